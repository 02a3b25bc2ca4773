//! Funds Transfer
//!
//! Moves value between two accounts as one all-or-nothing unit of work.
//!
//! # Steps (one transaction)
//!
//! ```text
//! 1. create Transfer(from, to, amount)
//! 2. create Entry(from, -amount)
//! 3. create Entry(to,   +amount)
//! 4. lock + update lower-id account   ┐ always ascending account id,
//! 5. lock + update higher-id account  ┘ never "from before to"
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Double-entry**: the two entries of a transfer sum to zero
//! 2. **Atomicity**: any failed step rolls back steps 1-5 together
//! 3. **Lock order**: two transfers over the same pair lock rows in the same
//!    order regardless of direction, so they cannot wait on each other in a cycle
//! 4. **At-most-one commit**: nothing is retried internally; retrying a failed
//!    transfer is always safe for the caller

pub mod orchestrator;
pub mod types;

pub use orchestrator::TransferOrchestrator;
pub use types::{BalancePolicy, TransferParams, TransferResult};

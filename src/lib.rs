//! Ledger Core - transactional funds transfers
//!
//! Moves value between two accounts with double-entry bookkeeping, as one
//! all-or-nothing unit of work that stays correct under concurrent transfers.
//!
//! # Modules
//!
//! - [`models`] - Account, Entry and Transfer rows
//! - [`error`] - Error taxonomy shared by every layer
//! - [`repository`] - Single-row primitives (PostgreSQL and in-memory)
//! - [`coordinator`] - Begin / run / commit-or-rollback
//! - [`transfer`] - The five-step transfer and account pass-through operations
//! - [`db`] - Connection pool and bootstrap schema
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod repository;
pub mod transfer;

// Convenient re-exports at crate root
pub use coordinator::{PgStore, TransactionCoordinator, TxBackend, TxHandle};
pub use error::LedgerError;
pub use models::{Account, CreateAccountParams, Entry, Transfer};
pub use repository::{MemoryStore, Repository};
pub use transfer::{BalancePolicy, TransferOrchestrator, TransferParams, TransferResult};

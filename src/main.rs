//! Ledger Core - bootstrap
//!
//! Loads `config/<env>.yaml`, sets up logging, connects to PostgreSQL, applies
//! the bootstrap schema and verifies the transfer core can open transactions.
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────────┐
//! │  Config  │───▶│ Logging  │───▶│ PgPool   │───▶│ Schema + Tx  │
//! │  (YAML)  │    │(tracing) │    │ (sqlx)   │    │  self-check  │
//! └──────────┘    └──────────┘    └──────────┘    └──────────────┘
//! ```
//!
//! Usage: `ledger_core [--env <name>]` (default env: `dev`)

use anyhow::Context;

use ledger_core::config::AppConfig;
use ledger_core::coordinator::PgStore;
use ledger_core::db::{Database, schema};
use ledger_core::transfer::TransferOrchestrator;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = ledger_core::logging::init_logging(&app_config);

    tracing::info!("Starting ledger core in {} mode", env);

    let db = Database::connect_with(&app_config.postgres_url, &app_config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    schema::init_schema(db.pool())
        .await
        .context("Failed to apply ledger schema")?;
    db.health_check().await.context("Health check failed")?;

    let store = PgStore::new(db.pool().clone(), &app_config.ledger);
    let orchestrator = TransferOrchestrator::new(store, app_config.ledger.balance_policy);

    // Round-trip one empty transaction through the coordinator
    orchestrator
        .coordinator()
        .run_in_transaction(|_repo| Box::pin(async move { Ok(()) }))
        .await
        .context("Transaction self-check failed")?;

    let accounts = orchestrator
        .list_accounts(1, 0)
        .await
        .context("Account listing failed")?;

    tracing::info!(
        lock_timeout_ms = app_config.ledger.lock_timeout_ms,
        balance_policy = ?orchestrator.policy(),
        has_accounts = !accounts.is_empty(),
        "Ledger core ready"
    );
    Ok(())
}

//! Bootstrap DDL for the ledger tables
//!
//! Idempotent (`IF NOT EXISTS`); safe to run on every start.

use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS accounts (
        id          BIGSERIAL PRIMARY KEY,
        owner       VARCHAR NOT NULL CHECK (length(trim(owner)) > 0),
        balance     BIGINT NOT NULL,
        currency    VARCHAR(3) NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS entries (
        id          BIGSERIAL PRIMARY KEY,
        account_id  BIGINT NOT NULL REFERENCES accounts (id),
        amount      BIGINT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS transfers (
        id              BIGSERIAL PRIMARY KEY,
        from_account_id BIGINT NOT NULL REFERENCES accounts (id),
        to_account_id   BIGINT NOT NULL REFERENCES accounts (id),
        amount          BIGINT NOT NULL CHECK (amount > 0),
        created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
        CHECK (from_account_id <> to_account_id)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_accounts_owner ON accounts (owner)",
    "CREATE INDEX IF NOT EXISTS idx_entries_account_id ON entries (account_id)",
    "CREATE INDEX IF NOT EXISTS idx_transfers_from_to ON transfers (from_account_id, to_account_id)",
    "CREATE INDEX IF NOT EXISTS idx_transfers_to ON transfers (to_account_id)",
];

/// Create ledger tables and indexes if missing
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!(statements = STATEMENTS.len(), "Ledger schema ready");
    Ok(())
}

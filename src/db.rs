//! Database module
//!
//! Database connection and schema verification utilities.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Tables the settlement engine reads or writes
pub const REQUIRED_TABLES: &[&str] = &[
    "accounts",
    "plans",
    "suppliers",
    "supplier_commission_overrides",
    "subscriptions",
    "orders",
    "ledger_entries",
    "processed_webhook_events",
    "withdrawal_requests",
    "outbound_tasks",
    "audit_logs",
];

/// Open the connection pool
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!(
                "Required table '{}' does not exist. Apply migrations/0001_settlement_core.sql.",
                table
            );
            return Ok(false);
        }
    }

    // The unique claim is what makes webhook handling idempotent
    let has_event_key: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.table_constraints
            WHERE table_schema = 'public'
              AND table_name = 'processed_webhook_events'
              AND constraint_type = 'PRIMARY KEY'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !has_event_key {
        tracing::error!("processed_webhook_events has no primary key on (gateway, event_id)");
        return Ok(false);
    }

    tracing::info!(tables = REQUIRED_TABLES.len(), "Database schema verified");
    Ok(true)
}

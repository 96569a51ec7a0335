//! PostgreSQL store
//!
//! Production implementation of the storage traits. Each [`PgTx`] wraps one
//! database transaction; row locks taken by the `lock_*` methods are held
//! until commit or rollback.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use super::{SettlementStore, StoreError, StoreResult, StoreTx};
use crate::audit::AuditRecord;
use crate::domain::{
    Amount, BalanceBucket, BalanceDelta, CommissionSources, EntryStatus, LedgerEntry,
    NewLedgerEntry, Order, PayoutStatus, Plan, Subscription, Supplier, SupplierBalance,
    SupplierFinancialStatus, SupplierStatus, SupplierType, WithdrawalRequest,
};
use crate::idempotency::ProcessedWebhookEvent;
use crate::outbox::{NewOutboundTask, OutboundTask};

const ORDER_COLUMNS: &str = r#"
    id, account_id, supplier_id, total_amount, marketplace_fee,
    status, payment_status, financial_status, payout_status,
    amount_paid, commission_rate, commission_value, net_value,
    gateway, external_transaction_id, paid_at, cancelled_at, cancellation_reason, updated_at
"#;

const SUPPLIER_COLUMNS: &str = r#"
    id, account_id, supplier_type, financial_status, status, commission_percent,
    available_balance, pending_balance, blocked_balance
"#;

const LEDGER_COLUMNS: &str = r#"
    id, supplier_id, entry_type, amount, reference_id, status,
    release_date, affects_balance, description, created_at
"#;

const WITHDRAWAL_COLUMNS: &str = r#"
    id, supplier_id, amount, payout_destination, status,
    requested_at, processed_at, processed_by, admin_note
"#;

const OUTBOUND_COLUMNS: &str = r#"
    id, event_type, payload, status, attempts, next_attempt_at, last_error, created_at, delivered_at
"#;

/// PostgreSQL-backed settlement store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettlementStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> StoreResult<PgTx> {
        let tx = self.pool.begin().await?;
        Ok(PgTx { tx })
    }

    async fn supplier(&self, supplier_id: Uuid) -> StoreResult<Option<Supplier>> {
        let sql = format!("SELECT {} FROM suppliers WHERE id = $1", SUPPLIER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(supplier_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(supplier_from_row).transpose()
    }

    async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn withdrawal(&self, request_id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
        let sql = format!(
            "SELECT {} FROM withdrawal_requests WHERE id = $1",
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(withdrawal_from_row).transpose()
    }

    async fn ledger_entries(&self, supplier_id: Uuid) -> StoreResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM ledger_entries WHERE supplier_id = $1 ORDER BY created_at, id",
            LEDGER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(supplier_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(ledger_entry_from_row).collect()
    }

    async fn suppliers_with_due_credits(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT supplier_id
            FROM ledger_entries
            WHERE entry_type = 'order_credit_pending'
              AND status = 'pending'
              AND release_date <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn overdue_candidates(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT s.id
            FROM suppliers s
            JOIN subscriptions sub ON sub.supplier_id = s.id AND sub.status <> 'cancelled'
            WHERE s.financial_status = 'active'
              AND sub.next_billing_date < $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn claim_due_outbound(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: i64,
    ) -> StoreResult<Vec<OutboundTask>> {
        // The lease hides claimed rows from concurrent dispatchers
        let sql = format!(
            r#"
            UPDATE outbound_tasks
            SET next_attempt_at = $2
            WHERE id IN (
                SELECT id FROM outbound_tasks
                WHERE status = 'pending' AND next_attempt_at <= $1
                ORDER BY next_attempt_at
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            OUTBOUND_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(now + lease)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(outbound_from_row).collect()
    }

    async fn mark_outbound_delivered(&self, task_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE outbound_tasks
            SET status = 'delivered', attempts = attempts + 1, delivered_at = $2
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_outbound_failed(
        &self,
        task_id: Uuid,
        attempts: i32,
        retry_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE outbound_tasks
            SET attempts = $2,
                last_error = $3,
                status = CASE WHEN $4::timestamptz IS NULL THEN 'dead' ELSE status END,
                next_attempt_at = COALESCE($4, next_attempt_at)
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(attempts)
        .bind(error)
        .bind(retry_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// One open database transaction
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn claim_webhook_event(&mut self, event: &ProcessedWebhookEvent) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (gateway, event_id, payload_hash, processed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (gateway, event_id) DO NOTHING
            "#,
        )
        .bind(&event.key.gateway)
        .bind(&event.key.event_id)
        .bind(&event.payload_hash)
        .bind(event.processed_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn lock_order(&mut self, order_id: Uuid) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE orders SET
                status = $2,
                payment_status = $3,
                financial_status = $4,
                payout_status = $5,
                amount_paid = $6,
                commission_rate = $7,
                commission_value = $8,
                net_value = $9,
                gateway = $10,
                external_transaction_id = $11,
                paid_at = $12,
                cancelled_at = $13,
                cancellation_reason = $14,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.financial_status.as_str())
        .bind(order.payout_status.map(|s| s.as_str()))
        .bind(order.amount_paid)
        .bind(order.commission_rate)
        .bind(order.commission_value)
        .bind(order.net_value)
        .bind(&order.gateway)
        .bind(&order.external_transaction_id)
        .bind(order.paid_at)
        .bind(order.cancelled_at)
        .bind(&order.cancellation_reason)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn set_payout_status(&mut self, order_id: Uuid, status: PayoutStatus) -> StoreResult<()> {
        sqlx::query("UPDATE orders SET payout_status = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn lock_supplier(&mut self, supplier_id: Uuid) -> StoreResult<Option<Supplier>> {
        let sql = format!(
            "SELECT {} FROM suppliers WHERE id = $1 FOR UPDATE",
            SUPPLIER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(supplier_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(supplier_from_row).transpose()
    }

    async fn update_supplier_status(
        &mut self,
        supplier_id: Uuid,
        financial_status: SupplierFinancialStatus,
        status: SupplierStatus,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE suppliers
            SET financial_status = $2, status = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(supplier_id)
        .bind(financial_status.as_str())
        .bind(status.as_str())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SupplierNotFound(supplier_id));
        }
        Ok(())
    }

    async fn apply_balance_delta(
        &mut self,
        supplier_id: Uuid,
        delta: &BalanceDelta,
    ) -> StoreResult<SupplierBalance> {
        let updated: Option<(Decimal, Decimal, Decimal)> = sqlx::query_as(
            r#"
            UPDATE suppliers
            SET available_balance = available_balance + $2,
                pending_balance = pending_balance + $3,
                blocked_balance = blocked_balance + $4,
                updated_at = NOW()
            WHERE id = $1
              AND available_balance + $2 >= 0
              AND pending_balance + $3 >= 0
              AND blocked_balance + $4 >= 0
            RETURNING available_balance, pending_balance, blocked_balance
            "#,
        )
        .bind(supplier_id)
        .bind(delta.available)
        .bind(delta.pending)
        .bind(delta.blocked)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some((available, pending, blocked)) = updated {
            return Ok(SupplierBalance::new(available, pending, blocked));
        }

        // Guard refused: find out which bucket, or whether the supplier is missing
        let current: Option<(Decimal, Decimal, Decimal)> = sqlx::query_as(
            "SELECT available_balance, pending_balance, blocked_balance FROM suppliers WHERE id = $1",
        )
        .bind(supplier_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let (available, pending, blocked) =
            current.ok_or(StoreError::SupplierNotFound(supplier_id))?;
        let current = SupplierBalance::new(available, pending, blocked);
        let bucket = current.apply(delta).err().unwrap_or(BalanceBucket::Available);

        Err(StoreError::NegativeBalance {
            supplier_id,
            bucket,
            current: current.get(bucket),
            change: delta.get(bucket),
        })
    }

    async fn commission_sources(
        &mut self,
        supplier_id: Uuid,
    ) -> StoreResult<Option<CommissionSources>> {
        let row: Option<(String, Option<Decimal>, Option<Decimal>, Option<Decimal>, Option<Decimal>)> =
            sqlx::query_as(
                r#"
                SELECT s.supplier_type,
                       o.commission_percent,
                       s.commission_percent,
                       a.default_commission_percent,
                       p.commission_percent
                FROM suppliers s
                LEFT JOIN accounts a ON a.id = s.account_id
                LEFT JOIN supplier_commission_overrides o
                       ON o.account_id = s.account_id AND o.supplier_id = s.id
                LEFT JOIN LATERAL (
                    SELECT plan_id FROM subscriptions
                    WHERE supplier_id = s.id AND status <> 'cancelled'
                    ORDER BY created_at DESC
                    LIMIT 1
                ) sub ON TRUE
                LEFT JOIN plans p ON p.id = sub.plan_id
                WHERE s.id = $1
                "#,
            )
            .bind(supplier_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(
            |(supplier_type, account_override, supplier_rate, account_default, plan_rate)|
             -> StoreResult<CommissionSources> {
                Ok(CommissionSources {
                    supplier_type: Some(supplier_type.parse::<SupplierType>()?),
                    account_override,
                    supplier_rate,
                    account_default,
                    plan_rate,
                })
            },
        )
        .transpose()
    }

    async fn current_subscription(
        &mut self,
        supplier_id: Uuid,
    ) -> StoreResult<Option<Subscription>> {
        let row: Option<(Uuid, Uuid, Uuid, Option<Uuid>, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, supplier_id, plan_id, scheduled_plan_id, status, next_billing_date
            FROM subscriptions
            WHERE supplier_id = $1 AND status <> 'cancelled'
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(supplier_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(
            |(id, supplier_id, plan_id, scheduled_plan_id, status, next_billing_date)|
             -> StoreResult<Subscription> {
                Ok(Subscription {
                    id,
                    supplier_id,
                    plan_id,
                    scheduled_plan_id,
                    status: status.parse()?,
                    next_billing_date,
                })
            },
        )
        .transpose()
    }

    async fn update_subscription(&mut self, subscription: &Subscription) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET plan_id = $2, scheduled_plan_id = $3, status = $4,
                next_billing_date = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.plan_id)
        .bind(subscription.scheduled_plan_id)
        .bind(subscription.status.as_str())
        .bind(subscription.next_billing_date)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn plan(&mut self, plan_id: Uuid) -> StoreResult<Option<Plan>> {
        let row: Option<(Uuid, String, Decimal, Decimal, i32, i32, i32)> = sqlx::query_as(
            r#"
            SELECT id, name, price, commission_percent, release_days, cycle_days, priority
            FROM plans
            WHERE id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(
            |(id, name, price, commission_percent, release_days, cycle_days, priority)| Plan {
                id,
                name,
                price,
                commission_percent,
                release_days: i64::from(release_days),
                cycle_days: i64::from(cycle_days),
                priority,
            },
        ))
    }

    async fn append_ledger_entry(&mut self, entry: NewLedgerEntry) -> StoreResult<LedgerEntry> {
        let (created_at,): (DateTime<Utc>,) = sqlx::query_as(
            r#"
            INSERT INTO ledger_entries (
                id, supplier_id, entry_type, amount, reference_id, status,
                release_date, affects_balance, description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING created_at
            "#,
        )
        .bind(entry.id)
        .bind(entry.supplier_id)
        .bind(entry.entry_type.as_str())
        .bind(entry.amount)
        .bind(entry.reference_id)
        .bind(entry.status.as_str())
        .bind(entry.release_date)
        .bind(entry.affects_balance)
        .bind(&entry.description)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(entry.into_entry(created_at))
    }

    async fn supplier_ledger(&mut self, supplier_id: Uuid) -> StoreResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM ledger_entries WHERE supplier_id = $1 ORDER BY created_at, id",
            LEDGER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(supplier_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(ledger_entry_from_row).collect()
    }

    async fn lock_order_credit(&mut self, order_id: Uuid) -> StoreResult<Option<LedgerEntry>> {
        let sql = format!(
            r#"
            SELECT {} FROM ledger_entries
            WHERE reference_id = $1 AND entry_type = 'order_credit_pending'
            FOR UPDATE
            "#,
            LEDGER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(ledger_entry_from_row).transpose()
    }

    async fn lock_due_credits(
        &mut self,
        supplier_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<LedgerEntry>> {
        let sql = format!(
            r#"
            SELECT {} FROM ledger_entries
            WHERE supplier_id = $1
              AND entry_type = 'order_credit_pending'
              AND status = 'pending'
              AND release_date <= $2
            ORDER BY release_date
            FOR UPDATE SKIP LOCKED
            "#,
            LEDGER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(supplier_id)
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(ledger_entry_from_row).collect()
    }

    async fn transition_entry_status(
        &mut self,
        entry_id: Uuid,
        from: EntryStatus,
        to: EntryStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE ledger_entries SET status = $3 WHERE id = $1 AND status = $2")
            .bind(entry_id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_withdrawal(&mut self, request: &WithdrawalRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO withdrawal_requests (
                id, supplier_id, amount, payout_destination, status, requested_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(request.id)
        .bind(request.supplier_id)
        .bind(request.amount.value())
        .bind(&request.payout_destination)
        .bind(request.status.as_str())
        .bind(request.requested_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_withdrawal(&mut self, request_id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
        let sql = format!(
            "SELECT {} FROM withdrawal_requests WHERE id = $1 FOR UPDATE",
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(request_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(withdrawal_from_row).transpose()
    }

    async fn update_withdrawal(&mut self, request: &WithdrawalRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE withdrawal_requests
            SET status = $2, processed_at = $3, processed_by = $4, admin_note = $5
            WHERE id = $1
            "#,
        )
        .bind(request.id)
        .bind(request.status.as_str())
        .bind(request.processed_at)
        .bind(request.processed_by)
        .bind(&request.admin_note)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn enqueue_outbound(&mut self, task: &NewOutboundTask) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO outbound_tasks (id, event_type, payload, status, attempts, next_attempt_at)
            VALUES ($1, $2, $3, 'pending', 0, NOW())
            "#,
        )
        .bind(task.id)
        .bind(&task.event_type)
        .bind(&task.payload)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_audit(&mut self, record: &AuditRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, action, resource_type, resource_id, actor_id, correlation_id, source,
                before_state, after_state, changed_fields, client_ip, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11::inet, $12)
            "#,
        )
        .bind(record.id)
        .bind(&record.action)
        .bind(&record.resource_type)
        .bind(record.resource_id)
        .bind(record.actor_id)
        .bind(record.correlation_id)
        .bind(&record.source)
        .bind(&record.before_state)
        .bind(&record.after_state)
        .bind(&record.changed_fields)
        .bind(record.client_ip.map(|ip| ip.to_string()))
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// =========================================================================
// Row decoding
// =========================================================================

fn order_from_row(row: &PgRow) -> StoreResult<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        supplier_id: row.try_get("supplier_id")?,
        total_amount: row.try_get("total_amount")?,
        marketplace_fee: row.try_get("marketplace_fee")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        payment_status: row.try_get::<String, _>("payment_status")?.parse()?,
        financial_status: row.try_get::<String, _>("financial_status")?.parse()?,
        payout_status: row
            .try_get::<Option<String>, _>("payout_status")?
            .map(|s| s.parse::<PayoutStatus>())
            .transpose()?,
        amount_paid: row.try_get("amount_paid")?,
        commission_rate: row.try_get("commission_rate")?,
        commission_value: row.try_get("commission_value")?,
        net_value: row.try_get("net_value")?,
        gateway: row.try_get("gateway")?,
        external_transaction_id: row.try_get("external_transaction_id")?,
        paid_at: row.try_get("paid_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        cancellation_reason: row.try_get("cancellation_reason")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn supplier_from_row(row: &PgRow) -> StoreResult<Supplier> {
    Ok(Supplier {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        supplier_type: row.try_get::<String, _>("supplier_type")?.parse()?,
        financial_status: row.try_get::<String, _>("financial_status")?.parse()?,
        status: row.try_get::<String, _>("status")?.parse()?,
        commission_percent: row.try_get("commission_percent")?,
        balance: SupplierBalance::new(
            row.try_get("available_balance")?,
            row.try_get("pending_balance")?,
            row.try_get("blocked_balance")?,
        ),
    })
}

fn ledger_entry_from_row(row: &PgRow) -> StoreResult<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        supplier_id: row.try_get("supplier_id")?,
        entry_type: row.try_get::<String, _>("entry_type")?.parse()?,
        amount: row.try_get("amount")?,
        reference_id: row.try_get("reference_id")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        release_date: row.try_get("release_date")?,
        affects_balance: row.try_get("affects_balance")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn withdrawal_from_row(row: &PgRow) -> StoreResult<WithdrawalRequest> {
    Ok(WithdrawalRequest {
        id: row.try_get("id")?,
        supplier_id: row.try_get("supplier_id")?,
        amount: Amount::try_from(row.try_get::<Decimal, _>("amount")?)?,
        payout_destination: row.try_get("payout_destination")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        requested_at: row.try_get("requested_at")?,
        processed_at: row.try_get("processed_at")?,
        processed_by: row.try_get("processed_by")?,
        admin_note: row.try_get("admin_note")?,
    })
}

fn outbound_from_row(row: &PgRow) -> StoreResult<OutboundTask> {
    Ok(OutboundTask {
        id: row.try_get("id")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        attempts: row.try_get("attempts")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        delivered_at: row.try_get("delivered_at")?,
    })
}

//! Commission resolution and settlement split
//!
//! Resolves the platform commission for a supplier and splits a payment into
//! marketplace fee, platform commission and supplier payout.
//!
//! Resolution order (first match wins):
//! 1. INTERNAL supplier -> 0%
//! 2. Per-account override for the supplier
//! 3. Supplier-level fixed rate
//! 4. Account default rate
//! 5. Subscription plan's `commission_percent`
//! 6. Fallback 10%

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{round_money, CommissionSources, DomainError, SupplierType};
use crate::store::{StoreResult, StoreTx};

/// Rate applied when nothing else is configured
pub const FALLBACK_COMMISSION_PERCENT: Decimal = Decimal::TEN;

/// Where a resolved rate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionSource {
    InternalSupplier,
    AccountOverride,
    SupplierRate,
    AccountDefault,
    Plan,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCommission {
    /// Percentage, e.g. 10 for 10%
    pub rate: Decimal,
    pub source: CommissionSource,
}

/// Pick the applicable rate. Pure: no I/O, no side effects.
pub fn resolve(sources: &CommissionSources) -> ResolvedCommission {
    let pick = |rate: Decimal, source| ResolvedCommission { rate, source };

    if sources.supplier_type == Some(SupplierType::Internal) {
        return pick(Decimal::ZERO, CommissionSource::InternalSupplier);
    }

    [
        (sources.account_override, CommissionSource::AccountOverride),
        (sources.supplier_rate, CommissionSource::SupplierRate),
        (sources.account_default, CommissionSource::AccountDefault),
        (sources.plan_rate, CommissionSource::Plan),
    ]
    .into_iter()
    .find_map(|(rate, source)| rate.map(|r| pick(r, source)))
    .unwrap_or_else(|| pick(FALLBACK_COMMISSION_PERCENT, CommissionSource::Fallback))
}

/// Loads commission inputs through the caller's transaction, so the rate is
/// read at payment-confirmation time alongside the money movement.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommissionResolver;

impl CommissionResolver {
    pub async fn resolve_rate<T: StoreTx>(
        &self,
        tx: &mut T,
        supplier_id: Uuid,
    ) -> StoreResult<Option<ResolvedCommission>> {
        let sources = tx.commission_sources(supplier_id).await?;
        Ok(sources.map(|s| resolve(&s)))
    }
}

/// How a payment is divided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSplit {
    pub total: Decimal,
    pub marketplace_fee: Decimal,
    pub platform_commission: Decimal,
    pub supplier_payout: Decimal,
}

impl SettlementSplit {
    /// total - marketplace_fee
    pub fn net(&self) -> Decimal {
        self.total - self.marketplace_fee
    }
}

/// `net = total - fee`; commission is rounded to cents once and the payout
/// takes the remainder, so `commission + payout == net` exactly.
pub fn split(
    total: Decimal,
    commission_percent: Decimal,
    marketplace_fee: Decimal,
) -> Result<SettlementSplit, DomainError> {
    if total <= Decimal::ZERO {
        return Err(DomainError::InvalidAmount(format!(
            "payment total must be positive (got {})",
            total
        )));
    }
    if marketplace_fee < Decimal::ZERO || marketplace_fee > total {
        return Err(DomainError::InvalidAmount(format!(
            "marketplace fee {} outside 0..={}",
            marketplace_fee, total
        )));
    }
    if commission_percent < Decimal::ZERO || commission_percent > Decimal::ONE_HUNDRED {
        return Err(DomainError::InvalidCommissionRate(commission_percent));
    }

    let net = total - marketplace_fee;
    let platform_commission = round_money(net * commission_percent / Decimal::ONE_HUNDRED);
    let supplier_payout = net - platform_commission;

    Ok(SettlementSplit {
        total,
        marketplace_fee,
        platform_commission,
        supplier_payout,
    })
}

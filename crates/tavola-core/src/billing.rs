//! # Billing Arithmetic
//!
//! Pure computations behind every amount the engine persists.
//!
//! ## Total Reconstruction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Session total is always rebuilt from the append-only trail:           │
//! │                                                                         │
//! │   KotItem { kot K1, P1, qty 3, 1.00 }                                  │
//! │        +  KotAdjustment { K1, P1, -1 }                                 │
//! │        =  effective qty 2  ──► line total 2.00                         │
//! │                                                                         │
//! │   KotItem { kot K2, P2, qty 1, 5.00 }                                  │
//! │        +  KotAdjustment { K2, P2, -1 }                                 │
//! │        =  effective qty 0  ──► excluded                                │
//! │                                                                         │
//! │   session total = Σ line totals with effective qty > 0 = 2.00          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No running sum is ever stored on the session; callers hand in the ticket
//! lines and adjustments and get the total back.

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::snapshot::{BillSummary, BillableLine};
use crate::types::{BillDiscount, BillPayment, DiscountType, KotAdjustment, KotItem};
use crate::{MAX_SPLIT_COUNT, MIN_SPLIT_COUNT};

// =============================================================================
// Effective Quantities
// =============================================================================

/// Sums adjustment deltas by `(kot_id, product_id)`.
fn adjustment_deltas(adjustments: &[KotAdjustment]) -> HashMap<(&str, &str), i64> {
    let mut deltas: HashMap<(&str, &str), i64> = HashMap::new();
    for adj in adjustments {
        *deltas
            .entry((adj.kot_id.as_str(), adj.product_id.as_str()))
            .or_insert(0) += adj.qty_change;
    }
    deltas
}

/// Effective quantity of one KOT line: `qty + Σ matching qty_change`.
///
/// May be zero or negative; adjustments are not clamped when written.
pub fn effective_qty(item: &KotItem, adjustments: &[KotAdjustment]) -> i64 {
    item.qty
        + adjustments
            .iter()
            .filter(|a| a.kot_id == item.kot_id && a.product_id == item.product_id)
            .map(|a| a.qty_change)
            .sum::<i64>()
}

/// KOT lines with their effective quantity, excluding any line that has
/// been cancelled down to zero or below. Input order is preserved.
pub fn billable_lines(items: &[KotItem], adjustments: &[KotAdjustment]) -> Vec<BillableLine> {
    let deltas = adjustment_deltas(adjustments);

    items
        .iter()
        .filter_map(|item| {
            let delta = deltas
                .get(&(item.kot_id.as_str(), item.product_id.as_str()))
                .copied()
                .unwrap_or(0);
            let effective = item.qty + delta;
            if effective <= 0 {
                return None;
            }
            Some(BillableLine {
                kot_id: item.kot_id.clone(),
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                ordered_qty: item.qty,
                effective_qty: effective,
                price: item.price(),
                total: item.price().multiply_quantity(effective),
            })
        })
        .collect()
}

/// Session total reconstructed from ticket lines and adjustments.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use tavola_core::billing::session_total;
/// use tavola_core::{KotAdjustment, KotItem};
///
/// let item = KotItem {
///     id: "i1".into(), kot_id: "k1".into(), product_id: "P1".into(),
///     name: "Lassi".into(), qty: 3, price_cents: 10_000, total_cents: 30_000, note: None,
/// };
/// let adj = KotAdjustment {
///     id: "a1".into(), session_id: "s1".into(), kot_id: "k1".into(),
///     product_id: "P1".into(), qty_change: -1, reason: "spilled".into(),
///     created_by: "staff".into(), created_at: Utc::now(),
/// };
/// assert_eq!(session_total(&[item], &[adj]).cents(), 20_000);
/// ```
pub fn session_total(items: &[KotItem], adjustments: &[KotAdjustment]) -> Money {
    billable_lines(items, adjustments)
        .into_iter()
        .map(|line| line.total)
        .sum()
}

// =============================================================================
// Settlement
// =============================================================================

/// Amount forgiven on a direct settlement: `max(0, bill - paid)`.
#[inline]
pub fn waived_off(bill_amount: Money, paid_amount: Money) -> Money {
    (bill_amount - paid_amount).clamp_zero()
}

/// Sum of payments recorded against a bill.
pub fn total_paid(payments: &[BillPayment]) -> Money {
    payments.iter().map(BillPayment::amount).sum()
}

/// A bill is paid once payments cover its total.
#[inline]
pub fn is_fully_paid(total: Money, paid: Money) -> bool {
    paid >= total
}

// =============================================================================
// Discounts
// =============================================================================

/// Amount one discount takes off `gross`.
pub fn discount_amount(gross: Money, discount: &BillDiscount) -> Money {
    match discount.discount_type {
        DiscountType::Flat => Money::from_cents(discount.value),
        DiscountType::Percent => gross.percentage_of(discount.value),
    }
}

/// Summarises a bill's gross, discounts and payments.
///
/// Discounts are each computed against the gross and the combined amount is
/// capped at the gross, so `net` never goes negative.
pub fn summarize_bill(
    gross: Money,
    discounts: &[BillDiscount],
    payments: &[BillPayment],
) -> BillSummary {
    let raw_discount: Money = discounts.iter().map(|d| discount_amount(gross, d)).sum();
    let discount_total = raw_discount.min(gross.clamp_zero());
    let net = gross - discount_total;
    let paid = total_paid(payments);

    BillSummary {
        gross,
        discount_total,
        net,
        paid,
        balance_due: (net - paid).clamp_zero(),
    }
}

// =============================================================================
// Equal Split
// =============================================================================

/// The shares produced by dividing a total among N payers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EqualSplit {
    pub total: Money,
    pub count: i64,
    /// Rounded half-up at the minor unit.
    pub per_split: Money,
    /// `total - per_split * count`. Not reassigned to any share.
    pub remainder: Money,
}

/// Rejects split counts outside `MIN_SPLIT_COUNT..=MAX_SPLIT_COUNT`.
pub fn validate_split_count(count: i64) -> CoreResult<()> {
    if !(MIN_SPLIT_COUNT..=MAX_SPLIT_COUNT).contains(&count) {
        return Err(CoreError::InvalidSplitCount {
            requested: count,
            min: MIN_SPLIT_COUNT,
            max: MAX_SPLIT_COUNT,
        });
    }
    Ok(())
}

/// Plans an equal split of `total` for `session_id`.
///
/// ## Errors
/// - [`CoreError::InvalidSplitCount`] when `count` is out of range
/// - [`CoreError::NothingToSplit`] when `total` is zero or negative
///
/// ## Example
/// ```rust
/// use tavola_core::billing::plan_equal_split;
/// use tavola_core::Money;
///
/// let plan = plan_equal_split("s-1", Money::from_cents(19_900), 3).unwrap();
/// assert_eq!(plan.per_split.cents(), 6_633);
/// assert_eq!(plan.remainder.cents(), 1);
/// ```
pub fn plan_equal_split(session_id: &str, total: Money, count: i64) -> CoreResult<EqualSplit> {
    validate_split_count(count)?;

    if !total.is_positive() {
        return Err(CoreError::NothingToSplit(session_id.to_string()));
    }

    let per_split = total
        .split_equal(count)
        .ok_or_else(|| CoreError::NothingToSplit(session_id.to_string()))?;

    Ok(EqualSplit {
        total,
        count,
        per_split,
        remainder: total - per_split * count,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # Read Models and Command Outcomes
//!
//! Shapes returned to collaborators: session snapshots for rendering and
//! the results of commands that produce more than an id.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{
    Bill, BillDiscount, BillItem, BillPayment, BillingSession, Kot, KotAdjustment, KotItem,
    SessionCartItem, SessionMeta, Settlement,
};

// =============================================================================
// Snapshots
// =============================================================================

/// Everything on the kitchen side of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session: BillingSession,
    pub cart: Vec<SessionCartItem>,
    /// Ordered by sequence number.
    pub kots: Vec<Kot>,
    pub kot_items: Vec<KotItem>,
    pub adjustments: Vec<KotAdjustment>,
}

/// [`SessionSnapshot`] plus the billing side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FullBillingSnapshot {
    #[serde(flatten)]
    pub base: SessionSnapshot,
    pub meta: Option<SessionMeta>,
    pub bills: Vec<Bill>,
    pub bill_items: Vec<BillItem>,
    pub payments: Vec<BillPayment>,
    pub discounts: Vec<BillDiscount>,
}

/// The parent's full snapshot as seen from one split child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SplitViewSnapshot {
    #[serde(flatten)]
    pub parent: FullBillingSnapshot,
    /// The child's own direct settlement, if it has been settled that way.
    pub settlement: Option<Settlement>,
    pub split_index: i64,
}

// =============================================================================
// Derived Lines
// =============================================================================

/// A KOT line after applying its adjustments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillableLine {
    pub kot_id: String,
    pub product_id: String,
    pub name: String,
    /// Quantity on the ticket.
    pub ordered_qty: i64,
    /// `ordered_qty + Σ qty_change`; always positive for billable lines.
    pub effective_qty: i64,
    pub price: Money,
    pub total: Money,
}

/// Informational totals for a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillSummary {
    pub gross: Money,
    /// Capped at `gross`.
    pub discount_total: Money,
    pub net: Money,
    pub paid: Money,
    /// `max(0, net - paid)`.
    pub balance_due: Money,
}

// =============================================================================
// Command Outcomes
// =============================================================================

/// Result of printing a bill.
///
/// `Skipped` is an expected outcome, not an error: the session had nothing
/// sent to the kitchen, so there was nothing to print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrintOutcome {
    Printed {
        revision: i64,
        /// KOT issued for residual cart items before printing.
        #[serde(rename = "autoKotId")]
        auto_kot_id: Option<String>,
    },
    Skipped,
}

impl PrintOutcome {
    #[inline]
    pub fn is_printed(&self) -> bool {
        matches!(self, PrintOutcome::Printed { .. })
    }
}

/// Result of a direct settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub settlement_id: String,
    /// Per-day sequence.
    pub bill_no: i64,
    #[ts(as = "String")]
    pub bill_date: NaiveDate,
    pub waived_off: Money,
    /// Whether the settlement also closed the split parent.
    pub parent_closed: bool,
}

/// Result of creating a bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBill {
    pub bill_id: String,
    pub bill_no: i64,
}

/// Result of settling a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillSettlement {
    /// No OPEN bills remained, so the session was closed.
    pub session_closed: bool,
    /// The session was a split child and its last open sibling.
    pub parent_closed: bool,
}

/// One child produced by an equal split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SplitChild {
    pub session_id: String,
    pub bill_id: String,
    pub bill_no: i64,
    pub split_index: i64,
}

/// Result of an equal split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SplitOutcome {
    pub parent_session_id: String,
    pub total: Money,
    pub per_split: Money,
    /// `total - per_split * children.len()`; may be negative. Not reassigned.
    pub remainder: Money,
    /// Ordered by split index.
    pub children: Vec<SplitChild>,
}

//! # Domain Types
//!
//! Persisted entities of the billing lifecycle and the enums they carry.
//!
//! ## Entity Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         BillingSession                                  │
//! │   (table tab; parent_session_id is a lookup key, never a live handle)  │
//! │                                                                         │
//! │   ├── SessionCartItem*   pre-ticket buffer, deleted on KOT issue       │
//! │   ├── Kot*               immutable ticket, sequence_no 1..N            │
//! │   │    └── KotItem*      frozen cart snapshot                          │
//! │   ├── KotAdjustment*     signed corrections, append-only               │
//! │   ├── Settlement?        legacy direct-pay record                      │
//! │   ├── SessionMeta?       customer / order note                         │
//! │   └── Bill*              FULL or SPLIT bill                            │
//! │        ├── BillItem*     (└── BillItemNote*)                           │
//! │        ├── BillDiscount*                                                │
//! │        └── BillPayment*                                                 │
//! │                                                                         │
//! │   AuditLogEntry          append-only, references any of the above      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Money Columns
//! Amounts are stored as `*_cents: i64` (minor units) and exposed as
//! [`Money`] through accessor methods.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

/// Implements `as_str()` and `Display` using the stored text form.
macro_rules! stored_text {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Text form used in storage and on the wire.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// =============================================================================
// Session Enums
// =============================================================================

/// How the order reaches the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    #[default]
    DineIn,
    Delivery,
    Takeaway,
}

stored_text!(OrderType {
    DineIn => "DINE_IN",
    Delivery => "DELIVERY",
    Takeaway => "TAKEAWAY",
});

/// Lifecycle of a billing session.
///
/// ## Transitions
/// ```text
/// RUNNING ──print──► PRINTED ──settle/split──► PAID
///    │                                          ▲
///    └──────── force-close (leaked) ────────────┘
/// ```
/// Status only ever moves forward; see [`SessionStatus::can_advance_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Tab is open, items are being ordered.
    #[default]
    Running,
    /// Bill has been printed; awaiting payment or split.
    Printed,
    /// Settled or closed. Terminal.
    Paid,
}

stored_text!(SessionStatus {
    Running => "RUNNING",
    Printed => "PRINTED",
    Paid => "PAID",
});

impl SessionStatus {
    const fn rank(&self) -> u8 {
        match self {
            SessionStatus::Running => 0,
            SessionStatus::Printed => 1,
            SessionStatus::Paid => 2,
        }
    }

    /// Whether moving to `next` keeps the lifecycle monotonic.
    ///
    /// Re-printing (PRINTED → PRINTED) is allowed; PAID is terminal.
    pub const fn can_advance_to(&self, next: SessionStatus) -> bool {
        match self {
            SessionStatus::Paid => false,
            _ => next.rank() >= self.rank(),
        }
    }

    /// Whether the session still counts as open for its table.
    #[inline]
    pub const fn is_open(&self) -> bool {
        !matches!(self, SessionStatus::Paid)
    }
}

// =============================================================================
// Bill Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillType {
    #[default]
    Full,
    Split,
}

stored_text!(BillType {
    Full => "FULL",
    Split => "SPLIT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitMethod {
    #[default]
    None,
    Equal,
    Percentage,
    Item,
}

stored_text!(SplitMethod {
    None => "NONE",
    Equal => "EQUAL",
    Percentage => "PERCENTAGE",
    Item => "ITEM",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillStatus {
    #[default]
    Open,
    Paid,
}

stored_text!(BillStatus {
    Open => "OPEN",
    Paid => "PAID",
});

/// FLAT discounts carry a value in minor units, PERCENT in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Flat,
    Percent,
}

stored_text!(DiscountType {
    Flat => "FLAT",
    Percent => "PERCENT",
});

/// Tender used for a payment against a [`Bill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    Cash,
    Card,
    Gpay,
    Phonepe,
    Paytm,
    /// Customer owes the amount (credit tab).
    Due,
}

stored_text!(PaymentMode {
    Cash => "CASH",
    Card => "CARD",
    Gpay => "GPAY",
    Phonepe => "PHONEPE",
    Paytm => "PAYTM",
    Due => "DUE",
});

/// Tender recorded on a direct [`Settlement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementMode {
    #[default]
    Cash,
    Card,
    /// Part cash, part card.
    Part,
    Other,
}

stored_text!(SettlementMode {
    Cash => "CASH",
    Card => "CARD",
    Part => "PART",
    Other => "OTHER",
});

// =============================================================================
// Audit Enums
// =============================================================================

/// Kind of entity an audit entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Session,
    SessionMeta,
    Cart,
    Kot,
    Adjustment,
    Bill,
    Discount,
    Payment,
}

stored_text!(EntityType {
    Session => "SESSION",
    SessionMeta => "SESSION_META",
    Cart => "CART",
    Kot => "KOT",
    Adjustment => "ADJUSTMENT",
    Bill => "BILL",
    Discount => "DISCOUNT",
    Payment => "PAYMENT",
});

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    QtyChange,
    CancelItem,
    Print,
    Settle,
    SplitCreate,
    Upsert,
    Apply,
    Add,
}

stored_text!(AuditAction {
    Create => "CREATE",
    QtyChange => "QTY_CHANGE",
    CancelItem => "CANCEL_ITEM",
    Print => "PRINT",
    Settle => "SETTLE",
    SplitCreate => "SPLIT_CREATE",
    Upsert => "UPSERT",
    Apply => "APPLY",
    Add => "ADD",
});

// =============================================================================
// Catalog Input
// =============================================================================

/// A menu item as supplied by the catalog collaborator.
///
/// The engine does not validate pricing against any catalog; it records
/// whatever the caller hands it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub product_id: String,
    pub name: String,
    pub price_cents: i64,
    /// Kitchen instruction for this line ("no onion").
    pub note: Option<String>,
}

impl MenuItem {
    /// Creates a menu item without a note.
    pub fn new(product_id: impl Into<String>, name: impl Into<String>, price: Money) -> Self {
        MenuItem {
            product_id: product_id.into(),
            name: name.into(),
            price_cents: price.cents(),
            note: None,
        }
    }

    /// Attaches a kitchen note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Billing Session
// =============================================================================

/// The running tab for one table, takeaway or delivery slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillingSession {
    pub id: String,
    pub table_id: String,
    pub order_type: OrderType,
    pub status: SessionStatus,
    /// 1 once a bill has been printed for this session.
    pub bill_printed: i64,
    /// Incremented on every print.
    pub bill_revision: i64,
    /// Set on split children only.
    pub parent_session_id: Option<String>,
    /// 1..N on split children only.
    pub split_index: Option<i64>,
    pub opened_by: String,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl BillingSession {
    /// Whether this session was produced by splitting another.
    #[inline]
    pub fn is_split_child(&self) -> bool {
        self.parent_session_id.is_some()
    }
}

// =============================================================================
// Cart
// =============================================================================

/// A pre-ticket cart line. One row per product per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SessionCartItem {
    pub id: String,
    pub session_id: String,
    pub product_id: String,
    pub name: String,
    pub qty: i64,
    pub price_cents: i64,
    /// Always `qty * price_cents`.
    pub total_cents: i64,
    pub note: Option<String>,
}

impl SessionCartItem {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Kitchen Order Ticket
// =============================================================================

/// An immutable round of items sent to the kitchen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Kot {
    pub id: String,
    pub session_id: String,
    /// 1-based, gap-free within the session.
    pub sequence_no: i64,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub kitchen_note: Option<String>,
}

/// A KOT line: the cart row frozen at ticket time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct KotItem {
    pub id: String,
    pub kot_id: String,
    pub product_id: String,
    pub name: String,
    pub qty: i64,
    pub price_cents: i64,
    pub total_cents: i64,
    pub note: Option<String>,
}

impl KotItem {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// A signed post-ticket quantity correction against one KOT line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct KotAdjustment {
    pub id: String,
    pub session_id: String,
    pub kot_id: String,
    pub product_id: String,
    /// Usually negative (cancellation).
    pub qty_change: i64,
    pub reason: String,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Settlement (direct pay)
// =============================================================================

/// A direct settlement of a printed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub id: String,
    pub session_id: String,
    /// Per-day sequence across all settlements.
    pub bill_no: i64,
    #[ts(as = "String")]
    pub bill_date: NaiveDate,
    pub bill_amount_cents: i64,
    pub paid_amount_cents: i64,
    /// `max(0, bill_amount - paid_amount)`.
    pub waived_off_cents: i64,
    pub payment_mode: SettlementMode,
    pub settled_by: String,
    #[ts(as = "String")]
    pub settled_at: DateTime<Utc>,
}

impl Settlement {
    #[inline]
    pub fn bill_amount(&self) -> Money {
        Money::from_cents(self.bill_amount_cents)
    }

    #[inline]
    pub fn paid_amount(&self) -> Money {
        Money::from_cents(self.paid_amount_cents)
    }

    #[inline]
    pub fn waived_off(&self) -> Money {
        Money::from_cents(self.waived_off_cents)
    }
}

// =============================================================================
// Bills
// =============================================================================

/// A bill issued against a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: String,
    pub session_id: String,
    /// Per-session sequence for FULL bills, per-day global for SPLIT bills.
    pub bill_no: i64,
    #[ts(as = "String")]
    pub bill_date: NaiveDate,
    pub bill_type: BillType,
    pub split_method: SplitMethod,
    pub total_amount_cents: i64,
    pub status: BillStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Bill {
    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillItem {
    pub id: String,
    pub bill_id: String,
    pub product_id: String,
    pub name: String,
    pub qty: i64,
    pub price_cents: i64,
    pub total_cents: i64,
}

/// Free-text annotation on a bill line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillItemNote {
    pub id: String,
    pub bill_item_id: String,
    pub note: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillDiscount {
    pub id: String,
    pub bill_id: String,
    pub discount_type: DiscountType,
    /// Minor units for FLAT, basis points for PERCENT.
    pub value: i64,
    pub reason: String,
    pub applied_by: String,
    #[ts(as = "String")]
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillPayment {
    pub id: String,
    pub bill_id: String,
    pub payment_mode: PaymentMode,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub paid_at: DateTime<Utc>,
}

impl BillPayment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Session Meta
// =============================================================================

/// Free-form per-session metadata, keyed by session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub session_id: String,
    pub customer_id: Option<String>,
    pub order_note: Option<String>,
    pub order_type: OrderType,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Audit Log
// =============================================================================

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: AuditAction,
    /// JSON document; opaque to the engine's invariants.
    pub payload: String,
    pub performed_by: String,
    #[ts(as = "String")]
    pub performed_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Parses the payload back into JSON.
    pub fn payload_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.payload)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_monotonic() {
        use SessionStatus::*;

        assert!(Running.can_advance_to(Printed));
        assert!(Running.can_advance_to(Paid));
        assert!(Printed.can_advance_to(Printed));
        assert!(Printed.can_advance_to(Paid));

        assert!(!Printed.can_advance_to(Running));
        assert!(!Paid.can_advance_to(Running));
        assert!(!Paid.can_advance_to(Printed));
        assert!(!Paid.can_advance_to(Paid));
    }

    #[test]
    fn test_stored_text_matches_serde() {
        assert_eq!(OrderType::DineIn.as_str(), "DINE_IN");
        assert_eq!(
            serde_json::to_string(&OrderType::DineIn).unwrap(),
            "\"DINE_IN\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentMode::Phonepe).unwrap(),
            format!("\"{}\"", PaymentMode::Phonepe)
        );
        assert_eq!(EntityType::SessionMeta.to_string(), "SESSION_META");
        assert_eq!(AuditAction::SplitCreate.to_string(), "SPLIT_CREATE");
    }

    #[test]
    fn test_menu_item_builder() {
        let item = MenuItem::new("P1", "Paneer Tikka", Money::from_cents(25_000))
            .with_note("extra spicy");
        assert_eq!(item.price().cents(), 25_000);
        assert_eq!(item.note.as_deref(), Some("extra spicy"));
    }

    #[test]
    fn test_session_serializes_camel_case() {
        let session = BillingSession {
            id: "s-1".into(),
            table_id: "T4".into(),
            order_type: OrderType::DineIn,
            status: SessionStatus::Running,
            bill_printed: 0,
            bill_revision: 0,
            parent_session_id: None,
            split_index: None,
            opened_by: "staff-1".into(),
            opened_at: Utc::now(),
            closed_at: None,
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["tableId"], "T4");
        assert_eq!(json["status"], "RUNNING");
        assert!(json["parentSessionId"].is_null());
        assert!(!session.is_split_child());
    }
}

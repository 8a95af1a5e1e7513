//! # tavola-core: Pure Billing Logic
//!
//! Domain types and business rules for a restaurant terminal's
//! order-to-payment lifecycle. Nothing in this crate touches a database,
//! a clock or the network; the storage crate (`tavola-db`) drives it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tavola Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Collaborators (UI, desktop shell, LAN, cloud)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ local function calls                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tavola-db (command engine)                   │   │
//! │  │   sessions ─► cart ─► KOT ─► adjustments ─► bills ─► split      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tavola-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  billing  │  │ validation│  │   │
//! │  │   │  Session  │  │   Money   │  │  totals   │  │   rules   │  │   │
//! │  │   │  Kot/Bill │  │  rounding │  │  splits   │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Persisted entities and their enums
//! - [`snapshot`] - Read models and command outcomes returned to callers
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`billing`] - Effective quantities, totals, discounts, equal splits
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tavola_core::money::Money;
//!
//! let total = Money::from_cents(19_900); // 199.00
//! let share = total.split_equal(3).unwrap();
//! assert_eq!(share.cents(), 6_633); // 66.33, the remainder is not reassigned
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod billing;
pub mod error;
pub mod money;
pub mod snapshot;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use snapshot::*;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single product in a session cart.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Highest unit price accepted for a cart or bill line, in minor units.
///
/// `MAX_UNIT_PRICE_CENTS * MAX_ITEM_QUANTITY` stays far inside `i64`, so line
/// totals and session sums cannot overflow.
pub const MAX_UNIT_PRICE_CENTS: i64 = 10_000_000_000;

/// Highest bill, settlement, payment or flat discount amount, in minor units.
pub const MAX_AMOUNT_CENTS: i64 = 10_000_000_000_000;

/// Smallest number of payers an equal split can produce.
pub const MIN_SPLIT_COUNT: i64 = 2;

/// Largest number of payers an equal split can produce.
pub const MAX_SPLIT_COUNT: i64 = 50;

/// 100% expressed in basis points.
pub const FULL_PERCENT_BPS: i64 = 10_000;

/// Maximum length of free-text fields (notes, reasons).
pub const MAX_TEXT_LENGTH: usize = 500;

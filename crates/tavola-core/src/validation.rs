//! # Validation Module
//!
//! Input validation for billing commands.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (before the transaction opens)                   │
//! │  ├── Required text (staff id, reasons, product identity)               │
//! │  ├── Numeric ranges (quantity, price, payment, discount)               │
//! │  └── Free-text length                                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Repository (inside the transaction)                          │
//! │  ├── Session / bill existence                                          │
//! │  └── Status guards (PRINTED before settle, no double split)            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  ├── CHECK constraints on enum text and amounts                        │
//! │  ├── UNIQUE (session_id, sequence_no) on kots                          │
//! │  └── Foreign keys                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tavola_core::validation::{validate_reason, validate_cart_quantity};
//!
//! validate_reason("customer changed mind").unwrap();
//! assert!(validate_reason("   ").is_err());
//! assert!(validate_cart_quantity(1_000).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::{DiscountType, MenuItem};
use crate::{
    FULL_PERCENT_BPS, MAX_AMOUNT_CENTS, MAX_ITEM_QUANTITY, MAX_TEXT_LENGTH, MAX_UNIT_PRICE_CENTS,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates that a text field is present and within the length limit.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    validate_text_length(field, value)
}

/// Validates an optional free-text field (notes).
pub fn validate_text_length(field: &str, value: &str) -> ValidationResult<()> {
    if value.chars().count() > MAX_TEXT_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_TEXT_LENGTH,
        });
    }
    Ok(())
}

/// Validates the acting staff identifier carried by every mutating command.
#[inline]
pub fn validate_staff_id(staff_id: &str) -> ValidationResult<()> {
    validate_required("staff_id", staff_id)
}

/// Validates a correction reason (adjustments, discounts).
///
/// ## Example
/// ```rust
/// use tavola_core::validation::validate_reason;
///
/// assert!(validate_reason("wrong table").is_ok());
/// assert!(validate_reason("").is_err());
/// ```
#[inline]
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    validate_required("reason", reason)
}

/// Validates a menu item handed in by the catalog.
///
/// ## Rules
/// - Product id and name must not be blank
/// - Price must be within `0..=MAX_UNIT_PRICE_CENTS` (zero is a complimentary item)
/// - Note, when present, must be within the text limit
pub fn validate_menu_item(item: &MenuItem) -> ValidationResult<()> {
    validate_required("product_id", &item.product_id)?;
    validate_required("name", &item.name)?;
    validate_unit_price(item.price_cents)?;

    if let Some(note) = &item.note {
        validate_text_length("note", note)?;
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart quantity update.
///
/// Zero and negative values are accepted here: they remove the line.
pub fn validate_cart_quantity(qty: i64) -> ValidationResult<()> {
    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Validates the quantity of an itemised bill line.
pub fn validate_line_quantity(qty: i64) -> ValidationResult<()> {
    if !(1..=MAX_ITEM_QUANTITY).contains(&qty) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a signed adjustment delta.
///
/// Any direction is accepted, including one that takes the line below zero,
/// but a single correction can move at most `MAX_ITEM_QUANTITY` units.
pub fn validate_adjustment_delta(qty_change: i64) -> ValidationResult<()> {
    if !(-MAX_ITEM_QUANTITY..=MAX_ITEM_QUANTITY).contains(&qty_change) {
        return Err(ValidationError::OutOfRange {
            field: "qty_change".to_string(),
            min: -MAX_ITEM_QUANTITY,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a unit price in minor units.
pub fn validate_unit_price(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_UNIT_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }
    Ok(())
}

/// Validates a payment amount in minor units.
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "amount".to_string(),
            min: 1,
            max: MAX_AMOUNT_CENTS,
        });
    }
    Ok(())
}

/// Validates a bill or settlement amount. Zero-value bills are allowed.
pub fn validate_bill_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_AMOUNT_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }
    Ok(())
}

/// Validates a discount value.
///
/// ## Rules
/// - FLAT: positive amount in minor units, at most `MAX_AMOUNT_CENTS`
/// - PERCENT: 1..=10000 basis points (0.01% to 100%)
pub fn validate_discount(discount_type: DiscountType, value: i64) -> ValidationResult<()> {
    match discount_type {
        DiscountType::Flat if value <= 0 => Err(ValidationError::MustBePositive {
            field: "discount".to_string(),
        }),
        DiscountType::Flat if value > MAX_AMOUNT_CENTS => Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 1,
            max: MAX_AMOUNT_CENTS,
        }),
        DiscountType::Percent if !(1..=FULL_PERCENT_BPS).contains(&value) => {
            Err(ValidationError::OutOfRange {
                field: "discount".to_string(),
                min: 1,
                max: FULL_PERCENT_BPS,
            })
        }
        _ => Ok(()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # Cart Repository
//!
//! The pre-ticket buffer of a session: one row per product, mutated freely
//! until a KOT freezes it.
//!
//! ## Cart Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Cart Operations                                 │
//! │                                                                         │
//! │  add_to_cart(P1)   ──► no row  → INSERT qty 1                          │
//! │  add_to_cart(P1)   ──► row     → qty + 1, note kept unless a new one   │
//! │  update_cart_qty   ──► qty ≤ 0 → DELETE                                │
//! │                    ──► qty > 0 → SET qty (audited when a reason given) │
//! │  update_note       ──► SET note (not audited)                          │
//! │  create_kot        ──► snapshot rows into KotItems, DELETE all         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tavola_core::validation::{
    validate_cart_quantity, validate_menu_item, validate_reason, validate_required,
    validate_text_length,
};
use tavola_core::{
    AuditAction, EntityType, MenuItem, SessionCartItem, ValidationError, MAX_ITEM_QUANTITY,
};
use tracing::debug;

use crate::command::CommandTx;
use crate::error::{DbError, DbResult};
use crate::ids::IdGenerator;
use crate::repository::session::require_open_session;

const SELECT_CART: &str = r#"
    SELECT id, session_id, product_id, name, qty, price_cents, total_cents, note
    FROM session_cart
"#;

/// Repository for session cart operations.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
    ids: Arc<dyn IdGenerator>,
}

impl CartRepository {
    /// Creates a new CartRepository.
    pub fn new(pool: SqlitePool, ids: Arc<dyn IdGenerator>) -> Self {
        CartRepository { pool, ids }
    }

    /// Adds one unit of `item` to the session cart.
    ///
    /// Repeated adds of the same product increment the existing row; its
    /// note is replaced only when the new add carries one. An add past
    /// `MAX_ITEM_QUANTITY` is rejected and leaves the line unchanged.
    pub async fn add_to_cart(&self, session_id: &str, item: &MenuItem) -> DbResult<SessionCartItem> {
        validate_menu_item(item)?;
        debug!(session_id = %session_id, product_id = %item.product_id, "Adding to cart");

        let mut tx = self.pool.begin().await?;
        require_open_session(&mut tx, session_id).await?;
        let line = upsert_line(&mut tx, &self.ids.next_id(), session_id, item).await?;
        tx.commit().await?;

        Ok(line)
    }

    /// Sets the quantity of a cart line; zero or less removes it.
    ///
    /// ## Audit
    /// A `CART/QTY_CHANGE` entry is written only when `reason` is given
    /// (decrements confirmed through a reason prompt upstream).
    pub async fn update_cart_qty(
        &self,
        session_id: &str,
        product_id: &str,
        qty: i64,
        reason: Option<&str>,
        staff_id: &str,
    ) -> DbResult<()> {
        validate_cart_quantity(qty)?;
        if let Some(reason) = reason {
            validate_reason(reason)?;
        }
        debug!(session_id = %session_id, product_id = %product_id, qty, "Updating cart quantity");

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;
        require_open_session(cmd.conn(), session_id).await?;

        if qty <= 0 {
            sqlx::query("DELETE FROM session_cart WHERE session_id = ?1 AND product_id = ?2")
                .bind(session_id)
                .bind(product_id)
                .execute(cmd.conn())
                .await?;
        } else {
            let updated = sqlx::query(
                r#"
                UPDATE session_cart
                SET qty = ?1, total_cents = ?1 * price_cents
                WHERE session_id = ?2 AND product_id = ?3
                "#,
            )
            .bind(qty)
            .bind(session_id)
            .bind(product_id)
            .execute(cmd.conn())
            .await?
            .rows_affected();

            if updated == 0 {
                return Err(DbError::not_found("Cart item", product_id));
            }
        }

        if let Some(reason) = reason {
            cmd.record(
                EntityType::Cart,
                session_id,
                AuditAction::QtyChange,
                json!({ "productId": product_id, "qty": qty, "reason": reason }),
            );
        }
        cmd.commit().await?;

        Ok(())
    }

    /// Overwrites a cart line's note. A blank note clears it.
    pub async fn update_cart_item_note(
        &self,
        session_id: &str,
        product_id: &str,
        note: Option<&str>,
    ) -> DbResult<()> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        if let Some(note) = note {
            validate_text_length("note", note)?;
        }

        let updated = sqlx::query(
            "UPDATE session_cart SET note = ?1 WHERE session_id = ?2 AND product_id = ?3",
        )
        .bind(note)
        .bind(session_id)
        .bind(product_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(DbError::not_found("Cart item", product_id));
        }
        Ok(())
    }

    /// Current cart lines for a session.
    pub async fn get_cart(&self, session_id: &str) -> DbResult<Vec<SessionCartItem>> {
        validate_required("session_id", session_id)?;
        let mut conn = self.pool.acquire().await?;
        list_lines(&mut conn, session_id).await
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Inserts a qty-1 line or increments the existing one, up to
/// `MAX_ITEM_QUANTITY`.
pub(crate) async fn upsert_line(
    conn: &mut SqliteConnection,
    new_id: &str,
    session_id: &str,
    item: &MenuItem,
) -> DbResult<SessionCartItem> {
    let note = item.note.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let line = sqlx::query_as::<_, SessionCartItem>(
        r#"
        INSERT INTO session_cart (
            id, session_id, product_id, name, qty, price_cents, total_cents, note
        ) VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5, ?6)
        ON CONFLICT(session_id, product_id) DO UPDATE SET
            qty = qty + 1,
            total_cents = (qty + 1) * price_cents,
            note = COALESCE(excluded.note, note)
        WHERE session_cart.qty < ?7
        RETURNING id, session_id, product_id, name, qty, price_cents, total_cents, note
        "#,
    )
    .bind(new_id)
    .bind(session_id)
    .bind(&item.product_id)
    .bind(&item.name)
    .bind(item.price_cents)
    .bind(note)
    .bind(MAX_ITEM_QUANTITY)
    .fetch_optional(conn)
    .await?;

    // No row back means the conflict update was filtered out by the cap
    line.ok_or_else(|| {
        ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: MAX_ITEM_QUANTITY,
        }
        .into()
    })
}

/// Cart lines in insertion order.
pub(crate) async fn list_lines(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<Vec<SessionCartItem>> {
    let sql = format!("{SELECT_CART} WHERE session_id = ?1 ORDER BY rowid");
    let lines = sqlx::query_as::<_, SessionCartItem>(&sql)
        .bind(session_id)
        .fetch_all(conn)
        .await?;

    Ok(lines)
}

/// Empties the cart. Returns the number of lines removed.
pub(crate) async fn clear(conn: &mut SqliteConnection, session_id: &str) -> DbResult<u64> {
    let removed = sqlx::query("DELETE FROM session_cart WHERE session_id = ?1")
        .bind(session_id)
        .execute(conn)
        .await?
        .rows_affected();

    Ok(removed)
}

// =============================================================================
// Unit Tests
// =============================================================================

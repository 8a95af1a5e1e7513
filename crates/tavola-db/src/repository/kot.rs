//! # KOT Repository
//!
//! Converts the current cart into an immutable kitchen order ticket.
//!
//! ## Sequencing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  INSERT INTO kots (..., sequence_no, ...)                              │
//! │  SELECT ..., COALESCE(MAX(sequence_no), 0) + 1, ...                    │
//! │  FROM kots WHERE session_id = ?                                        │
//! │                                                                         │
//! │  • read and write are one statement inside the command transaction    │
//! │  • UNIQUE (session_id, sequence_no) rejects any duplicate that slips   │
//! │    through, rolling the whole ticket back                              │
//! │  • result: 1, 2, 3, ... per session, no gaps, no repeats               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tavola_core::validation::validate_text_length;
use tavola_core::{AuditAction, EntityType, Kot, KotItem};
use tracing::{debug, info};

use crate::command::CommandTx;
use crate::error::DbResult;
use crate::ids::IdGenerator;
use crate::repository::cart;
use crate::repository::session::require_open_session;

/// Repository for kitchen order tickets.
#[derive(Debug, Clone)]
pub struct KotRepository {
    pool: SqlitePool,
    ids: Arc<dyn IdGenerator>,
}

impl KotRepository {
    /// Creates a new KotRepository.
    pub fn new(pool: SqlitePool, ids: Arc<dyn IdGenerator>) -> Self {
        KotRepository { pool, ids }
    }

    /// Sends the session's cart to the kitchen.
    ///
    /// ## Returns
    /// * `Ok(Some(kot_id))` - ticket issued, cart emptied
    /// * `Ok(None)` - cart was empty, nothing written
    pub async fn create_kot(
        &self,
        session_id: &str,
        staff_id: &str,
        kitchen_note: Option<&str>,
    ) -> DbResult<Option<String>> {
        if let Some(note) = kitchen_note {
            validate_text_length("kitchen_note", note)?;
        }
        debug!(session_id = %session_id, "Creating KOT");

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;
        require_open_session(cmd.conn(), session_id).await?;

        let kot = issue(&mut cmd, session_id, kitchen_note).await?;
        if kot.is_some() {
            cmd.commit().await?;
        }

        Ok(kot.map(|k| k.id))
    }

    /// Tickets of a session in sequence order.
    pub async fn list_kots(&self, session_id: &str) -> DbResult<Vec<Kot>> {
        let mut conn = self.pool.acquire().await?;
        list_for_session(&mut conn, session_id).await
    }

    /// Lines of one ticket.
    pub async fn get_kot_items(&self, kot_id: &str) -> DbResult<Vec<KotItem>> {
        let items = sqlx::query_as::<_, KotItem>(
            r#"
            SELECT id, kot_id, product_id, name, qty, price_cents, total_cents, note
            FROM kot_items
            WHERE kot_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(kot_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Freezes the cart into a new KOT inside `cmd`. `None` when the cart is
/// empty. The caller has already checked the session is open.
pub(crate) async fn issue(
    cmd: &mut CommandTx,
    session_id: &str,
    kitchen_note: Option<&str>,
) -> DbResult<Option<Kot>> {
    let lines = cart::list_lines(cmd.conn(), session_id).await?;
    if lines.is_empty() {
        debug!(session_id = %session_id, "Cart empty, no KOT issued");
        return Ok(None);
    }

    let kot_id = cmd.next_id();
    let created_by = cmd.staff_id().to_string();
    let kitchen_note = kitchen_note.map(str::trim).filter(|n| !n.is_empty());
    let now = Utc::now();

    let kot = sqlx::query_as::<_, Kot>(
        r#"
        INSERT INTO kots (id, session_id, sequence_no, created_by, created_at, kitchen_note)
        SELECT ?1, ?2, COALESCE(MAX(sequence_no), 0) + 1, ?3, ?4, ?5
        FROM kots
        WHERE session_id = ?2
        RETURNING id, session_id, sequence_no, created_by, created_at, kitchen_note
        "#,
    )
    .bind(&kot_id)
    .bind(session_id)
    .bind(&created_by)
    .bind(now)
    .bind(kitchen_note)
    .fetch_one(cmd.conn())
    .await?;

    for line in &lines {
        let item_id = cmd.next_id();
        sqlx::query(
            r#"
            INSERT INTO kot_items (
                id, kot_id, product_id, name, qty, price_cents, total_cents, note
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item_id)
        .bind(&kot.id)
        .bind(&line.product_id)
        .bind(&line.name)
        .bind(line.qty)
        .bind(line.price_cents)
        .bind(line.total_cents)
        .bind(&line.note)
        .execute(cmd.conn())
        .await?;
    }

    cart::clear(cmd.conn(), session_id).await?;

    cmd.record(
        EntityType::Kot,
        kot.id.as_str(),
        AuditAction::Create,
        json!({
            "sessionId": session_id,
            "sequenceNo": kot.sequence_no,
            "items": lines,
            "kitchenNote": kitchen_note,
        }),
    );

    info!(
        session_id = %session_id,
        kot_id = %kot.id,
        sequence_no = kot.sequence_no,
        items = lines.len(),
        "KOT issued"
    );
    Ok(Some(kot))
}

pub(crate) async fn list_for_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<Vec<Kot>> {
    let kots = sqlx::query_as::<_, Kot>(
        r#"
        SELECT id, session_id, sequence_no, created_by, created_at, kitchen_note
        FROM kots
        WHERE session_id = ?1
        ORDER BY sequence_no
        "#,
    )
    .bind(session_id)
    .fetch_all(conn)
    .await?;

    Ok(kots)
}

/// Every ticket line of a session, in ticket then line order.
pub(crate) async fn items_for_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<Vec<KotItem>> {
    let items = sqlx::query_as::<_, KotItem>(
        r#"
        SELECT ki.id, ki.kot_id, ki.product_id, ki.name, ki.qty,
               ki.price_cents, ki.total_cents, ki.note
        FROM kot_items ki
        JOIN kots k ON k.id = ki.kot_id
        WHERE k.session_id = ?1
        ORDER BY k.sequence_no, ki.rowid
        "#,
    )
    .bind(session_id)
    .fetch_all(conn)
    .await?;

    Ok(items)
}

/// Whether the session has at least one ticket.
pub(crate) async fn has_any(conn: &mut SqliteConnection, session_id: &str) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM kots WHERE session_id = ?1 LIMIT 1")
        .bind(session_id)
        .fetch_optional(conn)
        .await?;

    Ok(found.is_some())
}

// =============================================================================
// Unit Tests
// =============================================================================

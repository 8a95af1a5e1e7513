//! # Session Repository
//!
//! Owns every status transition of a billing session.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Session Lifecycle                                 │
//! │                                                                         │
//! │  1. OPEN                                                               │
//! │     └── create_session() → force-close leaked sessions for the table  │
//! │                          → BillingSession { status: RUNNING }          │
//! │     └── add_item_to_table() → reuse open session or create one        │
//! │                                                                         │
//! │  2. PRINT (billing repository)                                         │
//! │     └── RUNNING → PRINTED, bill_revision += 1                          │
//! │                                                                         │
//! │  3. CLOSE                                                              │
//! │     └── direct settlement / last bill settled → PAID                   │
//! │     └── equal split → parent PAID, children spawned PRINTED            │
//! │     └── last split child paid → parent PAID (if still open)            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status never moves backwards and a PAID session is never written again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tavola_core::validation::{validate_menu_item, validate_required, validate_text_length};
use tavola_core::{
    AuditAction, BillingSession, CoreError, EntityType, MenuItem, OrderType, SessionMeta,
    SessionStatus,
};
use tracing::{debug, info, warn};

use crate::command::CommandTx;
use crate::error::DbResult;
use crate::ids::IdGenerator;
use crate::repository::cart;

const SELECT_SESSION: &str = r#"
    SELECT
        id, table_id, order_type, status, bill_printed, bill_revision,
        parent_session_id, split_index, opened_by, opened_at, closed_at
    FROM billing_sessions
"#;

/// Repository for billing session operations.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
    ids: Arc<dyn IdGenerator>,
}

impl SessionRepository {
    /// Creates a new SessionRepository.
    pub fn new(pool: SqlitePool, ids: Arc<dyn IdGenerator>) -> Self {
        SessionRepository { pool, ids }
    }

    /// Gets a session by ID.
    pub async fn get_session(&self, session_id: &str) -> DbResult<BillingSession> {
        let mut conn = self.pool.acquire().await?;
        require_session(&mut conn, session_id).await
    }

    /// Most recently opened non-PAID standalone session for a table.
    ///
    /// Split shares are never returned here; see [`Self::get_split_children`].
    pub async fn get_open_session(&self, table_id: &str) -> DbResult<Option<BillingSession>> {
        let mut conn = self.pool.acquire().await?;
        find_open_session(&mut conn, table_id).await
    }

    /// Opens a new RUNNING session for a table.
    ///
    /// ## Safety Step
    /// Any session for the table still lacking `closed_at` is force-closed
    /// first. This repairs sessions leaked by a crash or a bug.
    ///
    /// ## Returns
    /// The new session id.
    pub async fn create_session(
        &self,
        table_id: &str,
        order_type: OrderType,
        staff_id: &str,
    ) -> DbResult<String> {
        validate_required("table_id", table_id)?;
        debug!(table_id = %table_id, order_type = %order_type, "Creating session");

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;
        let session_id = open_session(&mut cmd, table_id, order_type).await?;
        cmd.commit().await?;

        info!(session_id = %session_id, table_id = %table_id, "Session opened");
        Ok(session_id)
    }

    /// Adds one unit of `item` to the table's open session, opening a
    /// session first when the table has none.
    ///
    /// Split shares carry a fixed bill and never take new items. A table
    /// whose only open sessions are shares is refused, since opening a new
    /// session would force-close the unpaid shares.
    ///
    /// ## Returns
    /// The id of the session the item landed in.
    ///
    /// ## Errors
    /// - [`CoreError::SplitPending`] - the table has unpaid split shares only
    pub async fn add_item_to_table(
        &self,
        table_id: &str,
        order_type: OrderType,
        item: &MenuItem,
        staff_id: &str,
    ) -> DbResult<String> {
        validate_required("table_id", table_id)?;
        validate_menu_item(item)?;
        debug!(table_id = %table_id, product_id = %item.product_id, "Adding item to table");

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;

        let open = list_open_for_table(cmd.conn(), table_id).await?;
        let session_id = match open.iter().find(|s| !s.is_split_child()) {
            Some(session) => session.id.clone(),
            None if open.iter().any(BillingSession::is_split_child) => {
                return Err(CoreError::SplitPending(table_id.to_string()).into());
            }
            None => open_session(&mut cmd, table_id, order_type).await?,
        };

        let line_id = cmd.next_id();
        cart::upsert_line(cmd.conn(), &line_id, &session_id, item).await?;
        cmd.commit().await?;

        Ok(session_id)
    }

    /// All non-PAID sessions for a table.
    ///
    /// Standalone sessions come first, then split children by split index,
    /// so a split table renders as one ordered group.
    pub async fn get_open_sessions_by_table(
        &self,
        table_id: &str,
    ) -> DbResult<Vec<BillingSession>> {
        let mut conn = self.pool.acquire().await?;
        list_open_for_table(&mut conn, table_id).await
    }

    /// Non-PAID children of a split parent, by split index.
    pub async fn get_split_children(&self, session_id: &str) -> DbResult<Vec<BillingSession>> {
        let sql = format!(
            "{SELECT_SESSION}
            WHERE parent_session_id = ?1 AND status != 'PAID'
            ORDER BY split_index ASC"
        );
        let sessions = sqlx::query_as::<_, BillingSession>(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(sessions)
    }

    /// Gets the metadata row for a session, if any.
    pub async fn get_session_meta(&self, session_id: &str) -> DbResult<Option<SessionMeta>> {
        let mut conn = self.pool.acquire().await?;
        fetch_meta(&mut conn, session_id).await
    }

    /// Inserts or replaces the session's metadata.
    pub async fn upsert_session_meta(
        &self,
        session_id: &str,
        customer_id: Option<&str>,
        order_note: Option<&str>,
        order_type: OrderType,
        staff_id: &str,
    ) -> DbResult<SessionMeta> {
        if let Some(note) = order_note {
            validate_text_length("order_note", note)?;
        }

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;
        require_session(cmd.conn(), session_id).await?;

        let now = Utc::now();
        let meta = sqlx::query_as::<_, SessionMeta>(
            r#"
            INSERT INTO billing_session_meta (
                session_id, customer_id, order_note, order_type, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(session_id) DO UPDATE SET
                customer_id = excluded.customer_id,
                order_note = excluded.order_note,
                order_type = excluded.order_type,
                updated_at = excluded.updated_at
            RETURNING session_id, customer_id, order_note, order_type, created_at, updated_at
            "#,
        )
        .bind(session_id)
        .bind(customer_id)
        .bind(order_note)
        .bind(order_type)
        .bind(now)
        .fetch_one(cmd.conn())
        .await?;

        cmd.record(
            EntityType::SessionMeta,
            session_id,
            AuditAction::Upsert,
            json!({
                "customerId": customer_id,
                "orderNote": order_note,
                "orderType": order_type,
            }),
        );
        cmd.commit().await?;

        Ok(meta)
    }
}

// =============================================================================
// Shared helpers (run inside the caller's transaction)
// =============================================================================

/// Loads a session, or `None` when the id is unknown.
pub(crate) async fn fetch_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<Option<BillingSession>> {
    let sql = format!("{SELECT_SESSION} WHERE id = ?1");
    let session = sqlx::query_as::<_, BillingSession>(&sql)
        .bind(session_id)
        .fetch_optional(conn)
        .await?;

    Ok(session)
}

/// Loads a session or fails with [`CoreError::SessionNotFound`].
pub(crate) async fn require_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<BillingSession> {
    fetch_session(conn, session_id)
        .await?
        .ok_or_else(|| CoreError::SessionNotFound(session_id.to_string()).into())
}

/// Loads a session that can still take orders (RUNNING or PRINTED).
pub(crate) async fn require_open_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<BillingSession> {
    let session = require_session(conn, session_id).await?;
    if !session.status.is_open() {
        return Err(CoreError::invalid_status(session_id, session.status, "RUNNING or PRINTED").into());
    }
    Ok(session)
}

pub(crate) async fn find_open_session(
    conn: &mut SqliteConnection,
    table_id: &str,
) -> DbResult<Option<BillingSession>> {
    let sql = format!(
        "{SELECT_SESSION}
        WHERE table_id = ?1 AND status != 'PAID' AND parent_session_id IS NULL
        ORDER BY opened_at DESC, rowid DESC
        LIMIT 1"
    );
    let session = sqlx::query_as::<_, BillingSession>(&sql)
        .bind(table_id)
        .fetch_optional(conn)
        .await?;

    Ok(session)
}

/// Non-PAID sessions for a table: standalone ones newest first, then split
/// children by split index.
pub(crate) async fn list_open_for_table(
    conn: &mut SqliteConnection,
    table_id: &str,
) -> DbResult<Vec<BillingSession>> {
    let sql = format!(
        "{SELECT_SESSION}
        WHERE table_id = ?1 AND status != 'PAID'
        ORDER BY parent_session_id IS NOT NULL, split_index ASC, opened_at DESC, rowid DESC"
    );
    let sessions = sqlx::query_as::<_, BillingSession>(&sql)
        .bind(table_id)
        .fetch_all(conn)
        .await?;

    Ok(sessions)
}

/// Force-closes leaked sessions for the table and inserts a RUNNING one.
pub(crate) async fn open_session(
    cmd: &mut CommandTx,
    table_id: &str,
    order_type: OrderType,
) -> DbResult<String> {
    let now = Utc::now();

    let leaked = sqlx::query(
        r#"
        UPDATE billing_sessions
        SET status = 'PAID', closed_at = ?1
        WHERE table_id = ?2 AND closed_at IS NULL
        "#,
    )
    .bind(now)
    .bind(table_id)
    .execute(cmd.conn())
    .await?
    .rows_affected();

    if leaked > 0 {
        warn!(table_id = %table_id, count = leaked, "Force-closed leaked sessions");
    }

    let session_id = cmd.next_id();
    let opened_by = cmd.staff_id().to_string();

    sqlx::query(
        r#"
        INSERT INTO billing_sessions (
            id, table_id, order_type, status, bill_printed, bill_revision,
            opened_by, opened_at
        ) VALUES (?1, ?2, ?3, 'RUNNING', 0, 0, ?4, ?5)
        "#,
    )
    .bind(&session_id)
    .bind(table_id)
    .bind(order_type)
    .bind(&opened_by)
    .bind(now)
    .execute(cmd.conn())
    .await?;

    cmd.record(
        EntityType::Session,
        session_id.as_str(),
        AuditAction::Create,
        json!({ "tableId": table_id, "orderType": order_type, "forceClosed": leaked }),
    );

    Ok(session_id)
}

/// Inserts a PRINTED split child for `parent`.
pub(crate) async fn insert_split_child(
    conn: &mut SqliteConnection,
    child_id: &str,
    parent: &BillingSession,
    split_index: i64,
    opened_by: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO billing_sessions (
            id, table_id, order_type, status, bill_printed, bill_revision,
            parent_session_id, split_index, opened_by, opened_at
        ) VALUES (?1, ?2, ?3, 'PRINTED', 1, 1, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(child_id)
    .bind(&parent.table_id)
    .bind(parent.order_type)
    .bind(&parent.id)
    .bind(split_index)
    .bind(opened_by)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(())
}

/// RUNNING/PRINTED → PRINTED, bumping the revision. Returns the new revision.
pub(crate) async fn set_printed(conn: &mut SqliteConnection, session_id: &str) -> DbResult<i64> {
    let revision: i64 = sqlx::query_scalar(
        r#"
        UPDATE billing_sessions
        SET status = 'PRINTED', bill_printed = 1, bill_revision = bill_revision + 1
        WHERE id = ?1 AND status != 'PAID'
        RETURNING bill_revision
        "#,
    )
    .bind(session_id)
    .fetch_one(conn)
    .await?;

    Ok(revision)
}

/// Marks a session PAID. Returns `false` when it already was.
pub(crate) async fn close_session(
    conn: &mut SqliteConnection,
    session_id: &str,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let closed = sqlx::query(
        r#"
        UPDATE billing_sessions
        SET status = 'PAID', closed_at = COALESCE(closed_at, ?1)
        WHERE id = ?2 AND status != 'PAID'
        "#,
    )
    .bind(now)
    .bind(session_id)
    .execute(conn)
    .await?
    .rows_affected();

    if closed > 0 {
        info!(session_id = %session_id, "Session closed");
    }
    Ok(closed > 0)
}

/// Whether any session names `session_id` as its split parent.
pub(crate) async fn has_children(conn: &mut SqliteConnection, session_id: &str) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM billing_sessions WHERE parent_session_id = ?1 LIMIT 1",
    )
    .bind(session_id)
    .fetch_optional(conn)
    .await?;

    Ok(found.is_some())
}

/// Closes the split parent of `child` once no sibling is left unpaid.
///
/// Returns `true` when this call closed the parent.
pub(crate) async fn close_parent_if_complete(
    conn: &mut SqliteConnection,
    child: &BillingSession,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let Some(parent_id) = child.parent_session_id.as_deref() else {
        return Ok(false);
    };

    let unpaid: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM billing_sessions WHERE parent_session_id = ?1 AND status != 'PAID'",
    )
    .bind(parent_id)
    .fetch_one(&mut *conn)
    .await?;

    if unpaid > 0 {
        debug!(parent_id = %parent_id, unpaid, "Split siblings still open");
        return Ok(false);
    }

    close_session(conn, parent_id, now).await
}

pub(crate) async fn fetch_meta(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<Option<SessionMeta>> {
    let meta = sqlx::query_as::<_, SessionMeta>(
        r#"
        SELECT session_id, customer_id, order_note, order_type, created_at, updated_at
        FROM billing_session_meta
        WHERE session_id = ?1
        "#,
    )
    .bind(session_id)
    .fetch_optional(conn)
    .await?;

    Ok(meta)
}

/// Fails unless the session's status may move forward to `next`.
pub(crate) fn expect_transition(session: &BillingSession, next: SessionStatus) -> DbResult<()> {
    if !session.status.can_advance_to(next) {
        return Err(CoreError::invalid_status(
            &session.id,
            session.status,
            format!("a status that can move to {next}"),
        )
        .into());
    }
    Ok(())
}

/// Fails unless the session is in `expected`.
pub(crate) fn expect_status(session: &BillingSession, expected: SessionStatus) -> DbResult<()> {
    if session.status != expected {
        return Err(CoreError::invalid_status(&session.id, session.status, expected.as_str()).into());
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tavola_core::Money;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_open_session() {
        let db = db().await;
        let sessions = db.sessions();

        assert!(sessions.get_open_session("T1").await.unwrap().is_none());

        let id = sessions
            .create_session("T1", OrderType::DineIn, "staff-1")
            .await
            .unwrap();
        let open = sessions.get_open_session("T1").await.unwrap().unwrap();

        assert_eq!(open.id, id);
        assert_eq!(open.status, SessionStatus::Running);
        assert_eq!(open.bill_revision, 0);
        assert_eq!(open.opened_by, "staff-1");
        assert!(open.closed_at.is_none());

        let history = db.audit().for_entity(EntityType::Session, &id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, AuditAction::Create);
    }

    #[tokio::test]
    async fn test_create_session_force_closes_leaked() {
        let db = db().await;
        let sessions = db.sessions();

        let leaked = sessions
            .create_session("T2", OrderType::DineIn, "staff-1")
            .await
            .unwrap();
        let fresh = sessions
            .create_session("T2", OrderType::DineIn, "staff-2")
            .await
            .unwrap();

        let old = sessions.get_session(&leaked).await.unwrap();
        assert_eq!(old.status, SessionStatus::Paid);
        assert!(old.closed_at.is_some());

        let open = sessions.get_open_sessions_by_table("T2").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, fresh);
    }

    #[tokio::test]
    async fn test_get_session_not_found() {
        let db = db().await;
        let err = db.sessions().get_session("missing").await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::SessionNotFound(id)) if id == "missing"
        ));
    }

    #[tokio::test]
    async fn test_add_item_to_table_reuses_open_session() {
        let db = db().await;
        let sessions = db.sessions();
        let tea = MenuItem::new("P1", "Masala Chai", Money::from_cents(4_000));

        let first = sessions
            .add_item_to_table("T3", OrderType::DineIn, &tea, "staff-1")
            .await
            .unwrap();
        let second = sessions
            .add_item_to_table("T3", OrderType::DineIn, &tea, "staff-1")
            .await
            .unwrap();
        assert_eq!(first, second);

        let cart = db.cart().get_cart(&first).await.unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].qty, 2);
    }

    /// Table `T1` split three ways; returns the parent id and children ids.
    async fn split_table(db: &Database) -> (String, Vec<String>) {
        let thali = MenuItem::new("P1", "Thali", Money::from_cents(30_000));
        let sid = db
            .sessions()
            .add_item_to_table("T1", OrderType::DineIn, &thali, "staff-1")
            .await
            .unwrap();
        db.billing().mark_bill_printed(&sid, "staff-1").await.unwrap();
        let outcome = db.splits().split_session_equal(&sid, 3, "staff-1").await.unwrap();
        let children = outcome.children.into_iter().map(|c| c.session_id).collect();
        (sid, children)
    }

    #[tokio::test]
    async fn test_add_item_to_split_table_refused() {
        let db = db().await;
        let (_sid, children) = split_table(&db).await;
        let tea = MenuItem::new("P2", "Masala Chai", Money::from_cents(4_000));

        let err = db
            .sessions()
            .add_item_to_table("T1", OrderType::DineIn, &tea, "staff-1")
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::SplitPending(t)) if t == "T1"));
        assert_eq!(err.kind(), Some(tavola_core::ErrorKind::State));

        assert!(db.sessions().get_open_session("T1").await.unwrap().is_none());
        for child in &children {
            assert!(db.cart().get_cart(child).await.unwrap().is_empty());
            let session = db.sessions().get_session(child).await.unwrap();
            assert_eq!(session.status, SessionStatus::Printed);
        }
    }

    #[tokio::test]
    async fn test_add_item_after_shares_paid_opens_new_session() {
        let db = db().await;
        let (sid, children) = split_table(&db).await;
        for child in &children {
            db.billing()
                .finalize_settlement(
                    child,
                    Money::from_cents(10_000),
                    Money::from_cents(10_000),
                    tavola_core::SettlementMode::Cash,
                    "staff-1",
                )
                .await
                .unwrap();
        }

        let tea = MenuItem::new("P2", "Masala Chai", Money::from_cents(4_000));
        let fresh = db
            .sessions()
            .add_item_to_table("T1", OrderType::DineIn, &tea, "staff-1")
            .await
            .unwrap();

        assert_ne!(fresh, sid);
        assert!(!children.contains(&fresh));
        let session = db.sessions().get_session(&fresh).await.unwrap();
        assert_eq!(session.status, SessionStatus::Running);
        assert!(!session.is_split_child());
    }

    #[tokio::test]
    async fn test_open_sessions_on_split_table() {
        let db = db().await;
        let (sid, children) = split_table(&db).await;

        let shares = db.sessions().get_split_children(&sid).await.unwrap();
        let indexes: Vec<Option<i64>> = shares.iter().map(|s| s.split_index).collect();
        assert_eq!(indexes, vec![Some(1), Some(2), Some(3)]);
        assert!(shares
            .iter()
            .all(|s| s.parent_session_id.as_deref() == Some(sid.as_str())));

        let by_table = db.sessions().get_open_sessions_by_table("T1").await.unwrap();
        let ids: Vec<&str> = by_table.iter().map(|s| s.id.as_str()).collect();
        let expected: Vec<&str> = children.iter().map(String::as_str).collect();
        assert_eq!(ids, expected);

        // A standalone session on the same table sorts ahead of the shares
        // and is the one new items land in.
        sqlx::query(
            r#"
            INSERT INTO billing_sessions (
                id, table_id, order_type, status, bill_printed, bill_revision,
                opened_by, opened_at
            ) VALUES ('walk-in', 'T1', 'DINE_IN', 'RUNNING', 0, 0, 'staff-2', ?1)
            "#,
        )
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        let by_table = db.sessions().get_open_sessions_by_table("T1").await.unwrap();
        assert_eq!(by_table.len(), 4);
        assert_eq!(by_table[0].id, "walk-in");
        assert!(by_table[1..].iter().all(BillingSession::is_split_child));
        let indexes: Vec<Option<i64>> = by_table[1..].iter().map(|s| s.split_index).collect();
        assert_eq!(indexes, vec![Some(1), Some(2), Some(3)]);

        let tea = MenuItem::new("P2", "Masala Chai", Money::from_cents(4_000));
        let landed = db
            .sessions()
            .add_item_to_table("T1", OrderType::DineIn, &tea, "staff-2")
            .await
            .unwrap();
        assert_eq!(landed, "walk-in");
    }

    #[tokio::test]
    async fn test_session_meta_upsert() {
        let db = db().await;
        let sessions = db.sessions();
        let id = sessions
            .create_session("D1", OrderType::Delivery, "staff-1")
            .await
            .unwrap();

        assert!(sessions.get_session_meta(&id).await.unwrap().is_none());

        let first = sessions
            .upsert_session_meta(&id, Some("cust-9"), Some("ring twice"), OrderType::Delivery, "staff-1")
            .await
            .unwrap();
        let second = sessions
            .upsert_session_meta(&id, None, Some("leave at door"), OrderType::Takeaway, "staff-1")
            .await
            .unwrap();

        assert_eq!(second.created_at, first.created_at);
        let stored = sessions.get_session_meta(&id).await.unwrap().unwrap();
        assert_eq!(stored.customer_id, None);
        assert_eq!(stored.order_note.as_deref(), Some("leave at door"));
        assert_eq!(stored.order_type, OrderType::Takeaway);

        let history = db
            .audit()
            .for_entity(EntityType::SessionMeta, &id)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.action == AuditAction::Upsert));
    }

    #[tokio::test]
    async fn test_session_meta_requires_session() {
        let db = db().await;
        let err = db
            .sessions()
            .upsert_session_meta("ghost", None, None, OrderType::DineIn, "staff-1")
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::SessionNotFound(_))));
    }
}

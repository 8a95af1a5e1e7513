//! # Snapshot Repository
//!
//! Read-only views handed to the UI. Each load runs inside one read
//! transaction so the parts of a snapshot are mutually consistent.
//!
//! ```text
//! load_session              session + cart + KOTs + KOT items + adjustments
//! load_full_billing_session   + meta, bills, bill items, payments, discounts
//! load_split_view_session   parent's full snapshot + the child's settlement and split index
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tavola_core::{CoreError, FullBillingSnapshot, SessionSnapshot, SplitViewSnapshot};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::session::{fetch_meta, require_session};
use crate::repository::{adjustment, billing, cart, kot};

/// Repository for session snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotRepository {
    pool: SqlitePool,
}

impl SnapshotRepository {
    /// Creates a new SnapshotRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SnapshotRepository { pool }
    }

    /// Session with its cart, tickets and adjustments.
    pub async fn load_session(&self, session_id: &str) -> DbResult<SessionSnapshot> {
        let mut tx = self.pool.begin().await?;
        let snapshot = base_snapshot(&mut tx, session_id).await?;
        tx.commit().await?;
        Ok(snapshot)
    }

    /// Session snapshot plus metadata and the multi-bill records.
    pub async fn load_full_billing_session(&self, session_id: &str) -> DbResult<FullBillingSnapshot> {
        let mut tx = self.pool.begin().await?;
        let snapshot = full_snapshot(&mut tx, session_id).await?;
        tx.commit().await?;
        Ok(snapshot)
    }

    /// The split parent's full snapshot as seen from one child, with the
    /// child's own settlement and split index.
    ///
    /// ## Errors
    /// - [`CoreError::SessionNotFound`]
    /// - [`CoreError::NotASplitChild`] - the session has no parent
    pub async fn load_split_view_session(&self, child_session_id: &str) -> DbResult<SplitViewSnapshot> {
        let mut tx = self.pool.begin().await?;

        let child = require_session(&mut tx, child_session_id).await?;
        let (Some(parent_id), Some(split_index)) = (child.parent_session_id, child.split_index) else {
            return Err(CoreError::NotASplitChild(child_session_id.to_string()).into());
        };

        let parent = full_snapshot(&mut tx, &parent_id).await?;
        let settlement = billing::settlement_for_session(&mut tx, child_session_id).await?;
        tx.commit().await?;

        Ok(SplitViewSnapshot {
            parent,
            settlement,
            split_index,
        })
    }
}

async fn base_snapshot(conn: &mut SqliteConnection, session_id: &str) -> DbResult<SessionSnapshot> {
    debug!(session_id = %session_id, "Loading session snapshot");

    let session = require_session(conn, session_id).await?;
    let cart = cart::list_lines(conn, session_id).await?;
    let kots = kot::list_for_session(conn, session_id).await?;
    let kot_items = kot::items_for_session(conn, session_id).await?;
    let adjustments = adjustment::for_session(conn, session_id).await?;

    Ok(SessionSnapshot {
        session,
        cart,
        kots,
        kot_items,
        adjustments,
    })
}

async fn full_snapshot(conn: &mut SqliteConnection, session_id: &str) -> DbResult<FullBillingSnapshot> {
    let base = base_snapshot(conn, session_id).await?;

    Ok(FullBillingSnapshot {
        base,
        meta: fetch_meta(conn, session_id).await?,
        bills: billing::bills_for_session(conn, session_id).await?,
        bill_items: billing::bill_items_for_session(conn, session_id).await?,
        payments: billing::payments_for_session(conn, session_id).await?,
        discounts: billing::discounts_for_session(conn, session_id).await?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tavola_core::{
        BillType, MenuItem, Money, OrderType, PaymentMode, SettlementMode, SplitMethod,
    };

    #[tokio::test]
    async fn test_load_session_snapshot() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sid = db
            .sessions()
            .create_session("T1", OrderType::DineIn, "staff-1")
            .await
            .unwrap();
        let paneer = MenuItem::new("P1", "Paneer Tikka", Money::from_cents(28_000));
        let lassi = MenuItem::new("P2", "Lassi", Money::from_cents(9_000));

        db.cart().add_to_cart(&sid, &paneer).await.unwrap();
        let kot_id = db.kots().create_kot(&sid, "staff-1", None).await.unwrap().unwrap();
        db.adjustments()
            .add_adjustment(&sid, &kot_id, "P1", -1, "sent back", "staff-1")
            .await
            .unwrap();
        db.cart().add_to_cart(&sid, &lassi).await.unwrap();

        let snapshot = db.snapshots().load_session(&sid).await.unwrap();
        assert_eq!(snapshot.session.id, sid);
        assert_eq!(snapshot.cart.len(), 1);
        assert_eq!(snapshot.cart[0].product_id, "P2");
        assert_eq!(snapshot.kots.len(), 1);
        assert_eq!(snapshot.kot_items.len(), 1);
        assert_eq!(snapshot.adjustments.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_session() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.snapshots().load_session("ghost").await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_full_billing_snapshot() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sid = db
            .sessions()
            .create_session("D4", OrderType::Delivery, "staff-1")
            .await
            .unwrap();
        db.sessions()
            .upsert_session_meta(&sid, Some("cust-1"), None, OrderType::Delivery, "staff-1")
            .await
            .unwrap();
        let bill = db
            .billing()
            .create_bill(&sid, BillType::Full, SplitMethod::None, Money::from_cents(12_000), "staff-1")
            .await
            .unwrap();
        db.billing()
            .add_bill_item(&bill.bill_id, "P1", "Biryani", 1, Money::from_cents(12_000))
            .await
            .unwrap();
        db.billing()
            .add_bill_payment(&bill.bill_id, PaymentMode::Paytm, Money::from_cents(12_000), "staff-1")
            .await
            .unwrap();

        let snapshot = db.snapshots().load_full_billing_session(&sid).await.unwrap();
        assert_eq!(snapshot.meta.unwrap().customer_id.as_deref(), Some("cust-1"));
        assert_eq!(snapshot.bills.len(), 1);
        assert_eq!(snapshot.bill_items.len(), 1);
        assert_eq!(snapshot.payments.len(), 1);
        assert!(snapshot.discounts.is_empty());
    }

    #[tokio::test]
    async fn test_split_view() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sid = db
            .sessions()
            .create_session("T5", OrderType::DineIn, "staff-1")
            .await
            .unwrap();
        db.cart()
            .add_to_cart(&sid, &MenuItem::new("P1", "Thali", Money::from_cents(20_000)))
            .await
            .unwrap();
        db.billing().mark_bill_printed(&sid, "staff-1").await.unwrap();

        // A standalone session is not a split child
        let err = db.snapshots().load_split_view_session(&sid).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::NotASplitChild(_))));

        let outcome = db.splits().split_session_equal(&sid, 2, "staff-1").await.unwrap();
        let child = &outcome.children[1];
        db.billing()
            .finalize_settlement(&child.session_id, Money::from_cents(10_000), Money::from_cents(10_000), SettlementMode::Card, "staff-1")
            .await
            .unwrap();

        let view = db.snapshots().load_split_view_session(&child.session_id).await.unwrap();
        assert_eq!(view.split_index, 2);
        assert_eq!(view.parent.base.session.id, sid);
        assert_eq!(view.parent.base.kot_items.len(), 1);
        assert!(view.parent.bills.is_empty());
        assert_eq!(view.settlement.unwrap().payment_mode, SettlementMode::Card);

        // The sibling has no settlement yet
        let sibling = db
            .snapshots()
            .load_split_view_session(&outcome.children[0].session_id)
            .await
            .unwrap();
        assert!(sibling.settlement.is_none());
    }
}

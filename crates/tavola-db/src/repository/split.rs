//! # Split Repository
//!
//! Equal split of a printed session into N child sessions.
//!
//! ## Equal Split Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  parent (PRINTED, total 199.00)        split_session_equal(n = 3)      │
//! │     │                                                                   │
//! │     ├──► child 1 (PRINTED) ── bill SPLIT/EQUAL 66.33                   │
//! │     ├──► child 2 (PRINTED) ── bill SPLIT/EQUAL 66.33                   │
//! │     ├──► child 3 (PRINTED) ── bill SPLIT/EQUAL 66.33                   │
//! │     └──► parent PAID                                                   │
//! │                                                                         │
//! │  One transaction: any failure leaves no child, no bill and the parent  │
//! │  still PRINTED. The remainder (0.01 here) is reported, not assigned.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use tavola_core::billing::{plan_equal_split, validate_split_count};
use tavola_core::{
    AuditAction, BillType, CoreError, EntityType, SessionStatus, SplitChild, SplitMethod,
    SplitOutcome,
};
use tracing::{debug, info};

use crate::command::CommandTx;
use crate::error::DbResult;
use crate::ids::IdGenerator;
use crate::repository::billing::{insert_bill, next_daily_bill_no, recompute_total};
use crate::repository::session::{
    close_session, expect_status, has_children, insert_split_child, require_session,
};

/// Repository for splitting sessions.
#[derive(Debug, Clone)]
pub struct SplitRepository {
    pool: SqlitePool,
    ids: Arc<dyn IdGenerator>,
}

impl SplitRepository {
    /// Creates a new SplitRepository.
    pub fn new(pool: SqlitePool, ids: Arc<dyn IdGenerator>) -> Self {
        SplitRepository { pool, ids }
    }

    /// Splits a PRINTED session into `count` equal child sessions.
    ///
    /// Each child is opened PRINTED with one OPEN bill for `per_split`
    /// (total rebuilt from KOT lines and adjustments, rounded half-up). The
    /// parent is closed in the same transaction.
    ///
    /// ## Errors
    /// - [`CoreError::InvalidSplitCount`] - `count` outside 2..=50
    /// - [`CoreError::AlreadySplit`] - parent already has children
    /// - [`CoreError::InvalidSessionStatus`] - parent is not PRINTED
    /// - [`CoreError::NothingToSplit`] - total is zero
    pub async fn split_session_equal(
        &self,
        session_id: &str,
        count: i64,
        staff_id: &str,
    ) -> DbResult<SplitOutcome> {
        validate_split_count(count)?;
        debug!(session_id = %session_id, count, "Splitting session");

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;

        let parent = require_session(cmd.conn(), session_id).await?;
        // Checked before status: a split parent is already PAID, and a
        // second split must report AlreadySplit rather than a status error.
        if has_children(cmd.conn(), session_id).await? {
            return Err(CoreError::AlreadySplit(session_id.to_string()).into());
        }
        expect_status(&parent, SessionStatus::Printed)?;

        let total = recompute_total(cmd.conn(), session_id).await?;
        let plan = plan_equal_split(session_id, total, count)?;

        let now = Utc::now();
        let opened_by = cmd.staff_id().to_string();
        let mut children = Vec::with_capacity(count as usize);

        for split_index in 1..=count {
            let child_id = cmd.next_id();
            let bill_id = cmd.next_id();

            insert_split_child(cmd.conn(), &child_id, &parent, split_index, &opened_by, now).await?;

            let bill_no = next_daily_bill_no(cmd.conn(), now.date_naive()).await?;
            insert_bill(
                cmd.conn(),
                &bill_id,
                &child_id,
                bill_no,
                BillType::Split,
                SplitMethod::Equal,
                plan.per_split,
                now,
            )
            .await?;

            cmd.record(
                EntityType::Session,
                child_id.as_str(),
                AuditAction::SplitCreate,
                json!({
                    "parentSessionId": session_id,
                    "splitIndex": split_index,
                    "amount": plan.per_split,
                    "billId": bill_id,
                    "billNo": bill_no,
                }),
            );

            children.push(SplitChild {
                session_id: child_id,
                bill_id,
                bill_no,
                split_index,
            });
        }

        close_session(cmd.conn(), session_id, now).await?;
        cmd.commit().await?;

        info!(
            session_id = %session_id,
            count,
            per_split = %plan.per_split,
            remainder = %plan.remainder,
            "Session split"
        );

        Ok(SplitOutcome {
            parent_session_id: session_id.to_string(),
            total: plan.total,
            per_split: plan.per_split,
            remainder: plan.remainder,
            children,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tavola_core::{BillStatus, ErrorKind, MenuItem, Money, OrderType};

    /// Printed session billed at `price` x 1.
    async fn printed(db: &Database, table: &str, price: i64) -> String {
        let sid = db
            .sessions()
            .create_session(table, OrderType::DineIn, "staff-1")
            .await
            .unwrap();
        db.cart()
            .add_to_cart(&sid, &MenuItem::new("P1", "Platter", Money::from_cents(price)))
            .await
            .unwrap();
        db.billing().mark_bill_printed(&sid, "staff-1").await.unwrap();
        sid
    }

    #[tokio::test]
    async fn test_split_three_ways() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sid = printed(&db, "T1", 19_900).await;

        let outcome = db.splits().split_session_equal(&sid, 3, "staff-1").await.unwrap();
        assert_eq!(outcome.per_split.cents(), 6_633);
        assert_eq!(outcome.remainder.cents(), 1);
        assert_eq!(outcome.children.len(), 3);

        let indexes: Vec<i64> = outcome.children.iter().map(|c| c.split_index).collect();
        assert_eq!(indexes, vec![1, 2, 3]);

        let parent = db.sessions().get_session(&sid).await.unwrap();
        assert_eq!(parent.status, SessionStatus::Paid);

        for child in &outcome.children {
            let session = db.sessions().get_session(&child.session_id).await.unwrap();
            assert_eq!(session.status, SessionStatus::Printed);
            assert_eq!(session.parent_session_id.as_deref(), Some(sid.as_str()));
            assert_eq!(session.table_id, "T1");

            let bill = db.billing().get_bill(&child.bill_id).await.unwrap();
            assert_eq!(bill.bill_type, BillType::Split);
            assert_eq!(bill.split_method, SplitMethod::Equal);
            assert_eq!(bill.status, BillStatus::Open);
            assert_eq!(bill.total_amount_cents, 6_633);
        }

        // Daily counter, first bills of the day
        let numbers: Vec<i64> = outcome.children.iter().map(|c| c.bill_no).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_split_requires_printed() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sid = db
            .sessions()
            .create_session("T1", OrderType::DineIn, "staff-1")
            .await
            .unwrap();

        let err = db.splits().split_session_equal(&sid, 2, "staff-1").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::State));
    }

    #[tokio::test]
    async fn test_split_count_bounds() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sid = printed(&db, "T1", 10_000).await;

        for count in [0, 1, 51] {
            let err = db
                .splits()
                .split_session_equal(&sid, count, "staff-1")
                .await
                .unwrap_err();
            assert!(matches!(err.as_domain(), Some(CoreError::InvalidSplitCount { .. })));
        }
        assert_eq!(
            db.sessions().get_session(&sid).await.unwrap().status,
            SessionStatus::Printed
        );
    }

    #[tokio::test]
    async fn test_split_zero_total() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sid = printed(&db, "T1", 5_000).await;
        let kot_id = db.kots().list_kots(&sid).await.unwrap()[0].id.clone();
        db.adjustments()
            .add_adjustment(&sid, &kot_id, "P1", -1, "comped", "staff-1")
            .await
            .unwrap();

        let err = db.splits().split_session_equal(&sid, 2, "staff-1").await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::NothingToSplit(_))));
        assert!(db.sessions().get_split_children(&sid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_split_audited_per_child() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sid = printed(&db, "T1", 10_000).await;

        let outcome = db.splits().split_session_equal(&sid, 2, "staff-1").await.unwrap();
        for child in &outcome.children {
            let history = db
                .audit()
                .for_entity(EntityType::Session, &child.session_id)
                .await
                .unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].action, AuditAction::SplitCreate);
            assert_eq!(history[0].payload_json().unwrap()["amount"], 5_000);
        }
    }
}

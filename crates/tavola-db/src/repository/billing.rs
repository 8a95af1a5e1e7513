//! # Billing Repository
//!
//! Print, settle and the multi-bill path.
//!
//! ## Two Settlement Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  A. DIRECT                                                              │
//! │     mark_bill_printed()   residual cart → KOT, RUNNING → PRINTED       │
//! │     finalize_settlement() PRINTED → PAID, Settlement row               │
//! │                           (per-day bill number, waived-off amount)     │
//! │                                                                         │
//! │  B. MULTI-BILL                                                          │
//! │     create_bill()         OPEN bill, per-session bill number           │
//! │     add_bill_item() / apply_bill_discount() / add_bill_payment()       │
//! │     settle_bill()         payments ≥ total → bill PAID                 │
//! │                           no OPEN bills left → session PAID            │
//! │     instant_paid()        create + full CASH payment + settle          │
//! │                                                                         │
//! │  Either path closing a split child re-checks the parent: the last      │
//! │  child to pay closes a parent that is still open.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tavola_core::billing::{self as calc, is_fully_paid, summarize_bill, waived_off};
use tavola_core::validation::{
    validate_bill_amount, validate_discount, validate_line_quantity, validate_payment_amount,
    validate_reason, validate_required, validate_unit_price,
};
use tavola_core::{
    AuditAction, Bill, BillDiscount, BillItem, BillItemNote, BillPayment, BillSettlement,
    BillStatus, BillSummary, BillType, BillableLine, CoreError, CreatedBill, DiscountType,
    EntityType, Money, PaymentMode, PrintOutcome, SessionStatus, Settlement, SettlementMode,
    SettlementReceipt, SplitMethod,
};
use tracing::{debug, info};

use crate::command::CommandTx;
use crate::error::{DbError, DbResult};
use crate::ids::IdGenerator;
use crate::repository::session::{
    close_parent_if_complete, close_session, expect_status, expect_transition, has_children,
    require_open_session, require_session, set_printed,
};
use crate::repository::{adjustment, kot};

const SELECT_BILL: &str = r#"
    SELECT id, session_id, bill_no, bill_date, bill_type, split_method,
           total_amount_cents, status, created_at
    FROM bills
"#;

/// Repository for printing, settlement and bills.
#[derive(Debug, Clone)]
pub struct BillingRepository {
    pool: SqlitePool,
    ids: Arc<dyn IdGenerator>,
}

impl BillingRepository {
    /// Creates a new BillingRepository.
    pub fn new(pool: SqlitePool, ids: Arc<dyn IdGenerator>) -> Self {
        BillingRepository { pool, ids }
    }

    // =========================================================================
    // Direct path
    // =========================================================================

    /// Prints the bill for a session.
    ///
    /// ## What This Does
    /// 1. Issues a KOT for anything still in the cart (nothing is billed
    ///    that the kitchen never saw)
    /// 2. If the session has no KOT at all, returns [`PrintOutcome::Skipped`]
    ///    without touching the session
    /// 3. Otherwise sets PRINTED and bumps `bill_revision`
    pub async fn mark_bill_printed(&self, session_id: &str, staff_id: &str) -> DbResult<PrintOutcome> {
        debug!(session_id = %session_id, "Printing bill");

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;
        let session = require_session(cmd.conn(), session_id).await?;
        expect_transition(&session, SessionStatus::Printed)?;

        let auto_kot = kot::issue(&mut cmd, session_id, None).await?;
        if !kot::has_any(cmd.conn(), session_id).await? {
            debug!(session_id = %session_id, "Nothing sent to kitchen, print skipped");
            return Ok(PrintOutcome::Skipped);
        }

        let revision = set_printed(cmd.conn(), session_id).await?;
        let auto_kot_id = auto_kot.map(|k| k.id);

        cmd.record(
            EntityType::Session,
            session_id,
            AuditAction::Print,
            json!({ "revision": revision, "autoKotId": auto_kot_id }),
        );
        cmd.commit().await?;

        info!(session_id = %session_id, revision, "Bill printed");
        Ok(PrintOutcome::Printed {
            revision,
            auto_kot_id,
        })
    }

    /// Settles a printed session directly.
    ///
    /// ## Errors
    /// - [`CoreError::SplitParentSettlement`] - the session has split children
    /// - [`CoreError::SessionNotFound`]
    /// - [`CoreError::InvalidSessionStatus`] - the session is not PRINTED
    pub async fn finalize_settlement(
        &self,
        session_id: &str,
        bill_amount: Money,
        paid_amount: Money,
        payment_mode: SettlementMode,
        staff_id: &str,
    ) -> DbResult<SettlementReceipt> {
        validate_bill_amount("bill_amount", bill_amount.cents())?;
        validate_bill_amount("paid_amount", paid_amount.cents())?;
        debug!(session_id = %session_id, bill_amount = %bill_amount, "Finalizing settlement");

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;

        if has_children(cmd.conn(), session_id).await? {
            return Err(CoreError::SplitParentSettlement(session_id.to_string()).into());
        }
        let session = require_session(cmd.conn(), session_id).await?;
        expect_status(&session, SessionStatus::Printed)?;

        let now = Utc::now();
        let bill_date = now.date_naive();
        let waived = waived_off(bill_amount, paid_amount);

        let daily_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM settlements WHERE bill_date = ?1")
                .bind(bill_date)
                .fetch_one(cmd.conn())
                .await?;
        let bill_no = daily_count + 1;

        let settlement_id = cmd.next_id();
        let settled_by = cmd.staff_id().to_string();

        sqlx::query(
            r#"
            INSERT INTO settlements (
                id, session_id, bill_no, bill_date,
                bill_amount_cents, paid_amount_cents, waived_off_cents,
                payment_mode, settled_by, settled_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&settlement_id)
        .bind(session_id)
        .bind(bill_no)
        .bind(bill_date)
        .bind(bill_amount.cents())
        .bind(paid_amount.cents())
        .bind(waived.cents())
        .bind(payment_mode)
        .bind(&settled_by)
        .bind(now)
        .execute(cmd.conn())
        .await?;

        close_session(cmd.conn(), session_id, now).await?;
        let parent_closed = close_parent_if_complete(cmd.conn(), &session, now).await?;

        cmd.record(
            EntityType::Session,
            session_id,
            AuditAction::Settle,
            json!({
                "billNo": bill_no,
                "billDate": bill_date,
                "billAmount": bill_amount,
                "paidAmount": paid_amount,
                "waivedOff": waived,
                "paymentMode": payment_mode,
                "parentClosed": parent_closed,
            }),
        );
        cmd.commit().await?;

        info!(session_id = %session_id, bill_no, %bill_date, "Session settled");
        Ok(SettlementReceipt {
            settlement_id,
            bill_no,
            bill_date,
            waived_off: waived,
            parent_closed,
        })
    }

    /// Pays a session in full in one step: FULL bill, one CASH payment for
    /// the whole amount, settled.
    pub async fn instant_paid(
        &self,
        session_id: &str,
        total_amount: Money,
        staff_id: &str,
    ) -> DbResult<CreatedBill> {
        validate_bill_amount("total_amount", total_amount.cents())?;
        debug!(session_id = %session_id, total = %total_amount, "Instant pay");

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;
        let session = require_session(cmd.conn(), session_id).await?;
        expect_transition(&session, SessionStatus::Paid)?;

        let created = open_bill(
            &mut cmd,
            session_id,
            BillType::Full,
            SplitMethod::None,
            total_amount,
        )
        .await?;
        if total_amount.is_positive() {
            record_payment(&mut cmd, &created.bill_id, PaymentMode::Cash, total_amount).await?;
        }
        settle(&mut cmd, &created.bill_id).await?;
        cmd.commit().await?;

        info!(session_id = %session_id, bill_id = %created.bill_id, "Session paid in full");
        Ok(created)
    }

    // =========================================================================
    // Multi-bill path
    // =========================================================================

    /// Opens a bill against a session. Bill numbers count per session.
    pub async fn create_bill(
        &self,
        session_id: &str,
        bill_type: BillType,
        split_method: SplitMethod,
        total_amount: Money,
        staff_id: &str,
    ) -> DbResult<CreatedBill> {
        validate_bill_amount("total_amount", total_amount.cents())?;

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;
        require_open_session(cmd.conn(), session_id).await?;
        let created = open_bill(&mut cmd, session_id, bill_type, split_method, total_amount).await?;
        cmd.commit().await?;

        Ok(created)
    }

    /// Adds an itemised line to an OPEN bill. Not audited.
    pub async fn add_bill_item(
        &self,
        bill_id: &str,
        product_id: &str,
        name: &str,
        qty: i64,
        price: Money,
    ) -> DbResult<String> {
        validate_required("product_id", product_id)?;
        validate_required("name", name)?;
        validate_line_quantity(qty)?;
        validate_unit_price(price.cents())?;

        let mut tx = self.pool.begin().await?;
        let bill = require_bill(&mut tx, bill_id).await?;
        expect_open(&bill, "add items")?;

        let id = self.ids.next_id();
        sqlx::query(
            r#"
            INSERT INTO bill_items (id, bill_id, product_id, name, qty, price_cents, total_cents)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&id)
        .bind(bill_id)
        .bind(product_id)
        .bind(name)
        .bind(qty)
        .bind(price.cents())
        .bind(price.multiply_quantity(qty).cents())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(id)
    }

    /// Annotates a bill line. Not audited.
    pub async fn add_bill_item_note(&self, bill_item_id: &str, note: &str) -> DbResult<String> {
        validate_required("note", note)?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM bill_items WHERE id = ?1")
            .bind(bill_item_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(DbError::not_found("Bill item", bill_item_id));
        }

        let id = self.ids.next_id();
        sqlx::query(
            "INSERT INTO bill_item_notes (id, bill_item_id, note, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&id)
        .bind(bill_item_id)
        .bind(note.trim())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Applies a FLAT (minor units) or PERCENT (basis points) discount.
    pub async fn apply_bill_discount(
        &self,
        bill_id: &str,
        discount_type: DiscountType,
        value: i64,
        reason: &str,
        staff_id: &str,
    ) -> DbResult<String> {
        validate_discount(discount_type, value)?;
        validate_reason(reason)?;

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;
        let bill = require_bill(cmd.conn(), bill_id).await?;
        expect_open(&bill, "apply a discount")?;

        let id = cmd.next_id();
        let applied_by = cmd.staff_id().to_string();
        let reason = reason.trim();

        sqlx::query(
            r#"
            INSERT INTO bill_discounts (
                id, bill_id, discount_type, value, reason, applied_by, applied_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&id)
        .bind(bill_id)
        .bind(discount_type)
        .bind(value)
        .bind(reason)
        .bind(&applied_by)
        .bind(Utc::now())
        .execute(cmd.conn())
        .await?;

        cmd.record(
            EntityType::Discount,
            bill_id,
            AuditAction::Apply,
            json!({ "discountId": id, "type": discount_type, "value": value, "reason": reason }),
        );
        cmd.commit().await?;

        Ok(id)
    }

    /// Records a payment against an OPEN bill.
    pub async fn add_bill_payment(
        &self,
        bill_id: &str,
        payment_mode: PaymentMode,
        amount: Money,
        staff_id: &str,
    ) -> DbResult<String> {
        validate_payment_amount(amount.cents())?;

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;
        let bill = require_bill(cmd.conn(), bill_id).await?;
        expect_open(&bill, "take a payment")?;
        let id = record_payment(&mut cmd, bill_id, payment_mode, amount).await?;
        cmd.commit().await?;

        Ok(id)
    }

    /// Marks a fully paid bill PAID, closing the session when it was the
    /// last OPEN bill.
    ///
    /// ## Errors
    /// - [`CoreError::BillNotFound`]
    /// - [`CoreError::InvalidBillStatus`] - already PAID
    /// - [`CoreError::BillUnderpaid`] - payments don't cover the total
    pub async fn settle_bill(&self, bill_id: &str, staff_id: &str) -> DbResult<BillSettlement> {
        debug!(bill_id = %bill_id, "Settling bill");

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;
        let outcome = settle(&mut cmd, bill_id).await?;
        cmd.commit().await?;

        Ok(outcome)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Total rebuilt from ticket lines and adjustments.
    pub async fn session_total(&self, session_id: &str) -> DbResult<Money> {
        let mut conn = self.pool.acquire().await?;
        recompute_total(&mut conn, session_id).await
    }

    /// Ticket lines with effective quantity above zero.
    pub async fn billable_lines(&self, session_id: &str) -> DbResult<Vec<BillableLine>> {
        let mut conn = self.pool.acquire().await?;
        require_session(&mut conn, session_id).await?;
        let items = kot::items_for_session(&mut conn, session_id).await?;
        let adjustments = adjustment::for_session(&mut conn, session_id).await?;
        Ok(calc::billable_lines(&items, &adjustments))
    }

    /// Gross, discounts and payments of a bill. Informational only:
    /// settlement checks payments against the bill total.
    pub async fn bill_summary(&self, bill_id: &str) -> DbResult<BillSummary> {
        let mut conn = self.pool.acquire().await?;
        let bill = require_bill(&mut conn, bill_id).await?;
        let discounts = discounts_for_bill(&mut conn, bill_id).await?;
        let payments = payments_for_bill(&mut conn, bill_id).await?;
        Ok(summarize_bill(bill.total_amount(), &discounts, &payments))
    }

    /// Gets a bill by ID.
    pub async fn get_bill(&self, bill_id: &str) -> DbResult<Bill> {
        let mut conn = self.pool.acquire().await?;
        require_bill(&mut conn, bill_id).await
    }

    /// Bills of a session by bill number.
    pub async fn list_bills(&self, session_id: &str) -> DbResult<Vec<Bill>> {
        let mut conn = self.pool.acquire().await?;
        bills_for_session(&mut conn, session_id).await
    }

    /// Notes attached to a bill line, oldest first.
    pub async fn get_bill_item_notes(&self, bill_item_id: &str) -> DbResult<Vec<BillItemNote>> {
        let mut conn = self.pool.acquire().await?;
        notes_for_item(&mut conn, bill_item_id).await
    }

    /// Direct settlement of a session, if any.
    pub async fn get_settlement(&self, session_id: &str) -> DbResult<Option<Settlement>> {
        let mut conn = self.pool.acquire().await?;
        settlement_for_session(&mut conn, session_id).await
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Session total from the append-only trail.
pub(crate) async fn recompute_total(conn: &mut SqliteConnection, session_id: &str) -> DbResult<Money> {
    require_session(conn, session_id).await?;
    let items = kot::items_for_session(conn, session_id).await?;
    let adjustments = adjustment::for_session(conn, session_id).await?;
    Ok(calc::session_total(&items, &adjustments))
}

/// Inserts an OPEN bill with an explicit number and date.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn insert_bill(
    conn: &mut SqliteConnection,
    bill_id: &str,
    session_id: &str,
    bill_no: i64,
    bill_type: BillType,
    split_method: SplitMethod,
    total: Money,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO bills (
            id, session_id, bill_no, bill_date, bill_type, split_method,
            total_amount_cents, status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'OPEN', ?8)
        "#,
    )
    .bind(bill_id)
    .bind(session_id)
    .bind(bill_no)
    .bind(now.date_naive())
    .bind(bill_type)
    .bind(split_method)
    .bind(total.cents())
    .bind(now)
    .execute(conn)
    .await?;

    Ok(())
}

/// Next number on the global per-day bill counter.
pub(crate) async fn next_daily_bill_no(conn: &mut SqliteConnection, date: NaiveDate) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bills WHERE bill_date = ?1")
        .bind(date)
        .fetch_one(conn)
        .await?;
    Ok(count + 1)
}

async fn open_bill(
    cmd: &mut CommandTx,
    session_id: &str,
    bill_type: BillType,
    split_method: SplitMethod,
    total: Money,
) -> DbResult<CreatedBill> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bills WHERE session_id = ?1")
        .bind(session_id)
        .fetch_one(cmd.conn())
        .await?;
    let bill_no = count + 1;
    let bill_id = cmd.next_id();

    insert_bill(
        cmd.conn(),
        &bill_id,
        session_id,
        bill_no,
        bill_type,
        split_method,
        total,
        Utc::now(),
    )
    .await?;

    cmd.record(
        EntityType::Bill,
        bill_id.as_str(),
        AuditAction::Create,
        json!({
            "sessionId": session_id,
            "billType": bill_type,
            "splitMethod": split_method,
            "totalAmount": total,
            "billNo": bill_no,
        }),
    );

    info!(session_id = %session_id, bill_id = %bill_id, bill_no, "Bill created");
    Ok(CreatedBill { bill_id, bill_no })
}

async fn record_payment(
    cmd: &mut CommandTx,
    bill_id: &str,
    payment_mode: PaymentMode,
    amount: Money,
) -> DbResult<String> {
    let id = cmd.next_id();

    sqlx::query(
        r#"
        INSERT INTO bill_payments (id, bill_id, payment_mode, amount_cents, paid_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&id)
    .bind(bill_id)
    .bind(payment_mode)
    .bind(amount.cents())
    .bind(Utc::now())
    .execute(cmd.conn())
    .await?;

    cmd.record(
        EntityType::Payment,
        bill_id,
        AuditAction::Add,
        json!({ "paymentId": id, "mode": payment_mode, "amount": amount }),
    );

    Ok(id)
}

async fn settle(cmd: &mut CommandTx, bill_id: &str) -> DbResult<BillSettlement> {
    let bill = require_bill(cmd.conn(), bill_id).await?;
    expect_open(&bill, "settle")?;

    let paid = calc::total_paid(&payments_for_bill(cmd.conn(), bill_id).await?);
    if !is_fully_paid(bill.total_amount(), paid) {
        return Err(CoreError::BillUnderpaid {
            bill_id: bill_id.to_string(),
            paid_cents: paid.cents(),
            total_cents: bill.total_amount_cents,
        }
        .into());
    }

    sqlx::query("UPDATE bills SET status = 'PAID' WHERE id = ?1")
        .bind(bill_id)
        .execute(cmd.conn())
        .await?;

    let open_bills: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM bills WHERE session_id = ?1 AND status = 'OPEN'")
            .bind(&bill.session_id)
            .fetch_one(cmd.conn())
            .await?;

    let mut outcome = BillSettlement {
        session_closed: false,
        parent_closed: false,
    };

    if open_bills == 0 {
        let now = Utc::now();
        let session = require_session(cmd.conn(), &bill.session_id).await?;
        outcome.session_closed = close_session(cmd.conn(), &session.id, now).await?;
        outcome.parent_closed = close_parent_if_complete(cmd.conn(), &session, now).await?;
    }

    cmd.record(
        EntityType::Bill,
        bill_id,
        AuditAction::Settle,
        json!({
            "sessionId": bill.session_id,
            "paid": paid,
            "sessionClosed": outcome.session_closed,
            "parentClosed": outcome.parent_closed,
        }),
    );

    info!(bill_id = %bill_id, session_closed = outcome.session_closed, "Bill settled");
    Ok(outcome)
}

async fn require_bill(conn: &mut SqliteConnection, bill_id: &str) -> DbResult<Bill> {
    let sql = format!("{SELECT_BILL} WHERE id = ?1");
    sqlx::query_as::<_, Bill>(&sql)
        .bind(bill_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| CoreError::BillNotFound(bill_id.to_string()).into())
}

fn expect_open(bill: &Bill, operation: &str) -> DbResult<()> {
    if bill.status != BillStatus::Open {
        return Err(CoreError::InvalidBillStatus {
            bill_id: bill.id.clone(),
            current: bill.status,
            operation: operation.to_string(),
        }
        .into());
    }
    Ok(())
}

pub(crate) async fn bills_for_session(conn: &mut SqliteConnection, session_id: &str) -> DbResult<Vec<Bill>> {
    let sql = format!("{SELECT_BILL} WHERE session_id = ?1 ORDER BY bill_no, rowid");
    let bills = sqlx::query_as::<_, Bill>(&sql)
        .bind(session_id)
        .fetch_all(conn)
        .await?;
    Ok(bills)
}

pub(crate) async fn bill_items_for_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<Vec<BillItem>> {
    let items = sqlx::query_as::<_, BillItem>(
        r#"
        SELECT bi.id, bi.bill_id, bi.product_id, bi.name, bi.qty, bi.price_cents, bi.total_cents
        FROM bill_items bi
        JOIN bills b ON b.id = bi.bill_id
        WHERE b.session_id = ?1
        ORDER BY b.bill_no, bi.rowid
        "#,
    )
    .bind(session_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

pub(crate) async fn payments_for_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<Vec<BillPayment>> {
    let payments = sqlx::query_as::<_, BillPayment>(
        r#"
        SELECT p.id, p.bill_id, p.payment_mode, p.amount_cents, p.paid_at
        FROM bill_payments p
        JOIN bills b ON b.id = p.bill_id
        WHERE b.session_id = ?1
        ORDER BY p.paid_at, p.rowid
        "#,
    )
    .bind(session_id)
    .fetch_all(conn)
    .await?;
    Ok(payments)
}

pub(crate) async fn discounts_for_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<Vec<BillDiscount>> {
    let discounts = sqlx::query_as::<_, BillDiscount>(
        r#"
        SELECT d.id, d.bill_id, d.discount_type, d.value, d.reason, d.applied_by, d.applied_at
        FROM bill_discounts d
        JOIN bills b ON b.id = d.bill_id
        WHERE b.session_id = ?1
        ORDER BY d.applied_at, d.rowid
        "#,
    )
    .bind(session_id)
    .fetch_all(conn)
    .await?;
    Ok(discounts)
}

async fn payments_for_bill(conn: &mut SqliteConnection, bill_id: &str) -> DbResult<Vec<BillPayment>> {
    let payments = sqlx::query_as::<_, BillPayment>(
        r#"
        SELECT id, bill_id, payment_mode, amount_cents, paid_at
        FROM bill_payments
        WHERE bill_id = ?1
        ORDER BY paid_at, rowid
        "#,
    )
    .bind(bill_id)
    .fetch_all(conn)
    .await?;
    Ok(payments)
}

async fn discounts_for_bill(conn: &mut SqliteConnection, bill_id: &str) -> DbResult<Vec<BillDiscount>> {
    let discounts = sqlx::query_as::<_, BillDiscount>(
        r#"
        SELECT id, bill_id, discount_type, value, reason, applied_by, applied_at
        FROM bill_discounts
        WHERE bill_id = ?1
        ORDER BY applied_at, rowid
        "#,
    )
    .bind(bill_id)
    .fetch_all(conn)
    .await?;
    Ok(discounts)
}

pub(crate) async fn settlement_for_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<Option<Settlement>> {
    let settlement = sqlx::query_as::<_, Settlement>(
        r#"
        SELECT id, session_id, bill_no, bill_date, bill_amount_cents, paid_amount_cents,
               waived_off_cents, payment_mode, settled_by, settled_at
        FROM settlements
        WHERE session_id = ?1
        "#,
    )
    .bind(session_id)
    .fetch_optional(conn)
    .await?;
    Ok(settlement)
}

/// Notes on one bill line, oldest first.
async fn notes_for_item(
    conn: &mut SqliteConnection,
    bill_item_id: &str,
) -> DbResult<Vec<BillItemNote>> {
    let notes = sqlx::query_as::<_, BillItemNote>(
        r#"
        SELECT id, bill_item_id, note, created_at
        FROM bill_item_notes
        WHERE bill_item_id = ?1
        ORDER BY created_at, rowid
        "#,
    )
    .bind(bill_item_id)
    .fetch_all(conn)
    .await?;
    Ok(notes)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tavola_core::{ErrorKind, MenuItem, OrderType};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    /// Session with `qty` units of a 100.00 item already on a KOT.
    async fn ticketed(db: &Database, table: &str, qty: usize) -> String {
        let sid = db
            .sessions()
            .create_session(table, OrderType::DineIn, "staff-1")
            .await
            .unwrap();
        let item = MenuItem::new("P1", "Thali", Money::from_cents(10_000));
        for _ in 0..qty {
            db.cart().add_to_cart(&sid, &item).await.unwrap();
        }
        db.kots().create_kot(&sid, "staff-1", None).await.unwrap();
        sid
    }

    #[tokio::test]
    async fn test_print_skipped_without_kot() {
        let db = db().await;
        let sid = db
            .sessions()
            .create_session("T1", OrderType::DineIn, "staff-1")
            .await
            .unwrap();

        let outcome = db.billing().mark_bill_printed(&sid, "staff-1").await.unwrap();
        assert_eq!(outcome, PrintOutcome::Skipped);

        let session = db.sessions().get_session(&sid).await.unwrap();
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.bill_revision, 0);
    }

    #[tokio::test]
    async fn test_print_issues_residual_kot() {
        let db = db().await;
        let sid = db
            .sessions()
            .create_session("T1", OrderType::DineIn, "staff-1")
            .await
            .unwrap();
        db.cart()
            .add_to_cart(&sid, &MenuItem::new("P9", "Soda", Money::from_cents(3_000)))
            .await
            .unwrap();

        let outcome = db.billing().mark_bill_printed(&sid, "staff-1").await.unwrap();
        let PrintOutcome::Printed { revision, auto_kot_id } = outcome else {
            panic!("expected print");
        };
        assert_eq!(revision, 1);
        assert!(auto_kot_id.is_some());
        assert!(db.cart().get_cart(&sid).await.unwrap().is_empty());

        let session = db.sessions().get_session(&sid).await.unwrap();
        assert_eq!(session.status, SessionStatus::Printed);
        assert_eq!(session.bill_printed, 1);

        // Reprint bumps the revision
        let again = db.billing().mark_bill_printed(&sid, "staff-1").await.unwrap();
        assert!(matches!(again, PrintOutcome::Printed { revision: 2, auto_kot_id: None }));
    }

    #[tokio::test]
    async fn test_paid_session_cannot_move_again() {
        let db = db().await;
        let sid = ticketed(&db, "T1", 1).await;
        db.billing()
            .instant_paid(&sid, Money::from_cents(10_000), "staff-1")
            .await
            .unwrap();

        let err = db.billing().mark_bill_printed(&sid, "staff-1").await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InvalidSessionStatus { current: SessionStatus::Paid, .. })
        ));

        let err = db
            .billing()
            .instant_paid(&sid, Money::from_cents(10_000), "staff-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::State));
        assert_eq!(db.billing().list_bills(&sid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settlement_requires_print() {
        let db = db().await;
        let sid = ticketed(&db, "T1", 1).await;

        let err = db
            .billing()
            .finalize_settlement(&sid, Money::from_cents(10_000), Money::from_cents(10_000), SettlementMode::Cash, "staff-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::State));
        assert_eq!(
            db.sessions().get_session(&sid).await.unwrap().status,
            SessionStatus::Running
        );
    }

    #[tokio::test]
    async fn test_settlement_numbers_and_waiver() {
        let db = db().await;
        let first = ticketed(&db, "T1", 1).await;
        let second = ticketed(&db, "T2", 1).await;

        for sid in [&first, &second] {
            db.billing().mark_bill_printed(sid, "staff-1").await.unwrap();
        }

        let receipt = db
            .billing()
            .finalize_settlement(&first, Money::from_cents(10_000), Money::from_cents(9_500), SettlementMode::Card, "staff-1")
            .await
            .unwrap();
        assert_eq!(receipt.bill_no, 1);
        assert_eq!(receipt.waived_off.cents(), 500);
        assert!(!receipt.parent_closed);

        let receipt = db
            .billing()
            .finalize_settlement(&second, Money::from_cents(10_000), Money::from_cents(12_000), SettlementMode::Cash, "staff-1")
            .await
            .unwrap();
        assert_eq!(receipt.bill_no, 2);
        assert_eq!(receipt.waived_off, Money::zero());

        let session = db.sessions().get_session(&first).await.unwrap();
        assert_eq!(session.status, SessionStatus::Paid);
        assert!(session.closed_at.is_some());

        let settlement = db.billing().get_settlement(&first).await.unwrap().unwrap();
        assert_eq!(settlement.payment_mode, SettlementMode::Card);
        assert_eq!(settlement.waived_off_cents, 500);

        // No double settlement
        let err = db
            .billing()
            .finalize_settlement(&first, Money::from_cents(10_000), Money::from_cents(10_000), SettlementMode::Cash, "staff-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::State));
    }

    #[tokio::test]
    async fn test_multi_bill_flow() {
        let db = db().await;
        let sid = ticketed(&db, "T1", 2).await;
        let billing = db.billing();

        let first = billing
            .create_bill(&sid, BillType::Full, SplitMethod::None, Money::from_cents(15_000), "staff-1")
            .await
            .unwrap();
        let second = billing
            .create_bill(&sid, BillType::Full, SplitMethod::Item, Money::from_cents(5_000), "staff-1")
            .await
            .unwrap();
        assert_eq!(first.bill_no, 1);
        assert_eq!(second.bill_no, 2);

        let item_id = billing
            .add_bill_item(&first.bill_id, "P1", "Thali", 2, Money::from_cents(10_000))
            .await
            .unwrap();
        billing.add_bill_item_note(&item_id, "one without rice").await.unwrap();
        assert_eq!(billing.get_bill_item_notes(&item_id).await.unwrap().len(), 1);

        billing
            .apply_bill_discount(&first.bill_id, DiscountType::Percent, 1_000, "regular", "staff-1")
            .await
            .unwrap();
        billing
            .add_bill_payment(&first.bill_id, PaymentMode::Gpay, Money::from_cents(10_000), "staff-1")
            .await
            .unwrap();

        let summary = billing.bill_summary(&first.bill_id).await.unwrap();
        assert_eq!(summary.discount_total.cents(), 1_500);
        assert_eq!(summary.net.cents(), 13_500);
        assert_eq!(summary.balance_due.cents(), 3_500);

        // Underpaid against total_amount
        let err = billing.settle_bill(&first.bill_id, "staff-1").await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::BillUnderpaid { .. })));

        billing
            .add_bill_payment(&first.bill_id, PaymentMode::Cash, Money::from_cents(5_000), "staff-1")
            .await
            .unwrap();
        let outcome = billing.settle_bill(&first.bill_id, "staff-1").await.unwrap();
        assert!(!outcome.session_closed);

        billing
            .add_bill_payment(&second.bill_id, PaymentMode::Due, Money::from_cents(5_000), "staff-1")
            .await
            .unwrap();
        let outcome = billing.settle_bill(&second.bill_id, "staff-1").await.unwrap();
        assert!(outcome.session_closed);
        assert_eq!(
            db.sessions().get_session(&sid).await.unwrap().status,
            SessionStatus::Paid
        );

        let err = billing.settle_bill(&second.bill_id, "staff-1").await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidBillStatus { .. })));
    }

    #[tokio::test]
    async fn test_settle_missing_bill() {
        let db = db().await;
        let err = db.billing().settle_bill("nope", "staff-1").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_instant_paid() {
        let db = db().await;
        let sid = ticketed(&db, "T1", 3).await;

        let total = db.billing().session_total(&sid).await.unwrap();
        let created = db.billing().instant_paid(&sid, total, "staff-1").await.unwrap();

        let bill = db.billing().get_bill(&created.bill_id).await.unwrap();
        assert_eq!(bill.status, BillStatus::Paid);
        assert_eq!(bill.bill_type, BillType::Full);
        assert_eq!(bill.total_amount_cents, 30_000);
        assert_eq!(
            db.sessions().get_session(&sid).await.unwrap().status,
            SessionStatus::Paid
        );

        let payments = db.audit().for_entity(EntityType::Payment, &created.bill_id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].payload_json().unwrap()["mode"], "CASH");
    }

    #[tokio::test]
    async fn test_billable_lines_exclude_cancelled() {
        let db = db().await;
        let sid = ticketed(&db, "T1", 3).await;
        let kot_id = db.kots().list_kots(&sid).await.unwrap()[0].id.clone();

        db.adjustments()
            .add_adjustment(&sid, &kot_id, "P1", -3, "table walked out", "staff-1")
            .await
            .unwrap();

        assert!(db.billing().billable_lines(&sid).await.unwrap().is_empty());
        assert_eq!(db.billing().session_total(&sid).await.unwrap(), Money::zero());
    }

    #[tokio::test]
    async fn test_bill_item_bounds() {
        let db = db().await;
        let sid = ticketed(&db, "T1", 1).await;
        let bill = db
            .billing()
            .create_bill(&sid, BillType::Full, SplitMethod::None, Money::from_cents(10_000), "staff-1")
            .await
            .unwrap();

        for (qty, price) in [(i64::MAX, 2), (0, 100), (1, i64::MAX), (1, -1)] {
            let err = db
                .billing()
                .add_bill_item(&bill.bill_id, "P1", "Thali", qty, Money::from_cents(price))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::Validation));
        }

        let err = db
            .billing()
            .create_bill(&sid, BillType::Full, SplitMethod::None, Money::from_cents(i64::MAX), "staff-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Validation));

        let summary = db.billing().bill_summary(&bill.bill_id).await.unwrap();
        assert_eq!(summary.gross.cents(), 10_000);
    }

    #[tokio::test]
    async fn test_invalid_discount_rejected() {
        let db = db().await;
        let sid = ticketed(&db, "T1", 1).await;
        let bill = db
            .billing()
            .create_bill(&sid, BillType::Full, SplitMethod::None, Money::from_cents(10_000), "staff-1")
            .await
            .unwrap();

        let err = db
            .billing()
            .apply_bill_discount(&bill.bill_id, DiscountType::Percent, 20_000, "too generous", "staff-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Validation));
    }
}

//! # tavola-db: Billing Engine Storage for Tavola
//!
//! Every order-lifecycle command runs here, against SQLite via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tavola Data Flow                                 │
//! │                                                                         │
//! │  UI / host command (add_to_cart, mark_bill_printed, ...)               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tavola-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ session, cart │    │  (embedded)  │  │   │
//! │  │   │               │    │ kot, billing  │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ split, ...    │    │ 001_billing_ │  │   │
//! │  │   │ IdGenerator   │    │               │    │   schema.sql │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │                               │   │
//! │  │                        ┌───────▼───────┐                       │   │
//! │  │                        │   CommandTx   │ one tx per command,   │   │
//! │  │                        │ (command.rs)  │ audit rows included   │   │
//! │  │                        └───────────────┘                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (WAL)                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Configuration, pool creation, repository accessors
//! - [`command`] - Command transaction with queued audit entries
//! - [`ids`] - Injectable id generation
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per billing component
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tavola_core::{MenuItem, Money, OrderType};
//! use tavola_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./tavola.db")).await?;
//!
//! let item = MenuItem::new("P1", "Masala Dosa", Money::from_cents(12_000));
//! let session_id = db
//!     .sessions()
//!     .add_item_to_table("T4", OrderType::DineIn, &item, "staff-1")
//!     .await?;
//!
//! db.kots().create_kot(&session_id, "staff-1", None).await?;
//! db.billing().mark_bill_printed(&session_id, "staff-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod command;
pub mod error;
pub mod ids;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use command::CommandTx;
pub use error::{DbError, DbResult};
pub use ids::{IdGenerator, SequentialIdGenerator, UuidV4Generator};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::adjustment::AdjustmentRepository;
pub use repository::audit::AuditRepository;
pub use repository::billing::BillingRepository;
pub use repository::cart::CartRepository;
pub use repository::kot::KotRepository;
pub use repository::session::SessionRepository;
pub use repository::snapshot::SnapshotRepository;
pub use repository::split::SplitRepository;

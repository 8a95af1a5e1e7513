//! # Repository Module
//!
//! One repository per billing component.
//!
//! ## Command Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository → CommandTx → SQLite                      │
//! │                                                                         │
//! │  db.kots().create_kot(session_id, staff_id, note)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  KotRepository                                                         │
//! │  ├── validate input               (no transaction yet)                 │
//! │  ├── CommandTx::begin             (BEGIN)                              │
//! │  ├── kot::issue(conn, ...)        (rows, guards, sequence)             │
//! │  ├── cmd.record(KOT, CREATE, ..)  (queued audit)                       │
//! │  └── cmd.commit()                 (audit rows + COMMIT)                │
//! │                                                                         │
//! │  The free functions taking `&mut SqliteConnection` are shared between  │
//! │  repositories, so one command can span several components without     │
//! │  opening a second transaction (print issues a KOT, instant pay         │
//! │  creates + pays + settles a bill).                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`SessionRepository`] - Session lifecycle, table lookup, metadata
//! - [`CartRepository`] - Pre-ticket cart lines
//! - [`KotRepository`] - Kitchen order tickets
//! - [`AdjustmentRepository`] - Post-ticket quantity corrections
//! - [`BillingRepository`] - Print, settlement, bills, discounts, payments
//! - [`SplitRepository`] - Equal split into child sessions
//! - [`SnapshotRepository`] - Session snapshots for rendering
//! - [`AuditRepository`] - Audit trail reads

pub mod adjustment;
pub mod audit;
pub mod billing;
pub mod cart;
pub mod kot;
pub mod session;
pub mod snapshot;
pub mod split;

pub use adjustment::AdjustmentRepository;
pub use audit::AuditRepository;
pub use billing::BillingRepository;
pub use cart::CartRepository;
pub use kot::KotRepository;
pub use session::SessionRepository;
pub use snapshot::SnapshotRepository;
pub use split::SplitRepository;

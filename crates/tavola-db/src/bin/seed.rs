//! # Demo Floor Seeder
//!
//! Populates a database with a small restaurant floor for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./tavola_dev.db (or TAVOLA_DB_PATH)
//! cargo run -p tavola-db --bin seed
//!
//! # Specify database path
//! cargo run -p tavola-db --bin seed -- --db ./data/tavola.db
//! ```
//!
//! ## Generated Floor
//! - `T1`: RUNNING, two KOTs and a cart line not yet sent
//! - `T2`: PRINTED, one item cancelled after the KOT
//! - `T3`: split three ways, first child paid
//! - `D1`: delivery order paid in one step

use std::env;

use tavola_core::{MenuItem, Money, OrderType, SettlementMode};
use tavola_db::{Database, DbConfig};
use tracing_subscriber::EnvFilter;

const STAFF: &str = "seed";

/// `(product_id, name, price in minor units)`
const MENU: &[(&str, &str, i64)] = &[
    ("M-001", "Masala Dosa", 12_000),
    ("M-002", "Paneer Butter Masala", 26_000),
    ("M-003", "Butter Naan", 6_000),
    ("M-004", "Veg Biryani", 22_000),
    ("M-005", "Masala Chai", 4_000),
    ("M-006", "Gulab Jamun", 9_000),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tavola=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    let mut config = DbConfig::from_env("./tavola_dev.db")?;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database_path = args[i + 1].clone().into();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tavola Demo Floor Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./tavola_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Tavola Demo Floor Seeder");
    println!("========================");
    println!("Database: {}", config.database_path.display());
    println!();

    let db = Database::new(config).await?;
    println!("✓ Connected, migrations applied");

    let menu: Vec<MenuItem> = MENU
        .iter()
        .map(|(id, name, price)| MenuItem::new(*id, *name, Money::from_cents(*price)))
        .collect();

    if db.sessions().get_open_session("T1").await?.is_some() {
        println!("⚠ Table T1 already has an open session, skipping seed");
        return Ok(());
    }

    // T1: running table
    let t1 = db
        .sessions()
        .add_item_to_table("T1", OrderType::DineIn, &menu[0], STAFF)
        .await?;
    db.cart().add_to_cart(&t1, &menu[4]).await?;
    db.kots().create_kot(&t1, STAFF, None).await?;
    db.cart().add_to_cart(&t1, &menu[2].clone().with_note("extra butter")).await?;
    db.kots().create_kot(&t1, STAFF, Some("rush")).await?;
    db.cart().add_to_cart(&t1, &menu[5]).await?;
    println!("✓ T1 running");

    // T2: printed, one item cancelled
    let t2 = db.sessions().create_session("T2", OrderType::DineIn, STAFF).await?;
    for item in [&menu[1], &menu[2], &menu[2]] {
        db.cart().add_to_cart(&t2, item).await?;
    }
    if let Some(kot_id) = db.kots().create_kot(&t2, STAFF, None).await? {
        db.adjustments()
            .add_adjustment(&t2, &kot_id, "M-003", -1, "ordered twice by mistake", STAFF)
            .await?;
    }
    db.billing().mark_bill_printed(&t2, STAFF).await?;
    println!("✓ T2 printed, total {}", db.billing().session_total(&t2).await?);

    // T3: split three ways, first share paid
    let t3 = db.sessions().create_session("T3", OrderType::DineIn, STAFF).await?;
    for item in [&menu[3], &menu[3], &menu[1], &menu[4]] {
        db.cart().add_to_cart(&t3, item).await?;
    }
    db.billing().mark_bill_printed(&t3, STAFF).await?;
    let split = db.splits().split_session_equal(&t3, 3, STAFF).await?;
    if let Some(first) = split.children.first() {
        db.billing()
            .finalize_settlement(
                &first.session_id,
                split.per_split,
                split.per_split,
                SettlementMode::Card,
                STAFF,
            )
            .await?;
    }
    println!(
        "✓ T3 split {} ways at {} (remainder {})",
        split.children.len(),
        split.per_split,
        split.remainder
    );

    // D1: delivery, paid at once
    let d1 = db
        .sessions()
        .add_item_to_table("D1", OrderType::Delivery, &menu[3], STAFF)
        .await?;
    db.sessions()
        .upsert_session_meta(&d1, Some("cust-42"), Some("leave at the gate"), OrderType::Delivery, STAFF)
        .await?;
    db.kots().create_kot(&d1, STAFF, None).await?;
    let total = db.billing().session_total(&d1).await?;
    db.billing().instant_paid(&d1, total, STAFF).await?;
    println!("✓ D1 delivered and paid ({})", total);

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}

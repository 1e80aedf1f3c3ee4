//! # Seed Data Generator
//!
//! Populates a database with two branches, a few products and accounts,
//! and one of each movement, for development against a realistic book.
//!
//! ## Usage
//! ```bash
//! # Seed the configured database
//! cargo run -p stockbook-engine --bin seed
//!
//! # Specify database path
//! cargo run -p stockbook-engine --bin seed -- --db ./data/stockbook.db
//!
//! # Use a config file
//! cargo run -p stockbook-engine --bin seed -- --config ./engine.toml
//! ```

use chrono::Utc;
use std::env;
use std::path::{Path, PathBuf};

use stockbook_core::{AccountKind, Money, Quantity};
use stockbook_engine::{
    init_tracing, CreateProductRequest, Engine, EngineConfig, PaymentRequest, PurchaseRequest,
    SaleRequest, TransferRequest, VariantInput,
};

/// (name, category, unit cost, opening base qty, variants)
type ProductSeed = (&'static str, &'static str, i64, i64, &'static [(&'static str, i64, i64)]);

/// Variants are (unit code, units per base unit, sell price); 0 marks the base.
const PRODUCTS: &[ProductSeed] = &[
    ("Biscuits", "Snacks", 300, 40, &[("CARTON", 0, 360), ("PACK", 6, 65), ("PIECE", 24, 17)]),
    ("Rice", "Grocery", 90, 500, &[("KG", 0, 110)]),
    ("Cooking Oil", "Grocery", 2400, 20, &[("CAN", 0, 2750), ("LITRE", 5, 560)]),
    ("Soap", "Household", 480, 15, &[("BOX", 0, 600), ("BAR", 12, 55)]),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<String> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockbook Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file path (default: from config)");
                println!("  -c, --config <PATH>    Engine config file (default: platform config dir)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    init_tracing();

    let mut config = EngineConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }
    if !config.is_in_memory() {
        if let Some(parent) = Path::new(&config.database.path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    println!("Stockbook Seed Data Generator");
    println!("=============================");
    println!("Database: {}", config.database.path);
    println!();

    let engine = Engine::open(config).await?;
    println!("✓ Connected to database, migrations applied");

    let existing = {
        let mut conn = engine.database().acquire().await?;
        engine.database().branches().list(&mut conn).await?
    };
    if !existing.is_empty() {
        println!("⚠ Database already has {} branches", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let main = engine.create_branch("Main Store", "MAIN").await?;
    let east = engine.create_branch("East Market", "EAST").await?;
    println!("✓ Branches: {} and {}", main.code, east.code);

    for (name, category, cost, opening, variants) in PRODUCTS {
        let variants = variants
            .iter()
            .map(|(unit, per_base, price)| match per_base {
                0 => VariantInput::base(unit, Money::from_major(*price)),
                n => VariantInput::per_base(unit, *n, Money::from_major(*price)),
            })
            .map(|v| v.alert_at(Quantity::from_whole(5)))
            .collect();

        engine
            .create_product(CreateProductRequest {
                branch_id: main.id.clone(),
                name: name.to_string(),
                category: Some(category.to_string()),
                unit_cost: Money::from_major(*cost),
                variants,
                opening_quantity: Quantity::from_whole(*opening),
                date: Utc::now(),
                operator: Some("seed".into()),
            })
            .await?;
    }
    println!("✓ Products: {}", PRODUCTS.len());

    let customer = engine
        .create_account(AccountKind::Customer, &main.id, "Ayesha Traders", Some("0300-1234567"))
        .await?;
    let supplier = engine
        .create_account(AccountKind::Supplier, &main.id, "Valley Mills", None)
        .await?;
    println!("✓ Accounts: {} (customer), {} (supplier)", customer.name, supplier.name);

    let sale = engine
        .sell(
            SaleRequest::new(&main.id)
                .line("Biscuits", "CARTON", Quantity::from_whole(2), Money::from_major(360))
                .line("Biscuits", "PIECE", Quantity::from_whole(10), Money::from_major(17))
                .line("Rice", "KG", Quantity::from_whole(25), Money::from_major(110))
                .on_credit(&customer.id, Money::from_major(1000)),
        )
        .await?;
    println!("✓ Sale {} for {}", sale.receipt_no, sale.total);

    let purchase = engine
        .purchase(PurchaseRequest {
            branch_id: main.id.clone(),
            product: "Rice".into(),
            unit_code: "KG".into(),
            quantity: Quantity::from_whole(200),
            unit_cost: Money::from_major(90),
            supplier_id: Some(supplier.id.clone()),
            paid: Money::from_major(10_000),
            date: Utc::now(),
            operator: Some("seed".into()),
            ..Default::default()
        })
        .await?;
    println!("✓ Purchase {}", purchase.invoice_no);

    let transfer = engine
        .transfer(TransferRequest {
            source_branch_id: main.id.clone(),
            dest_branch_id: east.id.clone(),
            product: "Biscuits".into(),
            unit_code: "CARTON".into(),
            quantity: Quantity::from_whole(10),
            date: Utc::now(),
            operator: Some("seed".into()),
            ..Default::default()
        })
        .await?;
    println!("✓ Transfer {} to {}", transfer.record.ref_no, east.code);

    let payment = engine
        .record_payment(PaymentRequest {
            account_id: customer.id.clone(),
            branch_id: main.id.clone(),
            amount: Money::from_major(500),
            date: Utc::now(),
            operator: Some("seed".into()),
            ..Default::default()
        })
        .await?;
    println!("✓ Payment {}", payment.ref_no);

    println!();
    println!("Balances");
    for account in [&customer, &supplier] {
        println!("  {:<16} {}", account.name, engine.current_balance(&account.id).await?);
    }

    let low = engine.low_stock(&main.id).await?;
    println!("Low stock at {}: {} variant(s)", main.code, low.len());
    for item in low {
        println!(
            "  {} {}: {} (alert {})",
            item.product_name, item.unit_code, item.quantity, item.low_stock_alert
        );
    }

    println!();
    println!("✓ Seed complete!");
    Ok(())
}

//! # Stockbook Engine
//!
//! Units of work over the inventory and account ledgers of every branch.
//! Each public operation on [`Engine`] validates its request, locks the
//! aggregates it touches, runs inside one SQLite transaction and either
//! commits everything or nothing.
//!
//! ## Module Organization
//! ```text
//! stockbook_engine/
//! ├── lib.rs          ◄─── You are here (exports, tracing setup)
//! ├── engine.rs       ◄─── Engine handle and shared unit-of-work steps
//! ├── config.rs       ◄─── TOML + environment configuration
//! ├── error.rs        ◄─── EngineError with stable codes
//! ├── locks.rs        ◄─── Per product@branch / account exclusivity
//! ├── requests.rs     ◄─── Typed, validated request structs
//! ├── catalog.rs      ◄─── Branches, accounts, products, edits, prices
//! ├── sales.rs        ◄─── sell
//! ├── purchase.rs     ◄─── purchase
//! ├── adjust.rs       ◄─── adjust
//! ├── transfer.rs     ◄─── transfer, edit_transfer, delete_transfer
//! ├── accounts.rs     ◄─── payments, ledger corrections, reconciliation
//! └── history.rs      ◄─── read-only history and reports
//! ```
//!
//! ## Example
//! ```rust,ignore
//! use stockbook_engine::{Engine, EngineConfig, SaleRequest};
//!
//! let engine = Engine::open(EngineConfig::load(None)?).await?;
//! let receipt = engine
//!     .sell(SaleRequest::new(&branch_id).line("Biscuits", "PIECE", qty, price))
//!     .await?;
//! println!("{} {}", receipt.receipt_no, receipt.total);
//! ```

pub mod accounts;
pub mod adjust;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod locks;
pub mod purchase;
pub mod requests;
pub mod sales;
pub mod transfer;

#[cfg(test)]
mod testing;

use tracing_subscriber::EnvFilter;

pub use adjust::AdjustmentReceipt;
pub use catalog::ProductEdit;
pub use config::{ConfigError, EngineConfig};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, ErrorCode};
pub use purchase::PurchaseReceipt;
pub use requests::{
    AdjustPriceRequest, AdjustRequest, AlertChange, CreateProductRequest, EditEntryRequest,
    EditProductRequest, EditTransferRequest, PaymentRequest, PurchaseRequest, SaleLineRequest,
    SalePayment, SaleRequest, TransferRequest, VariantInput,
};
pub use sales::SaleReceipt;
pub use transfer::{TransferCorrection, TransferReceipt};

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=stockbook_engine=trace` - Trace the engine only
/// - Default: INFO, with debug for the stockbook crates
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,stockbook=debug,sqlx=warn")
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();
}

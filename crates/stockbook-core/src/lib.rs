//! # stockbook-core: Pure Inventory & Ledger Logic
//!
//! Unit conversion, stock ledger breakdowns, running-balance replay and
//! transfer planning, as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockbook Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Request layer (out of scope)                    │   │
//! │  │    forms, auth, pages ──► typed requests                        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    stockbook-engine                             │   │
//! │  │    sell, purchase, adjust, transfer, record_payment, ...       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ stockbook-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌────────────┐  ┌──────────┐  │   │
//! │  │   │  variant  │  │stock_ledger│  │  account_  │  │ transfer │  │   │
//! │  │   │VariantSet │  │ breakdown  │  │  ledger    │  │  plan    │  │   │
//! │  │   │ apply_    │  │ Particular │  │  replay    │  │  state   │  │   │
//! │  │   │  delta    │  │            │  │            │  │  machine │  │   │
//! │  │   └───────────┘  └────────────┘  └────────────┘  └──────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    stockbook-db (SQLite)                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`quantity`] - Fixed-point quantities and conversion factors
//! - [`money`] - Integer-cent money
//! - [`variant`] - `VariantSet` and proportional recalculation
//! - [`stock_ledger`] - Stock movement breakdowns and entries
//! - [`account_ledger`] - Customer/supplier running balances and replay
//! - [`transfer`] - Cross-branch movement planning and state machine
//! - [`sequence`] - Document numbering
//! - [`types`] - Branch, Product, Account and other records
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output; the caller supplies dates
//! 2. **Fixed Point**: quantities in hundredths, money in cents, no floats
//! 3. **Recompute, don't patch**: derived quantities and running balances
//!    are always rebuilt from their source of truth
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use stockbook_core::variant::{Conversion, NegativeStockPolicy, VariantSet, VariantSpec};
//! use stockbook_core::{ConversionFactor, Money, Quantity};
//!
//! let mut biscuits = VariantSet::new(
//!     "Biscuits",
//!     Money::from_major(300),
//!     vec![
//!         VariantSpec {
//!             unit_code: "carton".into(),
//!             conversion: Conversion::BaseEquivalent,
//!             sell_price: Money::from_major(360),
//!             low_stock_alert: Quantity::zero(),
//!         },
//!         VariantSpec {
//!             unit_code: "piece".into(),
//!             conversion: Conversion::Proportional(ConversionFactor::from_whole(12).unwrap()),
//!             sell_price: Money::from_major(35),
//!             low_stock_alert: Quantity::zero(),
//!         },
//!     ],
//!     Quantity::from_whole(10),
//! )
//! .unwrap();
//!
//! biscuits
//!     .apply_delta("CARTON", Quantity::from_whole(-2), NegativeStockPolicy::Reject)
//!     .unwrap();
//! assert_eq!(biscuits.get("PIECE").unwrap().quantity, Quantity::from_whole(96));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod account_ledger;
pub mod error;
pub mod money;
pub mod quantity;
pub mod sequence;
pub mod stock_ledger;
pub mod transfer;
pub mod types;
pub mod validation;
pub mod variant;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use stockbook_core::Money` instead of
// `use stockbook_core::money::Money`

pub use account_ledger::{AccountKind, AccountLedgerEntry, EntryFields, EntryStatus, EntryType};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use quantity::{ConversionFactor, Quantity};
pub use sequence::{SequenceGenerator, SequenceKind};
pub use stock_ledger::{LedgerLine, MovementContext, Particular, StockLedgerEntry};
pub use transfer::{TransferRecord, TransferState};
pub use types::*;
pub use variant::{Conversion, NegativeStockPolicy, Variant, VariantDelta, VariantSet, VariantSpec};

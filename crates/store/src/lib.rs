//! Persistence for the checkout reconciliation engine.
//!
//! Orders are stored as whole documents guarded by a version number; every
//! write is a compare-and-set against the version the caller loaded. Stock is
//! kept in a ledger that applies at most one movement per order and product.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{CartStore, Catalog, CommerceStore, OrderStore, StockDecrement, StockLedger};

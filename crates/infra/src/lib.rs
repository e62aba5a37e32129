//! Infrastructure layer: in-memory reference implementations and the
//! coordination that the pure domain crates stay free of.
//!
//! Durable backends slot in behind the same traits (`TenantStore`,
//! `NumberSequencer`, `EventBus`); everything here works without IO.

pub mod config;
pub mod document_store;
pub mod locks;
pub mod movement_log;
pub mod queries;
pub mod retry;
pub mod sequencer;
pub mod stock_activity;
pub mod stock_ledger;
pub mod tenant_store;

pub use config::RuntimeConfig;
pub use document_store::{DocumentError, DocumentStore, NewDocument};
pub use locks::{KeyLocks, LockTimeout};
pub use movement_log::MovementLog;
pub use queries::LedgerQueries;
pub use retry::with_retries;
pub use sequencer::InMemorySequencer;
pub use stock_activity::{ActivityProjectionError, StockActivity, StockActivityProjection};
pub use stock_ledger::{InMemoryStockLedger, LedgerError, StockLedger};
pub use tenant_store::{InMemoryTenantStore, TenantStore};

#[cfg(test)]
mod integration_tests;

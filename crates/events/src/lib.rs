//! `ledgerkit-events` — event plumbing shared by the ledger and its consumers.
//!
//! The movement log is the source of truth; everything here exists to carry
//! those facts to materialized views and external consumers.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;

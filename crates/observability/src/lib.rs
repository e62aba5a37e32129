//! `ledgerkit-observability` — process-level observability wiring.

pub mod tracing;

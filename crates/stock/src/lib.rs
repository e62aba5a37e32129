//! `ledgerkit-stock` — the stock ledger domain.
//!
//! An append-only log of movements is the source of truth. Two denormalized
//! views are derived from it: the per-material lot table and the per-shelf
//! contents table. Both are caches (either can be rebuilt by replaying the
//! log), and they must always agree on the amount held for any
//! `(material, shelf, expiration)` triple.

pub mod error;
pub mod movement;
pub mod views;

pub use error::StockError;
pub use movement::{Direction, MaterialId, MovementId, ShelfId, StockMovement};
pub use views::{
    AppliedMovement, Content, ContentKey, Lot, LotKey, MaterialStockView, Replayed,
    ShelfContentsView, apply_movement, replay_material, replay_shelf, views_agree,
};

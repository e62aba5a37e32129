//! Ledger query facade: the read side.
//!
//! Strictly read-only: nothing here can mutate a view. Callers needing a
//! stock change go through `StockLedger::apply`.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use ledgerkit_core::TenantId;
use ledgerkit_stock::{Content, Lot, MaterialId, MaterialStockView, ShelfContentsView, ShelfId};

use crate::tenant_store::TenantStore;

/// Read-only view over the materialized stock state.
#[derive(Debug)]
pub struct LedgerQueries<'a, MS, SS> {
    materials: &'a MS,
    shelves: &'a SS,
}

impl<'a, MS, SS> LedgerQueries<'a, MS, SS>
where
    MS: TenantStore<MaterialId, MaterialStockView>,
    SS: TenantStore<ShelfId, ShelfContentsView>,
{
    pub fn new(materials: &'a MS, shelves: &'a SS) -> Self {
        Self { materials, shelves }
    }

    /// Current stock of a material: sum of its positive lot amounts.
    pub fn current_stock(&self, tenant_id: TenantId, material_id: MaterialId) -> Decimal {
        self.materials
            .get(tenant_id, &material_id)
            .map(|view| view.total_amount())
            .unwrap_or(Decimal::ZERO)
    }

    /// Lot breakdown in FIFO-by-expiration order.
    pub fn lots_for(&self, tenant_id: TenantId, material_id: MaterialId) -> Vec<Lot> {
        self.materials
            .get(tenant_id, &material_id)
            .map(|view| view.lots())
            .unwrap_or_default()
    }

    /// Contents of a shelf across materials.
    pub fn contents_for(&self, tenant_id: TenantId, shelf_id: ShelfId) -> Vec<Content> {
        self.shelves
            .get(tenant_id, &shelf_id)
            .map(|view| view.contents())
            .unwrap_or_default()
    }

    /// Minimum dated expiration among the material's lots, absent when no
    /// lot carries one.
    pub fn earliest_expiration(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
    ) -> Option<NaiveDate> {
        self.materials
            .get(tenant_id, &material_id)
            .and_then(|view| view.earliest_expiration())
    }
}

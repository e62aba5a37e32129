//! Append-only movement log: the ledger's source of truth.
//!
//! Movements are appended in arrival order per tenant and are never mutated.
//! The only removal path is the cascade from deleting an originating line
//! item; affected views must be rebuilt by replay afterwards.

use std::collections::HashMap;
use std::sync::RwLock;

use ledgerkit_core::{DomainError, ExpectedVersion, TenantId};
use ledgerkit_documents::LineItemId;
use ledgerkit_stock::{MaterialId, ShelfId, StockMovement};

/// In-memory append-only movement log.
///
/// Intended for tests/dev. Not optimized for performance; durable backends
/// implement the same semantics with an ordinary table.
#[derive(Debug, Default)]
pub struct MovementLog {
    streams: RwLock<HashMap<TenantId, Vec<StockMovement>>>,
}

impl MovementLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one movement.
    ///
    /// `expected` is the material's stream version (number of logged
    /// movements for that material). The coordinator serializes writers per
    /// material, so a mismatch means a writer bypassed the lock; surfaced
    /// as a conflict rather than silently interleaved.
    pub fn append(
        &self,
        movement: StockMovement,
        expected: ExpectedVersion,
    ) -> Result<u64, DomainError> {
        let mut streams = self
            .streams
            .write()
            .map_err(|_| DomainError::conflict("movement log lock poisoned"))?;

        let stream = streams.entry(movement.tenant_id()).or_default();
        let current = Self::count_for_material(stream, movement.material_id());
        expected.check(current)?;

        stream.push(movement);
        Ok(current + 1)
    }

    /// Current stream version for a material (count of logged movements).
    pub fn material_version(&self, tenant_id: TenantId, material_id: MaterialId) -> u64 {
        self.streams
            .read()
            .ok()
            .and_then(|streams| {
                streams
                    .get(&tenant_id)
                    .map(|s| Self::count_for_material(s, material_id))
            })
            .unwrap_or(0)
    }

    /// All movements for a material, in append order.
    pub fn for_material(&self, tenant_id: TenantId, material_id: MaterialId) -> Vec<StockMovement> {
        self.filtered(tenant_id, |m| m.material_id() == material_id)
    }

    /// All movements touching a shelf, in append order.
    pub fn for_shelf(&self, tenant_id: TenantId, shelf_id: ShelfId) -> Vec<StockMovement> {
        self.filtered(tenant_id, |m| m.shelf_id() == Some(shelf_id))
    }

    /// All movements originated by a document line.
    pub fn for_line_item(&self, tenant_id: TenantId, line_item_id: LineItemId) -> Vec<StockMovement> {
        self.filtered(tenant_id, |m| m.originating_line_item() == Some(line_item_id))
    }

    /// Cascade from line-item deletion: remove the movement records it
    /// originated. No compensating movement is generated; the caller rebuilds
    /// the affected views and reconciles.
    pub fn remove_by_line_item(
        &self,
        tenant_id: TenantId,
        line_item_id: LineItemId,
    ) -> Vec<StockMovement> {
        let mut removed = Vec::new();

        if let Ok(mut streams) = self.streams.write() {
            if let Some(stream) = streams.get_mut(&tenant_id) {
                stream.retain(|m| {
                    if m.originating_line_item() == Some(line_item_id) {
                        removed.push(m.clone());
                        false
                    } else {
                        true
                    }
                });
            }
        }

        removed
    }

    fn filtered(
        &self,
        tenant_id: TenantId,
        keep: impl Fn(&StockMovement) -> bool,
    ) -> Vec<StockMovement> {
        self.streams
            .read()
            .ok()
            .and_then(|streams| {
                streams
                    .get(&tenant_id)
                    .map(|s| s.iter().filter(|m| keep(m)).cloned().collect())
            })
            .unwrap_or_default()
    }

    fn count_for_material(stream: &[StockMovement], material_id: MaterialId) -> u64 {
        stream.iter().filter(|m| m.material_id() == material_id).count() as u64
    }
}

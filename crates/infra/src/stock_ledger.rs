//! Stock ledger coordinator: serialized, all-or-nothing view maintenance.
//!
//! `applyMovement` is a read-modify-write over shared state, so all writers
//! targeting the same material (and, independently, the same shelf) are
//! serialized through per-key locks; movements for disjoint keys proceed in
//! parallel. Both updated views are computed before either store is written,
//! so a failure leaves no partial update. The movement log append carries an
//! optimistic version expectation as a second line of defense.

use serde_json::Value as JsonValue;
use uuid::Uuid;

use ledgerkit_core::{ExpectedVersion, Retryable, TenantId};
use ledgerkit_documents::LineItemId;
use ledgerkit_events::{EventBus, EventEnvelope, InMemoryEventBus};
use ledgerkit_stock::{
    AppliedMovement, MaterialId, MaterialStockView, Replayed, ShelfContentsView, ShelfId,
    StockError, StockMovement, apply_movement, replay_material, replay_shelf, views_agree,
};
use thiserror::Error;

use crate::config::RuntimeConfig;
use crate::locks::{KeyLocks, LockTimeout};
use crate::movement_log::MovementLog;
use crate::tenant_store::{InMemoryTenantStore, TenantStore};

/// Aggregate type tag carried on published movement envelopes.
const MATERIAL_STREAM: &str = "stock.material";

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Terminal domain rejection (validation, inconsistent withdrawal).
    #[error(transparent)]
    Stock(#[from] StockError),

    /// Lock on a ledger key not acquired within the configured bound.
    /// Retryable.
    #[error("contention on {key}: {source}")]
    ContentionTimeout { key: String, source: LockTimeout },

    /// The log rejected an append (a writer bypassed serialization).
    /// Retryable.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Publication failed after a successful commit (at-least-once; the
    /// movement is in the log and can be republished).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl Retryable for LedgerError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::ContentionTimeout { .. } | LedgerError::Conflict(_)
        )
    }
}

/// The stock ledger service: append-only log + the two materialized views.
///
/// Generic over the view stores and the event bus so durable backends can be
/// slotted in; `InMemoryStockLedger` is the everything-in-process variant.
#[derive(Debug)]
pub struct StockLedger<MS, SS, B> {
    config: RuntimeConfig,
    log: MovementLog,
    materials: MS,
    shelves: SS,
    material_locks: KeyLocks<(TenantId, MaterialId)>,
    shelf_locks: KeyLocks<(TenantId, ShelfId)>,
    bus: B,
}

/// Fully in-memory ledger (tests, dev, reference semantics).
pub type InMemoryStockLedger = StockLedger<
    InMemoryTenantStore<MaterialId, MaterialStockView>,
    InMemoryTenantStore<ShelfId, ShelfContentsView>,
    InMemoryEventBus<EventEnvelope<JsonValue>>,
>;

impl InMemoryStockLedger {
    pub fn in_memory(config: RuntimeConfig) -> Self {
        Self::new(
            config,
            InMemoryTenantStore::new(),
            InMemoryTenantStore::new(),
            InMemoryEventBus::new(),
        )
    }
}

impl<MS, SS, B> StockLedger<MS, SS, B>
where
    MS: TenantStore<MaterialId, MaterialStockView>,
    SS: TenantStore<ShelfId, ShelfContentsView>,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(config: RuntimeConfig, materials: MS, shelves: SS, bus: B) -> Self {
        Self {
            config,
            log: MovementLog::new(),
            materials,
            shelves,
            material_locks: KeyLocks::new(),
            shelf_locks: KeyLocks::new(),
            bus,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Read-side facade over the materialized views.
    pub fn queries(&self) -> crate::queries::LedgerQueries<'_, MS, SS> {
        crate::queries::LedgerQueries::new(&self.materials, &self.shelves)
    }

    /// Apply one movement: lock material (then shelf), update both views
    /// all-or-nothing, append to the log, publish.
    ///
    /// Lock order is always material-then-shelf, so paired acquisitions
    /// cannot deadlock.
    pub fn apply(&self, movement: StockMovement) -> Result<AppliedMovement, LedgerError> {
        let tenant_id = movement.tenant_id();
        let material_id = movement.material_id();
        let timeout = self.config.lock_timeout();

        self.material_locks
            .with_lock(&(tenant_id, material_id), timeout, || -> Result<AppliedMovement, LedgerError> {
                match movement.shelf_id() {
                    Some(shelf_id) => self
                        .shelf_locks
                        .with_lock(&(tenant_id, shelf_id), timeout, || {
                            self.apply_locked(&movement)
                        })
                        .map_err(|source| LedgerError::ContentionTimeout {
                            key: format!("shelf {shelf_id}"),
                            source,
                        })?,
                    None => self.apply_locked(&movement),
                }
            })
            .map_err(|source| LedgerError::ContentionTimeout {
                key: format!("material {material_id}"),
                source,
            })?
    }

    fn apply_locked(&self, movement: &StockMovement) -> Result<AppliedMovement, LedgerError> {
        let tenant_id = movement.tenant_id();
        let material_id = movement.material_id();

        let material = self
            .materials
            .get(tenant_id, &material_id)
            .unwrap_or_else(|| MaterialStockView::new(material_id));
        let shelf = movement.shelf_id().map(|shelf_id| {
            self.shelves
                .get(tenant_id, &shelf_id)
                .unwrap_or_else(|| ShelfContentsView::new(shelf_id))
        });

        // Both sides computed before anything is written.
        let applied = apply_movement(&material, shelf.as_ref(), movement)?;

        let expected = self.log.material_version(tenant_id, material_id);
        let sequence = self
            .log
            .append(movement.clone(), ExpectedVersion::Exact(expected))
            .map_err(|e| LedgerError::Conflict(e.to_string()))?;

        self.materials
            .upsert(tenant_id, material_id, applied.material.clone());
        if let Some(updated_shelf) = &applied.shelf {
            self.shelves
                .upsert(tenant_id, updated_shelf.shelf_id(), updated_shelf.clone());
        }

        if applied.lot_removed {
            tracing::info!(material = %material_id, "lot depleted");
        }
        tracing::debug!(
            material = %material_id,
            direction = ?movement.direction(),
            amount = %movement.amount(),
            sequence,
            "movement applied"
        );

        self.publish(movement, sequence)?;

        Ok(applied)
    }

    fn publish(&self, movement: &StockMovement, sequence: u64) -> Result<(), LedgerError> {
        let payload = serde_json::to_value(movement)
            .map_err(|e| LedgerError::Publish(format!("payload serialization failed: {e}")))?;

        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            movement.tenant_id(),
            movement.material_id().0,
            MATERIAL_STREAM,
            sequence,
            payload,
        );

        self.bus
            .publish(envelope)
            .map_err(|e| LedgerError::Publish(format!("{e:?}")))
    }

    /// Rebuild a material's lot table from the log (recovery procedure).
    ///
    /// Movements that no longer apply cleanly are skipped and reported;
    /// reconciling them is the caller's responsibility.
    pub fn rebuild_material(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
    ) -> Result<Replayed<MaterialStockView>, LedgerError> {
        self.material_locks
            .with_lock(&(tenant_id, material_id), self.config.lock_timeout(), || {
                let movements = self.log.for_material(tenant_id, material_id);
                let replayed = replay_material(material_id, &movements);
                if !replayed.skipped.is_empty() {
                    tracing::warn!(
                        material = %material_id,
                        skipped = replayed.skipped.len(),
                        "replay skipped movements that no longer apply"
                    );
                }
                self.materials
                    .upsert(tenant_id, material_id, replayed.view.clone());
                replayed
            })
            .map_err(|source| LedgerError::ContentionTimeout {
                key: format!("material {material_id}"),
                source,
            })
    }

    /// Rebuild a shelf's contents table from the log.
    pub fn rebuild_shelf(
        &self,
        tenant_id: TenantId,
        shelf_id: ShelfId,
    ) -> Result<Replayed<ShelfContentsView>, LedgerError> {
        self.shelf_locks
            .with_lock(&(tenant_id, shelf_id), self.config.lock_timeout(), || {
                let movements = self.log.for_shelf(tenant_id, shelf_id);
                let replayed = replay_shelf(shelf_id, &movements);
                if !replayed.skipped.is_empty() {
                    tracing::warn!(
                        shelf = %shelf_id,
                        skipped = replayed.skipped.len(),
                        "replay skipped movements that no longer apply"
                    );
                }
                self.shelves
                    .upsert(tenant_id, shelf_id, replayed.view.clone());
                replayed
            })
            .map_err(|source| LedgerError::ContentionTimeout {
                key: format!("shelf {shelf_id}"),
                source,
            })
    }

    /// Cascade from deleting a document line: remove the movements it
    /// originated, then rebuild every material and shelf they touched.
    pub fn remove_line_item_movements(
        &self,
        tenant_id: TenantId,
        line_item_id: LineItemId,
    ) -> Result<Vec<StockMovement>, LedgerError> {
        let removed = self.log.remove_by_line_item(tenant_id, line_item_id);
        if removed.is_empty() {
            return Ok(removed);
        }

        let mut materials: Vec<MaterialId> = removed.iter().map(|m| m.material_id()).collect();
        materials.sort();
        materials.dedup();

        let mut shelves: Vec<ShelfId> = removed.iter().filter_map(|m| m.shelf_id()).collect();
        shelves.sort();
        shelves.dedup();

        for material_id in materials {
            self.rebuild_material(tenant_id, material_id)?;
        }
        for shelf_id in shelves {
            self.rebuild_shelf(tenant_id, shelf_id)?;
        }

        tracing::info!(
            line_item = %line_item_id,
            removed = removed.len(),
            "cascade-removed movements for deleted line item"
        );

        Ok(removed)
    }

    /// Divergence detection for the core consistency contract. Missing views
    /// count as empty.
    pub fn check_agreement(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
        shelf_id: ShelfId,
    ) -> bool {
        let material = self
            .materials
            .get(tenant_id, &material_id)
            .unwrap_or_else(|| MaterialStockView::new(material_id));
        let shelf = self
            .shelves
            .get(tenant_id, &shelf_id)
            .unwrap_or_else(|| ShelfContentsView::new(shelf_id));
        views_agree(&material, &shelf)
    }
}

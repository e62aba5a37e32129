//! Reporting read model fed from published movement envelopes.
//!
//! Downstream consumers (reporting, rendering) do not read the ledger's own
//! views; they subscribe to the bus and build what they need. This
//! projection tallies intake/withdrawal activity per material. Like every
//! read model it is disposable and idempotent: replays at or below the
//! per-stream cursor are ignored, so at-least-once delivery is safe.

use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use ledgerkit_core::TenantId;
use ledgerkit_events::{EventEnvelope, Projection};
use ledgerkit_stock::{Direction, MaterialId, StockMovement};

use crate::tenant_store::TenantStore;

/// Per-material movement activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockActivity {
    pub material_id: MaterialId,
    pub intake_total: Decimal,
    pub withdrawal_total: Decimal,
    pub movement_count: u64,
}

#[derive(Debug, Error)]
pub enum ActivityProjectionError {
    #[error("failed to deserialize movement payload: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
}

/// Movement activity projection.
///
/// Consumes published envelopes (JSON payloads) and maintains a
/// tenant-isolated read model keyed by material.
#[derive(Debug)]
pub struct StockActivityProjection<S>
where
    S: TenantStore<MaterialId, StockActivity>,
{
    store: S,
    /// Last applied sequence number per (tenant, material) stream.
    cursors: RwLock<HashMap<(TenantId, MaterialId), u64>>,
}

impl<S> StockActivityProjection<S>
where
    S: TenantStore<MaterialId, StockActivity>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Query the read model for one tenant/material.
    pub fn get(&self, tenant_id: TenantId, material_id: &MaterialId) -> Option<StockActivity> {
        self.store.get(tenant_id, material_id)
    }

    /// List all activity records for a tenant.
    pub fn list(&self, tenant_id: TenantId) -> Vec<StockActivity> {
        self.store.list(tenant_id)
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Enforces tenant isolation at the payload level
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ActivityProjectionError> {
        let movement: StockMovement = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ActivityProjectionError::Deserialize(e.to_string()))?;

        if movement.tenant_id() != envelope.tenant_id() {
            return Err(ActivityProjectionError::TenantIsolation(
                "movement tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if movement.material_id().0 != envelope.aggregate_id() {
            return Err(ActivityProjectionError::TenantIsolation(
                "movement material_id does not match envelope aggregate_id".to_string(),
            ));
        }

        self.record(envelope.tenant_id(), envelope.sequence_number(), &movement);
        Ok(())
    }

    fn record(&self, tenant_id: TenantId, sequence: u64, movement: &StockMovement) {
        let material_id = movement.material_id();

        if let Ok(mut cursors) = self.cursors.write() {
            let key = (tenant_id, material_id);
            let last = *cursors.get(&key).unwrap_or(&0);

            if sequence <= last {
                // Duplicate or replay; safe to ignore.
                return;
            }

            let mut activity = self
                .store
                .get(tenant_id, &material_id)
                .unwrap_or(StockActivity {
                    material_id,
                    intake_total: Decimal::ZERO,
                    withdrawal_total: Decimal::ZERO,
                    movement_count: 0,
                });

            match movement.direction() {
                Direction::In => activity.intake_total += movement.amount(),
                Direction::Out => activity.withdrawal_total += movement.amount(),
            }
            activity.movement_count += 1;

            self.store.upsert(tenant_id, material_id, activity);
            cursors.insert(key, sequence);
        }
    }
}

impl<S> Projection for StockActivityProjection<S>
where
    S: TenantStore<MaterialId, StockActivity>,
{
    type Ev = StockMovement;

    fn apply(&mut self, envelope: &EventEnvelope<StockMovement>) {
        self.record(
            envelope.tenant_id(),
            envelope.sequence_number(),
            envelope.payload(),
        );
    }
}

//! In-memory document number sequencer.
//!
//! A mutex-guarded counter table keyed `(tenant, type, year)` makes the
//! read-increment one atomic step: N concurrent calls for the same key
//! produce N distinct, contiguous numbers. A durable backend would instead
//! insert under a uniqueness constraint on `(type, number)` and retry on
//! conflict.

use std::collections::HashMap;
use std::sync::Mutex;

use ledgerkit_core::TenantId;
use ledgerkit_documents::{
    DocumentType, NumberSequencer, SequencedNumber, SequencerError, numbering::MAX_SEQUENCE,
};

type CounterKey = (TenantId, DocumentType, i32);

/// Serialized per-`(tenant, type, year)` counter.
#[derive(Debug, Default)]
pub struct InMemorySequencer {
    counters: Mutex<HashMap<CounterKey, u32>>,
}

impl InMemorySequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a counter from the highest persisted number for its key, so the
    /// sequence continues instead of restarting after a boot. Idempotent:
    /// seeding below the current counter is a no-op.
    pub fn seed(&self, tenant_id: TenantId, doc_type: DocumentType, highest: SequencedNumber) {
        if let Ok(mut counters) = self.counters.lock() {
            let entry = counters
                .entry((tenant_id, doc_type, highest.year()))
                .or_insert(0);
            *entry = (*entry).max(highest.sequence());
        }
    }
}

impl NumberSequencer for InMemorySequencer {
    fn next_number(
        &self,
        tenant_id: TenantId,
        doc_type: DocumentType,
        year: i32,
    ) -> Result<SequencedNumber, SequencerError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| SequencerError::Conflict("sequencer lock poisoned".into()))?;

        let entry = counters.entry((tenant_id, doc_type, year)).or_insert(0);
        if *entry >= MAX_SEQUENCE {
            return Err(SequencerError::Exhausted { year });
        }

        *entry += 1;
        SequencedNumber::new(year, *entry)
    }
}

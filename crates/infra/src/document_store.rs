//! Document storage and lifecycle orchestration.
//!
//! Creation assigns a sequenced number (unless a purchase carries an
//! external one), guarded by a uniqueness constraint on `(type, number)`.
//! Deletion cascades: a deleted document soft-deletes its line items, and a
//! deleted line item removes the stock movements it originated.
//!
//! Totals are never stored; every balance read goes through the valuation
//! engine against the current line items and payments.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use ledgerkit_core::{DomainError, Retryable, TenantId};
use ledgerkit_documents::{
    Document, DocumentId, DocumentNumber, DocumentTotals, DocumentType, LineItem, LineItemId,
    NumberSequencer, Payment, PaymentId, SequencerError, TaxByRate, document_totals,
    tax_totals_by_rate,
};
use ledgerkit_events::{EventBus, EventEnvelope};
use ledgerkit_stock::{MaterialId, MaterialStockView, ShelfContentsView, ShelfId};

use crate::config::RuntimeConfig;
use crate::retry::with_retries;
use crate::stock_ledger::{LedgerError, StockLedger};
use crate::tenant_store::TenantStore;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Sequencer(#[from] SequencerError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl Retryable for DocumentError {
    fn is_retryable(&self) -> bool {
        match self {
            DocumentError::Domain(e) => e.is_retryable(),
            DocumentError::Sequencer(e) => e.is_retryable(),
            DocumentError::Ledger(e) => e.is_retryable(),
        }
    }
}

/// Input for document creation. Number assignment happens inside the store.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: DocumentId,
    pub doc_type: DocumentType,
    pub tax_included: bool,
    /// Falls back to the configured default currency.
    pub currency: Option<String>,
    /// Purchase documents may bring their supplier's number and skip
    /// sequencing.
    pub external_number: Option<String>,
    pub source_document: Option<DocumentId>,
    pub created_at: DateTime<Utc>,
}

/// Tenant-scoped document storage with number assignment and cascades.
#[derive(Debug)]
pub struct DocumentStore<N> {
    config: RuntimeConfig,
    sequencer: N,
    documents: RwLock<HashMap<(TenantId, DocumentId), Document>>,
    /// Uniqueness constraint on `(type, number)` per tenant.
    numbers: RwLock<HashSet<(TenantId, DocumentType, String)>>,
}

impl<N> DocumentStore<N>
where
    N: NumberSequencer,
{
    pub fn new(config: RuntimeConfig, sequencer: N) -> Self {
        Self {
            config,
            sequencer,
            documents: RwLock::new(HashMap::new()),
            numbers: RwLock::new(HashSet::new()),
        }
    }

    pub fn sequencer(&self) -> &N {
        &self.sequencer
    }

    /// Create a document, assigning its number.
    ///
    /// Sequenced assignment retries on sequencing conflicts within the
    /// configured budget before surfacing the error.
    pub fn create(&self, tenant_id: TenantId, new: NewDocument) -> Result<Document, DocumentError> {
        let number = match &new.external_number {
            Some(external) => DocumentNumber::External(external.clone()),
            None => {
                let year = new.created_at.year();
                let assigned = with_retries(self.config.retry_budget, || {
                    self.sequencer.next_number(tenant_id, new.doc_type, year)
                })?;
                DocumentNumber::Sequenced(assigned)
            }
        };

        let currency = new
            .currency
            .unwrap_or_else(|| self.config.default_currency.clone());

        let document = Document::new(
            tenant_id,
            new.id,
            new.doc_type,
            number,
            new.tax_included,
            currency,
            new.source_document,
            new.created_at,
        )?;

        let mut documents = self
            .documents
            .write()
            .map_err(|_| DomainError::conflict("document store lock poisoned"))?;
        if documents.contains_key(&(tenant_id, new.id)) {
            return Err(DomainError::conflict("document id already exists").into());
        }

        let number_key = (tenant_id, new.doc_type, document.number().to_string());
        {
            let mut numbers = self
                .numbers
                .write()
                .map_err(|_| DomainError::conflict("number index lock poisoned"))?;
            if !numbers.insert(number_key) {
                return Err(DomainError::conflict(format!(
                    "document number {} already exists for type {}",
                    document.number(),
                    new.doc_type
                ))
                .into());
            }
        }

        documents.insert((tenant_id, new.id), document.clone());

        tracing::debug!(
            document = %new.id,
            doc_type = %new.doc_type,
            number = %document.number(),
            "document created"
        );

        Ok(document)
    }

    pub fn get(&self, tenant_id: TenantId, document_id: DocumentId) -> Option<Document> {
        self.documents
            .read()
            .ok()?
            .get(&(tenant_id, document_id))
            .cloned()
    }

    pub fn add_line_item(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        line_item: LineItem,
    ) -> Result<(), DocumentError> {
        self.update(tenant_id, document_id, |doc| doc.add_line_item(line_item))
    }

    pub fn record_payment(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        payment: Payment,
    ) -> Result<(), DocumentError> {
        self.update(tenant_id, document_id, |doc| doc.add_payment(payment))
    }

    pub fn delete_payment(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        payment_id: PaymentId,
    ) -> Result<(), DocumentError> {
        self.update(tenant_id, document_id, |doc| doc.delete_payment(payment_id))
    }

    /// Soft-delete a line item and cascade-remove the movements it
    /// originated. The ledger rebuilds the affected views; no compensating
    /// movement is generated.
    pub fn delete_line_item<MS, SS, B>(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        line_item_id: LineItemId,
        ledger: &StockLedger<MS, SS, B>,
    ) -> Result<(), DocumentError>
    where
        MS: TenantStore<MaterialId, MaterialStockView>,
        SS: TenantStore<ShelfId, ShelfContentsView>,
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        self.update(tenant_id, document_id, |doc| doc.delete_line_item(line_item_id))?;
        ledger.remove_line_item_movements(tenant_id, line_item_id)?;
        Ok(())
    }

    /// Soft-delete a document; cascades to its line items and their
    /// movements.
    pub fn delete_document<MS, SS, B>(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        ledger: &StockLedger<MS, SS, B>,
    ) -> Result<(), DocumentError>
    where
        MS: TenantStore<MaterialId, MaterialStockView>,
        SS: TenantStore<ShelfId, ShelfContentsView>,
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        let line_items = self.update(tenant_id, document_id, |doc| {
            doc.mark_deleted();
            Ok(doc.line_items().iter().map(|li| li.id()).collect::<Vec<_>>())
        })?;

        for line_item_id in line_items {
            ledger.remove_line_item_movements(tenant_id, line_item_id)?;
        }

        Ok(())
    }

    /// Payment-derived balances, computed fresh from the stored document.
    pub fn totals(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<DocumentTotals, DocumentError> {
        let document = self
            .get(tenant_id, document_id)
            .ok_or(DomainError::NotFound)?;
        Ok(document_totals(&document))
    }

    /// Line tax grouped by rate, computed fresh from the stored document.
    pub fn tax_breakdown(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<TaxByRate>, DocumentError> {
        let document = self
            .get(tenant_id, document_id)
            .ok_or(DomainError::NotFound)?;
        Ok(tax_totals_by_rate(&document))
    }

    fn update<T>(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        f: impl FnOnce(&mut Document) -> Result<T, DomainError>,
    ) -> Result<T, DocumentError> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| DomainError::conflict("document store lock poisoned"))?;
        let document = documents
            .get_mut(&(tenant_id, document_id))
            .ok_or(DomainError::NotFound)?;
        Ok(f(document)?)
    }
}

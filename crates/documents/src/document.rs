use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerkit_core::{AggregateId, DomainError, DomainResult, Entity, Money, TenantId};

use crate::numbering::DocumentNumber;

/// Document identifier (tenant-scoped via `tenant_id` fields on operations).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub AggregateId);

/// Line item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItemId(pub AggregateId);

/// Payment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub AggregateId);

macro_rules! impl_id_newtype {
    ($t:ty) => {
        impl $t {
            pub fn new(id: AggregateId) -> Self {
                Self(id)
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

impl_id_newtype!(DocumentId);
impl_id_newtype!(LineItemId);
impl_id_newtype!(PaymentId);

/// Commercial document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Quote,
    Sale,
    Dispatch,
    Invoice,
    CreditNote,
    DebitNote,
    Purchase,
}

impl DocumentType {
    /// Only purchase documents may carry an externally supplied number and
    /// opt out of sequencing.
    pub fn allows_external_number(&self) -> bool {
        matches!(self, DocumentType::Purchase)
    }

    /// Whether a payment on this document flows outward (a refund) rather
    /// than inward. Credit notes give money back; everything else collects.
    pub fn payment_flows_out(&self) -> bool {
        matches!(self, DocumentType::CreditNote)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Quote => "quote",
            DocumentType::Sale => "sale",
            DocumentType::Dispatch => "dispatch",
            DocumentType::Invoice => "invoice",
            DocumentType::CreditNote => "credit_note",
            DocumentType::DebitNote => "debit_note",
            DocumentType::Purchase => "purchase",
        }
    }
}

impl core::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Cash,
    CreditCard,
    DebitCard,
    BankTransfer,
    Cheque,
    PromissoryNote,
    Financing,
}

/// A priced line on a document.
///
/// Validation happens here, at construction; the valuation engine assumes
/// validated input and never fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    id: LineItemId,
    price: Money,
    amount: Decimal,
    tax_rate: Decimal,
    reduction_percent: Decimal,
    deleted: bool,
}

impl LineItem {
    pub fn new(
        id: LineItemId,
        price: Money,
        amount: Decimal,
        tax_rate: Decimal,
        reduction_percent: Decimal,
    ) -> DomainResult<Self> {
        if price.is_negative() {
            return Err(DomainError::validation("line item price cannot be negative"));
        }
        if amount < Decimal::ONE {
            return Err(DomainError::validation("line item amount must be at least 1"));
        }
        if tax_rate.is_sign_negative() && !tax_rate.is_zero() {
            return Err(DomainError::validation("line item tax rate cannot be negative"));
        }

        Ok(Self {
            id,
            price,
            amount,
            tax_rate,
            reduction_percent,
            deleted: false,
        })
    }

    pub fn id(&self) -> LineItemId {
        self.id
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    pub fn reduction_percent(&self) -> Decimal {
        self.reduction_percent
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}

/// A payment registered against a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    document_id: DocumentId,
    value: Money,
    kind: PaymentKind,
    verified: bool,
    deleted: bool,
    occurred_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        id: PaymentId,
        document_id: DocumentId,
        value: Money,
        kind: PaymentKind,
        verified: bool,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if value.is_negative() {
            return Err(DomainError::validation("payment value cannot be negative"));
        }

        Ok(Self {
            id,
            document_id,
            value,
            kind,
            verified,
            deleted: false,
            occurred_at,
        })
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn value(&self) -> Money {
        self.value
    }

    pub fn kind(&self) -> PaymentKind {
        self.kind
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}

/// Entity: commercial document.
///
/// Documents are soft-deleted; deleting a document cascades the deletion flag
/// onto its line items. Removing the stock movements a line item originated
/// is the storage layer's responsibility (the document does not reach into
/// the ledger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    tenant_id: TenantId,
    doc_type: DocumentType,
    number: DocumentNumber,
    tax_included: bool,
    currency: String,
    line_items: Vec<LineItem>,
    payments: Vec<Payment>,
    deleted: bool,
    /// Conversion chain (quote -> sale -> invoice).
    source_document: Option<DocumentId>,
    created_at: DateTime<Utc>,
}

impl Document {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: TenantId,
        id: DocumentId,
        doc_type: DocumentType,
        number: DocumentNumber,
        tax_included: bool,
        currency: impl Into<String>,
        source_document: Option<DocumentId>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        match &number {
            DocumentNumber::External(n) => {
                if !doc_type.allows_external_number() {
                    return Err(DomainError::validation(format!(
                        "{doc_type} documents cannot carry an external number"
                    )));
                }
                if n.trim().is_empty() {
                    return Err(DomainError::validation("external document number cannot be empty"));
                }
            }
            DocumentNumber::Sequenced(_) => {}
        }

        let currency = currency.into();
        if currency.trim().is_empty() {
            return Err(DomainError::validation("currency cannot be empty"));
        }

        Ok(Self {
            id,
            tenant_id,
            doc_type,
            number,
            tax_included,
            currency,
            line_items: Vec::new(),
            payments: Vec::new(),
            deleted: false,
            source_document,
            created_at,
        })
    }

    pub fn id_typed(&self) -> DocumentId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn doc_type(&self) -> DocumentType {
        self.doc_type
    }

    pub fn number(&self) -> &DocumentNumber {
        &self.number
    }

    pub fn tax_included(&self) -> bool {
        self.tax_included
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn source_document(&self) -> Option<DocumentId> {
        self.source_document
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    /// Line items that still count: not soft-deleted.
    pub fn active_line_items(&self) -> impl Iterator<Item = &LineItem> {
        self.line_items.iter().filter(|li| !li.is_deleted())
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    /// Payments that still count: not soft-deleted.
    pub fn active_payments(&self) -> impl Iterator<Item = &Payment> {
        self.payments.iter().filter(|p| !p.is_deleted())
    }

    pub fn add_line_item(&mut self, line_item: LineItem) -> DomainResult<()> {
        self.ensure_live()?;
        if self.line_items.iter().any(|li| li.id() == line_item.id()) {
            return Err(DomainError::conflict("line item id already present"));
        }
        self.line_items.push(line_item);
        Ok(())
    }

    /// Soft-delete a line item. The caller removes the movements it
    /// originated from the ledger.
    pub fn delete_line_item(&mut self, line_item_id: LineItemId) -> DomainResult<()> {
        let item = self
            .line_items
            .iter_mut()
            .find(|li| li.id() == line_item_id && !li.is_deleted())
            .ok_or(DomainError::NotFound)?;
        item.mark_deleted();
        Ok(())
    }

    pub fn add_payment(&mut self, payment: Payment) -> DomainResult<()> {
        self.ensure_live()?;
        if payment.document_id() != self.id {
            return Err(DomainError::validation("payment targets a different document"));
        }
        if self.payments.iter().any(|p| p.id() == payment.id()) {
            return Err(DomainError::conflict("payment id already present"));
        }
        self.payments.push(payment);
        Ok(())
    }

    pub fn delete_payment(&mut self, payment_id: PaymentId) -> DomainResult<()> {
        let payment = self
            .payments
            .iter_mut()
            .find(|p| p.id() == payment_id && !p.is_deleted())
            .ok_or(DomainError::NotFound)?;
        payment.mark_deleted();
        Ok(())
    }

    /// Soft-delete the document; cascades onto its line items.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        for li in &mut self.line_items {
            li.mark_deleted();
        }
    }

    fn ensure_live(&self) -> DomainResult<()> {
        if self.deleted {
            return Err(DomainError::invariant("document is deleted"));
        }
        Ok(())
    }
}

impl Entity for Document {
    type Id = DocumentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

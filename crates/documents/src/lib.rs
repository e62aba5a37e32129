//! `ledgerkit-documents` — commercial documents and their financial math.
//!
//! A document (quote, sale, invoice, ...) owns its line items and payments.
//! Every financial total is derived fresh from those records by the
//! valuation engine; nothing computed is ever stored as authoritative state.

pub mod document;
pub mod numbering;
pub mod valuation;

pub use document::{
    Document, DocumentId, DocumentType, LineItem, LineItemId, Payment, PaymentId, PaymentKind,
};
pub use numbering::{DocumentNumber, NumberSequencer, SequencedNumber, SequencerError};
pub use valuation::{DocumentTotals, LineTotals, TaxByRate, document_totals, line_totals, tax_totals_by_rate};

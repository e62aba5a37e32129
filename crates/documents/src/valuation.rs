//! Valuation engine: pure, side-effect-free financial math.
//!
//! Every total is derived fresh from line items and payments on each call.
//! Persisted copies of these values, wherever a storage layer keeps them,
//! are caches that must be invalidated whenever a line item or payment
//! changes; they are never authoritative.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerkit_core::{Money, ValueObject};

use crate::document::{Document, LineItem};

/// Residual band within which an outstanding balance snaps to exactly zero,
/// absorbing rounding noise across multi-currency/multi-line computations.
pub fn payment_tolerance() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

/// All derived amounts for a single line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTotals {
    pub without_tax_before_reduction: Money,
    pub with_tax_before_reduction: Money,
    pub without_tax_after_reduction: Money,
    pub with_tax_after_reduction: Money,
    /// `with_tax_after_reduction − without_tax_after_reduction`.
    pub tax: Money,
    /// `without_tax_before_reduction − without_tax_after_reduction`.
    pub reduction: Money,
}

impl ValueObject for LineTotals {}

/// Derived balances for a whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    /// Sum of `with_tax_after_reduction` over non-deleted line items.
    pub total: Money,
    /// Sum of non-deleted payment values.
    pub total_paid: Money,
    /// `total − total_paid`, snapped to zero inside the tolerance band.
    pub total_to_pay: Money,
}

impl ValueObject for DocumentTotals {}

/// Line tax grouped by rate (the tax table on rendered invoices).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxByRate {
    pub rate: Decimal,
    pub tax: Money,
}

/// Compute the derived amounts of one line item.
///
/// `tax_included` is the document's mode: whether the stated price already
/// contains tax. Input is validated at `LineItem` construction, so this
/// function cannot fail.
pub fn line_totals(item: &LineItem, tax_included: bool) -> LineTotals {
    let base = item.price() * item.amount();

    let (without_tax_before_reduction, with_tax_before_reduction) = if tax_included {
        (base.strip_percent(item.tax_rate()), base)
    } else {
        (base, base.plus_percent(item.tax_rate()))
    };

    let without_tax_after_reduction =
        without_tax_before_reduction.less_percent(item.reduction_percent());
    let with_tax_after_reduction = with_tax_before_reduction.less_percent(item.reduction_percent());

    LineTotals {
        without_tax_before_reduction,
        with_tax_before_reduction,
        without_tax_after_reduction,
        with_tax_after_reduction,
        tax: with_tax_after_reduction - without_tax_after_reduction,
        reduction: without_tax_before_reduction - without_tax_after_reduction,
    }
}

/// Compute a document's balances from its line items and payments.
pub fn document_totals(document: &Document) -> DocumentTotals {
    let total: Money = document
        .active_line_items()
        .map(|li| line_totals(li, document.tax_included()).with_tax_after_reduction)
        .sum();

    let total_paid: Money = document.active_payments().map(|p| p.value()).sum();

    let outstanding = total - total_paid;
    let total_to_pay = if outstanding.abs().as_decimal() < payment_tolerance() {
        Money::ZERO
    } else {
        outstanding
    };

    DocumentTotals {
        total,
        total_paid,
        total_to_pay,
    }
}

/// Group line tax by tax rate over non-deleted line items, ascending by rate.
pub fn tax_totals_by_rate(document: &Document) -> Vec<TaxByRate> {
    let mut buckets: Vec<TaxByRate> = Vec::new();

    for li in document.active_line_items() {
        let tax = line_totals(li, document.tax_included()).tax;
        match buckets.iter_mut().find(|b| b.rate == li.tax_rate()) {
            Some(bucket) => bucket.tax += tax,
            None => buckets.push(TaxByRate {
                rate: li.tax_rate(),
                tax,
            }),
        }
    }

    buckets.sort_by(|a, b| a.rate.cmp(&b.rate));
    buckets
}

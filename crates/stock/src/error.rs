use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use ledgerkit_core::Retryable;

use crate::movement::{MaterialId, ShelfId};

/// Stock ledger error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Malformed movement (non-positive amount, mismatched views, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An `out` movement references a `(shelf, expiration)` lot that does
    /// not exist or has insufficient amount. Rejected rather than allowing a
    /// negative lot; the caller must reconcile (e.g. issue a correcting `in`
    /// first).
    #[error(
        "inconsistent withdrawal of {requested} from material {material_id} \
         (shelf: {shelf_id:?}, expiration: {expiration:?}, available: {available})"
    )]
    InconsistentWithdrawal {
        material_id: MaterialId,
        shelf_id: Option<ShelfId>,
        expiration: Option<NaiveDate>,
        requested: Decimal,
        available: Decimal,
    },
}

impl StockError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl Retryable for StockError {
    fn is_retryable(&self) -> bool {
        false
    }
}

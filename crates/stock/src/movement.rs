use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerkit_core::{AggregateId, TenantId};
use ledgerkit_documents::LineItemId;
use ledgerkit_events::Event;

use crate::error::StockError;

/// Material identifier (tenant-scoped via `tenant_id` on movements).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(pub AggregateId);

/// Shelf identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShelfId(pub AggregateId);

/// Movement identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub AggregateId);

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

impl_id_newtype!(MaterialId);
impl_id_newtype!(ShelfId);
impl_id_newtype!(MovementId);

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Signed contribution of `amount` to the stock level.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            Direction::In => amount,
            Direction::Out => -amount,
        }
    }
}

/// An atomic in/out stock event, immutable once created.
///
/// Movements are never mutated. They are deleted only as a cascading side
/// effect of deleting the line item that originated them; that deletion
/// removes the record without generating a compensating movement, so
/// reconciliation stays with the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    id: MovementId,
    tenant_id: TenantId,
    material_id: MaterialId,
    /// Unassigned stock has no shelf.
    shelf_id: Option<ShelfId>,
    direction: Direction,
    amount: Decimal,
    expiration: Option<NaiveDate>,
    occurred_at: DateTime<Utc>,
    /// The document line that caused this movement, if any.
    originating_line_item: Option<LineItemId>,
    note: Option<String>,
}

impl StockMovement {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: MovementId,
        tenant_id: TenantId,
        material_id: MaterialId,
        shelf_id: Option<ShelfId>,
        direction: Direction,
        amount: Decimal,
        expiration: Option<NaiveDate>,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, StockError> {
        if amount <= Decimal::ZERO {
            return Err(StockError::validation("movement amount must be positive"));
        }

        Ok(Self {
            id,
            tenant_id,
            material_id,
            shelf_id,
            direction,
            amount,
            expiration,
            occurred_at,
            originating_line_item: None,
            note: None,
        })
    }

    /// Link the movement to the document line that caused it.
    pub fn with_origin(mut self, line_item_id: LineItemId) -> Self {
        self.originating_line_item = Some(line_item_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn id(&self) -> MovementId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn material_id(&self) -> MaterialId {
        self.material_id
    }

    pub fn shelf_id(&self) -> Option<ShelfId> {
        self.shelf_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn expiration(&self) -> Option<NaiveDate> {
        self.expiration
    }

    pub fn originating_line_item(&self) -> Option<LineItemId> {
        self.originating_line_item
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Signed contribution of this movement to the material's stock level.
    pub fn signed_amount(&self) -> Decimal {
        self.direction.signed(self.amount)
    }
}

impl Event for StockMovement {
    fn event_type(&self) -> &'static str {
        match self.direction {
            Direction::In => "stock.movement.in",
            Direction::Out => "stock.movement.out",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

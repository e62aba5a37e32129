use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// The materialized stock views are the canonical examples: the movement log
/// is authoritative, and any view can be deleted and rebuilt by replaying the
/// log. Projections must therefore be **idempotent** (at-least-once delivery)
/// and **disposable** (a rebuild from scratch yields the same state).
///
/// Persistence of the read model is an infrastructure concern and is not
/// defined here.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    ///
    /// Must be idempotent: applying the same envelope twice yields the same
    /// read model. The envelope carries `tenant_id`; updates must stay scoped
    /// to that tenant.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}

//! The [`ComponentTable`] contract.
//!
//! Queries never see concrete storage. They consume tables through this
//! object-safe trait, which exposes exactly the capabilities a join needs:
//! record iteration, point lookup by entity, and event subscription.

use std::any::Any;

use crate::component::{ComponentId, ComponentRecord, TableId};
use crate::entity::Entity;
use crate::event::{EventSink, ListenerId, TableEvent};

/// A per-component-type store, seen from the query side.
///
/// Records are addressed two ways: by dense index (`record_at`, for full
/// scans in table order) and by owning entity (`component_for_entity`, for
/// point probes during a join). An entity owns at most one component per
/// table.
pub trait ComponentTable {
    /// The identity of this table, used to latch it into query setups and
    /// to key it in a table directory.
    fn table_id(&self) -> TableId;

    /// Number of live records in the table.
    fn record_count(&self) -> usize;

    /// The record at dense index `index`, or `None` past the end.
    ///
    /// Indices are only meaningful for the duration of one scan: removing a
    /// record compacts the table and may move another record into its slot.
    fn record_at(&self, index: usize) -> Option<ComponentRecord>;

    /// The component instance owned by `entity`, if any.
    fn component_for_entity(&self, entity: Entity) -> Option<ComponentId>;

    /// Returns `true` if `entity` owns a component in this table.
    fn has_component(&self, entity: Entity) -> bool {
        self.component_for_entity(entity).is_some()
    }

    /// Remove the component owned by `entity`, if any. Returns `true` when
    /// a record was removed. This is how a table directory cascades entity
    /// destruction without knowing the concrete component type.
    fn remove_entity(&mut self, entity: Entity) -> bool;

    /// Attach a sink that will receive a [`TableEvent`] for every component
    /// created or destroyed in this table.
    fn subscribe(&mut self, sink: EventSink<TableEvent>) -> ListenerId;

    /// Detach a previously attached sink.
    fn unsubscribe(&mut self, id: ListenerId) -> bool;

    /// Upcast for typed access through a table directory.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed access through a table directory.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

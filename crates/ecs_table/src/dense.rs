//! Dense component storage.
//!
//! [`DenseTable`] keeps records in a contiguous vector for fast scans, with
//! two side maps for point lookups: entity → row and component id → row.
//! Removal swap-compacts the vector, so scan order is insertion order only
//! until the first removal. Component ids stay stable across compaction.

use std::collections::HashMap;

use ecs_component::{
    Component, ComponentId, ComponentRecord, ComponentTable, Entity, EventSink, ListenerId,
    ListenerSet, TableEvent, TableId,
};

use crate::error::WorldError;

/// One stored component and its bookkeeping.
#[derive(Debug)]
struct Record<T> {
    id: ComponentId,
    entity: Entity,
    revision: u32,
    value: T,
}

/// Dense storage for components of a single type.
///
/// An entity owns at most one component per table. Inserting for an entity
/// that already has one overwrites the value in place, bumping the record's
/// revision counter while keeping its [`ComponentId`].
#[derive(Debug)]
pub struct DenseTable<T: Component> {
    records: Vec<Record<T>>,
    by_entity: HashMap<Entity, usize>,
    by_id: HashMap<ComponentId, usize>,
    next_id: u64,
    listeners: ListenerSet<TableEvent>,
}

impl<T: Component> DenseTable<T> {
    /// Create a new empty table. Ids start at 1 (0 is the absent sentinel).
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            by_entity: HashMap::new(),
            by_id: HashMap::new(),
            next_id: 1,
            listeners: ListenerSet::new(),
        }
    }

    /// Insert a component for `entity`, or overwrite the existing one.
    ///
    /// A fresh insert allocates a new [`ComponentId`] and notifies
    /// listeners. An overwrite keeps the id, bumps the revision, and does
    /// not notify — the set of (entity, component) pairs is unchanged.
    pub fn insert(&mut self, entity: Entity, value: T) -> ComponentId {
        if let Some(&row) = self.by_entity.get(&entity) {
            let record = &mut self.records[row];
            record.value = value;
            record.revision += 1;
            return record.id;
        }

        let id = ComponentId::from_raw(self.next_id);
        self.next_id += 1;

        let row = self.records.len();
        self.records.push(Record {
            id,
            entity,
            revision: 0,
            value,
        });
        self.by_entity.insert(entity, row);
        self.by_id.insert(id, row);

        self.listeners.publish(TableEvent::ComponentCreated {
            table: T::table_id(),
            component: id,
            entity,
        });
        id
    }

    /// Remove the component owned by `entity`, returning its value.
    ///
    /// The last record is swapped into the vacated row; side maps are
    /// re-pointed accordingly.
    pub fn remove(&mut self, entity: Entity) -> Result<T, WorldError> {
        let row = self
            .by_entity
            .remove(&entity)
            .ok_or(WorldError::ComponentNotFound(entity))?;

        let record = self.records.swap_remove(row);
        self.by_id.remove(&record.id);

        if row < self.records.len() {
            let moved = &self.records[row];
            self.by_entity.insert(moved.entity, row);
            self.by_id.insert(moved.id, row);
        }

        self.listeners.publish(TableEvent::ComponentDestroyed {
            table: T::table_id(),
            component: record.id,
            entity,
        });
        Ok(record.value)
    }

    /// The component value owned by `entity`.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&T> {
        let &row = self.by_entity.get(&entity)?;
        Some(&self.records[row].value)
    }

    /// Mutable access to the component owned by `entity`.
    ///
    /// Bumps the record's revision: handing out `&mut` counts as a write.
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        let &row = self.by_entity.get(&entity)?;
        let record = &mut self.records[row];
        record.revision += 1;
        Some(&mut record.value)
    }

    /// The component value behind a stable id.
    #[must_use]
    pub fn get_by_id(&self, id: ComponentId) -> Option<&T> {
        let &row = self.by_id.get(&id)?;
        Some(&self.records[row].value)
    }

    /// The revision counter of the component owned by `entity`.
    #[must_use]
    pub fn revision(&self, entity: Entity) -> Option<u32> {
        let &row = self.by_entity.get(&entity)?;
        Some(self.records[row].revision)
    }

    /// Number of stored components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the table stores no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T: Component> Default for DenseTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> ComponentTable for DenseTable<T> {
    fn table_id(&self) -> TableId {
        T::table_id()
    }

    fn record_count(&self) -> usize {
        self.records.len()
    }

    fn record_at(&self, index: usize) -> Option<ComponentRecord> {
        let record = self.records.get(index)?;
        Some(ComponentRecord {
            id: record.id,
            entity: record.entity,
            revision: record.revision,
        })
    }

    fn component_for_entity(&self, entity: Entity) -> Option<ComponentId> {
        let &row = self.by_entity.get(&entity)?;
        Some(self.records[row].id)
    }

    fn remove_entity(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_ok()
    }

    fn subscribe(&mut self, sink: EventSink<TableEvent>) -> ListenerId {
        self.listeners.attach(sink)
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.detach(id)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

//! The table directory.
//!
//! [`World`] owns the entity manager and one boxed table per registered
//! component type, keyed by [`TableId`]. Queries resolve their latched
//! table ids against it at call time; callers reach typed storage through
//! the downcast accessors.

use std::collections::HashMap;

use ecs_component::{Component, ComponentId, ComponentTable, Entity, TableId};
use tracing::{info, warn};

use crate::dense::DenseTable;
use crate::entities::EntityManager;
use crate::error::WorldError;

/// Entity manager plus registered component tables.
#[derive(Default)]
pub struct World {
    entities: EntityManager,
    tables: HashMap<TableId, Box<dyn ComponentTable>>,
}

impl World {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: EntityManager::new(),
            tables: HashMap::new(),
        }
    }

    /// Returns the entity manager.
    #[must_use]
    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    /// Returns the entity manager mutably.
    pub fn entities_mut(&mut self) -> &mut EntityManager {
        &mut self.entities
    }

    /// Register a [`DenseTable`] for component type `T` and return its id.
    ///
    /// Re-registering a type replaces the existing table and drops its
    /// contents; queries latched onto the id keep working against the
    /// replacement.
    pub fn register<T: Component>(&mut self) -> TableId {
        let id = T::table_id();
        let previous = self
            .tables
            .insert(id, Box::new(DenseTable::<T>::new()));
        if previous.is_some() {
            warn!(table = T::type_name(), "replaced existing table");
        } else {
            info!(table = T::type_name(), "registered table");
        }
        id
    }

    /// Typed access to the table for component type `T`.
    #[must_use]
    pub fn table<T: Component>(&self) -> Option<&DenseTable<T>> {
        self.tables
            .get(&T::table_id())?
            .as_any()
            .downcast_ref::<DenseTable<T>>()
    }

    /// Typed mutable access to the table for component type `T`.
    pub fn table_mut<T: Component>(&mut self) -> Option<&mut DenseTable<T>> {
        self.tables
            .get_mut(&T::table_id())?
            .as_any_mut()
            .downcast_mut::<DenseTable<T>>()
    }

    /// Dynamic access to a table by id.
    #[must_use]
    pub fn table_dyn(&self, id: TableId) -> Option<&dyn ComponentTable> {
        self.tables.get(&id).map(|table| table.as_ref())
    }

    /// Dynamic mutable access to a table by id.
    pub fn table_dyn_mut(&mut self, id: TableId) -> Option<&mut (dyn ComponentTable + 'static)> {
        self.tables.get_mut(&id).map(|table| table.as_mut())
    }

    /// Insert a component for an allocated entity.
    pub fn insert_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<ComponentId, WorldError> {
        if !self.entities.contains(entity) {
            return Err(WorldError::EntityNotFound(entity));
        }
        let table = self
            .table_mut::<T>()
            .ok_or(WorldError::UnknownTable(T::table_id()))?;
        Ok(table.insert(entity, value))
    }

    /// Remove the `T` component from an entity, returning its value.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<T, WorldError> {
        let table = self
            .table_mut::<T>()
            .ok_or(WorldError::UnknownTable(T::table_id()))?;
        table.remove(entity)
    }

    /// The `T` component owned by an entity, if any.
    #[must_use]
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.table::<T>()?.get(entity)
    }

    /// Destroy an entity and remove its components from every table.
    pub fn despawn(&mut self, entity: Entity) -> Result<(), WorldError> {
        self.entities.despawn(entity)?;
        for table in self.tables.values_mut() {
            table.remove_entity(entity);
        }
        Ok(())
    }

    /// Number of registered tables.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

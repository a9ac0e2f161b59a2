//! Entity lifecycle and liveness.
//!
//! The [`EntityManager`] allocates entity ids, tracks activation state, and
//! publishes batched lifecycle events. An entity is *alive* when it is
//! allocated and active; deactivated entities keep their components but are
//! invisible to joins until re-activated.

use std::collections::HashMap;

use ecs_component::{Entity, EntityEvent, EventSink, ListenerId, ListenerSet};
use tracing::debug;

use crate::error::WorldError;

/// Activation state of an allocated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Active,
    Inactive,
}

/// Allocates entities and tracks which of them are alive.
#[derive(Debug)]
pub struct EntityManager {
    next_id: u64,
    states: HashMap<Entity, Activation>,
    listeners: ListenerSet<EntityEvent>,
}

impl EntityManager {
    /// Create a new manager. Ids start at 1 (0 is [`Entity::INVALID`]).
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            states: HashMap::new(),
            listeners: ListenerSet::new(),
        }
    }

    /// Allocate one active entity.
    pub fn spawn(&mut self) -> Entity {
        let batch = self.spawn_batch(1);
        batch[0]
    }

    /// Allocate `count` active entities, publishing one activation batch.
    pub fn spawn_batch(&mut self, count: usize) -> Vec<Entity> {
        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            let entity = Entity::from_raw(self.next_id);
            self.next_id += 1;
            self.states.insert(entity, Activation::Active);
            batch.push(entity);
        }
        debug!(count, "spawned entities");
        self.listeners.publish(EntityEvent::Activated(batch.clone()));
        batch
    }

    /// Destroy one entity.
    pub fn despawn(&mut self, entity: Entity) -> Result<(), WorldError> {
        if self.states.remove(&entity).is_none() {
            return Err(WorldError::EntityNotFound(entity));
        }
        self.listeners.publish(EntityEvent::Destroyed(vec![entity]));
        Ok(())
    }

    /// Destroy several entities, publishing one destruction batch.
    ///
    /// Unknown entities are skipped; returns how many were destroyed.
    pub fn despawn_batch(&mut self, entities: &[Entity]) -> usize {
        let destroyed: Vec<Entity> = entities
            .iter()
            .copied()
            .filter(|e| self.states.remove(e).is_some())
            .collect();
        let count = destroyed.len();
        if count > 0 {
            self.listeners.publish(EntityEvent::Destroyed(destroyed));
        }
        count
    }

    /// Activate or deactivate an entity. No event is published when the
    /// state does not change.
    pub fn set_active(&mut self, entity: Entity, active: bool) -> Result<(), WorldError> {
        let state = self
            .states
            .get_mut(&entity)
            .ok_or(WorldError::EntityNotFound(entity))?;
        let target = if active {
            Activation::Active
        } else {
            Activation::Inactive
        };
        if *state == target {
            return Ok(());
        }
        *state = target;

        let event = if active {
            EntityEvent::Activated(vec![entity])
        } else {
            EntityEvent::Deactivated(vec![entity])
        };
        self.listeners.publish(event);
        Ok(())
    }

    /// Returns `true` if the entity is allocated and active.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.states.get(&entity) == Some(&Activation::Active)
    }

    /// Returns `true` if the entity is allocated, active or not.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.states.contains_key(&entity)
    }

    /// Number of allocated entities, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` if no entities are allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Attach a sink for lifecycle event batches.
    pub fn subscribe(&mut self, sink: EventSink<EntityEvent>) -> ListenerId {
        self.listeners.attach(sink)
    }

    /// Detach a previously attached sink.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.detach(id)
    }
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_is_alive() {
        let mut entities = EntityManager::new();
        let e = entities.spawn();
        assert!(e.is_valid());
        assert!(entities.is_alive(e));
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn test_despawn_removes() {
        let mut entities = EntityManager::new();
        let e = entities.spawn();
        entities.despawn(e).unwrap();
        assert!(!entities.is_alive(e));
        assert!(!entities.contains(e));
        assert!(matches!(
            entities.despawn(e),
            Err(WorldError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_deactivated_is_not_alive_but_allocated() {
        let mut entities = EntityManager::new();
        let e = entities.spawn();
        entities.set_active(e, false).unwrap();
        assert!(!entities.is_alive(e));
        assert!(entities.contains(e));

        entities.set_active(e, true).unwrap();
        assert!(entities.is_alive(e));
    }

    #[test]
    fn test_lifecycle_events_are_batched() {
        let mut entities = EntityManager::new();
        let (tx, rx) = flume::unbounded();
        entities.subscribe(tx);

        let batch = entities.spawn_batch(3);
        assert_eq!(rx.try_recv().unwrap(), EntityEvent::Activated(batch.clone()));

        entities.despawn_batch(&batch[..2]);
        assert_eq!(
            rx.try_recv().unwrap(),
            EntityEvent::Destroyed(batch[..2].to_vec())
        );
    }

    #[test]
    fn test_redundant_set_active_publishes_nothing() {
        let mut entities = EntityManager::new();
        let e = entities.spawn();

        let (tx, rx) = flume::unbounded();
        entities.subscribe(tx);
        entities.set_active(e, true).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_despawn_batch_skips_unknown() {
        let mut entities = EntityManager::new();
        let e = entities.spawn();
        let ghost = Entity::from_raw(99);
        assert_eq!(entities.despawn_batch(&[e, ghost]), 1);
    }
}

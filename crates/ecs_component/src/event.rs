//! Change notifications from tables and the entity manager.
//!
//! Invalidation is modelled as message passing rather than virtual
//! callbacks: a subscriber hands the publisher a channel sender
//! ([`EventSink`]) and drains the receiving end whenever it is convenient.
//! Publishing is a non-blocking `send` — nothing heavier can happen from a
//! mutation call site.
//!
//! Unsubscription is disconnection: when the subscriber drops its receiver,
//! the next publish to that sink fails and the [`ListenerSet`] prunes it.

use tracing::{debug, trace};
use uuid::Uuid;

use crate::component::{ComponentId, TableId};
use crate::entity::Entity;

/// The sending half of a subscription channel.
pub type EventSink<E> = flume::Sender<E>;

/// Identity of one attached listener, for logging and explicit detachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub Uuid);

impl ListenerId {
    /// Generate a fresh listener id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A change notification from one component table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEvent {
    /// A component instance was created.
    ComponentCreated {
        /// The table that grew.
        table: TableId,
        /// The instance that was created.
        component: ComponentId,
        /// The entity that now owns it.
        entity: Entity,
    },
    /// A component instance was destroyed.
    ComponentDestroyed {
        /// The table that shrank.
        table: TableId,
        /// The instance that was destroyed.
        component: ComponentId,
        /// The entity that owned it.
        entity: Entity,
    },
}

/// A lifecycle notification from the entity manager.
///
/// Lifecycle changes are delivered as batches: one event may carry several
/// entities when the mutation site changed several at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityEvent {
    /// Entities became active (spawned, or re-activated).
    Activated(Vec<Entity>),
    /// Entities were deactivated but remain allocated.
    Deactivated(Vec<Entity>),
    /// Entities were destroyed.
    Destroyed(Vec<Entity>),
}

/// The publisher side of a subscription: a set of attached sinks.
///
/// Tables and the entity manager each embed one of these. `publish` clones
/// the event into every attached sink and drops sinks whose receiver has
/// disconnected.
#[derive(Debug)]
pub struct ListenerSet<E: Clone> {
    sinks: Vec<(ListenerId, EventSink<E>)>,
}

impl<E: Clone> Default for ListenerSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> ListenerSet<E> {
    /// Create an empty listener set.
    #[must_use]
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Attach a sink. Returns the id under which it was registered.
    pub fn attach(&mut self, sink: EventSink<E>) -> ListenerId {
        let id = ListenerId::generate();
        self.sinks.push((id, sink));
        debug!(listener = %id.0, listeners = self.sinks.len(), "listener attached");
        id
    }

    /// Detach a sink by id. Returns `true` if it was present.
    pub fn detach(&mut self, id: ListenerId) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|(sink_id, _)| *sink_id != id);
        self.sinks.len() != before
    }

    /// Deliver an event to every attached sink.
    ///
    /// Sinks whose receiver has been dropped are removed; that is the
    /// normal end of a subscription, not an error.
    pub fn publish(&mut self, event: E) {
        self.sinks.retain(|(id, sink)| {
            let delivered = sink.send(event.clone()).is_ok();
            if !delivered {
                trace!(listener = %id.0, "listener disconnected, pruning");
            }
            delivered
        });
    }

    /// Number of currently attached sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns `true` if no sinks are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_all_sinks() {
        let mut set = ListenerSet::new();
        let (tx1, rx1) = flume::unbounded();
        let (tx2, rx2) = flume::unbounded();
        set.attach(tx1);
        set.attach(tx2);

        set.publish(EntityEvent::Destroyed(vec![Entity::from_raw(1)]));

        assert_eq!(rx1.try_recv().unwrap(), EntityEvent::Destroyed(vec![Entity::from_raw(1)]));
        assert_eq!(rx2.try_recv().unwrap(), EntityEvent::Destroyed(vec![Entity::from_raw(1)]));
    }

    #[test]
    fn test_disconnected_sink_is_pruned() {
        let mut set = ListenerSet::new();
        let (tx, rx) = flume::unbounded::<EntityEvent>();
        set.attach(tx);
        assert_eq!(set.len(), 1);

        drop(rx);
        set.publish(EntityEvent::Activated(vec![Entity::from_raw(2)]));
        assert!(set.is_empty());
    }

    #[test]
    fn test_detach_by_id() {
        let mut set = ListenerSet::new();
        let (tx, _rx) = flume::unbounded::<EntityEvent>();
        let id = set.attach(tx);

        assert!(set.detach(id));
        assert!(set.is_empty());
        assert!(!set.detach(id));
    }
}

//! Cached multi-table component queries.
//!
//! A [`CachedQuery`] materializes a join across component tables, keyed by
//! entity identity: one row per live base-table entity that has a component
//! in every required table. The result is cached behind a validity flag;
//! change notifications from the participating tables and the entity
//! manager flip the flag, and [`CachedQuery::execute`] only re-joins when
//! it is down. For unchanged frames this turns an
//! O(tables × entities) join into O(1).
//!
//! Invalidation arrives over channels and is drained at the top of
//! `execute` — mutation call sites only ever perform a non-blocking send,
//! so a notification can never re-enter the join.

use std::collections::HashMap;

use ecs_component::{ComponentId, Entity, EntityEvent, ListenerId, TableEvent, TableId};
use ecs_table::World;
use tracing::{debug, trace, warn};

use crate::descriptor::{JoinMethod, QueryDescriptor};
use crate::row::ResultRow;

/// The receiving half of the invalidation subscriptions, plus the
/// registration ids needed to detach them eagerly.
#[derive(Debug)]
struct Inbox {
    table_events: flume::Receiver<TableEvent>,
    entity_events: flume::Receiver<EntityEvent>,
    table_regs: Vec<(TableId, ListenerId)>,
    entity_reg: ListenerId,
}

/// Where the query sits in the listener lifecycle.
#[derive(Debug)]
enum ListenerState {
    /// Automatic invalidation is off; every execute re-joins.
    Disabled,
    /// Invalidation is wanted but nothing is subscribed (no tables latched
    /// yet, or subscriptions were just torn down by a re-setup).
    Armed,
    /// Sinks are attached to every latched table and the entity manager.
    Registered(Inbox),
}

/// A configured query with a cached, lazily rebuilt result.
///
/// Lifecycle: configure with [`setup`](CachedQuery::setup), call
/// [`execute`](CachedQuery::execute) every frame, read
/// [`rows`](CachedQuery::rows) or probe [`find`](CachedQuery::find).
/// Dropping the query drops its event receivers; publishers prune the dead
/// subscriptions on their next event.
///
/// Result order is base-table scan order. A re-join after invalidation may
/// reorder rows relative to the previous result if the base table
/// compacted in between.
#[derive(Debug)]
pub struct CachedQuery {
    /// Participating tables; index 0 is the base table.
    tables: Vec<TableId>,
    /// Join methods, parallel to `tables`; `methods[0]` is always `Require`.
    methods: Vec<JoinMethod>,
    rows: Vec<ResultRow>,
    lookup: Option<HashMap<Entity, usize>>,
    valid: bool,
    listeners: ListenerState,
}

impl CachedQuery {
    /// Create an unconfigured query with automatic invalidation enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            methods: Vec::new(),
            rows: Vec::new(),
            lookup: None,
            valid: false,
            listeners: ListenerState::Armed,
        }
    }

    /// Configure (or reconfigure) the query.
    ///
    /// Clears any cached result, tears down previous subscriptions, latches
    /// the descriptor's table set, and — when automatic invalidation is
    /// enabled — subscribes against the new tables. Safe to call any number
    /// of times; no subscription to a previously latched table survives.
    pub fn setup(&mut self, world: &mut World, descriptor: QueryDescriptor) {
        self.detach(world);

        self.rows = Vec::new();
        self.valid = false;

        self.tables = Vec::with_capacity(descriptor.table_count());
        self.methods = Vec::with_capacity(descriptor.table_count());
        self.tables.push(descriptor.base);
        self.methods.push(JoinMethod::Require);
        for op in &descriptor.operations {
            self.tables.push(op.table);
            self.methods.push(op.method);
        }
        self.lookup = descriptor.lookup.then(HashMap::new);

        if matches!(self.listeners, ListenerState::Armed) {
            self.attach(world);
        }

        debug!(
            tables = self.tables.len(),
            lookup = self.lookup.is_some(),
            listening = matches!(self.listeners, ListenerState::Registered(_)),
            "query configured"
        );
    }

    /// Turn automatic invalidation on or off.
    ///
    /// Off: subscriptions are removed and every `execute` re-joins. On:
    /// subscriptions are attached to the latched table set (if one exists)
    /// and the cached result is considered unknown until the next
    /// `execute`, since changes during the unsubscribed window went
    /// unobserved.
    pub fn set_listening(&mut self, world: &mut World, enable: bool) {
        if enable {
            if !matches!(self.listeners, ListenerState::Registered(_)) {
                self.listeners = ListenerState::Armed;
                if !self.tables.is_empty() {
                    self.attach(world);
                }
            }
        } else {
            self.detach(world);
            self.listeners = ListenerState::Disabled;
        }
    }

    /// Returns `true` if the cached result reflects every observed change.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The current result rows, in base-table scan order.
    #[must_use]
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Re-join if anything relevant changed.
    ///
    /// Returns `true` when a re-join happened (the result may differ from
    /// the previous one), `false` on a cache hit or when the query is not
    /// configured. A missing base table also returns `false`, leaving the
    /// previous result in place — a query against an unregistered table is
    /// tolerated, not a panic.
    pub fn execute(&mut self, world: &World) -> bool {
        self.drain_events(world);

        if self.valid && matches!(self.listeners, ListenerState::Registered(_)) {
            trace!("query cache hit");
            return false;
        }
        if self.tables.is_empty() {
            return false;
        }
        let Some(base) = world.table_dyn(self.tables[0]) else {
            warn!(table = ?self.tables[0], "base table missing, keeping previous result");
            return false;
        };

        let mut rows: Vec<ResultRow> = Vec::with_capacity(base.record_count());
        let mut lookup = self
            .lookup
            .as_ref()
            .map(|_| HashMap::with_capacity(base.record_count()));

        'records: for index in 0..base.record_count() {
            let Some(record) = base.record_at(index) else {
                break;
            };
            if !world.entities().is_alive(record.entity) {
                continue;
            }

            let mut components = Vec::with_capacity(self.tables.len());
            components.push(record.id);

            for (table, method) in self.tables.iter().zip(&self.methods).skip(1) {
                let id = world
                    .table_dyn(*table)
                    .and_then(|t| t.component_for_entity(record.entity));
                match (id, method) {
                    (Some(id), _) => components.push(id),
                    (None, JoinMethod::Require) => continue 'records,
                    (None, JoinMethod::Optional) => components.push(ComponentId::INVALID),
                }
            }

            if let Some(map) = lookup.as_mut() {
                map.insert(record.entity, rows.len());
            }
            rows.push(ResultRow {
                entity: record.entity,
                components,
            });
        }

        debug!(
            rows = rows.len(),
            tables = self.tables.len(),
            "query re-joined"
        );
        self.rows = rows;
        self.lookup = lookup;
        self.valid = true;
        true
    }

    /// Point lookup: the result row for `entity`, if the lookup index was
    /// requested at setup and the entity is alive and present in the
    /// current result.
    ///
    /// The returned reference is valid until the next `execute` that
    /// re-joins.
    #[must_use]
    pub fn find(&self, world: &World, entity: Entity) -> Option<&ResultRow> {
        if !world.entities().is_alive(entity) {
            return None;
        }
        let &row = self.lookup.as_ref()?.get(&entity)?;
        let found = self.rows.get(row)?;
        debug_assert_eq!(found.entity, entity);
        Some(found)
    }

    /// Drain pending change notifications, updating the validity flag and
    /// pruning the lookup index for destroyed entities.
    fn drain_events(&mut self, world: &World) {
        let ListenerState::Registered(inbox) = &self.listeners else {
            return;
        };
        let table_events = inbox.table_events.clone();
        let entity_events = inbox.entity_events.clone();

        while let Ok(event) = table_events.try_recv() {
            if !self.valid {
                continue;
            }
            let table = match event {
                TableEvent::ComponentCreated { table, .. }
                | TableEvent::ComponentDestroyed { table, .. } => table,
            };
            debug!(?table, "tracked table changed, invalidating");
            self.valid = false;
        }

        while let Ok(event) = entity_events.try_recv() {
            match event {
                EntityEvent::Activated(batch) | EntityEvent::Deactivated(batch) => {
                    if self.valid && self.batch_matches_required(world, &batch) {
                        debug!("entity activation change hit required tables, invalidating");
                        self.valid = false;
                    }
                }
                EntityEvent::Destroyed(batch) => {
                    if let Some(map) = self.lookup.as_mut() {
                        for entity in &batch {
                            map.remove(entity);
                        }
                    }
                    if self.valid {
                        debug!(count = batch.len(), "entities destroyed, invalidating");
                        self.valid = false;
                    }
                }
            }
        }
    }

    /// Returns `true` if some entity in the batch has a component in every
    /// required table — i.e. its activation change can affect the result.
    fn batch_matches_required(&self, world: &World, batch: &[Entity]) -> bool {
        batch.iter().any(|&entity| {
            self.tables
                .iter()
                .zip(&self.methods)
                .filter(|(_, method)| **method == JoinMethod::Require)
                .all(|(table, _)| {
                    world
                        .table_dyn(*table)
                        .is_some_and(|t| t.has_component(entity))
                })
        })
    }

    /// Subscribe to every latched table and the entity manager.
    fn attach(&mut self, world: &mut World) {
        let (table_tx, table_rx) = flume::unbounded();
        let (entity_tx, entity_rx) = flume::unbounded();

        let mut table_regs = Vec::with_capacity(self.tables.len());
        for &table_id in &self.tables {
            match world.table_dyn_mut(table_id) {
                Some(table) => table_regs.push((table_id, table.subscribe(table_tx.clone()))),
                None => warn!(?table_id, "cannot subscribe to unregistered table"),
            }
        }
        let entity_reg = world.entities_mut().subscribe(entity_tx);

        // Whatever happened while unsubscribed went unobserved.
        self.valid = false;
        self.listeners = ListenerState::Registered(Inbox {
            table_events: table_rx,
            entity_events: entity_rx,
            table_regs,
            entity_reg,
        });
    }

    /// Remove active subscriptions, keeping the enabled/disabled intent.
    fn detach(&mut self, world: &mut World) {
        let state = std::mem::replace(&mut self.listeners, ListenerState::Disabled);
        match state {
            ListenerState::Registered(inbox) => {
                for (table_id, listener) in inbox.table_regs {
                    if let Some(table) = world.table_dyn_mut(table_id) {
                        table.unsubscribe(listener);
                    }
                }
                world.entities_mut().unsubscribe(inbox.entity_reg);
                self.listeners = ListenerState::Armed;
                debug!("query listeners detached");
            }
            other => self.listeners = other,
        }
    }
}

impl Default for CachedQuery {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use ecs_component::Component;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[derive(Debug, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    #[derive(Debug, PartialEq)]
    struct Label;

    impl Component for Label {
        fn type_name() -> &'static str {
            "Label"
        }
    }

    #[derive(Debug, PartialEq)]
    struct Health {
        current: f32,
    }

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    fn pos(x: f32) -> Position {
        Position { x, y: 0.0 }
    }

    fn vel() -> Velocity {
        Velocity { dx: 1.0, dy: 0.0 }
    }

    /// Three entities: all have Position; e1 and e3 have Velocity; e1 has
    /// a Label.
    fn fixture() -> (World, [Entity; 3]) {
        let mut world = World::new();
        world.register::<Position>();
        world.register::<Velocity>();
        world.register::<Label>();

        let spawned = world.entities_mut().spawn_batch(3);
        let [e1, e2, e3] = [spawned[0], spawned[1], spawned[2]];

        world.insert_component(e1, pos(1.0)).unwrap();
        world.insert_component(e2, pos(2.0)).unwrap();
        world.insert_component(e3, pos(3.0)).unwrap();
        world.insert_component(e1, vel()).unwrap();
        world.insert_component(e3, vel()).unwrap();
        world.insert_component(e1, Label).unwrap();

        (world, [e1, e2, e3])
    }

    fn standard_query(world: &mut World) -> CachedQuery {
        let mut query = CachedQuery::new();
        query.setup(
            world,
            QueryDescriptor::new(Position::table_id())
                .require(Velocity::table_id())
                .optional(Label::table_id())
                .with_lookup(),
        );
        query
    }

    fn row_entities(query: &CachedQuery) -> Vec<Entity> {
        query.rows().iter().map(|row| row.entity).collect()
    }

    #[test]
    fn test_join_rejects_entities_missing_required_components() {
        let (mut world, [e1, _e2, e3]) = fixture();
        let mut query = standard_query(&mut world);

        assert!(query.execute(&world));
        assert_eq!(row_entities(&query), vec![e1, e3]);
    }

    #[test]
    fn test_optional_miss_recorded_as_invalid_sentinel() {
        let (mut world, [e1, _e2, e3]) = fixture();
        let mut query = standard_query(&mut world);
        query.execute(&world);

        let row1 = query.find(&world, e1).unwrap();
        assert!(row1.component(0).is_valid());
        assert!(row1.component(1).is_valid());
        assert!(row1.component(2).is_valid());

        let row3 = query.find(&world, e3).unwrap();
        assert!(row3.component(1).is_valid());
        assert_eq!(row3.component(2), ComponentId::INVALID);
    }

    #[test]
    fn test_base_only_query_yields_all_live_base_entities() {
        let (mut world, [e1, e2, e3]) = fixture();
        let mut query = CachedQuery::new();
        query.setup(&mut world, QueryDescriptor::new(Position::table_id()));

        assert!(query.execute(&world));
        assert_eq!(row_entities(&query), vec![e1, e2, e3]);
    }

    #[test]
    fn test_execute_unconfigured_is_noop() {
        let world = World::new();
        let mut query = CachedQuery::new();
        assert!(!query.execute(&world));
        assert!(query.rows().is_empty());
    }

    #[test]
    fn test_missing_base_table_is_tolerated() {
        let (mut world, _) = fixture();
        let mut query = standard_query(&mut world);
        query.execute(&world);

        query.setup(
            &mut world,
            QueryDescriptor::new(TableId::from_name("NoSuchTable")),
        );
        assert!(!query.execute(&world));
        assert!(query.rows().is_empty());
    }

    #[test]
    fn test_cache_hit_returns_false_and_preserves_rows() {
        let (mut world, _) = fixture();
        let mut query = standard_query(&mut world);

        assert!(query.execute(&world));
        let first = row_entities(&query);
        assert!(query.is_valid());

        assert!(!query.execute(&world));
        assert_eq!(row_entities(&query), first);
    }

    #[test]
    fn test_listening_disabled_always_rejoins() {
        let (mut world, _) = fixture();
        let mut query = standard_query(&mut world);
        query.set_listening(&mut world, false);

        assert!(query.execute(&world));
        assert!(query.execute(&world));
    }

    #[test]
    fn test_removing_required_component_drops_row() {
        let (mut world, [e1, _e2, e3]) = fixture();
        let mut query = standard_query(&mut world);
        query.execute(&world);

        world.remove_component::<Velocity>(e1).unwrap();
        assert!(query.execute(&world));
        assert_eq!(row_entities(&query), vec![e3]);
    }

    #[test]
    fn test_adding_required_component_inserts_row() {
        let (mut world, [e1, e2, e3]) = fixture();
        let mut query = standard_query(&mut world);
        query.execute(&world);

        world.insert_component(e2, vel()).unwrap();
        assert!(query.execute(&world));
        assert_eq!(row_entities(&query), vec![e1, e2, e3]);
    }

    #[test]
    fn test_optional_table_change_also_invalidates() {
        let (mut world, [_e1, _e2, e3]) = fixture();
        let mut query = standard_query(&mut world);
        query.execute(&world);

        // Coarse invalidation: any tracked table counts, optional included.
        world.insert_component(e3, Label).unwrap();
        assert!(query.execute(&world));
        assert!(query.find(&world, e3).unwrap().component(2).is_valid());
    }

    #[test]
    fn test_untracked_table_does_not_invalidate() {
        let (mut world, [e1, _e2, _e3]) = fixture();
        world.register::<Health>();
        let mut query = standard_query(&mut world);
        query.execute(&world);

        world.insert_component(e1, Health { current: 10.0 }).unwrap();
        assert!(!query.execute(&world));
    }

    #[test]
    fn test_deactivation_of_matching_entity_invalidates() {
        let (mut world, [e1, _e2, e3]) = fixture();
        let mut query = standard_query(&mut world);
        query.execute(&world);

        world.entities_mut().set_active(e1, false).unwrap();
        assert!(query.execute(&world));
        assert_eq!(row_entities(&query), vec![e3]);

        world.entities_mut().set_active(e1, true).unwrap();
        assert!(query.execute(&world));
        assert_eq!(row_entities(&query), vec![e1, e3]);
    }

    #[test]
    fn test_deactivation_of_nonmatching_entity_is_filtered_out() {
        let (mut world, [_e1, e2, _e3]) = fixture();
        let mut query = standard_query(&mut world);
        query.execute(&world);

        // e2 has no Velocity, so it cannot be in the result; its
        // activation change must not cost a re-join.
        world.entities_mut().set_active(e2, false).unwrap();
        assert!(!query.execute(&world));
    }

    #[test]
    fn test_destroy_entity_invalidates_without_component_event() {
        let (mut world, [e1, _e2, e3]) = fixture();
        let mut query = standard_query(&mut world);
        query.execute(&world);

        // Destroy the entity only — components stay behind in their
        // tables, so no table event fires. One observed variant keeps the
        // cache valid here and waits for the component-destroyed cascade;
        // this implementation invalidates on the destruction itself and
        // prunes the lookup index.
        world.entities_mut().despawn(e1).unwrap();

        assert!(query.find(&world, e1).is_none());
        assert!(query.execute(&world));
        assert_eq!(row_entities(&query), vec![e3]);
    }

    #[test]
    fn test_find_is_none_for_destroyed_entity_before_execute() {
        let (mut world, [e1, _e2, _e3]) = fixture();
        let mut query = standard_query(&mut world);
        query.execute(&world);
        assert!(query.find(&world, e1).is_some());

        world.entities_mut().despawn(e1).unwrap();
        // No execute in between: the liveness guard already hides the
        // stale row.
        assert!(query.find(&world, e1).is_none());
    }

    #[test]
    fn test_find_consistency_with_rows() {
        let (mut world, [_e1, e2, _e3]) = fixture();
        let mut query = standard_query(&mut world);
        query.execute(&world);

        for row in query.rows() {
            let found = query.find(&world, row.entity).unwrap();
            assert_eq!(found.entity, row.entity);
        }
        assert!(query.find(&world, e2).is_none());
        assert!(query.find(&world, Entity::from_raw(999)).is_none());
    }

    #[test]
    fn test_find_without_lookup_returns_none() {
        let (mut world, [e1, _e2, _e3]) = fixture();
        let mut query = CachedQuery::new();
        query.setup(
            &mut world,
            QueryDescriptor::new(Position::table_id()).require(Velocity::table_id()),
        );
        query.execute(&world);

        assert!(!query.rows().is_empty());
        assert!(query.find(&world, e1).is_none());
    }

    #[test]
    fn test_resetup_detaches_previous_tables() {
        let (mut world, [e1, e2, _e3]) = fixture();
        world.register::<Health>();
        let mut query = standard_query(&mut world);
        query.execute(&world);

        // Re-point the query at a disjoint table set.
        query.setup(&mut world, QueryDescriptor::new(Health::table_id()));
        query.execute(&world);

        // Mutating the previously tracked tables must no longer reach the
        // query: the next execute is a cache hit.
        world.insert_component(e2, Label).unwrap();
        world.remove_component::<Velocity>(e1).unwrap();
        assert!(!query.execute(&world));
    }

    #[test]
    fn test_enabling_listeners_discards_unobserved_state() {
        let (mut world, [_e1, e2, _e3]) = fixture();
        let mut query = standard_query(&mut world);
        query.set_listening(&mut world, false);
        query.execute(&world);

        // Mutate while unsubscribed, then re-enable: the first execute
        // must re-join because the window went unobserved.
        world.insert_component(e2, vel()).unwrap();
        query.set_listening(&mut world, true);
        assert!(query.execute(&world));
        assert_eq!(row_entities(&query).len(), 3);
        assert!(!query.execute(&world));
    }

    #[test]
    fn test_methods_zero_is_always_require() {
        let (mut world, _) = fixture();
        let mut query = CachedQuery::new();
        query.setup(
            &mut world,
            QueryDescriptor::new(Position::table_id()).optional(Label::table_id()),
        );
        assert_eq!(query.methods[0], JoinMethod::Require);
        assert_eq!(query.methods[1], JoinMethod::Optional);
    }

    #[test]
    fn test_overwrite_does_not_invalidate() {
        let (mut world, [e1, _e2, _e3]) = fixture();
        let mut query = standard_query(&mut world);
        query.execute(&world);

        // Overwriting a component keeps the (entity, id) set unchanged, so
        // no event fires and the cache holds.
        world.insert_component(e1, pos(42.0)).unwrap();
        assert!(!query.execute(&world));
    }
}

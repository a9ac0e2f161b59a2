//! # ecs_app — query demo
//!
//! A miniature fixed-tick simulation around one cached query. Most ticks
//! nothing changes and `execute` is a cache hit; a few scripted mutations
//! (component removal, deactivation, destruction) show the cache dropping
//! and the join re-running.
//!
//! Run with `RUST_LOG=ecs_app=debug` to see per-tick cache behavior.

use anyhow::Result;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use ecs_component::{Component, Entity};
use ecs_query::{CachedQuery, QueryDescriptor};
use ecs_table::World;

#[derive(Debug)]
struct Position {
    x: f32,
    y: f32,
}

impl Component for Position {
    fn type_name() -> &'static str {
        "Position"
    }
}

#[derive(Debug)]
struct Velocity {
    dx: f32,
    dy: f32,
}

impl Component for Velocity {
    fn type_name() -> &'static str {
        "Velocity"
    }
}

#[derive(Debug)]
struct Label(String);

impl Component for Label {
    fn type_name() -> &'static str {
        "Label"
    }
}

fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ecs_app=info".parse()?))
        .init();

    info!("query demo starting");

    let mut world = World::new();
    world.register::<Position>();
    world.register::<Velocity>();
    world.register::<Label>();

    let fleet = spawn_fleet(&mut world)?;
    for &entity in &fleet {
        if let Some(Label(name)) = world.get_component::<Label>(entity) {
            info!(entity = %entity, name = name.as_str(), "labelled ship");
        }
    }

    let mut movement = CachedQuery::new();
    movement.setup(
        &mut world,
        QueryDescriptor::new(Position::table_id())
            .require(Velocity::table_id())
            .optional(Label::table_id())
            .with_lookup(),
    );

    let dt = 1.0 / 60.0;
    for tick in 1..=10u64 {
        match tick {
            4 => {
                world.remove_component::<Velocity>(fleet[0])?;
                info!(tick, entity = %fleet[0], "removed required component");
            }
            6 => {
                world.entities_mut().set_active(fleet[1], false)?;
                info!(tick, entity = %fleet[1], "deactivated entity");
            }
            8 => {
                world.despawn(fleet[2])?;
                info!(tick, entity = %fleet[2], "destroyed entity");
            }
            _ => {}
        }

        let rejoined = movement.execute(&world);
        run_movement(&mut world, &movement, dt);

        debug!(
            tick,
            rejoined,
            rows = movement.rows().len(),
            "tick complete"
        );
    }

    info!(rows = movement.rows().len(), "query demo shut down");
    Ok(())
}

/// Spawn five entities: all positioned, four moving, two labelled.
fn spawn_fleet(world: &mut World) -> Result<Vec<Entity>> {
    let fleet = world.entities_mut().spawn_batch(5);
    for (i, &entity) in fleet.iter().enumerate() {
        world.insert_component(
            entity,
            Position {
                x: i as f32,
                y: 0.0,
            },
        )?;
        if i < 4 {
            world.insert_component(entity, Velocity { dx: 1.0, dy: 0.5 })?;
        }
        if i % 2 == 0 {
            world.insert_component(entity, Label(format!("ship-{i}")))?;
        }
    }
    Ok(fleet)
}

/// Integrate positions for every matched row.
///
/// Writes go through `get_mut`, which bumps revisions but publishes no
/// events — the next tick stays a cache hit.
fn run_movement(world: &mut World, movement: &CachedQuery, dt: f32) {
    let steps: Vec<(Entity, f32, f32)> = {
        let Some(velocities) = world.table::<Velocity>() else {
            return;
        };
        movement
            .rows()
            .iter()
            .filter_map(|row| {
                let v = velocities.get_by_id(row.component(1))?;
                Some((row.entity, v.dx * dt, v.dy * dt))
            })
            .collect()
    };

    let Some(positions) = world.table_mut::<Position>() else {
        return;
    };
    for (entity, dx, dy) in steps {
        if let Some(p) = positions.get_mut(entity) {
            p.x += dx;
            p.y += dy;
        }
    }
}

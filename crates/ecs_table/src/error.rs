//! Storage-layer error types.

use ecs_component::{Entity, TableId};

/// Errors that can occur while mutating entities, components, or the
/// table directory.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The entity is not allocated in the entity manager.
    #[error("entity {0} not found")]
    EntityNotFound(Entity),

    /// The entity owns no component in the addressed table.
    #[error("no component for entity {0}")]
    ComponentNotFound(Entity),

    /// No table is registered under the given id.
    #[error("unknown table {0:?}")]
    UnknownTable(TableId),
}

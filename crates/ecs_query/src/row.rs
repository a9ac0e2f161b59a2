//! Query result rows.

use ecs_component::{ComponentId, Entity};

/// One output record of a join: an entity plus one component id per
/// participating table.
///
/// `components[i]` corresponds to the i-th table of the query setup, with
/// column 0 being the base table. A column holds [`ComponentId::INVALID`]
/// only when the table was joined optionally and the entity has no
/// component there.
///
/// Rows deliberately do not implement `Clone`: they own their column array,
/// and result buffers are replaced wholesale on re-join rather than copied.
#[derive(Debug, PartialEq, Eq)]
pub struct ResultRow {
    /// The matched entity.
    pub entity: Entity,
    /// Component ids, parallel to the query's table list.
    pub components: Vec<ComponentId>,
}

impl ResultRow {
    /// The component id in the given column, or the invalid sentinel when
    /// the column index is out of range.
    #[must_use]
    pub fn component(&self, column: usize) -> ComponentId {
        self.components
            .get(column)
            .copied()
            .unwrap_or(ComponentId::INVALID)
    }

    /// Number of columns (participating tables).
    #[must_use]
    pub fn width(&self) -> usize {
        self.components.len()
    }
}

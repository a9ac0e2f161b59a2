//! Query descriptors.
//!
//! A [`QueryDescriptor`] declares which tables a query joins and how: one
//! base table that drives iteration, plus any number of joined tables that
//! are either required (non-matching entities are rejected) or optional
//! (absence is recorded, not rejected).

use ecs_component::TableId;
use serde::{Deserialize, Serialize};

/// How a joined table participates in the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinMethod {
    /// Entities without a component in this table are rejected.
    Require,
    /// Entities without a component in this table still match; the result
    /// column carries the invalid-id sentinel.
    Optional,
}

/// One joined table and its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOp {
    /// The table to probe.
    pub table: TableId,
    /// Whether a miss rejects the entity.
    pub method: JoinMethod,
}

/// Describes a query: base table, join operations, and whether to maintain
/// an entity → row lookup index alongside the result.
///
/// The base table is always an implicit [`JoinMethod::Require`] participant
/// at column 0. Operations keep their declaration order; result columns
/// 1..N mirror it.
///
/// # Examples
///
/// ```rust
/// use ecs_component::TableId;
/// use ecs_query::QueryDescriptor;
///
/// let query = QueryDescriptor::new(TableId::from_name("Position"))
///     .require(TableId::from_name("Velocity"))
///     .optional(TableId::from_name("Label"))
///     .with_lookup();
/// assert_eq!(query.table_count(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// The table driving join iteration.
    pub base: TableId,
    /// Joined tables in declaration order.
    pub operations: Vec<QueryOp>,
    /// Whether to maintain the entity → row lookup index.
    pub lookup: bool,
}

impl QueryDescriptor {
    /// Create a descriptor over a base table with no joined tables.
    #[must_use]
    pub fn new(base: TableId) -> Self {
        Self {
            base,
            operations: Vec::new(),
            lookup: false,
        }
    }

    /// Add a required joined table.
    #[must_use]
    pub fn require(mut self, table: TableId) -> Self {
        self.operations.push(QueryOp {
            table,
            method: JoinMethod::Require,
        });
        self
    }

    /// Add an optional joined table.
    #[must_use]
    pub fn optional(mut self, table: TableId) -> Self {
        self.operations.push(QueryOp {
            table,
            method: JoinMethod::Optional,
        });
        self
    }

    /// Maintain an entity → row lookup index alongside the result.
    #[must_use]
    pub fn with_lookup(mut self) -> Self {
        self.lookup = true;
        self
    }

    /// Total number of participating tables, base included.
    #[must_use]
    pub fn table_count(&self) -> usize {
        1 + self.operations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_order() {
        let a = TableId::from_name("A");
        let b = TableId::from_name("B");
        let c = TableId::from_name("C");

        let query = QueryDescriptor::new(a).require(b).optional(c);
        assert_eq!(query.base, a);
        assert_eq!(
            query.operations,
            vec![
                QueryOp {
                    table: b,
                    method: JoinMethod::Require
                },
                QueryOp {
                    table: c,
                    method: JoinMethod::Optional
                },
            ]
        );
        assert_eq!(query.table_count(), 3);
    }

    #[test]
    fn test_base_only_descriptor() {
        let query = QueryDescriptor::new(TableId::from_name("A"));
        assert!(query.operations.is_empty());
        assert!(!query.lookup);
        assert_eq!(query.table_count(), 1);
    }

    #[test]
    fn test_with_lookup() {
        let query = QueryDescriptor::new(TableId::from_name("A")).with_lookup();
        assert!(query.lookup);
    }
}

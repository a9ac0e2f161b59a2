//! # ecs_query
//!
//! Cached component queries: a join-and-cache layer between per-type
//! component tables and the systems that iterate entities with a specific
//! component combination.
//!
//! This crate provides:
//!
//! - [`QueryDescriptor`] — which tables to join, and how (require /
//!   optional).
//! - [`CachedQuery`] — the join engine with a validity cache, event-driven
//!   invalidation, and an optional entity → row lookup index.
//! - [`ResultRow`] — one entity plus one component id per joined table.

pub mod descriptor;
pub mod query;
pub mod row;

pub use descriptor::{JoinMethod, QueryDescriptor, QueryOp};
pub use query::CachedQuery;
pub use row::ResultRow;

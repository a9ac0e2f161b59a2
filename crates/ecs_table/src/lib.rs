//! # ecs_table
//!
//! Concrete collaborators for the query engine: component storage, entity
//! lifecycle, and the directory that holds them together.
//!
//! This crate provides:
//!
//! - [`DenseTable`] — dense per-type component storage with stable ids.
//! - [`EntityManager`] — entity allocation, activation, and liveness.
//! - [`World`] — the table directory queries resolve against.
//! - [`WorldError`] — storage-layer error taxonomy.

pub mod dense;
pub mod entities;
pub mod error;
pub mod world;

pub use dense::DenseTable;
pub use entities::EntityManager;
pub use error::WorldError;
pub use world::World;

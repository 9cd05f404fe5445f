//! Outpost Storage - Postgres persistence layer
//!
//! Models, repositories, and the shared connection pool for the
//! campaign store, delivery ledger, and webhook audit tables.

pub mod db;
pub mod models;
pub mod repository;

pub use db::{Database, DatabasePool};
pub use models::*;
pub use repository::*;

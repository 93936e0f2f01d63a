//! Persistence for monitored services.
//!
//! The monitor only talks to [`store::ServiceStore`]. Two implementations ship with the crate:
//!
//! - [`postgres::PostgresStore`]: the production store, backed by sqlx and the crate's migrations
//! - [`memory::InMemoryStore`]: a lock-protected in-process store used by tests
//!
//! # Modules
//!
//! - [`errors`]: Database-specific error types
//! - [`models`]: Records matching the table schemas

pub mod errors;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

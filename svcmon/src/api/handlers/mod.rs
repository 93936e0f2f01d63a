//! Axum route handlers.

pub mod health;
pub mod services;
pub mod trigger;

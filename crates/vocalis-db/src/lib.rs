//! Vocalis Credit Ledger Database Layer
//!
//! This crate provides PostgreSQL access and repository implementations
//! for the billing engine. It includes:
//!
//! - Connection pool management with sqlx
//! - Repository implementations for all domain entities
//! - Single-statement conditional balance mutations; the database, not the
//!   application process, is the serialization point

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use sqlx::{PgPool, Postgres, Transaction};
pub use vocalis_core::{AppError, AppResult};

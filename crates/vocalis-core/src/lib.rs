//! Vocalis Credit Ledger Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Vocalis billing engine. It includes:
//!
//! - Domain models (Wallet, LedgerTransaction, CreditReservation, etc.)
//! - Common traits for repositories and external collaborators
//! - Unified error handling for transient system faults
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

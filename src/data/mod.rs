//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Usage counters, business profiles, generation records, drafts

mod database;
mod models;

pub use database::{Database, UsageCounter};
pub use models::*;

#[cfg(test)]
mod database_test;

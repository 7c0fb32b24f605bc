//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite object store

mod database;
mod models;

pub use database::Database;
pub use models::*;

//! Data ingestion and storage
//!
//! Cleaning of raw match rows and SQLite database management.

pub mod cleaning;
pub mod database;

pub use cleaning::{clean_matches, CleaningSummary, RawMatch};
pub use database::{Database, DatabaseStats};

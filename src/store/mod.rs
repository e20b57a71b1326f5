//! In-memory document store for the AuthBox server
//!
//! This module provides schemaless, per-collection locked storage
//! with atomic consume-once semantics for one-time tokens.

pub mod document;
pub mod collection;
pub mod database;

pub use document::{Document, object, get_str, get_i64, get_bool};
pub use collection::Collection;
pub use database::Database;

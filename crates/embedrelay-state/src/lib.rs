//! Pipeline state persistence for embedrelay.
//!
//! Provides the [`StateStore`] trait and a [`SqliteStateStore`]
//! implementation for the scanner checkpoint, vector-metadata audit
//! records, and dead-letter failure records.

#![warn(clippy::pedantic)]

pub mod error;
pub mod sqlite;
pub mod store;

pub use error::StateError;
pub use sqlite::SqliteStateStore;
pub use store::StateStore;

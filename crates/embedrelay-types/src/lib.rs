//! Shared embedrelay data model and error model types.
//!
//! Pure data types used across the scanner, delivery worker, state store,
//! and task queue. This crate has no I/O; it exists so the storage and
//! engine crates can share wire/storage types without circular
//! dependencies.

pub mod artifact;
pub mod checkpoint;
pub mod document;
pub mod error;
pub mod id;
pub mod record;
pub mod task;

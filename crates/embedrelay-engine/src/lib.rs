//! Checkpointed ingestion engine for embedrelay.
//!
//! Hosts the periodic artifact scanner, the concurrent delivery worker,
//! the request-signing trust bridge, the dead-letter handler, and the
//! status resolver, wired over the state-store and task-queue crates.

#![warn(clippy::pedantic)]

pub mod artifact_store;
pub mod config;
pub mod dead_letter;
pub mod error;
pub mod runtime;
pub mod scanner;
pub mod signer;
pub mod sink;
pub mod status;
pub mod validate;
pub mod worker;

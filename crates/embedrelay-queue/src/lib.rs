//! Durable task queue for embedrelay.
//!
//! Provides the [`TaskQueue`] trait (at-least-once delivery with
//! visibility-timeout redelivery and a dead-letter channel) and a
//! [`SqliteTaskQueue`] implementation backing local operation and tests.

#![warn(clippy::pedantic)]

pub mod error;
pub mod queue;
pub mod sqlite;

pub use error::QueueError;
pub use queue::{Delivery, TaskQueue};
pub use sqlite::SqliteTaskQueue;

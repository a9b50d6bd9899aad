//! Task queue trait definition.
//!
//! The pipeline consumes exactly this contract: at-least-once delivery,
//! visibility-timeout redelivery of unacknowledged messages, and movement
//! to a dead-letter channel once delivery attempts are exhausted.

use embedrelay_types::task::ProcessingTask;

use crate::error;

/// One physical delivery of a task.
///
/// `attempt` counts this delivery inclusive; `first_received_at` /
/// `last_received_at` are ISO-8601 receive times the dead-letter handler
/// mines for failure bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Opaque per-message handle for `ack` / `fail`.
    pub delivery_id: i64,
    pub task: ProcessingTask,
    pub attempt: u32,
    pub first_received_at: Option<String>,
    pub last_received_at: Option<String>,
}

/// At-least-once delivery channel contract.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn TaskQueue>`.
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`](crate::error::QueueError) on storage failure.
    fn enqueue(&self, task: &ProcessingTask) -> error::Result<()>;

    /// Receive up to `max_items` visible deliveries.
    ///
    /// Received messages become invisible for the queue's visibility
    /// timeout; a message whose attempts are already exhausted moves to
    /// the dead-letter channel instead of being returned.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`](crate::error::QueueError) on storage failure.
    fn receive(&self, max_items: usize) -> error::Result<Vec<Delivery>>;

    /// Acknowledge a delivery, removing the message permanently.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`](crate::error::QueueError) on storage failure.
    fn ack(&self, delivery: &Delivery) -> error::Result<()>;

    /// Negatively acknowledge a delivery, making it redeliverable after
    /// `retry_delay` (pass `Duration::ZERO` for immediate redelivery).
    /// A delivery whose attempts are exhausted moves to the dead-letter
    /// channel instead.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`](crate::error::QueueError) on storage failure.
    fn fail(&self, delivery: &Delivery, retry_delay: std::time::Duration) -> error::Result<()>;

    /// Receive up to `max_items` deliveries from the dead-letter channel.
    ///
    /// Dead-lettered deliveries are not subject to visibility timeouts;
    /// the dead-letter handler acks them after persisting failure records.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`](crate::error::QueueError) on storage failure.
    fn receive_dead_letters(&self, max_items: usize) -> error::Result<Vec<Delivery>>;
}

//! Task queue for asynchronous delivery.
//!
//! ## Architecture
//!
//! ```text
//! POST /broadcasts → delivery_tasks queue → Dispatcher → POST /mailworker
//! ```
//!
//! Delivery is at-least-once: a task may reach its target more than once.

pub mod memory;
pub mod publisher;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryQueue;
pub use publisher::Publisher;
pub use types::{DeliveryTask, BROADCAST_KEY_PARAM, DELIVERY_QUEUE, MAIL_WORKER_PATH};

/// Errors raised while enqueueing a task.
#[derive(Debug, Error)]
#[error("task enqueue failed: {0}")]
pub struct QueueError(pub String);

/// Accepts tasks for asynchronous, at-least-once execution.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: &DeliveryTask) -> Result<(), QueueError>;
}

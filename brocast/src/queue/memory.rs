//! In-process task queue that only records what was enqueued.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::{DeliveryTask, QueueError, TaskQueue};

/// Records tasks instead of dispatching them.
#[derive(Default)]
pub struct MemoryQueue {
    tasks: Mutex<Vec<DeliveryTask>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks enqueued so far, in order.
    pub async fn tasks(&self) -> Vec<DeliveryTask> {
        self.tasks.lock().await.clone()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, task: &DeliveryTask) -> Result<(), QueueError> {
        info!(task_id = %task.task_id(), "memory_task_recorded");
        self.tasks.lock().await.push(task.clone());
        Ok(())
    }
}

//! Async RabbitMQ publisher for delivery tasks.
//!
//! The publisher is shared across request handlers and keeps one connection
//! and channel open, reconnecting when the channel drops.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::types::{DeliveryTask, DELIVERY_QUEUE};
use super::{QueueError, TaskQueue};

/// Publishes delivery tasks over a lazily opened, shared link.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    url: String,
    link: Mutex<Option<Link>>,
}

/// One connection and its confirm-mode channel.
struct Link {
    connection: Connection,
    channel: Channel,
}

impl Link {
    async fn open(url: &str) -> Result<Self> {
        info!("rabbitmq_publisher_connecting");

        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        let channel = connection
            .create_channel()
            .await
            .context("Failed to create channel")?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .context("Failed to enable publisher confirms")?;

        declare_delivery_queue(&channel).await?;

        info!("rabbitmq_publisher_connected");
        Ok(Self {
            connection,
            channel,
        })
    }

    fn is_usable(&self) -> bool {
        self.channel.status().connected()
    }
}

/// Declare the durable delivery queue. Idempotent.
pub async fn declare_delivery_queue(channel: &Channel) -> Result<()> {
    channel
        .queue_declare(
            DELIVERY_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare delivery queue")?;

    info!(queue = DELIVERY_QUEUE, "rabbitmq_queue_declared");
    Ok(())
}

impl Publisher {
    /// Create a new publisher for the given RabbitMQ URL. Connects lazily.
    pub fn new(url: String) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                url,
                link: Mutex::new(None),
            }),
        }
    }

    /// Channel of the current link, opening a new link if there is none or
    /// the old one dropped. Callers queue on the lock while a link opens.
    async fn channel(&self) -> Result<Channel> {
        let mut link = self.inner.link.lock().await;

        if let Some(current) = link.as_ref() {
            if current.is_usable() {
                return Ok(current.channel.clone());
            }
            warn!("rabbitmq_publisher_link_lost");
        }

        let fresh = Link::open(&self.inner.url).await?;
        let channel = fresh.channel.clone();
        *link = Some(fresh);
        Ok(channel)
    }

    /// Publish a task to the delivery queue and wait for the broker confirm.
    pub async fn publish_task(&self, task: &DeliveryTask) -> Result<()> {
        let channel = self.channel().await?;

        let body = serde_json::to_vec(task).context("Failed to serialize task")?;
        let task_id = task.task_id();

        let confirm = channel
            .basic_publish(
                "",
                DELIVERY_QUEUE,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into())
                    .with_message_id(task_id.clone().into()),
            )
            .await
            .context("Failed to publish to delivery queue")?
            .await
            .context("Failed to confirm publish")?;

        if confirm.is_nack() {
            anyhow::bail!("Broker rejected task {}", task_id);
        }

        info!(
            queue = DELIVERY_QUEUE,
            task_id = %task_id,
            body_length = body.len(),
            "rabbitmq_task_published"
        );

        Ok(())
    }

    /// Close the link if one is open.
    pub async fn close(&self) {
        let Some(Link {
            connection,
            channel,
        }) = self.inner.link.lock().await.take()
        else {
            return;
        };

        if let Err(e) = channel.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_channel_close_error");
        }
        if let Err(e) = connection.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_connection_close_error");
        }

        info!("rabbitmq_publisher_closed");
    }
}

#[async_trait]
impl TaskQueue for Publisher {
    async fn enqueue(&self, task: &DeliveryTask) -> Result<(), QueueError> {
        // `{:#}` keeps the whole anyhow context chain in one line
        self.publish_task(task)
            .await
            .map_err(|e| QueueError(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordKey;

    fn unused_local_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        format!("amqp://127.0.0.1:{}/%2f", port)
    }

    #[test]
    fn test_publisher_clones_share_link() {
        let publisher = Publisher::new("amqp://localhost:5672".to_string());
        let clone = publisher.clone();
        assert!(Arc::ptr_eq(&publisher.inner, &clone.inner));
    }

    #[tokio::test]
    async fn test_enqueue_without_broker_reports_connect_failure() {
        let publisher = Publisher::new(unused_local_url());
        let task = DeliveryTask::mail(&RecordKey::new(1));

        let err = publisher.enqueue(&task).await.unwrap_err();

        assert!(err.0.starts_with("Failed to connect to RabbitMQ"));
        assert!(publisher.inner.link.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_close_without_link_is_noop() {
        let publisher = Publisher::new(unused_local_url());
        publisher.close().await;
        assert!(publisher.inner.link.lock().await.is_none());
    }
}

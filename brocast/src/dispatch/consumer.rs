//! RabbitMQ consumer for the delivery queue.
//!
//! Each message is a JSON [`DeliveryTask`]. The consumer spawns a task per
//! message, invokes the target endpoint and then:
//! - acks on 2xx
//! - nacks without requeue on 4xx or an unparseable message
//! - nacks with requeue on 5xx or a transport error

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::FieldTable,
    Channel, Connection, ConnectionProperties,
};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::invoker::{InvokeOutcome, Invoker};
use crate::queue::publisher::declare_delivery_queue;
use crate::queue::{DeliveryTask, DELIVERY_QUEUE};
use crate::shutdown::shutdown_signal;
use crate::Config;

/// Run the dispatcher until the queue closes or a shutdown signal arrives.
///
/// This function:
/// 1. Connects to RabbitMQ using the configured URL
/// 2. Sets QoS so at most `dispatch_concurrency` tasks are in flight
/// 3. Declares the delivery queue (idempotent operation)
/// 4. Starts consuming messages, spawning a task for each
/// 5. On SIGINT/SIGTERM stops consuming, waits for in-flight tasks to settle,
///    then closes the connection
pub async fn run(config: Config) -> Result<()> {
    info!(url_length = config.amqp_url.len(), "rabbitmq_connecting");

    let conn = Connection::connect(&config.amqp_url, ConnectionProperties::default())
        .await
        .context("Failed to connect to RabbitMQ")?;

    info!("rabbitmq_connected");

    let channel = conn
        .create_channel()
        .await
        .context("Failed to create channel")?;

    let prefetch_count = u16::try_from(config.dispatch_concurrency).unwrap_or(u16::MAX);
    channel
        .basic_qos(prefetch_count, BasicQosOptions::default())
        .await
        .context("Failed to set QoS")?;

    info!(prefetch_count = prefetch_count, "rabbitmq_qos_set");

    declare_delivery_queue(&channel).await?;

    let invoker = Invoker::new(
        &config.worker_base_url,
        config.task_signing_key.clone(),
        Duration::from_millis(config.request_timeout_ms),
    )?;
    let invoker = Arc::new(invoker);

    let mut consumer = channel
        .basic_consume(
            DELIVERY_QUEUE,
            "brocast-dispatcher",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("Failed to start consumer")?;

    info!(
        queue = DELIVERY_QUEUE,
        worker_base_url = %config.worker_base_url,
        signing_enabled = config.task_signing_key.is_some(),
        "dispatcher_ready"
    );

    let channel = Arc::new(channel);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("dispatcher_stopping");
                break;
            }
            delivery = consumer.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        while in_flight.try_join_next().is_some() {}

                        let delivery_tag = delivery.delivery_tag;
                        let invoker = Arc::clone(&invoker);
                        let channel = Arc::clone(&channel);

                        in_flight.spawn(async move {
                            let outcome = match serde_json::from_slice::<DeliveryTask>(&delivery.data) {
                                Ok(task) => {
                                    info!(
                                        queue = DELIVERY_QUEUE,
                                        task_id = %task.task_id(),
                                        delivery_tag = delivery_tag,
                                        redelivered = delivery.redelivered,
                                        "rabbitmq_task_received"
                                    );
                                    invoker.invoke(&task).await
                                }
                                Err(e) => {
                                    error!(
                                        delivery_tag = delivery_tag,
                                        error = %e,
                                        body_preview = %String::from_utf8_lossy(
                                            &delivery.data[..delivery.data.len().min(500)]
                                        ),
                                        "rabbitmq_task_parse_failed"
                                    );
                                    InvokeOutcome::Malformed
                                }
                            };

                            settle(&channel, delivery_tag, outcome).await;
                        });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "rabbitmq_delivery_error");
                    }
                    None => {
                        warn!("rabbitmq_consumer_closed");
                        break;
                    }
                }
            }
        }
    }

    info!(in_flight = in_flight.len(), "dispatcher_draining");
    let drained = drain(&mut in_flight).await;
    info!(drained = drained, "dispatcher_drained");

    if let Err(e) = conn.close(200, "Normal shutdown").await {
        warn!(error = %e, "rabbitmq_connection_close_error");
    }

    info!("dispatcher_shutdown_complete");
    Ok(())
}

/// Ack or nack a delivery according to the invocation outcome.
async fn settle(channel: &Channel, delivery_tag: u64, outcome: InvokeOutcome) {
    let result = match &outcome {
        InvokeOutcome::Completed => {
            channel
                .basic_ack(delivery_tag, BasicAckOptions::default())
                .await
        }
        InvokeOutcome::Rejected(_) | InvokeOutcome::Malformed | InvokeOutcome::Retry(_) => {
            channel
                .basic_nack(
                    delivery_tag,
                    BasicNackOptions {
                        requeue: requeue_for(&outcome),
                        ..Default::default()
                    },
                )
                .await
        }
    };

    match result {
        Ok(()) => info!(
            delivery_tag = delivery_tag,
            outcome = ?outcome,
            "rabbitmq_task_settled"
        ),
        Err(e) => error!(
            delivery_tag = delivery_tag,
            error = %e,
            "rabbitmq_settle_failed"
        ),
    }
}

/// Wait for every spawned task; returns how many finished.
///
/// A task that panicked is logged and counted; its delivery stays unacked
/// and the broker redelivers it once the connection closes.
async fn drain(in_flight: &mut JoinSet<()>) -> usize {
    let mut finished = 0;
    while let Some(result) = in_flight.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "dispatcher_task_failed");
        }
        finished += 1;
    }
    finished
}

/// Only transient failures go back on the queue.
fn requeue_for(outcome: &InvokeOutcome) -> bool {
    matches!(outcome, InvokeOutcome::Retry(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_waits_for_in_flight_tasks() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let settled = Arc::new(AtomicUsize::new(0));
        let mut in_flight = JoinSet::new();
        for delay in [30u64, 10, 20] {
            let settled = Arc::clone(&settled);
            in_flight.spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                settled.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(drain(&mut in_flight).await, 3);
        assert_eq!(settled.load(Ordering::SeqCst), 3);
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_drain_survives_panicked_task() {
        let mut in_flight: JoinSet<()> = JoinSet::new();
        in_flight.spawn(async { panic!("invoker blew up") });
        in_flight.spawn(async {});

        assert_eq!(drain(&mut in_flight).await, 2);
    }

    #[test]
    fn test_requeue_only_transient_failures() {
        assert!(!requeue_for(&InvokeOutcome::Completed));
        assert!(!requeue_for(&InvokeOutcome::Rejected(401)));
        assert!(!requeue_for(&InvokeOutcome::Malformed));
        assert!(requeue_for(&InvokeOutcome::Retry("timeout".to_string())));
    }
}

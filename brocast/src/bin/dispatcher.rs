//! Brocast Dispatcher - delivery task consumer.
//!
//! This binary:
//! 1. Consumes tasks from the delivery_tasks queue
//! 2. POSTs each task's parameters to its target endpoint on the web server
//! 3. Acks, drops or requeues the task depending on the response

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use brocast::{dispatch, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("dispatcher_starting");

    let config = Config::from_env();
    info!(
        concurrency = config.dispatch_concurrency,
        worker_base_url = %config.worker_base_url,
        request_timeout_ms = config.request_timeout_ms,
        "config_loaded"
    );

    dispatch::run(config).await?;

    Ok(())
}

//! Brocast Web Server.
//!
//! Serves the landing page, accepts broadcast submissions and runs the mail
//! worker when the dispatcher invokes `/mailworker`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use brocast::mail::{MemoryMailer, SmtpMailer};
use brocast::shutdown::shutdown_signal;
use brocast::store::{MemoryStore, RedisStore};
use brocast::web::Pages;
use brocast::{router, AppState, BroadcastStore, Config, EmailRenderer, Mailer, Publisher};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    let config = Config::from_env();
    info!(
        port = config.port,
        redis_configured = config.redis_url.is_some(),
        smtp_configured = config.smtp_host.is_some(),
        template_dir = %config.template_dir,
        identity_header = %config.identity_header,
        task_signing_configured = config.task_signing_key.is_some(),
        "config_loaded"
    );

    let store: Arc<dyn BroadcastStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisStore::connect(url)
                .await
                .context("Failed to connect to Redis")?,
        ),
        None => {
            warn!("redis_not_configured_using_memory_store");
            Arc::new(MemoryStore::new())
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.smtp_host {
        Some(host) => {
            let credentials = config
                .smtp_username
                .clone()
                .zip(config.smtp_password.clone());
            Arc::new(SmtpMailer::new(host, config.smtp_port, credentials))
        }
        None => {
            warn!("smtp_not_configured_using_memory_mailer");
            Arc::new(MemoryMailer::new())
        }
    };

    // A broken template directory only breaks `GET /`
    let pages = Pages::load(&config.template_dir).unwrap_or_else(|e| {
        error!(template_dir = %config.template_dir, error = %e, "pages_load_failed");
        Pages::empty()
    });

    let renderer = EmailRenderer::new(config.service_mailbox.clone())
        .context("Failed to load email template")?;

    if config.task_signing_key.is_none() {
        warn!("task_signing_not_configured");
    }

    let publisher = Publisher::new(config.amqp_url.clone());
    info!("rabbitmq_publisher_created");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(
        config,
        store,
        Arc::new(publisher.clone()),
        mailer,
        pages,
        renderer,
    );

    let app = router(state);

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("web_server_shutting_down");
        })
        .await
        .context("Server error")?;

    publisher.close().await;

    info!("web_server_shutdown_complete");

    Ok(())
}

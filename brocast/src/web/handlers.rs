//! HTTP endpoint handlers.
//!
//! - `GET /`: landing page
//! - `POST /broadcasts`: store a broadcast and enqueue its delivery
//! - `POST /mailworker`: run the delivery worker (task system only)

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Form, State},
    http::{HeaderMap, StatusCode},
    response::Html,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use super::identity::AuthenticatedUser;
use super::pages::Pages;
use super::signature::{
    is_signature_verification_enabled, verify_task_signature, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use crate::broadcast::{Broadcast, BroadcastRequest};
use crate::deliver::deliver;
use crate::error::AppError;
use crate::mail::{EmailRenderer, Mailer};
use crate::queue::{DeliveryTask, TaskQueue, BROADCAST_KEY_PARAM};
use crate::store::BroadcastStore;
use crate::Config;

/// Largest accepted submission body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn BroadcastStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub mailer: Arc<dyn Mailer>,
    pub pages: Arc<Pages>,
    pub renderer: Arc<EmailRenderer>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn BroadcastStore>,
        queue: Arc<dyn TaskQueue>,
        mailer: Arc<dyn Mailer>,
        pages: Pages,
        renderer: EmailRenderer,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            queue,
            mailer,
            pages: Arc::new(pages),
            renderer: Arc::new(renderer),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Landing Page
// =============================================================================

/// Landing page endpoint.
pub async fn root(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let page = state.pages.render_root().map_err(|e| {
        error!(error = %e, "root_render_failed");
        e
    })?;

    Ok(Html(page))
}

// =============================================================================
// Broadcast Submission
// =============================================================================

/// Broadcast submission endpoint.
///
/// This endpoint:
/// 1. Reads and parses the JSON body
/// 2. Stamps the caller identity and the current time onto the record
/// 3. Stores the record
/// 4. Enqueues a delivery task carrying only the record key
/// 5. Returns 201 Created with an empty body
///
/// If the enqueue fails the stored record is left in place.
pub async fn submit_broadcast(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Body,
) -> Result<StatusCode, AppError> {
    let bytes = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
        warn!(account = %user.as_str(), error = %e, "broadcast_body_read_failed");
        AppError::BadRequest(e.to_string())
    })?;

    let request: BroadcastRequest = serde_json::from_slice(&bytes).map_err(|e| {
        warn!(
            account = %user.as_str(),
            body_length = bytes.len(),
            error = %e,
            "broadcast_parse_failed"
        );
        AppError::BadRequest(e.to_string())
    })?;

    info!(
        account = %user.as_str(),
        recipient_count = request.recipients.len(),
        body_length = request.body.len(),
        has_sender = request.sender.is_some(),
        "broadcast_received"
    );

    let broadcast = Broadcast::from_request(request, user.as_str(), Utc::now());

    let key = state.store.put(&broadcast).await.map_err(|e| {
        error!(account = %user.as_str(), error = %e, "broadcast_store_failed");
        e
    })?;

    info!(broadcast_key = %key, "broadcast_stored");

    let task = DeliveryTask::mail(&key);
    state.queue.enqueue(&task).await.map_err(|e| {
        error!(broadcast_key = %key, error = %e, "delivery_task_enqueue_failed");
        e
    })?;

    info!(broadcast_key = %key, target = %task.target, "delivery_task_enqueued");

    Ok(StatusCode::CREATED)
}

// =============================================================================
// Mail Worker
// =============================================================================

/// Delivery worker endpoint, invoked by the dispatcher.
///
/// Rejects unsigned calls with 401 when a signing key is configured. Once a
/// call is accepted the response is always 200: a failed delivery is logged
/// and dropped, not handed back to the queue for another attempt.
pub async fn mail_worker(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<BTreeMap<String, String>>,
) -> StatusCode {
    if is_signature_verification_enabled(&state.config.task_signing_key) {
        let signing_key = state.config.task_signing_key.as_deref().unwrap_or_default();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        if !verify_task_signature(
            signing_key,
            &header(TIMESTAMP_HEADER),
            &params,
            &header(SIGNATURE_HEADER),
            state.config.task_signature_max_age,
        ) {
            warn!("mail_worker_signature_invalid");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let encoded_key = match params.get(BROADCAST_KEY_PARAM) {
        Some(key) => key,
        None => {
            error!(param = BROADCAST_KEY_PARAM, "mail_worker_key_missing");
            return StatusCode::OK;
        }
    };

    info!(broadcast_key = %encoded_key, "mail_worker_invoked");

    // Errors are already logged by the worker
    let _ = deliver(
        state.store.as_ref(),
        state.mailer.as_ref(),
        &state.renderer,
        encoded_key,
    )
    .await;

    StatusCode::OK
}

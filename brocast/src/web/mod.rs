//! Web server module.
//!
//! The router serves the public landing page and submission endpoint plus
//! the internal mail worker endpoint the dispatcher calls.

pub mod handlers;
pub mod identity;
pub mod pages;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{health, mail_worker, root, submit_broadcast, AppState, HealthResponse};
pub use identity::AuthenticatedUser;
pub use pages::Pages;
pub use signature::{sign_task, verify_task_signature, SIGNATURE_HEADER, TIMESTAMP_HEADER};

use crate::queue::MAIL_WORKER_PATH;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/broadcasts", post(submit_broadcast))
        .route(MAIL_WORKER_PATH, post(mail_worker))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

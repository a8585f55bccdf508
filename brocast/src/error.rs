//! HTTP error type for the synchronous handlers.
//!
//! Every error becomes a non-2xx status with the raw error text as a
//! `text/plain` body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::mail::RenderError;
use crate::queue::QueueError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed client input
    #[error("{0}")]
    BadRequest(String),

    /// No resolvable caller identity
    #[error("{0}")]
    Unauthorized(String),

    /// Any collaborator failure
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<RenderError> for AppError {
    fn from(e: RenderError) -> Self {
        AppError::Internal(e.to_string())
    }
}

//! Caller identity.
//!
//! Authentication happens upstream; the gateway forwards the resolved
//! identity in a header (see `Config::identity_header`). Handlers take an
//! [`AuthenticatedUser`] argument instead of reading it themselves.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use super::AppState;
use crate::error::AppError;

/// Identity of the caller, as resolved by the authentication gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl AuthenticatedUser {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = state.config.identity_header.as_str();

        let identity = parts
            .headers
            .get(header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match identity {
            Some(identity) => Ok(AuthenticatedUser(identity.to_string())),
            None => {
                warn!(header = %header, path = %parts.uri.path(), "identity_missing");
                Err(AppError::Unauthorized(
                    "no authenticated identity on request".to_string(),
                ))
            }
        }
    }
}

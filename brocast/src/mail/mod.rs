//! Outbound mail.
//!
//! [`EmailRenderer`] turns a stored broadcast into a [`MailMessage`];
//! a [`Mailer`] hands it to a transport.

pub mod memory;
pub mod render;
pub mod smtp;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryMailer;
pub use render::{maps_url, EmailRenderer, RenderError, MAPS_BASE_URL};
pub use smtp::SmtpMailer;

/// Errors raised while sending mail.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("transport failed: {0}")]
    Transport(String),
}

/// A single plain-text message addressed to every recipient at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    /// Display name in the `From` header
    pub from_name: String,
    /// Mailbox address in the `From` header
    pub from_address: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    /// `From` header value, e.g. `Alice <brocastmailer@gmail.com>`.
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_address)
    }
}

/// Best-effort mail delivery. Failures are reported, never retried here.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

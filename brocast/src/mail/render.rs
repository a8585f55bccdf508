//! Email rendering.
//!
//! The body template is embedded at compile time from `templates/email.txt`.
//! The `.txt` name keeps tera's HTML autoescaping off.

use std::error::Error as _;

use tera::{Context, Tera};
use thiserror::Error;

use super::MailMessage;
use crate::broadcast::Broadcast;

/// Prefix of the map link; the record's location is appended verbatim.
pub const MAPS_BASE_URL: &str = "https://maps.google.com/maps?q=";

const EMAIL_TEMPLATE: &str = "email.txt";

/// Template loading or rendering failure.
#[derive(Debug, Error)]
#[error("template error: {0}")]
pub struct RenderError(String);

impl From<tera::Error> for RenderError {
    fn from(e: tera::Error) -> Self {
        // Tera nests the useful message in the source chain
        let mut message = e.to_string();
        let mut source = e.source();
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        RenderError(message)
    }
}

/// Map link for a location token. The token is not escaped.
pub fn maps_url(geo_location: &str) -> String {
    format!("{}{}", MAPS_BASE_URL, geo_location)
}

/// Renders broadcasts into outbound mail.
pub struct EmailRenderer {
    engine: Tera,
    service_mailbox: String,
}

impl EmailRenderer {
    /// Create a renderer sending from `service_mailbox`.
    pub fn new(service_mailbox: impl Into<String>) -> Result<Self, RenderError> {
        let mut engine = Tera::default();
        engine.add_raw_template(
            EMAIL_TEMPLATE,
            include_str!("../../templates/email.txt"),
        )?;

        Ok(Self {
            engine,
            service_mailbox: service_mailbox.into(),
        })
    }

    /// Render the plain-text body for a broadcast.
    pub fn render_body(&self, broadcast: &Broadcast) -> Result<String, RenderError> {
        let mut context = Context::new();
        context.insert("maps_url", &maps_url(&broadcast.geo_location));
        context.insert("body", &broadcast.body);

        Ok(self.engine.render(EMAIL_TEMPLATE, &context)?)
    }

    /// Build the message for a broadcast: one mail to all recipients.
    pub fn render(&self, broadcast: &Broadcast) -> Result<MailMessage, RenderError> {
        let sender = broadcast.display_sender();

        Ok(MailMessage {
            from_name: sender.to_string(),
            from_address: self.service_mailbox.clone(),
            to: broadcast.recipients.clone(),
            subject: format!("Brocast from {}", sender),
            body: self.render_body(broadcast)?,
        })
    }
}

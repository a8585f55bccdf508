//! SMTP mailer.
//!
//! Wraps lettre's `AsyncSmtpTransport` for a plain (non-TLS) relay such as a
//! local MTA or sidecar.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use tracing::info;

use super::{MailError, MailMessage, Mailer};

/// Sends mail through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Create a mailer for `host:port`, authenticating when credentials are given.
    pub fn new(host: &str, port: u16, credentials: Option<(String, String)>) -> Self {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port);

        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }

        info!(host = %host, port = port, "smtp_mailer_created");

        Self {
            transport: builder.build(),
        }
    }
}

fn parse_address(address: &str) -> Result<Address, MailError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|e| MailError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Build the lettre message: one message, every recipient in `To`.
fn build_message(message: &MailMessage) -> Result<Message, MailError> {
    let from = Mailbox::new(
        Some(message.from_name.clone()),
        parse_address(&message.from_address)?,
    );

    let mut builder = Message::builder()
        .from(from)
        .subject(message.subject.as_str())
        .header(ContentType::TEXT_PLAIN);

    for recipient in &message.to {
        builder = builder.to(Mailbox::new(None, parse_address(recipient)?));
    }

    builder
        .body(message.body.clone())
        .map_err(|e| MailError::Build(e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let email = build_message(message)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        Ok(())
    }
}

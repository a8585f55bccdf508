//! Mailer that keeps messages in memory instead of sending them.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::{MailError, MailMessage, Mailer};

/// Records every message passed to [`Mailer::send`].
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages "sent" so far, in order.
    pub async fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        info!(
            from = %message.from_header(),
            recipient_count = message.to.len(),
            subject = %message.subject,
            "memory_mail_recorded"
        );
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

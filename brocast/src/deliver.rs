//! Delivery worker - turns a stored broadcast into one outbound mail.
//!
//! Runs once per delivery task. Every failure is terminal for the invocation:
//! it is logged and returned, never retried here. The same key delivered
//! twice sends the mail twice.

use tracing::{error, info, warn};

use crate::mail::{EmailRenderer, MailError, Mailer, RenderError};
use crate::store::{BroadcastStore, KeyDecodeError, RecordKey, StoreError};

/// Why a delivery attempt stopped.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid broadcast key: {0}")]
    InvalidKey(#[from] KeyDecodeError),

    #[error("broadcast {0} not found")]
    NotFound(String),

    #[error("failed to load broadcast: {0}")]
    Load(#[from] StoreError),

    #[error("failed to render mail: {0}")]
    Render(#[from] RenderError),

    #[error("failed to send mail: {0}")]
    Send(#[from] MailError),
}

/// Result of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub key: RecordKey,
    pub recipient_count: usize,
}

/// Deliver the broadcast behind an encoded key.
///
/// 1. Decodes the key
/// 2. Loads the record
/// 3. Renders the mail (map link, body, footer)
/// 4. Sends a single message addressed to every recipient
pub async fn deliver(
    store: &dyn BroadcastStore,
    mailer: &dyn Mailer,
    renderer: &EmailRenderer,
    encoded_key: &str,
) -> Result<DeliveryReport, DeliveryError> {
    let key = RecordKey::decode(encoded_key).map_err(|e| {
        error!(broadcast_key = %encoded_key, error = %e, "delivery_key_invalid");
        e
    })?;

    info!(broadcast_key = %encoded_key, "delivery_start");

    let broadcast = match store.get(&key).await {
        Ok(Some(broadcast)) => broadcast,
        Ok(None) => {
            warn!(broadcast_key = %encoded_key, "delivery_record_missing");
            return Err(DeliveryError::NotFound(encoded_key.to_string()));
        }
        Err(e) => {
            error!(broadcast_key = %encoded_key, error = %e, "delivery_record_load_failed");
            return Err(e.into());
        }
    };

    let message = renderer.render(&broadcast).map_err(|e| {
        error!(broadcast_key = %encoded_key, error = %e, "delivery_render_failed");
        e
    })?;

    info!(
        broadcast_key = %encoded_key,
        recipient_count = message.to.len(),
        body_length = message.body.len(),
        "mail_sending"
    );

    if let Err(e) = mailer.send(&message).await {
        error!(broadcast_key = %encoded_key, error = %e, "mail_send_failed");
        return Err(e.into());
    }

    info!(
        broadcast_key = %encoded_key,
        recipient_count = message.to.len(),
        "mail_sent"
    );

    Ok(DeliveryReport {
        key,
        recipient_count: message.to.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{Broadcast, BroadcastRequest};
    use crate::mail::{MailMessage, MemoryMailer};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _message: &MailMessage) -> Result<(), MailError> {
            Err(MailError::Transport("relay unavailable".to_string()))
        }
    }

    struct UnreachableStore;

    #[async_trait]
    impl BroadcastStore for UnreachableStore {
        async fn put(&self, _record: &Broadcast) -> Result<RecordKey, StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }

        async fn get(&self, _key: &RecordKey) -> Result<Option<Broadcast>, StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
    }

    fn renderer() -> EmailRenderer {
        EmailRenderer::new("brocastmailer@gmail.com").unwrap()
    }

    async fn stored(store: &MemoryStore, recipients: &[&str]) -> String {
        let request = BroadcastRequest {
            geo_location: "40.0,-70.0".to_string(),
            body: "hello".to_string(),
            recipients: recipients.iter().map(|s| s.to_string()).collect(),
            sender: Some("Alice".to_string()),
        };
        let record = Broadcast::from_request(request, "alice@example.com", Utc::now());
        store.put(&record).await.unwrap().encode()
    }

    #[tokio::test]
    async fn test_deliver_sends_one_message_to_all_recipients() {
        let store = MemoryStore::new();
        let mailer = MemoryMailer::new();
        let key = stored(&store, &["a@x.com", "b@x.com"]).await;

        let report = deliver(&store, &mailer, &renderer(), &key).await.unwrap();
        assert_eq!(report.recipient_count, 2);

        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["a@x.com".to_string(), "b@x.com".to_string()]);
        assert!(sent[0]
            .body
            .contains("https://maps.google.com/maps?q=40.0,-70.0"));
    }

    #[tokio::test]
    async fn test_deliver_twice_sends_twice() {
        let store = MemoryStore::new();
        let mailer = MemoryMailer::new();
        let key = stored(&store, &["a@x.com"]).await;

        deliver(&store, &mailer, &renderer(), &key).await.unwrap();
        deliver(&store, &mailer, &renderer(), &key).await.unwrap();

        assert_eq!(mailer.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn test_deliver_invalid_key_sends_nothing() {
        let store = MemoryStore::new();
        let mailer = MemoryMailer::new();

        let result = deliver(&store, &mailer, &renderer(), "not-hex").await;

        assert!(matches!(result, Err(DeliveryError::InvalidKey(_))));
        assert!(mailer.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_deliver_missing_record() {
        let store = MemoryStore::new();
        let mailer = MemoryMailer::new();
        let key = RecordKey::new(404).encode();

        let result = deliver(&store, &mailer, &renderer(), &key).await;

        assert!(matches!(result, Err(DeliveryError::NotFound(_))));
        assert!(mailer.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_deliver_store_failure_sends_nothing() {
        let mailer = MemoryMailer::new();
        let key = RecordKey::new(1).encode();

        let result = deliver(&UnreachableStore, &mailer, &renderer(), &key).await;

        assert!(matches!(
            result,
            Err(DeliveryError::Load(StoreError::Backend(_)))
        ));
        assert!(mailer.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_deliver_reports_send_failure() {
        let store = MemoryStore::new();
        let key = stored(&store, &["a@x.com"]).await;

        let result = deliver(&store, &FailingMailer, &renderer(), &key).await;

        assert!(matches!(result, Err(DeliveryError::Send(_))));
    }
}

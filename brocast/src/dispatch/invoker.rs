//! HTTP invocation of task endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{error, info, warn};

use crate::queue::DeliveryTask;
use crate::web::signature::{sign_task, unix_now, SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// What the consumer should do with a task after invoking it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    /// Endpoint accepted the task; acknowledge it
    Completed,
    /// Endpoint refused the task for good (4xx); drop it
    Rejected(u16),
    /// Queue message is not a task; drop it
    Malformed,
    /// Endpoint or network failed (5xx, timeout); requeue it
    Retry(String),
}

/// Map an HTTP status code to an outcome.
pub fn classify_status(status: u16) -> InvokeOutcome {
    match status {
        200..=299 => InvokeOutcome::Completed,
        400..=499 => InvokeOutcome::Rejected(status),
        _ => InvokeOutcome::Retry(format!("endpoint returned {}", status)),
    }
}

/// Invokes task targets relative to a base URL, signing each call.
pub struct Invoker {
    client: Client,
    base_url: String,
    signing_key: Option<String>,
    timeout: Duration,
}

impl Invoker {
    pub fn new(base_url: &str, signing_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(32)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            signing_key: signing_key.filter(|k| !k.trim().is_empty()),
            timeout,
        })
    }

    /// Full URL for a task target.
    pub fn url_for(&self, task: &DeliveryTask) -> String {
        format!("{}{}", self.base_url, task.target)
    }

    /// POST the task's params form-encoded to its target.
    pub async fn invoke(&self, task: &DeliveryTask) -> InvokeOutcome {
        let url = self.url_for(task);
        let task_id = task.task_id();

        let mut request = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .form(&task.params);

        if let Some(key) = &self.signing_key {
            let timestamp = unix_now().to_string();
            match sign_task(key, &timestamp, &task.params) {
                Some(signature) => {
                    request = request
                        .header(TIMESTAMP_HEADER, timestamp)
                        .header(SIGNATURE_HEADER, signature);
                }
                None => warn!(task_id = %task_id, "task_signing_failed"),
            }
        }

        match request.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let outcome = classify_status(status);

                info!(
                    task_id = %task_id,
                    url = %url,
                    status_code = status,
                    outcome = ?outcome,
                    "task_invoked"
                );

                outcome
            }
            Err(e) => {
                if e.is_timeout() {
                    error!(
                        task_id = %task_id,
                        url = %url,
                        timeout_seconds = self.timeout.as_secs_f64(),
                        error = %e,
                        "task_invoke_timeout"
                    );
                } else {
                    error!(task_id = %task_id, url = %url, error = %e, "task_invoke_error");
                }
                InvokeOutcome::Retry(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordKey;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200), InvokeOutcome::Completed);
        assert_eq!(classify_status(204), InvokeOutcome::Completed);
        assert_eq!(classify_status(401), InvokeOutcome::Rejected(401));
        assert_eq!(classify_status(404), InvokeOutcome::Rejected(404));
        assert!(matches!(classify_status(500), InvokeOutcome::Retry(_)));
        assert!(matches!(classify_status(503), InvokeOutcome::Retry(_)));
        assert!(matches!(classify_status(302), InvokeOutcome::Retry(_)));
    }

    #[test]
    fn test_url_for_joins_base_and_target() {
        let invoker = Invoker::new("http://web:8080/", None, Duration::from_secs(1)).unwrap();
        let task = DeliveryTask::mail(&RecordKey::new(1));
        assert_eq!(invoker.url_for(&task), "http://web:8080/mailworker");
    }

    #[test]
    fn test_blank_signing_key_disables_signing() {
        let invoker =
            Invoker::new("http://web:8080", Some("  ".to_string()), Duration::from_secs(1))
                .unwrap();
        assert!(invoker.signing_key.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_retried() {
        // Reserve a free port, then release it so nothing is listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let base_url = format!("http://127.0.0.1:{}", port);
        let invoker = Invoker::new(&base_url, None, Duration::from_millis(500)).unwrap();
        let task = DeliveryTask::mail(&RecordKey::new(1));

        assert!(matches!(invoker.invoke(&task).await, InvokeOutcome::Retry(_)));
    }
}

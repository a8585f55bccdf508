//! Task message types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::store::RecordKey;

/// Queue name for pending delivery tasks.
pub const DELIVERY_QUEUE: &str = "delivery_tasks";

/// Endpoint that runs the delivery worker.
pub const MAIL_WORKER_PATH: &str = "/mailworker";

/// Form parameter carrying the encoded record key.
pub const BROADCAST_KEY_PARAM: &str = "broadcast_key";

/// An asynchronous invocation of `target` with flat string parameters.
///
/// The dispatcher POSTs `params` form-encoded to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTask {
    /// Path of the endpoint to invoke, e.g. `/mailworker`
    pub target: String,
    /// Form parameters, sorted by name
    pub params: BTreeMap<String, String>,
}

impl DeliveryTask {
    /// Task asking the mail worker to deliver the record behind `key`.
    pub fn mail(key: &RecordKey) -> Self {
        let mut params = BTreeMap::new();
        params.insert(BROADCAST_KEY_PARAM.to_string(), key.encode());
        Self {
            target: MAIL_WORKER_PATH.to_string(),
            params,
        }
    }

    /// Identifier used as the AMQP message id and in logs.
    pub fn task_id(&self) -> String {
        match self.params.get(BROADCAST_KEY_PARAM) {
            Some(key) => format!("{}-{}", self.target.trim_start_matches('/'), key),
            None => self.target.trim_start_matches('/').to_string(),
        }
    }
}

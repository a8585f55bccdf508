//! Brocast - share where you are with a list of friends by mail.
//!
//! This library provides shared modules for the two Brocast binaries:
//! - `brocast-web`: landing page, broadcast submission and the mail worker endpoint
//! - `brocast-dispatcher`: delivers queued tasks to their endpoints
//!
//! ## Architecture
//!
//! ```text
//! POST /broadcasts → store.put → delivery_tasks → Dispatcher → POST /mailworker → Mailer
//! ```

pub mod broadcast;
pub mod config;
pub mod deliver;
pub mod dispatch;
pub mod error;
pub mod mail;
pub mod queue;
pub mod shutdown;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use broadcast::{Broadcast, BroadcastRequest};
pub use config::Config;
pub use deliver::{deliver, DeliveryError, DeliveryReport};
pub use error::AppError;
pub use mail::{EmailRenderer, MailMessage, Mailer};
pub use queue::{DeliveryTask, Publisher, TaskQueue, DELIVERY_QUEUE};
pub use store::{BroadcastStore, RecordKey};
pub use web::{router, AppState};

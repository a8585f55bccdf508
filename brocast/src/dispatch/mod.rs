//! Task dispatcher.
//!
//! Consumes the delivery queue and invokes each task's target endpoint over
//! HTTP. This is the at-least-once half of the pipeline: a task is only
//! acknowledged once its endpoint answered 2xx or rejected it permanently.

pub mod consumer;
pub mod invoker;

pub use consumer::run;
pub use invoker::{classify_status, InvokeOutcome, Invoker};

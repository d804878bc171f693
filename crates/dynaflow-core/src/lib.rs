//! Expression compilation and resilient request execution for DynamoDB.
//!
//! The crate turns structured conditions, updates and projections into
//! DynamoDB's placeholder-based expression language, then drives the
//! resulting requests through a retrying executor with per-attempt
//! deadlines, cursor pagination, batch fan-out, parallel scan segmentation
//! and transaction composition. All I/O goes through an injected
//! [`transport::DynamoDBClient`].
#![allow(missing_docs, clippy::doc_markdown, clippy::module_name_repetitions)]

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod expression;
pub mod operation;
pub mod paginate;
pub mod request;
pub mod retry;
pub mod scan;
pub mod transaction;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::Dynaflow;
pub use config::{ExecutorConfig, HttpClientConfig, RetryPolicy};
pub use error::{DynaflowError, DynaflowResult};
pub use expression::{AttributePath, Condition, UpdateAction};
pub use paginate::AggregatedResult;
pub use transport::{DynamoDBClient, TransportError};

//! Integration tests for dynaflow against a DynamoDB compatible endpoint.
//!
//! These tests require a server at `localhost:8000` (override with
//! `DYNAFLOW_ENDPOINT_URL`). They are marked `#[ignore]` so they don't run
//! during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! cargo test -p dynaflow-integration -- --ignored
//! ```

use std::sync::{Arc, Once};

use anyhow::Context;
use aws_sdk_dynamodb::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
};
use dynaflow_core::transport::HttpClient;
use dynaflow_core::{Dynaflow, ExecutorConfig, HttpClientConfig};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Create a configured SDK client for table setup and teardown.
#[must_use]
pub fn admin_client() -> aws_sdk_dynamodb::Client {
    init_tracing();

    let creds = Credentials::new("test", "test", None, None, "integration-test");

    let config = aws_sdk_dynamodb::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(creds)
        .endpoint_url(HttpClientConfig::from_env().endpoint)
        .build();

    aws_sdk_dynamodb::Client::from_conf(config)
}

/// A [`Dynaflow`] bound to `table` through the HTTP transport.
pub fn dynaflow(table: &str) -> anyhow::Result<Dynaflow> {
    init_tracing();
    let transport = HttpClient::new(&HttpClientConfig::from_env())
        .context("failed to build HTTP transport")?;
    Dynaflow::new(Arc::new(transport), table, ExecutorConfig::from_env())
        .context("invalid executor configuration")
}

/// Generate a unique table name for a test.
#[must_use]
pub fn test_table_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Create a table keyed on `pk`, plus `sk` as sort key when `composite`.
pub async fn create_table(
    client: &aws_sdk_dynamodb::Client,
    prefix: &str,
    composite: bool,
) -> anyhow::Result<String> {
    let name = test_table_name(prefix);
    let mut request = client
        .create_table()
        .table_name(&name)
        .billing_mode(BillingMode::PayPerRequest);

    let mut keys = vec![("pk", KeyType::Hash)];
    if composite {
        keys.push(("sk", KeyType::Range));
    }
    for (attribute, key_type) in keys {
        request = request
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(attribute)
                    .key_type(key_type)
                    .build()?,
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(attribute)
                    .attribute_type(ScalarAttributeType::S)
                    .build()?,
            );
    }
    request
        .send()
        .await
        .with_context(|| format!("failed to create table {name}"))?;
    Ok(name)
}

/// Delete a table, ignoring failures.
pub async fn cleanup_table(client: &aws_sdk_dynamodb::Client, table: &str) {
    let _ = client.delete_table().table_name(table).send().await;
}

mod test_batch;
mod test_item;
mod test_read;
mod test_transaction;

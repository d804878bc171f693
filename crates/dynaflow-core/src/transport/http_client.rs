//! JSON-over-HTTP transport for DynamoDB compatible endpoints.
//!
//! Requests are `POST`ed to the endpoint root with the operation named in
//! `X-Amz-Target`, matching the `awsJson1_0` protocol. Requests are not
//! signed, so this transport targets local endpoints; production callers
//! plug in their own [`DynamoDBClient`].

use dynaflow_model::error::DynamoDBError;
use dynaflow_model::input::{
    BatchGetItemInput, BatchWriteItemInput, DeleteItemInput, GetItemInput, ListTablesInput,
    PutItemInput, QueryInput, ScanInput, TransactGetItemsInput, TransactWriteItemsInput,
    UpdateItemInput,
};
use dynaflow_model::output::{
    BatchGetItemOutput, BatchWriteItemOutput, DeleteItemOutput, GetItemOutput, ListTablesOutput,
    PutItemOutput, QueryOutput, ScanOutput, TransactGetItemsOutput, TransactWriteItemsOutput,
    UpdateItemOutput,
};
use dynaflow_model::DynamoDBOperation;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{DynamoDBClient, TransportError};
use crate::config::HttpClientConfig;

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// [`DynamoDBClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpClient {
    /// Build a client for `config.endpoint`.
    pub fn new(config: &HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Connection(Box::new(e)))?;
        Ok(Self::with_client(http, config))
    }

    /// Wrap an existing `reqwest` client, sharing its connection pool.
    #[must_use]
    pub fn with_client(http: reqwest::Client, config: &HttpClientConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint.clone(),
        }
    }

    async fn call<I, O>(&self, operation: DynamoDBOperation, input: &I) -> Result<O, TransportError>
    where
        I: Serialize + Sync,
        O: DeserializeOwned,
    {
        let body = serde_json::to_vec(input).map_err(|e| TransportError::Codec {
            operation,
            message: e.to_string(),
        })?;

        debug!(operation = %operation, endpoint = %self.endpoint, bytes = body.len(), "dispatching request");

        let response = self
            .http
            .post(&self.endpoint)
            .header(http::header::CONTENT_TYPE, CONTENT_TYPE)
            .header("X-Amz-Target", operation.target())
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Connection(Box::new(e)))?;

        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(Box::new(e)))?;

        if !status.is_success() {
            let err = DynamoDBError::from_response(status, &payload);
            debug!(operation = %operation, status = %status, code = %err.code, "request failed");
            return Err(TransportError::Service(err));
        }

        serde_json::from_slice(&payload).map_err(|e| TransportError::Codec {
            operation,
            message: e.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl DynamoDBClient for HttpClient {
    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, TransportError> {
        self.call(DynamoDBOperation::GetItem, &input).await
    }

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, TransportError> {
        self.call(DynamoDBOperation::PutItem, &input).await
    }

    async fn update_item(
        &self,
        input: UpdateItemInput,
    ) -> Result<UpdateItemOutput, TransportError> {
        self.call(DynamoDBOperation::UpdateItem, &input).await
    }

    async fn delete_item(
        &self,
        input: DeleteItemInput,
    ) -> Result<DeleteItemOutput, TransportError> {
        self.call(DynamoDBOperation::DeleteItem, &input).await
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, TransportError> {
        self.call(DynamoDBOperation::Query, &input).await
    }

    async fn scan(&self, input: ScanInput) -> Result<ScanOutput, TransportError> {
        self.call(DynamoDBOperation::Scan, &input).await
    }

    async fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> Result<BatchGetItemOutput, TransportError> {
        self.call(DynamoDBOperation::BatchGetItem, &input).await
    }

    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> Result<BatchWriteItemOutput, TransportError> {
        self.call(DynamoDBOperation::BatchWriteItem, &input).await
    }

    async fn transact_get_items(
        &self,
        input: TransactGetItemsInput,
    ) -> Result<TransactGetItemsOutput, TransportError> {
        self.call(DynamoDBOperation::TransactGetItems, &input).await
    }

    async fn transact_write_items(
        &self,
        input: TransactWriteItemsInput,
    ) -> Result<TransactWriteItemsOutput, TransportError> {
        self.call(DynamoDBOperation::TransactWriteItems, &input).await
    }

    async fn list_tables(
        &self,
        input: ListTablesInput,
    ) -> Result<ListTablesOutput, TransportError> {
        self.call(DynamoDBOperation::ListTables, &input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_should_report_connection_refused_as_retryable() {
        let config = HttpClientConfig {
            endpoint: "http://127.0.0.1:1".to_owned(),
            ..HttpClientConfig::default()
        };
        let client = HttpClient::new(&config).expect("build client");
        let err = client
            .list_tables(ListTablesInput::default())
            .await
            .expect_err("nothing listens on port 1");
        assert!(matches!(err, TransportError::Connection(_)));
        assert!(err.is_retryable());
    }
}

//! Scripted in-memory transport for executor tests.
//!
//! Requests are recorded as JSON and answered by per-operation handlers
//! that also see JSON, so one client serves every command shape.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

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
use dynaflow_model::{DynamoDBOperation, dynamodb_error};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::transport::{DynamoDBClient, TransportError};

/// What the scripted store does with one request.
pub(crate) enum Reply {
    Ok(Value),
    Err(TransportError),
    /// Answer `Value` after sleeping.
    Delayed(Duration, Value),
    /// Never answer.
    Hang,
}

impl Reply {
    pub(crate) fn empty() -> Self {
        Self::Ok(serde_json::json!({}))
    }

    pub(crate) fn throttled() -> Self {
        Self::Err(TransportError::Service(dynamodb_error!(ThrottlingException)))
    }

    pub(crate) fn conditional_failure() -> Self {
        Self::Err(TransportError::Service(dynamodb_error!(
            ConditionalCheckFailedException,
            "The conditional request failed"
        )))
    }
}

type Handler = Box<dyn FnMut(&Value) -> Reply + Send>;

#[derive(Default)]
struct State {
    handlers: HashMap<DynamoDBOperation, Handler>,
    calls: Vec<(DynamoDBOperation, Value)>,
}

#[derive(Default)]
pub(crate) struct MemoryClient {
    state: Mutex<State>,
}

impl std::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClient")
            .field("calls", &self.state.lock().calls.len())
            .finish_non_exhaustive()
    }
}

impl MemoryClient {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `operation` with `handler`. Unscripted operations get `{}`.
    pub(crate) fn on(
        &self,
        operation: DynamoDBOperation,
        handler: impl FnMut(&Value) -> Reply + Send + 'static,
    ) {
        self.state.lock().handlers.insert(operation, Box::new(handler));
    }

    /// Answer `operation` with `replies` in order, then with `{}`.
    pub(crate) fn script(&self, operation: DynamoDBOperation, replies: Vec<Reply>) {
        let mut replies = replies.into_iter();
        self.on(operation, move |_| replies.next().unwrap_or_else(Reply::empty));
    }

    /// Requests sent for `operation`, in order.
    pub(crate) fn calls(&self, operation: DynamoDBOperation) -> Vec<Value> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(op, _)| *op == operation)
            .map(|(_, request)| request.clone())
            .collect()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.state.lock().calls.len()
    }

    async fn dispatch<I, O>(&self, operation: DynamoDBOperation, input: I) -> Result<O, TransportError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let request = serde_json::to_value(&input).expect("serialize request");
        let reply = {
            let mut state = self.state.lock();
            state.calls.push((operation, request.clone()));
            match state.handlers.get_mut(&operation) {
                Some(handler) => handler(&request),
                None => Reply::empty(),
            }
        };
        let body = match reply {
            Reply::Ok(body) => body,
            Reply::Err(err) => return Err(err),
            Reply::Delayed(delay, body) => {
                tokio::time::sleep(delay).await;
                body
            }
            Reply::Hang => futures::future::pending().await,
        };
        Ok(serde_json::from_value(body).expect("deserialize scripted reply"))
    }
}

#[async_trait::async_trait]
impl DynamoDBClient for MemoryClient {
    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, TransportError> {
        self.dispatch(DynamoDBOperation::GetItem, input).await
    }

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, TransportError> {
        self.dispatch(DynamoDBOperation::PutItem, input).await
    }

    async fn update_item(
        &self,
        input: UpdateItemInput,
    ) -> Result<UpdateItemOutput, TransportError> {
        self.dispatch(DynamoDBOperation::UpdateItem, input).await
    }

    async fn delete_item(
        &self,
        input: DeleteItemInput,
    ) -> Result<DeleteItemOutput, TransportError> {
        self.dispatch(DynamoDBOperation::DeleteItem, input).await
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, TransportError> {
        self.dispatch(DynamoDBOperation::Query, input).await
    }

    async fn scan(&self, input: ScanInput) -> Result<ScanOutput, TransportError> {
        self.dispatch(DynamoDBOperation::Scan, input).await
    }

    async fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> Result<BatchGetItemOutput, TransportError> {
        self.dispatch(DynamoDBOperation::BatchGetItem, input).await
    }

    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> Result<BatchWriteItemOutput, TransportError> {
        self.dispatch(DynamoDBOperation::BatchWriteItem, input).await
    }

    async fn transact_get_items(
        &self,
        input: TransactGetItemsInput,
    ) -> Result<TransactGetItemsOutput, TransportError> {
        self.dispatch(DynamoDBOperation::TransactGetItems, input).await
    }

    async fn transact_write_items(
        &self,
        input: TransactWriteItemsInput,
    ) -> Result<TransactWriteItemsOutput, TransportError> {
        self.dispatch(DynamoDBOperation::TransactWriteItems, input).await
    }

    async fn list_tables(
        &self,
        input: ListTablesInput,
    ) -> Result<ListTablesOutput, TransportError> {
        self.dispatch(DynamoDBOperation::ListTables, input).await
    }
}

/// A `{"pk": {"S": id}}` item.
pub(crate) fn item(id: &str) -> Value {
    serde_json::json!({ "pk": { "S": id } })
}

/// A query/scan page of `ids`, continuing at `next` when given.
pub(crate) fn page(ids: &[&str], next: Option<&str>) -> Value {
    let items: Vec<Value> = ids.iter().map(|id| item(id)).collect();
    let mut body = serde_json::json!({
        "Items": items,
        "Count": ids.len(),
        "ScannedCount": ids.len(),
        "ConsumedCapacity": { "TableName": "t", "CapacityUnits": 0.5 },
    });
    if let Some(next) = next {
        body["LastEvaluatedKey"] = item(next);
    }
    body
}

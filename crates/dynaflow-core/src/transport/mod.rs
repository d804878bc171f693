//! The single I/O seam: one async call per DynamoDB command.
//!
//! [`DynamoDBClient`] uses `#[async_trait]` because it must be object-safe;
//! every entry point receives it as an `Arc<dyn DynamoDBClient>`.

pub mod http_client;

use dynaflow_model::error::{DynamoDBError, DynamoDBErrorCode};
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
use futures::future::BoxFuture;

pub use self::http_client::HttpClient;

/// Failure reported by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The service answered with an error document.
    #[error(transparent)]
    Service(#[from] DynamoDBError),

    /// The request never produced a response.
    #[error("connection failed: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A request or response body could not be (de)serialized.
    #[error("failed to encode or decode {operation}: {message}")]
    Codec {
        /// The operation being exchanged.
        operation: DynamoDBOperation,
        /// What went wrong.
        message: String,
    },
}

impl TransportError {
    /// Whether the failure is worth another attempt.
    ///
    /// Connectivity problems, server faults and throttling are; every other
    /// service error and all codec errors are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Service(err) => {
                err.retryable
                    || matches!(
                        err.code,
                        DynamoDBErrorCode::InternalServerError
                            | DynamoDBErrorCode::ServiceUnavailable
                            | DynamoDBErrorCode::ProvisionedThroughputExceededException
                            | DynamoDBErrorCode::ThrottlingException
                            | DynamoDBErrorCode::RequestLimitExceeded
                    )
                    || (err.code == DynamoDBErrorCode::Unknown && err.status_code.is_server_error())
            }
            Self::Connection(_) => true,
            Self::Codec { .. } => false,
        }
    }
}

/// Low-level DynamoDB transport.
#[async_trait::async_trait]
pub trait DynamoDBClient: Send + Sync + std::fmt::Debug {
    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, TransportError>;

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, TransportError>;

    async fn update_item(&self, input: UpdateItemInput)
    -> Result<UpdateItemOutput, TransportError>;

    async fn delete_item(&self, input: DeleteItemInput)
    -> Result<DeleteItemOutput, TransportError>;

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, TransportError>;

    async fn scan(&self, input: ScanInput) -> Result<ScanOutput, TransportError>;

    async fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> Result<BatchGetItemOutput, TransportError>;

    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> Result<BatchWriteItemOutput, TransportError>;

    async fn transact_get_items(
        &self,
        input: TransactGetItemsInput,
    ) -> Result<TransactGetItemsOutput, TransportError>;

    async fn transact_write_items(
        &self,
        input: TransactWriteItemsInput,
    ) -> Result<TransactWriteItemsOutput, TransportError>;

    async fn list_tables(&self, input: ListTablesInput)
    -> Result<ListTablesOutput, TransportError>;
}

/// A wire request that knows which transport call carries it.
///
/// The executor clones the command for every attempt, so a retried call
/// resends exactly the request that was built once.
pub trait Command: Clone + Send + Sync {
    /// Response type.
    type Output: Send;

    /// The operation this command performs.
    const OPERATION: DynamoDBOperation;

    /// Dispatch through `client`.
    fn send(self, client: &dyn DynamoDBClient) -> BoxFuture<'_, Result<Self::Output, TransportError>>;
}

macro_rules! command {
    ($input:ty => $output:ty, $operation:ident, $method:ident) => {
        impl Command for $input {
            type Output = $output;
            const OPERATION: DynamoDBOperation = DynamoDBOperation::$operation;

            fn send(
                self,
                client: &dyn DynamoDBClient,
            ) -> BoxFuture<'_, Result<Self::Output, TransportError>> {
                client.$method(self)
            }
        }
    };
}

command!(GetItemInput => GetItemOutput, GetItem, get_item);
command!(PutItemInput => PutItemOutput, PutItem, put_item);
command!(UpdateItemInput => UpdateItemOutput, UpdateItem, update_item);
command!(DeleteItemInput => DeleteItemOutput, DeleteItem, delete_item);
command!(QueryInput => QueryOutput, Query, query);
command!(ScanInput => ScanOutput, Scan, scan);
command!(BatchGetItemInput => BatchGetItemOutput, BatchGetItem, batch_get_item);
command!(BatchWriteItemInput => BatchWriteItemOutput, BatchWriteItem, batch_write_item);
command!(TransactGetItemsInput => TransactGetItemsOutput, TransactGetItems, transact_get_items);
command!(TransactWriteItemsInput => TransactWriteItemsOutput, TransactWriteItems, transact_write_items);
command!(ListTablesInput => ListTablesOutput, ListTables, list_tables);

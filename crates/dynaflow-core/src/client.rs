//! The table-scoped entry point.
//!
//! Every method finalizes its option record first, so invalid input fails
//! before any network call, then hands the request to the executor. Each
//! operation comes in two flavors: the plain method returns the items the
//! caller usually wants, the `_raw` variant the full aggregated output.

use std::sync::Arc;

use dynaflow_model::input::{ListTablesInput, QueryInput, ScanInput};
use dynaflow_model::output::{
    BatchGetItemOutput, BatchWriteItemOutput, DeleteItemOutput, GetItemOutput, PutItemOutput,
    TransactGetItemsOutput, TransactWriteItemsOutput, UpdateItemOutput,
};
use dynaflow_model::types::{ReturnConsumedCapacity, ReturnItemCollectionMetrics};
use dynaflow_model::{Item, Key};
use tracing::debug;

use crate::batch::{batch_get, batch_write};
use crate::config::ExecutorConfig;
use crate::error::DynaflowResult;
use crate::operation::{
    BatchGetOptions, BatchWriteOptions, DeleteOptions, GetOptions, ListTablesOptions,
    PendingOperation, PutOptions, QueryOptions, ScanOptions, UpdateOptions,
};
use crate::paginate::{AggregatedResult, paginate};
use crate::retry::RetryableExecutor;
use crate::scan::scan;
use crate::transaction::{TransactAction, TransactRead, compose_get, compose_write};
use crate::transport::DynamoDBClient;

/// Settings of a write transaction beyond its sub-operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactWriteOptions {
    pub client_request_token: Option<String>,
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
    pub return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

/// Operations against one table through an injected client.
#[derive(Debug, Clone)]
pub struct Dynaflow {
    executor: RetryableExecutor,
    table: String,
}

impl Dynaflow {
    /// Bind `client` to `table`. Fails if `config` is invalid.
    pub fn new(
        client: Arc<dyn DynamoDBClient>,
        table: impl Into<String>,
        config: ExecutorConfig,
    ) -> DynaflowResult<Self> {
        config.validate()?;
        Ok(Self {
            executor: RetryableExecutor::new(client, config),
            table: table.into(),
        })
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn executor(&self) -> &RetryableExecutor {
        &self.executor
    }

    /// The item at `key`, if any.
    pub async fn get(&self, key: Key, options: GetOptions) -> DynaflowResult<Option<Item>> {
        Ok(self.get_raw(key, options).await?.item)
    }

    pub async fn get_raw(&self, key: Key, options: GetOptions) -> DynaflowResult<GetItemOutput> {
        let pending = options.finalize(&self.table, key)?;
        self.executor.send(&pending.request).await
    }

    /// Write `item` and return it.
    pub async fn put(&self, item: Item, options: PutOptions) -> DynaflowResult<Item> {
        let pending = options.finalize(&self.table, item)?;
        self.executor.send(&pending.request).await?;
        Ok(pending.request.item)
    }

    pub async fn put_raw(&self, item: Item, options: PutOptions) -> DynaflowResult<PutItemOutput> {
        let pending = options.finalize(&self.table, item)?;
        self.executor.send(&pending.request).await
    }

    /// Apply an update and return the attributes selected by its
    /// `ReturnValues` mode.
    pub async fn update(&self, key: Key, options: UpdateOptions) -> DynaflowResult<Item> {
        Ok(self.update_raw(key, options).await?.attributes)
    }

    pub async fn update_raw(
        &self,
        key: Key,
        options: UpdateOptions,
    ) -> DynaflowResult<UpdateItemOutput> {
        let pending = options.finalize(&self.table, key)?;
        self.executor.send(&pending.request).await
    }

    /// Delete the item at `key`, returning the attributes selected by its
    /// `ReturnValues` mode.
    pub async fn delete(&self, key: Key, options: DeleteOptions) -> DynaflowResult<Item> {
        Ok(self.delete_raw(key, options).await?.attributes)
    }

    pub async fn delete_raw(
        &self,
        key: Key,
        options: DeleteOptions,
    ) -> DynaflowResult<DeleteItemOutput> {
        let pending = options.finalize(&self.table, key)?;
        self.executor.send(&pending.request).await
    }

    /// Items under `partition_key`, a single-attribute key.
    pub async fn query(
        &self,
        partition_key: &Key,
        options: QueryOptions,
    ) -> DynaflowResult<Vec<Item>> {
        Ok(self.query_raw(partition_key, options).await?.into_items())
    }

    pub async fn query_raw(
        &self,
        partition_key: &Key,
        options: QueryOptions,
    ) -> DynaflowResult<AggregatedResult> {
        let PendingOperation {
            request, paging, ..
        } = options.finalize(&self.table, partition_key)?;
        debug!(table = %self.table, index = ?request.index_name, "query");
        paginate::<QueryInput>(&self.executor, request, paging).await
    }

    /// Items of the whole table or index, split into parallel segments
    /// unless the options say otherwise.
    pub async fn scan(&self, options: ScanOptions) -> DynaflowResult<Vec<Item>> {
        Ok(self.scan_raw(options).await?.into_items())
    }

    pub async fn scan_raw(&self, options: ScanOptions) -> DynaflowResult<AggregatedResult> {
        let PendingOperation {
            request,
            paging,
            segments,
        }: PendingOperation<ScanInput> =
            options.finalize(&self.table, self.executor.config().scan_segments)?;
        scan(&self.executor, request, paging, segments).await
    }

    /// The items found for `keys`, in no particular order.
    pub async fn batch_get(
        &self,
        keys: Vec<Key>,
        options: BatchGetOptions,
    ) -> DynaflowResult<Vec<Item>> {
        let mut output = self.batch_get_raw(keys, options).await?;
        Ok(output.responses.remove(&self.table).unwrap_or_default())
    }

    pub async fn batch_get_raw(
        &self,
        keys: Vec<Key>,
        options: BatchGetOptions,
    ) -> DynaflowResult<BatchGetItemOutput> {
        let request = options.finalize(&self.table, keys)?.request;
        batch_get(
            &self.executor,
            &request.table,
            request.keys,
            request.template,
            request.return_consumed_capacity,
        )
        .await
    }

    /// Write every item and return them.
    pub async fn batch_put(
        &self,
        items: Vec<Item>,
        options: BatchWriteOptions,
    ) -> DynaflowResult<Vec<Item>> {
        let written = items.clone();
        self.batch_put_raw(items, options).await?;
        Ok(written)
    }

    pub async fn batch_put_raw(
        &self,
        items: Vec<Item>,
        options: BatchWriteOptions,
    ) -> DynaflowResult<BatchWriteItemOutput> {
        let request = options.finalize_puts(&self.table, items)?.request;
        batch_write(
            &self.executor,
            &request.table,
            request.requests,
            request.return_consumed_capacity,
            request.return_item_collection_metrics,
        )
        .await
    }

    pub async fn batch_delete(
        &self,
        keys: Vec<Key>,
        options: BatchWriteOptions,
    ) -> DynaflowResult<BatchWriteItemOutput> {
        let request = options.finalize_deletes(&self.table, keys)?.request;
        batch_write(
            &self.executor,
            &request.table,
            request.requests,
            request.return_consumed_capacity,
            request.return_item_collection_metrics,
        )
        .await
    }

    /// Apply `actions` atomically. Actions may target any table.
    pub async fn transact_write(
        &self,
        actions: Vec<TransactAction>,
        options: TransactWriteOptions,
    ) -> DynaflowResult<TransactWriteItemsOutput> {
        let request = compose_write(
            actions,
            options.client_request_token,
            options.return_consumed_capacity,
            options.return_item_collection_metrics,
        )?;
        self.executor.send(&request).await
    }

    /// Read every item of `reads` in one snapshot, in request order.
    pub async fn transact_get(&self, reads: Vec<TransactRead>) -> DynaflowResult<Vec<Option<Item>>> {
        let output = self.transact_get_raw(reads, None).await?;
        Ok(output.responses.into_iter().map(|r| r.item).collect())
    }

    pub async fn transact_get_raw(
        &self,
        reads: Vec<TransactRead>,
        return_consumed_capacity: Option<ReturnConsumedCapacity>,
    ) -> DynaflowResult<TransactGetItemsOutput> {
        let request = compose_get(reads, return_consumed_capacity)?;
        self.executor.send(&request).await
    }

    /// Names of the tables visible to the client.
    pub async fn list_tables(&self, options: ListTablesOptions) -> DynaflowResult<Vec<String>> {
        Ok(self.list_tables_raw(options).await?.into_items())
    }

    pub async fn list_tables_raw(
        &self,
        options: ListTablesOptions,
    ) -> DynaflowResult<AggregatedResult<String, String>> {
        let pending = options.finalize()?;
        paginate::<ListTablesInput>(&self.executor, pending.request, pending.paging).await
    }
}

#[cfg(test)]
mod tests {
    use dynaflow_model::{AttributeValue, DynamoDBOperation};
    use serde_json::json;

    use super::*;
    use crate::error::DynaflowError;
    use crate::expression::condition::{attribute_not_exists, gt};
    use crate::expression::update::increment;
    use crate::test_support::{MemoryClient, Reply, item, page};

    fn table(client: Arc<MemoryClient>) -> Dynaflow {
        Dynaflow::new(client, "t", ExecutorConfig::default()).expect("valid config")
    }

    fn key(id: &str) -> Key {
        [("pk".to_owned(), AttributeValue::from(id))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_should_reject_invalid_config() {
        let mut config = ExecutorConfig::default();
        config.patience_ratio = 0.0;
        assert!(Dynaflow::new(MemoryClient::new(), "t", config).is_err());
    }

    #[tokio::test]
    async fn test_should_return_written_item_from_put() {
        let client = MemoryClient::new();
        client.on(DynamoDBOperation::PutItem, |_| Reply::empty());
        let written = table(client.clone())
            .put(
                key("a"),
                PutOptions::default().when(attribute_not_exists("pk")),
            )
            .await
            .expect("put");
        assert_eq!(written, key("a"));

        let calls = client.calls(DynamoDBOperation::PutItem);
        assert_eq!(
            calls[0],
            json!({
                "TableName": "t",
                "Item": { "pk": { "S": "a" } },
                "ConditionExpression": "attribute_not_exists(#n0)",
                "ExpressionAttributeNames": { "#n0": "pk" },
            })
        );
    }

    #[tokio::test]
    async fn test_should_return_none_for_missing_item() {
        let client = MemoryClient::new();
        client.on(DynamoDBOperation::GetItem, |_| Reply::empty());
        let found = table(client)
            .get(key("missing"), GetOptions::default())
            .await
            .expect("get");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_should_query_all_pages_with_filter() {
        let client = MemoryClient::new();
        client.script(
            DynamoDBOperation::Query,
            vec![
                Reply::Ok(page(&["a", "b"], Some("b"))),
                Reply::Ok(page(&["c"], None)),
            ],
        );
        let items = table(client.clone())
            .query(&key("p"), QueryOptions::default().filter(gt("score", 10_i32)))
            .await
            .expect("query");
        assert_eq!(items.len(), 3);

        let calls = client.calls(DynamoDBOperation::Query);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0]["KeyConditionExpression"], "#n0 = :v0");
        assert_eq!(calls[0]["FilterExpression"], "#n1 > :v1");
        assert!(calls[1].get("ExclusiveStartKey").is_some());
    }

    #[tokio::test]
    async fn test_should_scan_with_configured_segments() {
        let client = MemoryClient::new();
        client.on(DynamoDBOperation::Scan, |_| Reply::Ok(page(&["x"], None)));
        let mut config = ExecutorConfig::default();
        config.scan_segments = 4;
        let items = Dynaflow::new(client.clone(), "t", config)
            .expect("config")
            .scan(ScanOptions::default())
            .await
            .expect("scan");
        assert_eq!(items.len(), 4);
        assert_eq!(client.calls(DynamoDBOperation::Scan).len(), 4);
    }

    #[tokio::test]
    async fn test_should_return_batch_items_for_table() {
        let client = MemoryClient::new();
        client.on(DynamoDBOperation::BatchGetItem, |_| {
            Reply::Ok(json!({ "Responses": { "t": [item("a"), item("b")] } }))
        });
        let items = table(client)
            .batch_get(vec![key("a"), key("b")], BatchGetOptions::default())
            .await
            .expect("batch get");
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_should_reject_oversized_transaction_before_calling() {
        let client = MemoryClient::new();
        let actions = (0..26)
            .map(|i| {
                TransactAction::update(
                    "t",
                    key(&i.to_string()),
                    UpdateOptions::default().apply(increment("n", 1_i32)),
                )
                .expect("action")
            })
            .collect();
        let err = table(client.clone())
            .transact_write(actions, TransactWriteOptions::default())
            .await
            .expect_err("26 actions");
        assert!(matches!(err, DynaflowError::Validation(_)));
        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_should_keep_transact_get_order() {
        let client = MemoryClient::new();
        client.on(DynamoDBOperation::TransactGetItems, |_| {
            Reply::Ok(json!({ "Responses": [{ "Item": item("b") }, {}] }))
        });
        let reads = vec![
            TransactRead::get("t", key("b"), GetOptions::default()).expect("read"),
            TransactRead::get("t", key("z"), GetOptions::default()).expect("read"),
        ];
        let items = table(client).transact_get(reads).await.expect("transact get");
        assert_eq!(items.len(), 2);
        assert!(items[0].is_some());
        assert!(items[1].is_none());
    }

    #[tokio::test]
    async fn test_should_follow_list_tables_cursor() {
        let client = MemoryClient::new();
        client.script(
            DynamoDBOperation::ListTables,
            vec![
                Reply::Ok(json!({ "TableNames": ["a", "b"], "LastEvaluatedTableName": "b" })),
                Reply::Ok(json!({ "TableNames": ["c"] })),
            ],
        );
        let names = table(client.clone())
            .list_tables(ListTablesOptions::default())
            .await
            .expect("list tables");
        assert_eq!(names, vec!["a", "b", "c"]);
        let calls = client.calls(DynamoDBOperation::ListTables);
        assert_eq!(calls[1]["ExclusiveStartTableName"], "b");

        let err = table(client)
            .list_tables(ListTablesOptions::default().limit(101))
            .await
            .expect_err("limit too large");
        assert!(matches!(err, DynaflowError::Validation(_)));
    }
}

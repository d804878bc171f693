//! Cursor-following pagination and result aggregation.

use dynaflow_model::input::{ListTablesInput, QueryInput, ScanInput};
use dynaflow_model::output::{ListTablesOutput, QueryOutput, ScanOutput};
use dynaflow_model::types::ConsumedCapacity;
use dynaflow_model::{Item, Key};
use tracing::debug;

use crate::error::DynaflowResult;
use crate::retry::RetryableExecutor;
use crate::transport::Command;

/// The parts of one page the paginator cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<I, C> {
    pub items: Vec<I>,
    pub count: usize,
    pub scanned_count: usize,
    pub consumed_capacity: Option<ConsumedCapacity>,
    pub cursor: Option<C>,
}

/// A command whose response may continue on a further page.
pub trait PagedCommand: Command {
    /// One element of a page.
    type Item: Send;
    /// Opaque continuation token.
    type Cursor: Clone + Send;

    /// Resume the request after `cursor`.
    fn set_cursor(&mut self, cursor: Self::Cursor);

    /// Take a response apart.
    fn into_page(output: Self::Output) -> Page<Self::Item, Self::Cursor>;
}

/// How far to follow cursors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Paging {
    /// Stop once this many items were collected, truncating the surplus.
    pub limit: Option<usize>,
    /// Fetch one page and hand its cursor back to the caller.
    pub single_page: bool,
}

/// Items, counts and capacity accumulated across pages, segments or chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResult<I = Item, C = Key> {
    pub items: Vec<I>,
    pub count: usize,
    pub scanned_count: usize,
    pub consumed_capacity: Option<ConsumedCapacity>,
    /// Where to resume; only set in single-page mode.
    pub cursor: Option<C>,
}

impl<I, C> Default for AggregatedResult<I, C> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            scanned_count: 0,
            consumed_capacity: None,
            cursor: None,
        }
    }
}

impl<I, C> AggregatedResult<I, C> {
    /// Fold one page in; the page's cursor is not kept.
    pub fn absorb(&mut self, page: Page<I, C>) {
        self.items.extend(page.items);
        self.count += page.count;
        self.scanned_count += page.scanned_count;
        add_capacity(&mut self.consumed_capacity, page.consumed_capacity);
    }

    /// Fold another aggregate in, as when joining scan segments.
    pub fn merge(&mut self, other: Self) {
        self.items.extend(other.items);
        self.count += other.count;
        self.scanned_count += other.scanned_count;
        add_capacity(&mut self.consumed_capacity, other.consumed_capacity);
        if self.cursor.is_none() {
            self.cursor = other.cursor;
        }
    }

    /// Keep at most `limit` items; `count` then reflects what is kept.
    pub fn truncate(&mut self, limit: usize) {
        if self.items.len() >= limit {
            self.items.truncate(limit);
            self.count = self.items.len();
        }
    }

    #[must_use]
    pub fn into_items(self) -> Vec<I> {
        self.items
    }
}

/// Add `next` into `acc`: capacity units are summed, every other field is
/// taken from whichever report came first.
pub fn add_capacity(acc: &mut Option<ConsumedCapacity>, next: Option<ConsumedCapacity>) {
    let Some(next) = next else {
        return;
    };
    match acc {
        None => *acc = Some(next),
        Some(acc) => {
            acc.capacity_units = sum_units(acc.capacity_units, next.capacity_units);
            acc.read_capacity_units = sum_units(acc.read_capacity_units, next.read_capacity_units);
            acc.write_capacity_units =
                sum_units(acc.write_capacity_units, next.write_capacity_units);
        }
    }
}

/// Add per-table reports into `acc`, matching entries by table name.
pub fn add_table_capacities(acc: &mut Vec<ConsumedCapacity>, next: Vec<ConsumedCapacity>) {
    for report in next {
        match acc.iter_mut().find(|c| c.table_name == report.table_name) {
            Some(existing) => {
                let mut merged = Some(existing.clone());
                add_capacity(&mut merged, Some(report));
                if let Some(merged) = merged {
                    *existing = merged;
                }
            }
            None => acc.push(report),
        }
    }
}

fn sum_units(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
    }
}

/// Drive `request` page by page.
///
/// Page `n + 1` is only sent once page `n` has arrived. The loop ends when
/// a page carries no cursor, after the first page in single-page mode, or
/// once `paging.limit` items are collected, in which case the items are
/// truncated to exactly the limit. The request's own `Limit` is never
/// lowered to fit the remainder.
pub async fn paginate<C: PagedCommand>(
    executor: &RetryableExecutor,
    mut request: C,
    paging: Paging,
) -> DynaflowResult<AggregatedResult<C::Item, C::Cursor>> {
    let mut result = AggregatedResult::default();
    let mut pages = 0_usize;
    loop {
        let output = executor.send(&request).await?;
        let mut page = C::into_page(output);
        pages += 1;
        let cursor = page.cursor.take();
        debug!(
            operation = %C::OPERATION,
            page = pages,
            items = page.items.len(),
            more = cursor.is_some(),
            "fetched page"
        );
        result.absorb(page);

        if paging.single_page {
            result.cursor = cursor;
            if let Some(limit) = paging.limit {
                result.truncate(limit);
            }
            return Ok(result);
        }
        if let Some(limit) = paging.limit {
            if result.items.len() >= limit {
                result.truncate(limit);
                return Ok(result);
            }
        }
        match cursor {
            Some(cursor) => request.set_cursor(cursor),
            None => return Ok(result),
        }
    }
}

fn non_empty(key: Key) -> Option<Key> {
    (!key.is_empty()).then_some(key)
}

fn to_count(count: i32) -> usize {
    usize::try_from(count).unwrap_or(0)
}

impl PagedCommand for QueryInput {
    type Item = Item;
    type Cursor = Key;

    fn set_cursor(&mut self, cursor: Key) {
        self.exclusive_start_key = cursor;
    }

    fn into_page(output: QueryOutput) -> Page<Item, Key> {
        Page {
            items: output.items,
            count: to_count(output.count),
            scanned_count: to_count(output.scanned_count),
            consumed_capacity: output.consumed_capacity,
            cursor: non_empty(output.last_evaluated_key),
        }
    }
}

impl PagedCommand for ScanInput {
    type Item = Item;
    type Cursor = Key;

    fn set_cursor(&mut self, cursor: Key) {
        self.exclusive_start_key = cursor;
    }

    fn into_page(output: ScanOutput) -> Page<Item, Key> {
        Page {
            items: output.items,
            count: to_count(output.count),
            scanned_count: to_count(output.scanned_count),
            consumed_capacity: output.consumed_capacity,
            cursor: non_empty(output.last_evaluated_key),
        }
    }
}

impl PagedCommand for ListTablesInput {
    type Item = String;
    type Cursor = String;

    fn set_cursor(&mut self, cursor: String) {
        self.exclusive_start_table_name = Some(cursor);
    }

    fn into_page(output: ListTablesOutput) -> Page<String, String> {
        let count = output.table_names.len();
        Page {
            items: output.table_names,
            count,
            scanned_count: count,
            consumed_capacity: None,
            cursor: output.last_evaluated_table_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dynaflow_model::DynamoDBOperation;

    use super::*;
    use crate::config::ExecutorConfig;
    use crate::test_support::{MemoryClient, Reply, page};

    fn executor(client: Arc<MemoryClient>) -> RetryableExecutor {
        RetryableExecutor::new(client, ExecutorConfig::default())
    }

    fn three_pages(client: &MemoryClient) {
        client.script(
            DynamoDBOperation::Query,
            vec![
                Reply::Ok(page(&["a", "b"], Some("b"))),
                Reply::Ok(page(&["c", "d"], Some("d"))),
                Reply::Ok(page(&["e"], None)),
            ],
        );
    }

    #[tokio::test]
    async fn test_should_follow_cursors_until_exhausted() {
        let client = MemoryClient::new();
        three_pages(&client);
        let result = paginate(&executor(client.clone()), QueryInput::default(), Paging::default())
            .await
            .expect("paginate");
        assert_eq!(result.items.len(), 5);
        assert_eq!(result.count, 5);
        assert_eq!(result.scanned_count, 5);
        assert!(result.cursor.is_none());
        let capacity = result.consumed_capacity.expect("capacity reported");
        assert_eq!(capacity.capacity_units, Some(1.5));
        assert_eq!(capacity.table_name.as_deref(), Some("t"));

        let calls = client.calls(DynamoDBOperation::Query);
        assert_eq!(calls.len(), 3);
        assert!(calls[0].get("ExclusiveStartKey").is_none());
        assert_eq!(calls[1]["ExclusiveStartKey"]["pk"]["S"], "b");
        assert_eq!(calls[2]["ExclusiveStartKey"]["pk"]["S"], "d");
    }

    #[tokio::test]
    async fn test_should_truncate_to_limit_client_side() {
        let client = MemoryClient::new();
        three_pages(&client);
        let mut request = QueryInput::default();
        request.limit = Some(2);
        let paging = Paging {
            limit: Some(3),
            single_page: false,
        };
        let result = paginate(&executor(client.clone()), request, paging)
            .await
            .expect("paginate");
        assert_eq!(result.items.len(), 3);
        assert_eq!(result.count, 3);
        let calls = client.calls(DynamoDBOperation::Query);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1]["Limit"], 2);
    }

    #[tokio::test]
    async fn test_should_return_cursor_in_single_page_mode() {
        let client = MemoryClient::new();
        three_pages(&client);
        let paging = Paging {
            limit: None,
            single_page: true,
        };
        let result = paginate(&executor(client.clone()), QueryInput::default(), paging)
            .await
            .expect("paginate");
        assert_eq!(result.items.len(), 2);
        let cursor = result.cursor.expect("more pages");
        assert_eq!(cursor["pk"].as_s(), Some("b"));
        assert_eq!(client.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_should_page_through_table_names() {
        let client = MemoryClient::new();
        client.script(
            DynamoDBOperation::ListTables,
            vec![
                Reply::Ok(serde_json::json!({
                    "TableNames": ["a", "b"],
                    "LastEvaluatedTableName": "b",
                })),
                Reply::Ok(serde_json::json!({ "TableNames": ["c"] })),
            ],
        );
        let result = paginate(
            &executor(client.clone()),
            ListTablesInput::default(),
            Paging::default(),
        )
        .await
        .expect("paginate");
        assert_eq!(result.items, vec!["a", "b", "c"]);
        let calls = client.calls(DynamoDBOperation::ListTables);
        assert_eq!(calls[1]["ExclusiveStartTableName"], "b");
    }

    #[test]
    fn test_should_merge_capacity_per_table() {
        let report = |table: &str, units: f64| ConsumedCapacity {
            table_name: Some(table.to_owned()),
            capacity_units: Some(units),
            ..ConsumedCapacity::default()
        };
        let mut acc = vec![report("a", 1.0)];
        add_table_capacities(&mut acc, vec![report("b", 2.0), report("a", 0.5)]);
        assert_eq!(acc, vec![report("a", 1.5), report("b", 2.0)]);
    }
}

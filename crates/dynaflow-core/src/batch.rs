//! Batch fan-out: provider-sized chunks, run concurrently, each resubmitting
//! its unprocessed remainder until the store reports none.

use dynaflow_model::input::{BatchGetItemInput, BatchWriteItemInput};
use dynaflow_model::output::{BatchGetItemOutput, BatchWriteItemOutput};
use dynaflow_model::types::{
    KeysAndAttributes, ReturnConsumedCapacity, ReturnItemCollectionMetrics, WriteRequest,
};
use dynaflow_model::Key;
use futures::future::join_all;
use tracing::debug;

use crate::error::{DynaflowError, DynaflowResult};
use crate::paginate::add_table_capacities;
use crate::request::{MAX_KEY_ATTRIBUTES, validate_key};
use crate::retry::RetryableExecutor;
use crate::transport::Command;

/// Keys per `BatchGetItem` call.
pub const BATCH_GET_LIMIT: usize = 100;
/// Requests per `BatchWriteItem` call.
pub const BATCH_WRITE_LIMIT: usize = 25;

/// A batch command the store may only partly process.
pub trait Resubmit: Command<Output: Default> {
    /// Take the unprocessed remainder out of `output` as a new request.
    fn remainder(&self, output: &mut Self::Output) -> Option<Self>;

    /// Fold `output` into `acc`.
    fn merge(acc: &mut Self::Output, output: Self::Output);
}

impl Resubmit for BatchGetItemInput {
    fn remainder(&self, output: &mut BatchGetItemOutput) -> Option<Self> {
        let mut unprocessed = std::mem::take(&mut output.unprocessed_keys);
        unprocessed.retain(|_, entry| !entry.keys.is_empty());
        (!unprocessed.is_empty()).then(|| Self {
            request_items: unprocessed,
            return_consumed_capacity: self.return_consumed_capacity,
        })
    }

    fn merge(acc: &mut BatchGetItemOutput, output: BatchGetItemOutput) {
        for (table, items) in output.responses {
            acc.responses.entry(table).or_default().extend(items);
        }
        add_table_capacities(&mut acc.consumed_capacity, output.consumed_capacity);
    }
}

impl Resubmit for BatchWriteItemInput {
    fn remainder(&self, output: &mut BatchWriteItemOutput) -> Option<Self> {
        let mut unprocessed = std::mem::take(&mut output.unprocessed_items);
        unprocessed.retain(|_, requests| !requests.is_empty());
        (!unprocessed.is_empty()).then(|| Self {
            request_items: unprocessed,
            return_consumed_capacity: self.return_consumed_capacity,
            return_item_collection_metrics: self.return_item_collection_metrics,
        })
    }

    fn merge(acc: &mut BatchWriteItemOutput, output: BatchWriteItemOutput) {
        for (table, metrics) in output.item_collection_metrics {
            acc.item_collection_metrics
                .entry(table)
                .or_default()
                .extend(metrics);
        }
        add_table_capacities(&mut acc.consumed_capacity, output.consumed_capacity);
    }
}

/// Send `request`, then its remainders, until nothing is left.
///
/// Every call goes through the executor's retry loop. Between rounds the
/// executor's backoff schedule is applied so a throttled table is not
/// hammered with the same remainder.
pub async fn run_until_processed<C>(
    executor: &RetryableExecutor,
    mut request: C,
) -> DynaflowResult<C::Output>
where
    C: Resubmit,
{
    let mut acc = C::Output::default();
    let mut round = 0;
    loop {
        let mut output = executor.send(&request).await?;
        let remainder = request.remainder(&mut output);
        C::merge(&mut acc, output);
        let Some(next) = remainder else {
            return Ok(acc);
        };
        round += 1;
        let delay = executor.config().retry.delay_for(round);
        debug!(operation = %C::OPERATION, round, ?delay, "resubmitting unprocessed remainder");
        tokio::time::sleep(delay).await;
        request = next;
    }
}

/// Split `units` into chunks of `chunk_size`, run them concurrently and
/// merge the outputs in chunk order.
///
/// Every chunk is awaited before anything is returned; if any failed, the
/// first failure in chunk order is returned and all output is discarded.
async fn fan_out<U, C, F>(
    executor: &RetryableExecutor,
    units: Vec<U>,
    chunk_size: usize,
    build: F,
) -> DynaflowResult<C::Output>
where
    U: Clone,
    C: Resubmit,
    F: Fn(Vec<U>) -> C,
{
    let chunks: Vec<C> = units.chunks(chunk_size).map(|c| build(c.to_vec())).collect();
    debug!(operation = %C::OPERATION, chunks = chunks.len(), "fanning out batch");

    let outcomes = join_all(
        chunks
            .into_iter()
            .map(|chunk| run_until_processed(executor, chunk)),
    )
    .await;

    let mut acc = C::Output::default();
    for outcome in outcomes {
        C::merge(&mut acc, outcome?);
    }
    Ok(acc)
}

/// Read `keys` from `table` in chunks of [`BATCH_GET_LIMIT`].
///
/// `template` carries the projection and consistency settings copied into
/// every chunk.
pub async fn batch_get(
    executor: &RetryableExecutor,
    table: &str,
    keys: Vec<Key>,
    template: KeysAndAttributes,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
) -> DynaflowResult<BatchGetItemOutput> {
    if keys.is_empty() {
        return Err(DynaflowError::validation("At least one key must be provided"));
    }
    for key in &keys {
        validate_key(key, MAX_KEY_ATTRIBUTES)?;
    }
    fan_out(executor, keys, BATCH_GET_LIMIT, |keys| BatchGetItemInput {
        request_items: [(
            table.to_owned(),
            KeysAndAttributes {
                keys,
                ..template.clone()
            },
        )]
        .into_iter()
        .collect(),
        return_consumed_capacity,
    })
    .await
}

/// Apply `requests` to `table` in chunks of [`BATCH_WRITE_LIMIT`].
pub async fn batch_write(
    executor: &RetryableExecutor,
    table: &str,
    requests: Vec<WriteRequest>,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
    return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
) -> DynaflowResult<BatchWriteItemOutput> {
    if requests.is_empty() {
        return Err(DynaflowError::validation(
            "At least one write request must be provided",
        ));
    }
    fan_out(executor, requests, BATCH_WRITE_LIMIT, |requests| {
        BatchWriteItemInput {
            request_items: [(table.to_owned(), requests)].into_iter().collect(),
            return_consumed_capacity,
            return_item_collection_metrics,
        }
    })
    .await
}

//! Immutable option records for every operation.
//!
//! Each record starts from `Default`, every setter consumes the record and
//! returns the updated value, and a single `finalize` call validates the
//! options, compiles their expressions and produces the
//! [`PendingOperation`] the executor consumes. Validation therefore runs
//! exactly once, before any network call; retries resend the finalized
//! request.

use dynaflow_model::input::{
    DeleteItemInput, GetItemInput, ListTablesInput, PutItemInput, QueryInput, ScanInput,
    UpdateItemInput,
};
use dynaflow_model::types::{
    KeysAndAttributes, ReturnConsumedCapacity, ReturnItemCollectionMetrics, ReturnValue, Select,
    WriteRequest,
};
use dynaflow_model::{Item, Key};

use crate::error::{DynaflowError, DynaflowResult};
use crate::expression::{AttributePath, Condition, UpdateAction};
use crate::paginate::Paging;
use crate::request::{
    ExpressionSet, MAX_KEY_ATTRIBUTES, RequestParameters, assemble, partition_key_condition,
    validate_key,
};

/// Most table names one `ListTables` page may return.
pub const MAX_LIST_TABLES_LIMIT: usize = 100;

/// One finalized logical call.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation<R> {
    /// The request sent on every attempt.
    pub request: R,
    /// Cursor handling for paged operations.
    pub paging: Paging,
    /// Parallel segments for scans.
    pub segments: Option<u32>,
}

impl<R> PendingOperation<R> {
    fn single(request: R) -> Self {
        Self {
            request,
            paging: Paging::default(),
            segments: None,
        }
    }
}

/// Keys of a batch read plus the settings shared by every chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchGetRequest {
    pub table: String,
    pub keys: Vec<Key>,
    pub template: KeysAndAttributes,
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

/// Write requests of a batch write.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchWriteRequest {
    pub table: String,
    pub requests: Vec<WriteRequest>,
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
    pub return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

/// Query result order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// How a scan is split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Segmentation {
    /// The executor's configured segment count.
    #[default]
    Default,
    /// A single sequential scan.
    Disabled,
    /// This many parallel segments.
    Total(u32),
    /// Only segment `segment` of `total`.
    Only { segment: u32, total: u32 },
}

fn extend_paths<I, P>(target: &mut Vec<AttributePath>, paths: I)
where
    I: IntoIterator<Item = P>,
    P: Into<AttributePath>,
{
    target.extend(paths.into_iter().map(Into::into));
}

fn check_limit(limit: Option<usize>) -> DynaflowResult<Option<i32>> {
    match limit {
        None => Ok(None),
        Some(0) => Err(DynaflowError::validation("The limit must be positive")),
        Some(limit) => Ok(Some(i32::try_from(limit).unwrap_or(i32::MAX))),
    }
}

fn to_wire_segment(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Options of a single item read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetOptions {
    projection: Vec<AttributePath>,
    consistent_read: bool,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

impl GetOptions {
    /// Only return these attributes.
    #[must_use]
    pub fn select<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<AttributePath>,
    {
        extend_paths(&mut self.projection, paths);
        self
    }

    #[must_use]
    pub fn consistent_read(mut self, consistent: bool) -> Self {
        self.consistent_read = consistent;
        self
    }

    #[must_use]
    pub fn return_consumed_capacity(mut self, mode: ReturnConsumedCapacity) -> Self {
        self.return_consumed_capacity = Some(mode);
        self
    }

    /// Compiled parameters, shared with transactional reads.
    pub(crate) fn parameters(self, table: &str, key: Key) -> DynaflowResult<RequestParameters> {
        validate_key(&key, MAX_KEY_ATTRIBUTES)?;
        let mut params = RequestParameters::for_table(table);
        params.key = key;
        params.consistent_read = self.consistent_read.then_some(true);
        params.return_consumed_capacity = self.return_consumed_capacity;
        assemble(
            params,
            ExpressionSet {
                projection: self.projection,
                ..ExpressionSet::default()
            },
        )
    }

    pub fn finalize(self, table: &str, key: Key) -> DynaflowResult<PendingOperation<GetItemInput>> {
        Ok(PendingOperation::single(self.parameters(table, key)?.into_get_item()))
    }
}

/// Options of a single item write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutOptions {
    conditions: Vec<Condition>,
    return_values: Option<ReturnValue>,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
    return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

impl PutOptions {
    /// Only write if `condition` holds. Repeated calls are conjoined and
    /// `None` is ignored.
    #[must_use]
    pub fn when(mut self, condition: impl Into<Option<Condition>>) -> Self {
        self.conditions.extend(condition.into());
        self
    }

    #[must_use]
    pub fn return_values(mut self, values: ReturnValue) -> Self {
        self.return_values = Some(values);
        self
    }

    #[must_use]
    pub fn return_consumed_capacity(mut self, mode: ReturnConsumedCapacity) -> Self {
        self.return_consumed_capacity = Some(mode);
        self
    }

    #[must_use]
    pub fn return_item_collection_metrics(mut self, mode: ReturnItemCollectionMetrics) -> Self {
        self.return_item_collection_metrics = Some(mode);
        self
    }

    pub(crate) fn parameters(self, table: &str, item: Item) -> DynaflowResult<RequestParameters> {
        if item.is_empty() {
            return Err(DynaflowError::validation("The item must not be empty"));
        }
        let mut params = RequestParameters::for_table(table);
        params.item = item;
        params.return_values = self.return_values;
        params.return_consumed_capacity = self.return_consumed_capacity;
        params.return_item_collection_metrics = self.return_item_collection_metrics;
        assemble(
            params,
            ExpressionSet {
                conditions: self.conditions,
                ..ExpressionSet::default()
            },
        )
    }

    pub fn finalize(self, table: &str, item: Item) -> DynaflowResult<PendingOperation<PutItemInput>> {
        Ok(PendingOperation::single(self.parameters(table, item)?.into_put_item()))
    }
}

/// Options of a single item update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    actions: Vec<UpdateAction>,
    conditions: Vec<Condition>,
    return_values: Option<ReturnValue>,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
    return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

impl UpdateOptions {
    /// Add an action; see [`crate::expression::update`] for builders.
    #[must_use]
    pub fn apply(mut self, action: UpdateAction) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn apply_all(mut self, actions: impl IntoIterator<Item = UpdateAction>) -> Self {
        self.actions.extend(actions);
        self
    }

    #[must_use]
    pub fn when(mut self, condition: impl Into<Option<Condition>>) -> Self {
        self.conditions.extend(condition.into());
        self
    }

    #[must_use]
    pub fn return_values(mut self, values: ReturnValue) -> Self {
        self.return_values = Some(values);
        self
    }

    #[must_use]
    pub fn return_consumed_capacity(mut self, mode: ReturnConsumedCapacity) -> Self {
        self.return_consumed_capacity = Some(mode);
        self
    }

    #[must_use]
    pub fn return_item_collection_metrics(mut self, mode: ReturnItemCollectionMetrics) -> Self {
        self.return_item_collection_metrics = Some(mode);
        self
    }

    pub(crate) fn parameters(self, table: &str, key: Key) -> DynaflowResult<RequestParameters> {
        validate_key(&key, MAX_KEY_ATTRIBUTES)?;
        let mut params = RequestParameters::for_table(table);
        params.key = key;
        params.return_values = self.return_values;
        params.return_consumed_capacity = self.return_consumed_capacity;
        params.return_item_collection_metrics = self.return_item_collection_metrics;
        assemble(
            params,
            ExpressionSet {
                conditions: self.conditions,
                updates: self.actions,
                ..ExpressionSet::default()
            },
        )
    }

    pub fn finalize(
        self,
        table: &str,
        key: Key,
    ) -> DynaflowResult<PendingOperation<UpdateItemInput>> {
        Ok(PendingOperation::single(self.parameters(table, key)?.into_update_item()))
    }
}

/// Options of a single item delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOptions {
    conditions: Vec<Condition>,
    return_values: Option<ReturnValue>,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
    return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

impl DeleteOptions {
    #[must_use]
    pub fn when(mut self, condition: impl Into<Option<Condition>>) -> Self {
        self.conditions.extend(condition.into());
        self
    }

    #[must_use]
    pub fn return_values(mut self, values: ReturnValue) -> Self {
        self.return_values = Some(values);
        self
    }

    #[must_use]
    pub fn return_consumed_capacity(mut self, mode: ReturnConsumedCapacity) -> Self {
        self.return_consumed_capacity = Some(mode);
        self
    }

    #[must_use]
    pub fn return_item_collection_metrics(mut self, mode: ReturnItemCollectionMetrics) -> Self {
        self.return_item_collection_metrics = Some(mode);
        self
    }

    pub(crate) fn parameters(self, table: &str, key: Key) -> DynaflowResult<RequestParameters> {
        validate_key(&key, MAX_KEY_ATTRIBUTES)?;
        let mut params = RequestParameters::for_table(table);
        params.key = key;
        params.return_values = self.return_values;
        params.return_consumed_capacity = self.return_consumed_capacity;
        params.return_item_collection_metrics = self.return_item_collection_metrics;
        assemble(
            params,
            ExpressionSet {
                conditions: self.conditions,
                ..ExpressionSet::default()
            },
        )
    }

    pub fn finalize(
        self,
        table: &str,
        key: Key,
    ) -> DynaflowResult<PendingOperation<DeleteItemInput>> {
        Ok(PendingOperation::single(self.parameters(table, key)?.into_delete_item()))
    }
}

/// Settings shared by query and scan.
#[derive(Debug, Clone, Default, PartialEq)]
struct ReadSettings {
    filters: Vec<Condition>,
    projection: Vec<AttributePath>,
    index_name: Option<String>,
    consistent_read: bool,
    limit: Option<usize>,
    single_page: bool,
    start_key: Key,
    select: Option<Select>,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

impl ReadSettings {
    fn parameters(&self, table: &str) -> DynaflowResult<RequestParameters> {
        let mut params = RequestParameters::for_table(table);
        params.index_name.clone_from(&self.index_name);
        params.consistent_read = self.consistent_read.then_some(true);
        params.limit = check_limit(self.limit)?;
        params.exclusive_start_key.clone_from(&self.start_key);
        params.select = self.select;
        params.return_consumed_capacity = self.return_consumed_capacity;
        Ok(params)
    }

    fn paging(&self) -> Paging {
        Paging {
            limit: self.limit,
            single_page: self.single_page,
        }
    }
}

macro_rules! read_setters {
    ($record:ty) => {
        impl $record {
            /// Keep only items matching `condition`. Repeated calls are
            /// conjoined and `None` is ignored.
            #[must_use]
            pub fn filter(mut self, condition: impl Into<Option<Condition>>) -> Self {
                self.read.filters.extend(condition.into());
                self
            }

            /// Only return these attributes.
            #[must_use]
            pub fn select<I, P>(mut self, paths: I) -> Self
            where
                I: IntoIterator<Item = P>,
                P: Into<AttributePath>,
            {
                extend_paths(&mut self.read.projection, paths);
                self
            }

            /// Read from a secondary index. Consistent reads are dropped.
            #[must_use]
            pub fn index(mut self, name: impl Into<String>) -> Self {
                self.read.index_name = Some(name.into());
                self
            }

            #[must_use]
            pub fn consistent_read(mut self, consistent: bool) -> Self {
                self.read.consistent_read = consistent;
                self
            }

            /// Stop after this many items.
            #[must_use]
            pub fn limit(mut self, limit: usize) -> Self {
                self.read.limit = Some(limit);
                self
            }

            /// Fetch one page and return its cursor.
            #[must_use]
            pub fn single_page(mut self) -> Self {
                self.read.single_page = true;
                self
            }

            /// Resume after `key`, a cursor returned by an earlier call.
            #[must_use]
            pub fn start(mut self, key: Key) -> Self {
                self.read.start_key = key;
                self
            }

            #[must_use]
            pub fn select_mode(mut self, select: Select) -> Self {
                self.read.select = Some(select);
                self
            }

            #[must_use]
            pub fn return_consumed_capacity(mut self, mode: ReturnConsumedCapacity) -> Self {
                self.read.return_consumed_capacity = Some(mode);
                self
            }
        }
    };
}

/// Options of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    read: ReadSettings,
    key_conditions: Vec<Condition>,
    order: SortOrder,
}

read_setters!(QueryOptions);

impl QueryOptions {
    /// Add a sort key condition.
    #[must_use]
    pub fn having(mut self, condition: impl Into<Option<Condition>>) -> Self {
        self.key_conditions.extend(condition.into());
        self
    }

    #[must_use]
    pub fn sort(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Validate and compile. `partition_key` holds exactly the partition
    /// key attribute, which becomes the leading key condition.
    pub fn finalize(
        self,
        table: &str,
        partition_key: &Key,
    ) -> DynaflowResult<PendingOperation<QueryInput>> {
        let mut key_conditions = Vec::with_capacity(self.key_conditions.len() + 1);
        key_conditions.push(partition_key_condition(partition_key)?);
        key_conditions.extend(self.key_conditions);

        let mut params = self.read.parameters(table)?;
        if self.order == SortOrder::Descending {
            params.scan_index_forward = Some(false);
        }
        let paging = self.read.paging();
        let params = assemble(
            params,
            ExpressionSet {
                projection: self.read.projection,
                key_conditions,
                filters: self.read.filters,
                ..ExpressionSet::default()
            },
        )?;
        Ok(PendingOperation {
            request: params.into_query(),
            paging,
            segments: None,
        })
    }
}

/// Options of a scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOptions {
    read: ReadSettings,
    segmentation: Segmentation,
}

read_setters!(ScanOptions);

impl ScanOptions {
    /// Split the scan into `total` parallel segments.
    #[must_use]
    pub fn total_segments(mut self, total: u32) -> Self {
        self.segmentation = Segmentation::Total(total);
        self
    }

    /// Scan only `segment` of `total`.
    #[must_use]
    pub fn segment(mut self, segment: u32, total: u32) -> Self {
        self.segmentation = Segmentation::Only { segment, total };
        self
    }

    /// Scan sequentially.
    #[must_use]
    pub fn disable_segments(mut self) -> Self {
        self.segmentation = Segmentation::Disabled;
        self
    }

    /// Validate and compile; `default_segments` applies unless overridden.
    pub fn finalize(
        self,
        table: &str,
        default_segments: u32,
    ) -> DynaflowResult<PendingOperation<ScanInput>> {
        let mut params = self.read.parameters(table)?;
        let segments = match self.segmentation {
            Segmentation::Default => Some(default_segments),
            Segmentation::Disabled => None,
            Segmentation::Total(total) => Some(total),
            Segmentation::Only { segment, total } => {
                params.segment = Some(to_wire_segment(segment));
                params.total_segments = Some(to_wire_segment(total));
                None
            }
        };
        let paging = self.read.paging();
        let params = assemble(
            params,
            ExpressionSet {
                projection: self.read.projection,
                filters: self.read.filters,
                ..ExpressionSet::default()
            },
        )?;
        Ok(PendingOperation {
            request: params.into_scan(),
            paging,
            segments,
        })
    }
}

/// Options of a batch read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetOptions {
    projection: Vec<AttributePath>,
    consistent_read: bool,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

impl BatchGetOptions {
    #[must_use]
    pub fn select<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<AttributePath>,
    {
        extend_paths(&mut self.projection, paths);
        self
    }

    #[must_use]
    pub fn consistent_read(mut self, consistent: bool) -> Self {
        self.consistent_read = consistent;
        self
    }

    #[must_use]
    pub fn return_consumed_capacity(mut self, mode: ReturnConsumedCapacity) -> Self {
        self.return_consumed_capacity = Some(mode);
        self
    }

    pub fn finalize(
        self,
        table: &str,
        keys: Vec<Key>,
    ) -> DynaflowResult<PendingOperation<BatchGetRequest>> {
        if keys.is_empty() {
            return Err(DynaflowError::validation("At least one key must be provided"));
        }
        for key in &keys {
            validate_key(key, MAX_KEY_ATTRIBUTES)?;
        }
        let mut params = RequestParameters::for_table(table);
        params.consistent_read = self.consistent_read.then_some(true);
        let params = assemble(
            params,
            ExpressionSet {
                projection: self.projection,
                ..ExpressionSet::default()
            },
        )?;
        Ok(PendingOperation::single(BatchGetRequest {
            table: table.to_owned(),
            keys,
            template: params.into_keys_and_attributes(),
            return_consumed_capacity: self.return_consumed_capacity,
        }))
    }
}

/// Options of a batch put or delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchWriteOptions {
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
    return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

impl BatchWriteOptions {
    #[must_use]
    pub fn return_consumed_capacity(mut self, mode: ReturnConsumedCapacity) -> Self {
        self.return_consumed_capacity = Some(mode);
        self
    }

    #[must_use]
    pub fn return_item_collection_metrics(mut self, mode: ReturnItemCollectionMetrics) -> Self {
        self.return_item_collection_metrics = Some(mode);
        self
    }

    /// A batch of puts.
    pub fn finalize_puts(
        self,
        table: &str,
        items: Vec<Item>,
    ) -> DynaflowResult<PendingOperation<BatchWriteRequest>> {
        if items.is_empty() {
            return Err(DynaflowError::validation("At least one item must be provided"));
        }
        Ok(self.into_pending(table, items.into_iter().map(WriteRequest::put).collect()))
    }

    /// A batch of deletes.
    pub fn finalize_deletes(
        self,
        table: &str,
        keys: Vec<Key>,
    ) -> DynaflowResult<PendingOperation<BatchWriteRequest>> {
        if keys.is_empty() {
            return Err(DynaflowError::validation("At least one key must be provided"));
        }
        for key in &keys {
            validate_key(key, MAX_KEY_ATTRIBUTES)?;
        }
        Ok(self.into_pending(table, keys.into_iter().map(WriteRequest::delete).collect()))
    }

    fn into_pending(
        self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> PendingOperation<BatchWriteRequest> {
        PendingOperation::single(BatchWriteRequest {
            table: table.to_owned(),
            requests,
            return_consumed_capacity: self.return_consumed_capacity,
            return_item_collection_metrics: self.return_item_collection_metrics,
        })
    }
}

/// Options of a table listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListTablesOptions {
    limit: Option<usize>,
    start: Option<String>,
}

impl ListTablesOptions {
    /// Stop after `limit` names (at most 100).
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resume after the table named `table`.
    #[must_use]
    pub fn start(mut self, table: impl Into<String>) -> Self {
        self.start = Some(table.into());
        self
    }

    pub fn finalize(self) -> DynaflowResult<PendingOperation<ListTablesInput>> {
        if self.limit.is_some_and(|limit| limit > MAX_LIST_TABLES_LIMIT) {
            return Err(DynaflowError::validation(
                "The limit must be less than or equal to 100",
            ));
        }
        let request = ListTablesInput {
            exclusive_start_table_name: self.start,
            limit: check_limit(self.limit)?,
        };
        Ok(PendingOperation {
            request,
            paging: Paging {
                limit: self.limit,
                single_page: false,
            },
            segments: None,
        })
    }
}

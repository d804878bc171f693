//! Assembly of compiled expression fragments into wire requests.
//!
//! Every operation first fills a [`RequestParameters`] record with its
//! scalar options and an [`ExpressionSet`] with its structured conditions,
//! updates and projections. [`assemble`] compiles the expressions against
//! one shared placeholder scope, optimizes them together and merges the
//! result into the record, dropping whatever ends up empty. The record is
//! then narrowed into the typed input of the command that carries it.

use dynaflow_model::input::{
    DeleteItemInput, GetItemInput, PutItemInput, QueryInput, ScanInput, UpdateItemInput,
};
use dynaflow_model::types::{
    KeysAndAttributes, ReturnConsumedCapacity, ReturnItemCollectionMetrics, ReturnValue, Select,
};
use dynaflow_model::{ExpressionAttributeNames, ExpressionAttributeValues, Item, Key};
use serde::Serialize;

use crate::error::{DynaflowError, DynaflowResult};
use crate::expression::condition::{self, compile_conjunction};
use crate::expression::update::compile_updates;
use crate::expression::{
    AttributePath, CompiledExpression, Condition, PathSegment, PlaceholderMap, PlaceholderScope,
    UpdateAction, optimize,
};

/// Attributes a table or index key may hold (partition plus sort key).
pub const MAX_KEY_ATTRIBUTES: usize = 2;

/// Names of the fields a [`RequestParameters`] record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterField {
    TableName,
    Key,
    Item,
    IndexName,
    KeyConditionExpression,
    ConditionExpression,
    FilterExpression,
    ProjectionExpression,
    UpdateExpression,
    ExpressionAttributeNames,
    ExpressionAttributeValues,
    ConsistentRead,
    Limit,
    Select,
    ScanIndexForward,
    ExclusiveStartKey,
    Segment,
    TotalSegments,
    ReturnValues,
    ReturnConsumedCapacity,
    ReturnItemCollectionMetrics,
}

/// Every parameter of one single-table request, before it is narrowed into
/// a typed command input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestParameters {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub table_name: String,
    #[serde(skip_serializing_if = "Key::is_empty")]
    pub key: Key,
    #[serde(skip_serializing_if = "Item::is_empty")]
    pub item: Item,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_condition_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_expression: Option<String>,
    #[serde(skip_serializing_if = "ExpressionAttributeNames::is_empty")]
    pub expression_attribute_names: ExpressionAttributeNames,
    #[serde(skip_serializing_if = "ExpressionAttributeValues::is_empty")]
    pub expression_attribute_values: ExpressionAttributeValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistent_read: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Select>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_index_forward: Option<bool>,
    #[serde(skip_serializing_if = "Key::is_empty")]
    pub exclusive_start_key: Key,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_segments: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_values: Option<ReturnValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

impl RequestParameters {
    #[must_use]
    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            table_name: table.into(),
            ..Self::default()
        }
    }

    /// Reset every field not listed in `allowed` to its empty value.
    pub fn retain(&mut self, allowed: &[ParameterField]) {
        let keep = |field| allowed.contains(&field);
        if !keep(ParameterField::TableName) {
            self.table_name.clear();
        }
        if !keep(ParameterField::Key) {
            self.key.clear();
        }
        if !keep(ParameterField::Item) {
            self.item.clear();
        }
        if !keep(ParameterField::IndexName) {
            self.index_name = None;
        }
        if !keep(ParameterField::KeyConditionExpression) {
            self.key_condition_expression = None;
        }
        if !keep(ParameterField::ConditionExpression) {
            self.condition_expression = None;
        }
        if !keep(ParameterField::FilterExpression) {
            self.filter_expression = None;
        }
        if !keep(ParameterField::ProjectionExpression) {
            self.projection_expression = None;
        }
        if !keep(ParameterField::UpdateExpression) {
            self.update_expression = None;
        }
        if !keep(ParameterField::ExpressionAttributeNames) {
            self.expression_attribute_names.clear();
        }
        if !keep(ParameterField::ExpressionAttributeValues) {
            self.expression_attribute_values.clear();
        }
        if !keep(ParameterField::ConsistentRead) {
            self.consistent_read = None;
        }
        if !keep(ParameterField::Limit) {
            self.limit = None;
        }
        if !keep(ParameterField::Select) {
            self.select = None;
        }
        if !keep(ParameterField::ScanIndexForward) {
            self.scan_index_forward = None;
        }
        if !keep(ParameterField::ExclusiveStartKey) {
            self.exclusive_start_key.clear();
        }
        if !keep(ParameterField::Segment) {
            self.segment = None;
        }
        if !keep(ParameterField::TotalSegments) {
            self.total_segments = None;
        }
        if !keep(ParameterField::ReturnValues) {
            self.return_values = None;
        }
        if !keep(ParameterField::ReturnConsumedCapacity) {
            self.return_consumed_capacity = None;
        }
        if !keep(ParameterField::ReturnItemCollectionMetrics) {
            self.return_item_collection_metrics = None;
        }
    }

    #[must_use]
    pub fn into_get_item(self) -> GetItemInput {
        GetItemInput {
            table_name: self.table_name,
            key: self.key,
            consistent_read: self.consistent_read,
            projection_expression: self.projection_expression,
            expression_attribute_names: self.expression_attribute_names,
            return_consumed_capacity: self.return_consumed_capacity,
        }
    }

    #[must_use]
    pub fn into_put_item(self) -> PutItemInput {
        PutItemInput {
            table_name: self.table_name,
            item: self.item,
            condition_expression: self.condition_expression,
            expression_attribute_names: self.expression_attribute_names,
            expression_attribute_values: self.expression_attribute_values,
            return_values: self.return_values,
            return_consumed_capacity: self.return_consumed_capacity,
            return_item_collection_metrics: self.return_item_collection_metrics,
        }
    }

    #[must_use]
    pub fn into_update_item(self) -> UpdateItemInput {
        UpdateItemInput {
            table_name: self.table_name,
            key: self.key,
            update_expression: self.update_expression,
            condition_expression: self.condition_expression,
            expression_attribute_names: self.expression_attribute_names,
            expression_attribute_values: self.expression_attribute_values,
            return_values: self.return_values,
            return_consumed_capacity: self.return_consumed_capacity,
            return_item_collection_metrics: self.return_item_collection_metrics,
        }
    }

    #[must_use]
    pub fn into_delete_item(self) -> DeleteItemInput {
        DeleteItemInput {
            table_name: self.table_name,
            key: self.key,
            condition_expression: self.condition_expression,
            expression_attribute_names: self.expression_attribute_names,
            expression_attribute_values: self.expression_attribute_values,
            return_values: self.return_values,
            return_consumed_capacity: self.return_consumed_capacity,
            return_item_collection_metrics: self.return_item_collection_metrics,
        }
    }

    #[must_use]
    pub fn into_query(self) -> QueryInput {
        QueryInput {
            table_name: self.table_name,
            index_name: self.index_name,
            key_condition_expression: self.key_condition_expression,
            filter_expression: self.filter_expression,
            projection_expression: self.projection_expression,
            expression_attribute_names: self.expression_attribute_names,
            expression_attribute_values: self.expression_attribute_values,
            scan_index_forward: self.scan_index_forward,
            limit: self.limit,
            exclusive_start_key: self.exclusive_start_key,
            select: self.select,
            consistent_read: self.consistent_read,
            return_consumed_capacity: self.return_consumed_capacity,
        }
    }

    #[must_use]
    pub fn into_scan(self) -> ScanInput {
        ScanInput {
            table_name: self.table_name,
            index_name: self.index_name,
            filter_expression: self.filter_expression,
            projection_expression: self.projection_expression,
            expression_attribute_names: self.expression_attribute_names,
            expression_attribute_values: self.expression_attribute_values,
            limit: self.limit,
            exclusive_start_key: self.exclusive_start_key,
            segment: self.segment,
            total_segments: self.total_segments,
            select: self.select,
            consistent_read: self.consistent_read,
            return_consumed_capacity: self.return_consumed_capacity,
        }
    }

    /// The per-table entry of a `BatchGetItem` request, without keys.
    #[must_use]
    pub fn into_keys_and_attributes(self) -> KeysAndAttributes {
        KeysAndAttributes {
            keys: Vec::new(),
            projection_expression: self.projection_expression,
            expression_attribute_names: self.expression_attribute_names,
            consistent_read: self.consistent_read,
        }
    }
}

/// Structured expression inputs of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionSet {
    /// Attributes to return; duplicates are ignored.
    pub projection: Vec<AttributePath>,
    /// Query key conditions, implicitly conjoined.
    pub key_conditions: Vec<Condition>,
    /// Write conditions, implicitly conjoined.
    pub conditions: Vec<Condition>,
    /// Read filters, implicitly conjoined.
    pub filters: Vec<Condition>,
    /// Update actions.
    pub updates: Vec<UpdateAction>,
}

impl ExpressionSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projection.is_empty()
            && self.key_conditions.is_empty()
            && self.conditions.is_empty()
            && self.filters.is_empty()
            && self.updates.is_empty()
    }
}

/// Compile `expressions` and merge them into `params`.
///
/// All fragments share one placeholder scope and are optimized together,
/// so a name used by both the condition and the update gets a single
/// placeholder. Fragments that compile to nothing leave their field unset;
/// fields already set on `params` are only replaced by a non-empty
/// fragment. When an index is targeted, `ConsistentRead` is removed since
/// secondary indexes reject it.
pub fn assemble(
    mut params: RequestParameters,
    expressions: ExpressionSet,
) -> DynaflowResult<RequestParameters> {
    if params.index_name.is_some() {
        params.consistent_read = None;
    }
    if expressions.is_empty() {
        return Ok(params);
    }

    let ExpressionSet {
        projection,
        key_conditions,
        conditions,
        filters,
        updates,
    } = expressions;

    let mut scope = PlaceholderScope::new();
    let mut placeholders = PlaceholderMap::default();
    let mut take = |compiled: Option<CompiledExpression>| {
        compiled.map(|c| {
            placeholders.merge(c.placeholders);
            c.text
        })
    };

    let mut projection_text = take(compile_projection(projection, &mut scope)?);
    let mut key_condition_text = take(compile_conjunction(key_conditions, &mut scope)?);
    let mut condition_text = take(compile_conjunction(conditions, &mut scope)?);
    let mut filter_text = take(compile_conjunction(filters, &mut scope)?);
    let mut update_text = take(compile_updates(&updates, &mut scope)?);

    let mut texts: Vec<&mut String> = [
        projection_text.as_mut(),
        key_condition_text.as_mut(),
        condition_text.as_mut(),
        filter_text.as_mut(),
        update_text.as_mut(),
    ]
    .into_iter()
    .flatten()
    .collect();
    let placeholders = optimize(&mut texts, placeholders);

    let non_empty = |text: Option<String>| text.filter(|t| !t.is_empty());
    params.projection_expression = non_empty(projection_text).or(params.projection_expression);
    params.key_condition_expression =
        non_empty(key_condition_text).or(params.key_condition_expression);
    params.condition_expression = non_empty(condition_text).or(params.condition_expression);
    params.filter_expression = non_empty(filter_text).or(params.filter_expression);
    params.update_expression = non_empty(update_text).or(params.update_expression);

    let (names, values) = placeholders.into_wire();
    params.expression_attribute_names.extend(names);
    params.expression_attribute_values.extend(values);
    Ok(params)
}

/// Compile a projection list into `a, b.c` form, skipping repeated paths.
fn compile_projection(
    paths: Vec<AttributePath>,
    scope: &mut PlaceholderScope,
) -> DynaflowResult<Option<CompiledExpression>> {
    let mut unique: Vec<AttributePath> = Vec::with_capacity(paths.len());
    for path in paths {
        if !unique.contains(&path) {
            unique.push(path);
        }
    }
    if unique.is_empty() {
        return Ok(None);
    }
    let mut parts = Vec::with_capacity(unique.len());
    let mut placeholders = PlaceholderMap::default();
    for path in &unique {
        let compiled = path.compile(scope)?;
        placeholders.merge(compiled.placeholders);
        parts.push(compiled.text);
    }
    Ok(Some(CompiledExpression {
        text: parts.join(", "),
        placeholders,
    }))
}

/// Check that `key` names between one and `max` attributes.
pub fn validate_key(key: &Key, max: usize) -> DynaflowResult<()> {
    if key.is_empty() {
        return Err(DynaflowError::validation(
            "At least 1 property must be present in the key",
        ));
    }
    if key.len() > max {
        return Err(DynaflowError::validation(format!(
            "At most {max} properties must be present in the key"
        )));
    }
    Ok(())
}

/// The implicit `partition = value` key condition of a query.
pub fn partition_key_condition(key: &Key) -> DynaflowResult<Condition> {
    validate_key(key, 1)?;
    // Key attribute names are used verbatim, never split as paths.
    match key.iter().next() {
        Some((name, value)) => Ok(condition::eq(
            AttributePath::new(vec![PathSegment::Name(name.clone())]),
            value.clone(),
        )),
        None => Err(DynaflowError::validation(
            "At least 1 property must be present in the key",
        )),
    }
}

#[cfg(test)]
mod tests {
    use dynaflow_model::AttributeValue;

    use super::*;
    use crate::expression::condition::{attribute_not_exists, gt};
    use crate::expression::update::{increment, set};

    fn key(pairs: &[(&str, &str)]) -> Key {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), AttributeValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_should_share_placeholders_between_condition_and_update() {
        let mut params = RequestParameters::for_table("users");
        params.key = key(&[("pk", "u#1")]);
        let expressions = ExpressionSet {
            conditions: vec![gt("visits", 3_i32)],
            updates: vec![increment("visits", 1_i32), set("name", "Ada")],
            ..ExpressionSet::default()
        };
        let params = assemble(params, expressions).expect("assemble");
        assert_eq!(params.condition_expression.as_deref(), Some("#n0 > :v0"));
        assert_eq!(
            params.update_expression.as_deref(),
            Some("SET #n0 = if_not_exists(#n0, :v1) + :v2, #n1 = :v3")
        );
        assert_eq!(params.expression_attribute_names.len(), 2);
        assert_eq!(params.expression_attribute_names["#n0"], "visits");
        // 3, 0, 1 and "Ada" are all distinct literals
        assert_eq!(params.expression_attribute_values.len(), 4);
    }

    #[test]
    fn test_should_drop_empty_fragments_and_maps() {
        let params = RequestParameters::for_table("users");
        let expressions = ExpressionSet {
            conditions: vec![condition::and(Vec::<Condition>::new())],
            ..ExpressionSet::default()
        };
        let params = assemble(params, expressions).expect("assemble");
        assert!(params.condition_expression.is_none());
        let json = serde_json::to_value(&params).expect("serialize params");
        assert_eq!(json, serde_json::json!({ "TableName": "users" }));
    }

    #[test]
    fn test_should_dedup_projection_paths() {
        let expressions = ExpressionSet {
            projection: vec!["a".into(), "b.c".into(), "a".into()],
            ..ExpressionSet::default()
        };
        let params = assemble(RequestParameters::for_table("t"), expressions).expect("assemble");
        assert_eq!(params.projection_expression.as_deref(), Some("#n0, #n1.#n2"));
        assert_eq!(params.expression_attribute_names["#n2"], "c");
    }

    #[test]
    fn test_should_drop_consistent_read_on_index() {
        let mut params = RequestParameters::for_table("t");
        params.index_name = Some("by-email".to_owned());
        params.consistent_read = Some(true);
        let params = assemble(params, ExpressionSet::default()).expect("assemble");
        assert!(params.consistent_read.is_none());
    }

    #[test]
    fn test_should_retain_only_allowed_fields() {
        let mut params = RequestParameters::for_table("t");
        params.key = key(&[("pk", "1")]);
        params.return_values = Some(ReturnValue::AllOld);
        params.limit = Some(5);
        let expressions = ExpressionSet {
            conditions: vec![attribute_not_exists("pk")],
            ..ExpressionSet::default()
        };
        let mut params = assemble(params, expressions).expect("assemble");
        params.retain(&[
            ParameterField::TableName,
            ParameterField::Key,
            ParameterField::ConditionExpression,
            ParameterField::ExpressionAttributeNames,
        ]);
        let json = serde_json::to_value(&params).expect("serialize params");
        assert_eq!(
            json,
            serde_json::json!({
                "TableName": "t",
                "Key": { "pk": { "S": "1" } },
                "ConditionExpression": "attribute_not_exists(#n0)",
                "ExpressionAttributeNames": { "#n0": "pk" },
            })
        );
    }

    #[test]
    fn test_should_validate_key_size() {
        assert!(validate_key(&key(&[("pk", "1")]), MAX_KEY_ATTRIBUTES).is_ok());
        assert!(validate_key(&key(&[]), MAX_KEY_ATTRIBUTES).is_err());
        let err = validate_key(&key(&[("a", "1"), ("b", "2"), ("c", "3")]), MAX_KEY_ATTRIBUTES)
            .expect_err("three attributes");
        assert!(matches!(err, DynaflowError::Validation(msg) if msg.contains("At most 2")));
    }

    #[test]
    fn test_should_build_partition_key_condition() {
        let built = partition_key_condition(&key(&[("pk", "tenant")])).expect("one attribute");
        assert_eq!(built, condition::eq("pk", "tenant"));
        assert!(partition_key_condition(&key(&[("pk", "1"), ("sk", "2")])).is_err());
    }
}

//! Transaction composition.
//!
//! Sub-operations are built from the same option records as their
//! standalone counterparts, then narrowed to the fields a transaction item
//! accepts for its kind.

use dynaflow_model::input::{TransactGetItemsInput, TransactWriteItemsInput};
use dynaflow_model::types::{
    ConditionCheck, Delete, Get, Put, ReturnConsumedCapacity, ReturnItemCollectionMetrics,
    ReturnValue, ReturnValuesOnConditionCheckFailure, TransactGetItem, TransactWriteItem, Update,
};
use dynaflow_model::{Item, Key};
use tracing::debug;

use crate::error::{DynaflowError, DynaflowResult};
use crate::expression::Condition;
use crate::operation::{DeleteOptions, GetOptions, PutOptions, UpdateOptions};
use crate::request::{
    ExpressionSet, MAX_KEY_ATTRIBUTES, ParameterField, RequestParameters, assemble, validate_key,
};

/// Most sub-operations one transaction may carry.
pub const MAX_TRANSACTION_ITEMS: usize = 25;

const SHARED_WRITE_FIELDS: [ParameterField; 5] = [
    ParameterField::TableName,
    ParameterField::ConditionExpression,
    ParameterField::ExpressionAttributeNames,
    ParameterField::ExpressionAttributeValues,
    ParameterField::ReturnValues,
];

const GET_FIELDS: [ParameterField; 4] = [
    ParameterField::TableName,
    ParameterField::Key,
    ParameterField::ProjectionExpression,
    ParameterField::ExpressionAttributeNames,
];

/// The kind of a write transaction item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactKind {
    Check,
    Put,
    Delete,
    Update,
}

impl TransactKind {
    fn specific_fields(self) -> &'static [ParameterField] {
        match self {
            Self::Check | Self::Delete => &[ParameterField::Key],
            Self::Put => &[ParameterField::Item],
            Self::Update => &[ParameterField::Key, ParameterField::UpdateExpression],
        }
    }

    /// Fields an item of this kind may carry.
    #[must_use]
    pub fn allowed_fields(self) -> Vec<ParameterField> {
        let mut fields = SHARED_WRITE_FIELDS.to_vec();
        fields.extend_from_slice(self.specific_fields());
        fields
    }
}

/// Failure behavior of a transaction item; only a full old image or nothing
/// can be returned, so every other mode collapses to `NONE`.
fn on_condition_failure(
    return_values: Option<ReturnValue>,
) -> Option<ReturnValuesOnConditionCheckFailure> {
    return_values.map(|mode| match mode {
        ReturnValue::AllOld | ReturnValue::AllNew => ReturnValuesOnConditionCheckFailure::AllOld,
        ReturnValue::None | ReturnValue::UpdatedOld | ReturnValue::UpdatedNew => {
            ReturnValuesOnConditionCheckFailure::None
        }
    })
}

/// One write sub-operation of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactAction {
    kind: TransactKind,
    params: RequestParameters,
}

impl TransactAction {
    /// Assert `condition` on the item at `key` without writing it.
    pub fn check(table: &str, key: Key, condition: Condition) -> DynaflowResult<Self> {
        validate_key(&key, MAX_KEY_ATTRIBUTES)?;
        let mut params = RequestParameters::for_table(table);
        params.key = key;
        let params = assemble(
            params,
            ExpressionSet {
                conditions: vec![condition],
                ..ExpressionSet::default()
            },
        )?;
        Ok(Self::narrowed(TransactKind::Check, params))
    }

    pub fn put(table: &str, item: Item, options: PutOptions) -> DynaflowResult<Self> {
        Ok(Self::narrowed(TransactKind::Put, options.parameters(table, item)?))
    }

    pub fn update(table: &str, key: Key, options: UpdateOptions) -> DynaflowResult<Self> {
        Ok(Self::narrowed(TransactKind::Update, options.parameters(table, key)?))
    }

    pub fn delete(table: &str, key: Key, options: DeleteOptions) -> DynaflowResult<Self> {
        Ok(Self::narrowed(TransactKind::Delete, options.parameters(table, key)?))
    }

    fn narrowed(kind: TransactKind, mut params: RequestParameters) -> Self {
        params.retain(&kind.allowed_fields());
        Self { kind, params }
    }

    #[must_use]
    pub fn kind(&self) -> TransactKind {
        self.kind
    }

    fn into_item(self) -> DynaflowResult<TransactWriteItem> {
        let p = self.params;
        let on_failure = on_condition_failure(p.return_values);
        let item = match self.kind {
            TransactKind::Check => {
                let Some(condition_expression) = p.condition_expression else {
                    return Err(DynaflowError::validation(
                        "A condition check requires a condition",
                    ));
                };
                TransactWriteItem {
                    condition_check: Some(ConditionCheck {
                        table_name: p.table_name,
                        key: p.key,
                        condition_expression,
                        expression_attribute_names: p.expression_attribute_names,
                        expression_attribute_values: p.expression_attribute_values,
                        return_values_on_condition_check_failure: on_failure,
                    }),
                    ..TransactWriteItem::default()
                }
            }
            TransactKind::Put => TransactWriteItem {
                put: Some(Put {
                    table_name: p.table_name,
                    item: p.item,
                    condition_expression: p.condition_expression,
                    expression_attribute_names: p.expression_attribute_names,
                    expression_attribute_values: p.expression_attribute_values,
                    return_values_on_condition_check_failure: on_failure,
                }),
                ..TransactWriteItem::default()
            },
            TransactKind::Delete => TransactWriteItem {
                delete: Some(Delete {
                    table_name: p.table_name,
                    key: p.key,
                    condition_expression: p.condition_expression,
                    expression_attribute_names: p.expression_attribute_names,
                    expression_attribute_values: p.expression_attribute_values,
                    return_values_on_condition_check_failure: on_failure,
                }),
                ..TransactWriteItem::default()
            },
            TransactKind::Update => {
                let Some(update_expression) = p.update_expression else {
                    return Err(DynaflowError::validation(
                        "An update requires at least one action",
                    ));
                };
                TransactWriteItem {
                    update: Some(Update {
                        table_name: p.table_name,
                        key: p.key,
                        update_expression,
                        condition_expression: p.condition_expression,
                        expression_attribute_names: p.expression_attribute_names,
                        expression_attribute_values: p.expression_attribute_values,
                        return_values_on_condition_check_failure: on_failure,
                    }),
                    ..TransactWriteItem::default()
                }
            }
        };
        Ok(item)
    }
}

/// One read sub-operation of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactRead {
    params: RequestParameters,
}

impl TransactRead {
    pub fn get(table: &str, key: Key, options: GetOptions) -> DynaflowResult<Self> {
        let mut params = options.parameters(table, key)?;
        params.retain(&GET_FIELDS);
        Ok(Self { params })
    }

    fn into_item(self) -> TransactGetItem {
        let p = self.params;
        TransactGetItem {
            get: Get {
                table_name: p.table_name,
                key: p.key,
                projection_expression: p.projection_expression,
                expression_attribute_names: p.expression_attribute_names,
            },
        }
    }
}

fn check_transaction_size(len: usize) -> DynaflowResult<()> {
    if len == 0 {
        return Err(DynaflowError::validation(
            "At least one transaction must be provided",
        ));
    }
    if len > MAX_TRANSACTION_ITEMS {
        return Err(DynaflowError::validation(format!(
            "No more than {MAX_TRANSACTION_ITEMS} transactions can be provided"
        )));
    }
    Ok(())
}

/// Build a `TransactWriteItems` request from `actions`.
///
/// A missing `client_request_token` is replaced by a fresh UUID so retried
/// attempts of the same call stay idempotent on the store's side.
pub fn compose_write(
    actions: Vec<TransactAction>,
    client_request_token: Option<String>,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
    return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
) -> DynaflowResult<TransactWriteItemsInput> {
    check_transaction_size(actions.len())?;
    let transact_items = actions
        .into_iter()
        .map(TransactAction::into_item)
        .collect::<DynaflowResult<Vec<_>>>()?;
    let token = client_request_token.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    debug!(items = transact_items.len(), token = %token, "composed write transaction");
    Ok(TransactWriteItemsInput {
        transact_items,
        client_request_token: Some(token),
        return_consumed_capacity,
        return_item_collection_metrics,
    })
}

/// Build a `TransactGetItems` request from `reads`.
pub fn compose_get(
    reads: Vec<TransactRead>,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
) -> DynaflowResult<TransactGetItemsInput> {
    check_transaction_size(reads.len())?;
    Ok(TransactGetItemsInput {
        transact_items: reads.into_iter().map(TransactRead::into_item).collect(),
        return_consumed_capacity,
    })
}

#[cfg(test)]
mod tests {
    use dynaflow_model::AttributeValue;

    use super::*;
    use crate::expression::condition::{attribute_exists, attribute_not_exists, eq};
    use crate::expression::update::increment;

    fn key(id: &str) -> Key {
        [("pk".to_owned(), AttributeValue::from(id))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_should_map_return_values_to_condition_failure_mode() {
        let action = TransactAction::put(
            "t",
            key("1"),
            PutOptions::default()
                .when(attribute_not_exists("pk"))
                .return_values(ReturnValue::AllNew),
        )
        .expect("put");
        let input = compose_write(vec![action], None, None, None).expect("compose");
        let put = input.transact_items[0].put.as_ref().expect("put item");
        assert_eq!(
            put.return_values_on_condition_check_failure,
            Some(ReturnValuesOnConditionCheckFailure::AllOld)
        );
        assert_eq!(put.condition_expression.as_deref(), Some("attribute_not_exists(#n0)"));

        assert_eq!(
            on_condition_failure(Some(ReturnValue::UpdatedNew)),
            Some(ReturnValuesOnConditionCheckFailure::None)
        );
        assert_eq!(on_condition_failure(None), None);
    }

    #[test]
    fn test_should_strip_fields_outside_the_allow_list() {
        let action = TransactAction::update(
            "t",
            key("1"),
            UpdateOptions::default()
                .apply(increment("count", 1_i32))
                .return_consumed_capacity(ReturnConsumedCapacity::Total),
        )
        .expect("update");
        assert!(action.params.return_consumed_capacity.is_none());
        assert_eq!(action.kind(), TransactKind::Update);

        let input = compose_write(vec![action], None, None, None).expect("compose");
        let update = input.transact_items[0].update.as_ref().expect("update item");
        assert_eq!(
            update.update_expression,
            "SET #n0 = if_not_exists(#n0, :v0) + :v1"
        );
    }

    #[test]
    fn test_should_reject_update_without_actions() {
        let action = TransactAction::update("t", key("1"), UpdateOptions::default())
            .expect("options are valid on their own");
        let err = compose_write(vec![action], None, None, None).expect_err("no update");
        assert!(matches!(err, DynaflowError::Validation(_)));
    }

    #[test]
    fn test_should_bound_transaction_size() {
        let err = compose_write(Vec::new(), None, None, None).expect_err("empty");
        assert!(
            matches!(err, DynaflowError::Validation(ref m) if m == "At least one transaction must be provided")
        );

        let actions: Vec<TransactAction> = (0..26)
            .map(|i| {
                TransactAction::check("t", key(&i.to_string()), attribute_exists("pk"))
                    .expect("check")
            })
            .collect();
        let err = compose_write(actions, None, None, None).expect_err("too many");
        assert!(
            matches!(err, DynaflowError::Validation(ref m) if m == "No more than 25 transactions can be provided")
        );
    }

    #[test]
    fn test_should_generate_client_request_token_once() {
        let check = TransactAction::check("t", key("1"), eq("state", "open")).expect("check");
        let input = compose_write(vec![check.clone()], None, None, None).expect("compose");
        let token = input.client_request_token.expect("token generated");
        assert!(uuid::Uuid::parse_str(&token).is_ok());

        let input =
            compose_write(vec![check], Some("caller".to_owned()), None, None).expect("compose");
        assert_eq!(input.client_request_token.as_deref(), Some("caller"));
    }

    #[test]
    fn test_should_compose_transactional_reads() {
        let read = TransactRead::get(
            "t",
            key("1"),
            GetOptions::default().select(["name"]).consistent_read(true),
        )
        .expect("get");
        let input = compose_get(vec![read], None).expect("compose");
        let get = &input.transact_items[0].get;
        assert_eq!(get.projection_expression.as_deref(), Some("#n0"));
        assert_eq!(get.expression_attribute_names["#n0"], "name");
    }
}

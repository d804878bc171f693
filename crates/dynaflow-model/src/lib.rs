//! DynamoDB wire model types for Dynaflow.
//!
//! This crate holds the request and response shapes Dynaflow exchanges with a
//! DynamoDB compatible endpoint over the JSON protocol. Only the data plane
//! operations are modelled: single item CRUD, query, scan, batch and
//! transactional reads and writes, plus `ListTables`.
// "DynamoDB" appears in virtually every doc comment in this crate.
#![allow(clippy::doc_markdown)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::module_name_repetitions)]
#![allow(missing_docs)]

pub mod attribute_value;
pub mod error;
pub mod input;
pub mod operations;
pub mod output;
pub mod types;

pub use attribute_value::AttributeValue;
pub use error::{DynamoDBError, DynamoDBErrorCode};
pub use operations::DynamoDBOperation;
pub use types::{ExpressionAttributeNames, ExpressionAttributeValues, Item, Key};

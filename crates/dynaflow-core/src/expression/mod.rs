//! Compilation of structured predicates, updates and projections into
//! DynamoDB's placeholder-based expression language.
//!
//! The pipeline is:
//!
//! 1. **Serialization**: paths, conditions and updates are rendered into
//!    expression text, allocating one placeholder per name segment and per
//!    literal value from a [`PlaceholderScope`] shared by the whole request.
//! 2. **Optimization**: duplicate names and values are collapsed and every
//!    surviving placeholder is renamed to a short canonical token.

pub mod condition;
pub mod optimizer;
pub mod path;
pub mod placeholder;
pub mod update;

pub use condition::{CompareOp, Condition, FunctionName};
pub use optimizer::optimize;
pub use path::{AttributePath, PathSegment};
pub use placeholder::{CompiledExpression, PlaceholderMap, PlaceholderScope};
pub use update::{UpdateAction, UpdateKind};

/// Errors raised while compiling an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    /// A path with no segments.
    #[error("attribute path must contain at least one segment")]
    EmptyPath,

    /// A path whose segments cannot be expressed.
    #[error("invalid attribute path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path as written.
        path: String,
        /// Explanation.
        reason: &'static str,
    },

    /// An `IN` predicate with no candidates.
    #[error("IN condition on {path:?} needs at least one value")]
    EmptyInList {
        /// The tested path.
        path: String,
    },
}

//! Update actions and their compilation into one update expression.

use std::fmt;

use dynaflow_model::AttributeValue;

use super::ExpressionError;
use super::path::AttributePath;
use super::placeholder::{CompiledExpression, Emitter, PlaceholderScope};

/// Clause an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Set,
    Add,
    Remove,
    Delete,
}

impl UpdateKind {
    /// Clause order in the compiled expression.
    pub const ORDER: [Self; 4] = [Self::Set, Self::Add, Self::Remove, Self::Delete];
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Set => "SET",
            Self::Add => "ADD",
            Self::Remove => "REMOVE",
            Self::Delete => "DELETE",
        })
    }
}

/// One change to an item.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// `path = value`
    Set {
        path: AttributePath,
        value: AttributeValue,
    },
    /// Assign only when the attribute is absent.
    SetIfNotExists {
        path: AttributePath,
        value: AttributeValue,
    },
    /// Numeric increment; a missing attribute counts as zero.
    Increment {
        path: AttributePath,
        delta: AttributeValue,
    },
    /// Numeric decrement; a missing attribute counts as zero.
    Decrement {
        path: AttributePath,
        delta: AttributeValue,
    },
    /// Append to a list, creating it when absent.
    Append {
        path: AttributePath,
        values: Vec<AttributeValue>,
    },
    /// Prepend to a list, creating it when absent.
    Prepend {
        path: AttributePath,
        values: Vec<AttributeValue>,
    },
    /// `ADD path value`, for numbers and sets.
    Add {
        path: AttributePath,
        value: AttributeValue,
    },
    /// `REMOVE path`
    Remove { path: AttributePath },
    /// `DELETE path set`
    DeleteFromSet {
        path: AttributePath,
        values: AttributeValue,
    },
}

impl UpdateAction {
    #[must_use]
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::Set { .. }
            | Self::SetIfNotExists { .. }
            | Self::Increment { .. }
            | Self::Decrement { .. }
            | Self::Append { .. }
            | Self::Prepend { .. } => UpdateKind::Set,
            Self::Add { .. } => UpdateKind::Add,
            Self::Remove { .. } => UpdateKind::Remove,
            Self::DeleteFromSet { .. } => UpdateKind::Delete,
        }
    }

    /// Render the action without its clause word. `None` when the action is
    /// a no-op (empty list append, empty set).
    fn render(&self, e: &mut Emitter<'_>) -> Result<Option<String>, ExpressionError> {
        let text = match self {
            Self::Set { path, value } => {
                let p = path.render(e)?;
                format!("{p} = {}", e.value(value.clone()))
            }
            Self::SetIfNotExists { path, value } => {
                let p = path.render(e)?;
                format!("{p} = if_not_exists({p}, {})", e.value(value.clone()))
            }
            Self::Increment { path, delta } | Self::Decrement { path, delta } => {
                let sign = if matches!(self, Self::Increment { .. }) { '+' } else { '-' };
                let p = path.render(e)?;
                let zero = e.value(AttributeValue::N("0".to_owned()));
                let delta = e.value(delta.clone());
                format!("{p} = if_not_exists({p}, {zero}) {sign} {delta}")
            }
            Self::Append { values, .. } | Self::Prepend { values, .. } if values.is_empty() => {
                return Ok(None);
            }
            Self::Append { path, values } => {
                let p = path.render(e)?;
                let empty = e.value(AttributeValue::L(Vec::new()));
                let list = e.value(AttributeValue::L(values.clone()));
                format!("{p} = list_append(if_not_exists({p}, {empty}), {list})")
            }
            Self::Prepend { path, values } => {
                let p = path.render(e)?;
                let list = e.value(AttributeValue::L(values.clone()));
                let empty = e.value(AttributeValue::L(Vec::new()));
                format!("{p} = list_append({list}, if_not_exists({p}, {empty}))")
            }
            Self::Add { value, .. } | Self::DeleteFromSet { values: value, .. }
                if value.is_empty_set() =>
            {
                return Ok(None);
            }
            Self::Add { path, value } | Self::DeleteFromSet { path, values: value } => {
                let p = path.render(e)?;
                format!("{p} {}", e.value(value.clone()))
            }
            Self::Remove { path } => path.render(e)?,
        };
        Ok(Some(text))
    }
}

/// Compile actions into one update expression.
///
/// Actions are grouped by clause in the fixed order SET, ADD, REMOVE,
/// DELETE, keeping insertion order inside each clause. Clauses with no
/// surviving action are omitted; `None` if nothing survives at all.
pub fn compile_updates(
    actions: &[UpdateAction],
    scope: &mut PlaceholderScope,
) -> Result<Option<CompiledExpression>, ExpressionError> {
    let mut emitter = Emitter::new(scope);
    let mut clauses = Vec::new();
    for kind in UpdateKind::ORDER {
        let mut parts = Vec::new();
        for action in actions.iter().filter(|a| a.kind() == kind) {
            if let Some(part) = action.render(&mut emitter)? {
                parts.push(part);
            }
        }
        if !parts.is_empty() {
            clauses.push(format!("{kind} {}", parts.join(", ")));
        }
    }
    if clauses.is_empty() {
        return Ok(None);
    }
    Ok(Some(emitter.finish(clauses.join(" ").trim().to_owned())))
}

pub fn set(path: impl Into<AttributePath>, value: impl Into<AttributeValue>) -> UpdateAction {
    UpdateAction::Set {
        path: path.into(),
        value: value.into(),
    }
}

pub fn set_if_not_exists(
    path: impl Into<AttributePath>,
    value: impl Into<AttributeValue>,
) -> UpdateAction {
    UpdateAction::SetIfNotExists {
        path: path.into(),
        value: value.into(),
    }
}

pub fn increment(path: impl Into<AttributePath>, delta: impl Into<AttributeValue>) -> UpdateAction {
    UpdateAction::Increment {
        path: path.into(),
        delta: delta.into(),
    }
}

pub fn decrement(path: impl Into<AttributePath>, delta: impl Into<AttributeValue>) -> UpdateAction {
    UpdateAction::Decrement {
        path: path.into(),
        delta: delta.into(),
    }
}

pub fn append<I, V>(path: impl Into<AttributePath>, values: I) -> UpdateAction
where
    I: IntoIterator<Item = V>,
    V: Into<AttributeValue>,
{
    UpdateAction::Append {
        path: path.into(),
        values: values.into_iter().map(Into::into).collect(),
    }
}

pub fn prepend<I, V>(path: impl Into<AttributePath>, values: I) -> UpdateAction
where
    I: IntoIterator<Item = V>,
    V: Into<AttributeValue>,
{
    UpdateAction::Prepend {
        path: path.into(),
        values: values.into_iter().map(Into::into).collect(),
    }
}

pub fn add(path: impl Into<AttributePath>, value: impl Into<AttributeValue>) -> UpdateAction {
    UpdateAction::Add {
        path: path.into(),
        value: value.into(),
    }
}

/// `ADD` members to a set; `set` should be an `SS`, `NS` or `BS` value.
pub fn add_to_set(path: impl Into<AttributePath>, set: AttributeValue) -> UpdateAction {
    UpdateAction::Add {
        path: path.into(),
        value: set,
    }
}

pub fn remove(path: impl Into<AttributePath>) -> UpdateAction {
    UpdateAction::Remove { path: path.into() }
}

pub fn delete_from_set(path: impl Into<AttributePath>, set: AttributeValue) -> UpdateAction {
    UpdateAction::DeleteFromSet {
        path: path.into(),
        values: set,
    }
}

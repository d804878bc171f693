//! Condition trees and their compilation into condition, filter and
//! key-condition expressions.

use std::fmt;

use dynaflow_model::AttributeValue;

use super::ExpressionError;
use super::path::AttributePath;
use super::placeholder::{CompiledExpression, Emitter, PlaceholderScope};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal (`=`).
    Eq,
    /// Not equal (`<>`).
    Ne,
    /// Less than (`<`).
    Lt,
    /// Less than or equal (`<=`).
    Le,
    /// Greater than (`>`).
    Gt,
    /// Greater than or equal (`>=`).
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        })
    }
}

/// Built-in predicate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionName {
    /// `attribute_exists(path)`
    AttributeExists,
    /// `attribute_not_exists(path)`
    AttributeNotExists,
    /// `attribute_type(path, type)`
    AttributeType,
    /// `begins_with(path, prefix)`
    BeginsWith,
    /// `contains(path, operand)`
    Contains,
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AttributeExists => "attribute_exists",
            Self::AttributeNotExists => "attribute_not_exists",
            Self::AttributeType => "attribute_type",
            Self::BeginsWith => "begins_with",
            Self::Contains => "contains",
        })
    }
}

/// A predicate over one item.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `path op value`
    Comparison {
        op: CompareOp,
        path: AttributePath,
        value: AttributeValue,
    },
    /// `path BETWEEN low AND high`
    Between {
        path: AttributePath,
        low: AttributeValue,
        high: AttributeValue,
    },
    /// `path IN (v1, v2, ...)`
    In {
        path: AttributePath,
        values: Vec<AttributeValue>,
    },
    /// `name(path, args...)`
    Function {
        name: FunctionName,
        path: AttributePath,
        args: Vec<AttributeValue>,
    },
    /// `size(path) op value`
    Size {
        op: CompareOp,
        path: AttributePath,
        value: AttributeValue,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// Collapse empty groups, recursively.
    ///
    /// Returns `None` when nothing is left to compile. A group left with a
    /// single child is replaced by that child.
    #[must_use]
    pub fn prune(self) -> Option<Self> {
        match self {
            Self::And(children) => prune_group(children, Self::And),
            Self::Or(children) => prune_group(children, Self::Or),
            Self::Not(child) => child.prune().map(|c| Self::Not(Box::new(c))),
            leaf => Some(leaf),
        }
    }

    fn is_composite(&self) -> bool {
        matches!(self, Self::And(_) | Self::Or(_) | Self::Not(_))
    }

    /// Compile a single tree. `None` if it prunes away entirely.
    pub fn compile(
        self,
        scope: &mut PlaceholderScope,
    ) -> Result<Option<CompiledExpression>, ExpressionError> {
        let Some(tree) = self.prune() else {
            return Ok(None);
        };
        let mut emitter = Emitter::new(scope);
        let text = tree.render(&mut emitter)?;
        Ok(Some(emitter.finish(text)))
    }

    fn render(&self, e: &mut Emitter<'_>) -> Result<String, ExpressionError> {
        let text = match self {
            Self::Comparison { op, path, value } => {
                let p = path.render(e)?;
                format!("{p} {op} {}", e.value(value.clone()))
            }
            Self::Between { path, low, high } => {
                let p = path.render(e)?;
                let low = e.value(low.clone());
                let high = e.value(high.clone());
                format!("{p} BETWEEN {low} AND {high}")
            }
            Self::In { path, values } => {
                if values.is_empty() {
                    return Err(ExpressionError::EmptyInList {
                        path: path.to_string(),
                    });
                }
                let p = path.render(e)?;
                let candidates: Vec<String> = values.iter().map(|v| e.value(v.clone())).collect();
                format!("{p} IN ({})", candidates.join(", "))
            }
            Self::Function { name, path, args } => {
                let mut operands = vec![path.render(e)?];
                operands.extend(args.iter().map(|v| e.value(v.clone())));
                format!("{name}({})", operands.join(", "))
            }
            Self::Size { op, path, value } => {
                let p = path.render(e)?;
                format!("size({p}) {op} {}", e.value(value.clone()))
            }
            Self::And(children) => render_group(children, " AND ", e)?,
            Self::Or(children) => render_group(children, " OR ", e)?,
            Self::Not(child) => {
                let inner = child.render(e)?;
                if child.is_composite() {
                    format!("NOT ({inner})")
                } else {
                    format!("NOT {inner}")
                }
            }
        };
        Ok(text)
    }
}

fn prune_group(children: Vec<Condition>, wrap: fn(Vec<Condition>) -> Condition) -> Option<Condition> {
    let mut kept: Vec<Condition> = children.into_iter().filter_map(Condition::prune).collect();
    match kept.len() {
        0 => None,
        1 => kept.pop(),
        _ => Some(wrap(kept)),
    }
}

fn render_group(
    children: &[Condition],
    joiner: &str,
    e: &mut Emitter<'_>,
) -> Result<String, ExpressionError> {
    let mut parts = Vec::with_capacity(children.len());
    for child in children {
        let text = child.render(e)?;
        if child.is_composite() {
            parts.push(format!("({text})"));
        } else {
            parts.push(text);
        }
    }
    Ok(parts.join(joiner))
}

/// Compile independent conditions as one conjunction.
///
/// Each call that adds a condition to an operation contributes one entry;
/// they are joined by an implicit `AND`. Returns `None` when nothing is left
/// after empty groups are dropped.
pub fn compile_conjunction(
    conditions: Vec<Condition>,
    scope: &mut PlaceholderScope,
) -> Result<Option<CompiledExpression>, ExpressionError> {
    Condition::And(conditions).compile(scope)
}

fn comparison(op: CompareOp, path: impl Into<AttributePath>, value: impl Into<AttributeValue>) -> Condition {
    Condition::Comparison {
        op,
        path: path.into(),
        value: value.into(),
    }
}

pub fn eq(path: impl Into<AttributePath>, value: impl Into<AttributeValue>) -> Condition {
    comparison(CompareOp::Eq, path, value)
}

pub fn ne(path: impl Into<AttributePath>, value: impl Into<AttributeValue>) -> Condition {
    comparison(CompareOp::Ne, path, value)
}

pub fn lt(path: impl Into<AttributePath>, value: impl Into<AttributeValue>) -> Condition {
    comparison(CompareOp::Lt, path, value)
}

pub fn le(path: impl Into<AttributePath>, value: impl Into<AttributeValue>) -> Condition {
    comparison(CompareOp::Le, path, value)
}

pub fn gt(path: impl Into<AttributePath>, value: impl Into<AttributeValue>) -> Condition {
    comparison(CompareOp::Gt, path, value)
}

pub fn ge(path: impl Into<AttributePath>, value: impl Into<AttributeValue>) -> Condition {
    comparison(CompareOp::Ge, path, value)
}

pub fn between(
    path: impl Into<AttributePath>,
    low: impl Into<AttributeValue>,
    high: impl Into<AttributeValue>,
) -> Condition {
    Condition::Between {
        path: path.into(),
        low: low.into(),
        high: high.into(),
    }
}

pub fn is_in<I, V>(path: impl Into<AttributePath>, values: I) -> Condition
where
    I: IntoIterator<Item = V>,
    V: Into<AttributeValue>,
{
    Condition::In {
        path: path.into(),
        values: values.into_iter().map(Into::into).collect(),
    }
}

fn function(name: FunctionName, path: impl Into<AttributePath>, args: Vec<AttributeValue>) -> Condition {
    Condition::Function {
        name,
        path: path.into(),
        args,
    }
}

pub fn attribute_exists(path: impl Into<AttributePath>) -> Condition {
    function(FunctionName::AttributeExists, path, Vec::new())
}

pub fn attribute_not_exists(path: impl Into<AttributePath>) -> Condition {
    function(FunctionName::AttributeNotExists, path, Vec::new())
}

/// `attribute_type(path, type)`, where `type` is a descriptor such as `"S"`
/// or `"NS"`.
pub fn attribute_type(path: impl Into<AttributePath>, type_descriptor: &str) -> Condition {
    function(
        FunctionName::AttributeType,
        path,
        vec![AttributeValue::from(type_descriptor)],
    )
}

pub fn begins_with(path: impl Into<AttributePath>, prefix: impl Into<AttributeValue>) -> Condition {
    function(FunctionName::BeginsWith, path, vec![prefix.into()])
}

pub fn contains(path: impl Into<AttributePath>, operand: impl Into<AttributeValue>) -> Condition {
    function(FunctionName::Contains, path, vec![operand.into()])
}

pub fn not_contains(path: impl Into<AttributePath>, operand: impl Into<AttributeValue>) -> Condition {
    not(contains(path, operand))
}

/// `size(path) op value`
pub fn size(path: impl Into<AttributePath>, op: CompareOp, value: impl Into<AttributeValue>) -> Condition {
    Condition::Size {
        op,
        path: path.into(),
        value: value.into(),
    }
}

/// Conjunction; `None` entries are dropped.
pub fn and<I, C>(conditions: I) -> Condition
where
    I: IntoIterator<Item = C>,
    C: Into<Option<Condition>>,
{
    Condition::And(conditions.into_iter().filter_map(Into::into).collect())
}

/// Disjunction; `None` entries are dropped.
pub fn or<I, C>(conditions: I) -> Condition
where
    I: IntoIterator<Item = C>,
    C: Into<Option<Condition>>,
{
    Condition::Or(conditions.into_iter().filter_map(Into::into).collect())
}

pub fn not(condition: Condition) -> Condition {
    Condition::Not(Box::new(condition))
}

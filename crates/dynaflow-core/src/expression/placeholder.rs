//! Placeholder allocation for one compiled request.

use dynaflow_model::{AttributeValue, ExpressionAttributeNames, ExpressionAttributeValues};

/// Prefix of attribute name placeholders.
pub const NAME_SIGIL: char = '#';
/// Prefix of attribute value placeholders.
pub const VALUE_SIGIL: char = ':';

/// Counter handing out placeholders that are unique within one request.
///
/// Every fragment of a request (key condition, filter, projection, update)
/// compiles against the same scope so their placeholders never collide.
#[derive(Debug, Default)]
pub struct PlaceholderScope {
    names: usize,
    values: usize,
}

impl PlaceholderScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a name placeholder for `real` and record it in `map`.
    pub fn name(&mut self, map: &mut PlaceholderMap, real: &str) -> String {
        let token = format!("{NAME_SIGIL}attr{}", self.names);
        self.names += 1;
        map.names.push((token.clone(), real.to_owned()));
        token
    }

    /// Allocate a value placeholder for `value` and record it in `map`.
    pub fn value(&mut self, map: &mut PlaceholderMap, value: AttributeValue) -> String {
        let token = format!("{VALUE_SIGIL}val{}", self.values);
        self.values += 1;
        map.values.push((token.clone(), value));
        token
    }
}

/// Placeholder to real name/value bindings, in allocation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceholderMap {
    pub names: Vec<(String, String)>,
    pub values: Vec<(String, AttributeValue)>,
}

impl PlaceholderMap {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.values.is_empty()
    }

    /// Append another fragment's bindings.
    pub fn merge(&mut self, other: Self) {
        self.names.extend(other.names);
        self.values.extend(other.values);
    }

    /// Convert into the wire maps.
    #[must_use]
    pub fn into_wire(self) -> (ExpressionAttributeNames, ExpressionAttributeValues) {
        (
            self.names.into_iter().collect(),
            self.values.into_iter().collect(),
        )
    }
}

/// Expression text plus the placeholders it references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledExpression {
    pub text: String,
    pub placeholders: PlaceholderMap,
}

/// Collects the placeholders of one fragment while it is being rendered.
#[derive(Debug)]
pub(crate) struct Emitter<'s> {
    scope: &'s mut PlaceholderScope,
    placeholders: PlaceholderMap,
}

impl<'s> Emitter<'s> {
    pub(crate) fn new(scope: &'s mut PlaceholderScope) -> Self {
        Self {
            scope,
            placeholders: PlaceholderMap::default(),
        }
    }

    pub(crate) fn name(&mut self, real: &str) -> String {
        self.scope.name(&mut self.placeholders, real)
    }

    pub(crate) fn value(&mut self, value: AttributeValue) -> String {
        self.scope.value(&mut self.placeholders, value)
    }

    pub(crate) fn finish(self, text: String) -> CompiledExpression {
        CompiledExpression {
            text,
            placeholders: self.placeholders,
        }
    }
}

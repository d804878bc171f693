//! Attribute paths such as `address.lines[0]`.

use std::fmt;

use super::ExpressionError;
use super::placeholder::{CompiledExpression, Emitter, PlaceholderScope};

/// One step of an [`AttributePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A map key or top level attribute name.
    Name(String),
    /// A list element.
    Index(usize),
}

/// A location inside an item.
///
/// Paths are parsed leniently from strings: `.` separates names and `[n]`
/// dereferences list elements. A part whose brackets do not hold a number
/// is kept verbatim as a single name, since attribute names may contain any
/// character once hidden behind a placeholder. Structural problems (empty
/// names, a leading index) surface when the path is serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AttributePath {
    segments: Vec<PathSegment>,
}

impl AttributePath {
    #[must_use]
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Parse a dotted/indexed path string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        if raw.is_empty() {
            return Self { segments };
        }
        for part in raw.split('.') {
            parse_part(part, &mut segments);
        }
        Self { segments }
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Serialize into a standalone fragment with its own name bindings.
    pub fn compile(
        &self,
        scope: &mut PlaceholderScope,
    ) -> Result<CompiledExpression, ExpressionError> {
        let mut emitter = Emitter::new(scope);
        let text = self.render(&mut emitter)?;
        Ok(emitter.finish(text))
    }

    /// Render the path, allocating one name placeholder per named segment.
    pub(crate) fn render(&self, emitter: &mut Emitter<'_>) -> Result<String, ExpressionError> {
        if self.segments.is_empty() {
            return Err(ExpressionError::EmptyPath);
        }
        let mut out = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Name(name) if name.is_empty() => {
                    return Err(self.invalid("empty attribute name"));
                }
                PathSegment::Name(name) => {
                    if i > 0 {
                        out.push('.');
                    }
                    out.push_str(&emitter.name(name));
                }
                PathSegment::Index(_) if i == 0 => {
                    return Err(self.invalid("path cannot start with a list index"));
                }
                PathSegment::Index(idx) => {
                    out.push('[');
                    out.push_str(&idx.to_string());
                    out.push(']');
                }
            }
        }
        Ok(out)
    }

    fn invalid(&self, reason: &'static str) -> ExpressionError {
        ExpressionError::InvalidPath {
            path: self.to_string(),
            reason,
        }
    }
}

fn parse_part(part: &str, out: &mut Vec<PathSegment>) {
    let (name, mut rest) = part.find('[').map_or((part, ""), |i| part.split_at(i));
    let mut indices = Vec::new();
    while !rest.is_empty() {
        let parsed = rest.strip_prefix('[').and_then(|inner| {
            let close = inner.find(']')?;
            let idx = inner[..close].parse::<usize>().ok()?;
            Some((idx, &inner[close + 1..]))
        });
        let Some((idx, remaining)) = parsed else {
            out.push(PathSegment::Name(part.to_owned()));
            return;
        };
        indices.push(idx);
        rest = remaining;
    }
    if !name.is_empty() || indices.is_empty() || !out.is_empty() {
        out.push(PathSegment::Name(name.to_owned()));
    }
    out.extend(indices.into_iter().map(PathSegment::Index));
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Name(name) if i > 0 => write!(f, ".{name}")?,
                PathSegment::Name(name) => f.write_str(name)?,
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl From<&str> for AttributePath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for AttributePath {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&String> for AttributePath {
    fn from(raw: &String) -> Self {
        Self::parse(raw)
    }
}

impl From<Vec<PathSegment>> for AttributePath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self::new(segments)
    }
}

//! Placeholder deduplication and canonical renaming.
//!
//! Every fragment of one request is compiled against a shared
//! [`PlaceholderScope`](super::PlaceholderScope), which hands out a fresh
//! token per path segment and per literal. The optimizer folds duplicates
//! and renames the survivors to `#n<i>` / `:v<i>` so the request is compact
//! and stable: running it twice yields the same output.
//!
//! Tokens are rewritten whole. Expression text is scanned with a small
//! lexer and each `#ident` / `:ident` run is looked up as one unit, so
//! `#attr1` never matches inside `#attr10`. Tokens absent from the
//! placeholder map (for example ones written by hand) are left untouched.

use std::collections::HashMap;

use dynaflow_model::AttributeValue;

use super::placeholder::{NAME_SIGIL, PlaceholderMap, VALUE_SIGIL};

/// Deduplicate and canonicalize the placeholders shared by `expressions`.
///
/// Each string in `expressions` is rewritten in place. The returned map
/// holds one binding per distinct real name and per distinct value that is
/// still referenced by some expression, numbered in first-seen order across
/// `expressions`. Bindings no expression references are dropped, since the
/// store rejects unused placeholders.
pub fn optimize(expressions: &mut [&mut String], placeholders: PlaceholderMap) -> PlaceholderMap {
    let PlaceholderMap { names, values } = placeholders;

    let (name_alias, names) = dedup_by(names, |a, b| a == b);
    let (value_alias, values) = dedup_by(values, AttributeValue::same_as);
    let mut alias = name_alias;
    alias.extend(value_alias);
    for text in expressions.iter_mut() {
        let rewritten = rewrite(text.as_str(), &alias);
        **text = rewritten;
    }

    canonicalize(expressions, names, values)
}

/// Keep the first binding of each distinct target; map later tokens to it.
fn dedup_by<T>(
    bindings: Vec<(String, T)>,
    same: impl Fn(&T, &T) -> bool,
) -> (HashMap<String, String>, Vec<(String, T)>) {
    let mut alias = HashMap::new();
    let mut kept: Vec<(String, T)> = Vec::with_capacity(bindings.len());
    for (token, target) in bindings {
        match kept.iter().find(|(_, seen)| same(seen, &target)) {
            Some((first, _)) => {
                alias.insert(token, first.clone());
            }
            None => kept.push((token, target)),
        }
    }
    (alias, kept)
}

fn canonicalize(
    expressions: &mut [&mut String],
    names: Vec<(String, String)>,
    values: Vec<(String, AttributeValue)>,
) -> PlaceholderMap {
    let mut names: HashMap<String, String> = names.into_iter().collect();
    let mut values: HashMap<String, AttributeValue> = values.into_iter().collect();
    let mut renames = HashMap::new();
    let mut out = PlaceholderMap::default();

    for text in expressions.iter() {
        for token in tokens(text.as_str()) {
            if renames.contains_key(token) {
                continue;
            }
            if let Some(real) = names.remove(token) {
                let canonical = format!("{NAME_SIGIL}n{}", out.names.len());
                out.names.push((canonical.clone(), real));
                renames.insert(token.to_owned(), canonical);
            } else if let Some(value) = values.remove(token) {
                let canonical = format!("{VALUE_SIGIL}v{}", out.values.len());
                out.values.push((canonical.clone(), value));
                renames.insert(token.to_owned(), canonical);
            }
        }
    }

    for text in expressions.iter_mut() {
        let rewritten = rewrite(text.as_str(), &renames);
        **text = rewritten;
    }
    out
}

/// Placeholder tokens of `text`, in order of appearance.
fn tokens(text: &str) -> impl Iterator<Item = &str> {
    spans(text).into_iter().map(move |(start, end)| &text[start..end])
}

/// Byte ranges of every `#ident` / `:ident` run in `text`.
fn spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c != NAME_SIGIL && c != VALUE_SIGIL {
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some(&(i, next)) = chars.peek() {
            if !is_token_char(next) {
                break;
            }
            end = i + next.len_utf8();
            chars.next();
        }
        if end > start + c.len_utf8() {
            spans.push((start, end));
        }
    }
    spans
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace whole tokens of `text` through `map`, all at once.
fn rewrite(text: &str, map: &HashMap<String, String>) -> String {
    if map.is_empty() {
        return text.to_owned();
    }
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in spans(text) {
        if let Some(replacement) = map.get(&text[start..end]) {
            out.push_str(&text[cursor..start]);
            out.push_str(replacement);
            cursor = end;
        }
    }
    out.push_str(&text[cursor..]);
    out
}

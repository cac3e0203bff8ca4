//! Query template rendering.
//!
//! Templates substitute request parameters directly into query text with no
//! quoting, escaping, or parameter binding. That is the contract the stored
//! descriptors rely on — a placeholder may stand for a table or column name
//! as well as a value, which genuine bind parameters cannot express — and it
//! means descriptors must only ever be authored by trusted administrators.
//! Treat the descriptor store as part of the code: anyone who can write to
//! it can run arbitrary queries.

use crate::error::{Result, RowgateError};
use crate::params::{value_fragment, ParamBag};

/// Well-known placeholder for the third-party identity, substituted
/// textually after the normal render pass (the identity is only known once
/// the code exchange has run).
pub const IDENTITY_PLACEHOLDER: &str = "{{.openid}}";

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Placeholder(String),
}

/// A parsed query template: literal text interleaved with `{{.name}}`
/// placeholders. Placeholder names are flat identifiers; the bag is flat.
#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(input: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = input;
        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                return Err(RowgateError::TemplateParse(
                    "unterminated placeholder".to_string(),
                ));
            };
            segments.push(Segment::Placeholder(placeholder_name(&after[..end])?));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Ok(Self { segments })
    }

    /// Substitute every placeholder with its bag value's string form.
    /// A placeholder with no bag entry fails the render — it never renders
    /// silently empty.
    pub fn render(&self, bag: &ParamBag) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(name) => match bag.get(name) {
                    Some(value) => out.push_str(&value_fragment(value)),
                    None => return Err(RowgateError::MissingPlaceholder(name.clone())),
                },
            }
        }
        Ok(out)
    }
}

/// `inner` is the text between `{{` and `}}`: optional whitespace, a dot,
/// then a flat identifier.
fn placeholder_name(inner: &str) -> Result<String> {
    let trimmed = inner.trim();
    let Some(name) = trimmed.strip_prefix('.') else {
        return Err(RowgateError::TemplateParse(format!(
            "expected '.name' inside placeholder, got '{trimmed}'"
        )));
    };
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(RowgateError::TemplateParse(format!(
            "invalid placeholder name '{name}'"
        )));
    }
    Ok(name.to_string())
}

/// Plain-text substitution of the well-known identity placeholder. Not a
/// template pass: everything else in the string is left untouched.
pub fn substitute_identity(query: &str, open_id: &str) -> String {
    query.replace(IDENTITY_PLACEHOLDER, open_id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

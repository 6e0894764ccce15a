//! Source templates and their expansion.
//!
//! A map section's source is parsed once at configuration time into a
//! [`Template`]. At request time an [`Expander`] turns it into the string the
//! processor receives. The escape capability of the processor is applied to
//! every interpolated value, never to the literal text around it.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::error::MapProcError;
use crate::processor::{Escape, ModuleHandle};
use crate::request::{AttrRef, Request};

/// Piece of an expandable string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XlatNode {
    Text(String),
    Attribute(AttrRef),
}

/// Parsed source template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// Used verbatim
    Literal(String),
    /// Value of a single attribute; expansion fails if it is absent
    Attribute(AttrRef),
    /// Text with `%{...}` interpolations
    Xlat(Vec<XlatNode>),
}

fn xlat_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"%%|%\{([^{}]*)\}").expect("valid xlat regex"))
}

impl Template {
    /// Parse a source template.
    ///
    /// * `&Name` / `&reply:Name` - attribute reference
    /// * `'text'` - literal, no expansion
    /// * `"text %{Name}"` or bare text - expanded; `%%` is a literal `%`
    pub fn parse(raw: &str) -> Result<Self, MapProcError> {
        let raw = raw.trim();

        if raw.starts_with('&') {
            return Ok(Template::Attribute(AttrRef::parse(raw)?));
        }
        if let Some(body) = quoted_body(raw, '\'') {
            return Ok(Template::Literal(unescape(body, '\'')));
        }

        let nodes = match quoted_body(raw, '"') {
            Some(body) => parse_xlat(&unescape(body, '"'))?,
            None => parse_xlat(raw)?,
        };
        if nodes.iter().all(|n| matches!(n, XlatNode::Text(_))) {
            let text = nodes
                .into_iter()
                .map(|n| match n {
                    XlatNode::Text(t) => t,
                    XlatNode::Attribute(_) => String::new(),
                })
                .collect();
            return Ok(Template::Literal(text));
        }

        Ok(Template::Xlat(nodes))
    }

    /// Attribute references the template reads.
    pub fn attributes(&self) -> Vec<&AttrRef> {
        match self {
            Template::Literal(_) => Vec::new(),
            Template::Attribute(attr) => vec![attr],
            Template::Xlat(nodes) => nodes
                .iter()
                .filter_map(|n| match n {
                    XlatNode::Attribute(attr) => Some(attr),
                    XlatNode::Text(_) => None,
                })
                .collect(),
        }
    }
}

/// Body of `raw` if it is a single string quoted with `quote`: the closing
/// quote must be the first unescaped one, so `'a' || 'b'` is not quoted.
fn quoted_body(raw: &str, quote: char) -> Option<&str> {
    let rest = raw.strip_prefix(quote)?;
    let mut escaped = false;

    for (index, c) in rest.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return (index + c.len_utf8() == rest.len()).then(|| &rest[..index]);
        }
    }
    None
}

fn unescape(body: &str, quote: char) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' && matches!(chars.peek(), Some(&n) if n == quote || n == '\\') {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn escape_quoted(text: &str, quote: char) -> String {
    text.replace('\\', "\\\\")
        .replace(quote, &format!("\\{}", quote))
}

fn parse_xlat(body: &str) -> Result<Vec<XlatNode>, MapProcError> {
    let mut nodes = Vec::new();
    let mut text = String::new();
    let mut last = 0;

    for caps in xlat_pattern().captures_iter(body) {
        let whole = caps.get(0).expect("capture 0 always present");
        push_text(&mut text, &body[last..whole.start()])?;
        last = whole.end();

        match caps.get(1) {
            None => text.push('%'),
            Some(inner) => {
                if inner.as_str().trim().is_empty() {
                    return Err(MapProcError::Validation("Empty expansion '%{}'".to_string()));
                }
                let attr = AttrRef::parse(inner.as_str())?;
                if !text.is_empty() {
                    nodes.push(XlatNode::Text(std::mem::take(&mut text)));
                }
                nodes.push(XlatNode::Attribute(attr));
            }
        }
    }
    push_text(&mut text, &body[last..])?;

    if !text.is_empty() || nodes.is_empty() {
        nodes.push(XlatNode::Text(text));
    }
    Ok(nodes)
}

fn push_text(text: &mut String, chunk: &str) -> Result<(), MapProcError> {
    if chunk.contains("%{") {
        return Err(MapProcError::Validation(format!(
            "Unterminated expansion in '{}'",
            chunk
        )));
    }
    text.push_str(chunk);
    Ok(())
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Template::Literal(text) => write!(f, "'{}'", escape_quoted(text, '\'')),
            Template::Attribute(attr) => write!(f, "{}", attr),
            Template::Xlat(nodes) => {
                f.write_str("\"")?;
                for node in nodes {
                    match node {
                        XlatNode::Text(t) => {
                            f.write_str(&escape_quoted(t, '"').replace('%', "%%"))?
                        }
                        XlatNode::Attribute(attr) => {
                            write!(f, "%{{{}:{}}}", attr.list.as_str(), attr.name)?
                        }
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// Expands templates against a request.
///
/// Implementations call `escape` once for every interpolated value, passing
/// the owning module so the escaper can use module-specific rules (e.g. the
/// quoting convention of a particular SQL driver).
pub trait Expander: Send + Sync {
    fn expand(
        &self,
        request: &Request,
        template: &Template,
        escape: Option<&dyn Escape>,
        owner: &ModuleHandle,
    ) -> Result<String, MapProcError>;
}

/// Expander for the template forms [`Template::parse`] produces.
///
/// An absent attribute inside an expandable string becomes the empty string;
/// an absent attribute used as the whole template is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExpander;

impl Expander for DefaultExpander {
    fn expand(
        &self,
        request: &Request,
        template: &Template,
        escape: Option<&dyn Escape>,
        owner: &ModuleHandle,
    ) -> Result<String, MapProcError> {
        match template {
            Template::Literal(text) => Ok(text.clone()),
            Template::Attribute(attr) => request
                .get(attr)
                .map(|value| value.to_string())
                .ok_or_else(|| MapProcError::Expansion(format!("Attribute {} not found", attr))),
            Template::Xlat(nodes) => {
                let mut out = String::new();
                for node in nodes {
                    match node {
                        XlatNode::Text(text) => out.push_str(text),
                        XlatNode::Attribute(attr) => {
                            let raw = request
                                .get(attr)
                                .map(|value| value.to_string())
                                .unwrap_or_default();
                            match escape {
                                Some(escape) => out.push_str(&escape.escape(request, &raw, owner)),
                                None => out.push_str(&raw),
                            }
                        }
                    }
                }
                Ok(out)
            }
        }
    }
}

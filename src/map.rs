//! Attribute-mapping rules handed to map processors.
//!
//! A rule reads `lhs op rhs`: `lhs` is the request attribute to write, `op`
//! says how, and `rhs` names the field of the processor's result the value
//! comes from (a column, an LDAP attribute, a JSON path).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::MapProcError;
use crate::request::{AttrRef, Request};
use crate::value::AttrValue;

/// Assignment operator of a map rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapOperator {
    /// `=` set only if the attribute is absent
    Equal,
    /// `:=` replace all existing values
    Set,
    /// `+=` append
    Add,
    /// `-=` remove values equal to the result
    Sub,
    /// `!*` remove the attribute entirely
    Clear,
}

impl MapOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            MapOperator::Equal => "=",
            MapOperator::Set => ":=",
            MapOperator::Add => "+=",
            MapOperator::Sub => "-=",
            MapOperator::Clear => "!*",
        }
    }
}

impl FromStr for MapOperator {
    type Err = MapProcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(MapOperator::Equal),
            ":=" => Ok(MapOperator::Set),
            "+=" => Ok(MapOperator::Add),
            "-=" => Ok(MapOperator::Sub),
            "!*" => Ok(MapOperator::Clear),
            other => Err(MapProcError::Validation(format!("Unknown map operator '{}'", other))),
        }
    }
}

impl fmt::Display for MapOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn rule_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\S+)\s+(:=|\+=|-=|!\*|=)\s*(.*?)\s*$").expect("valid map rule regex")
    })
}

fn quoted_with(raw: &str) -> Option<char> {
    ['\'', '"']
        .into_iter()
        .find(|&quote| raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote))
}

fn unquote(raw: &str) -> &str {
    match quoted_with(raw) {
        Some(_) => &raw[1..raw.len() - 1],
        None => raw,
    }
}

/// One attribute-mapping rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ValueMap {
    pub lhs: AttrRef,
    pub op: MapOperator,
    pub rhs: String,
}

impl ValueMap {
    pub fn new(lhs: AttrRef, op: MapOperator, rhs: impl Into<String>) -> Self {
        Self {
            lhs,
            op,
            rhs: rhs.into(),
        }
    }

    /// Parse a rule such as `reply:Reply-Message := message`.
    ///
    /// # Example
    /// ```
    /// use mapproc::{MapOperator, ValueMap};
    ///
    /// let rule = ValueMap::parse("control:Cleartext-Password := 'password'").unwrap();
    /// assert_eq!(rule.op, MapOperator::Set);
    /// assert_eq!(rule.rhs, "password");
    /// ```
    pub fn parse(raw: &str) -> Result<Self, MapProcError> {
        let caps = rule_pattern()
            .captures(raw)
            .ok_or_else(|| MapProcError::Validation(format!("Malformed map rule '{}'", raw)))?;

        let lhs = AttrRef::parse(&caps[1])?;
        let op: MapOperator = caps[2].parse()?;
        let rhs = unquote(&caps[3]).to_string();

        if rhs.is_empty() && op != MapOperator::Clear {
            return Err(MapProcError::Validation(format!(
                "Map rule '{}' has no right-hand side",
                raw
            )));
        }

        Ok(Self::new(lhs, op, rhs))
    }

    /// Apply the rule's operator to `request` with a value produced by the
    /// processor. Returns whether the request changed.
    pub fn apply(&self, request: &mut Request, value: AttrValue) -> bool {
        match self.op {
            MapOperator::Equal => {
                if request.has(&self.lhs) {
                    return false;
                }
                request.set(&self.lhs, value);
                true
            }
            MapOperator::Set => {
                request.set(&self.lhs, value);
                true
            }
            MapOperator::Add => {
                request.add(&self.lhs, value);
                true
            }
            MapOperator::Sub => request.remove_value(&self.lhs, &value) > 0,
            MapOperator::Clear => request.remove(&self.lhs).is_some(),
        }
    }
}

impl fmt::Display for ValueMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // parse strips one layer of quotes and trims whitespace
        if self.rhs.contains(char::is_whitespace) || quoted_with(&self.rhs).is_some() {
            let quote = if self.rhs.contains('\'') { '"' } else { '\'' };
            write!(f, "{} {} {}{}{}", self.lhs, self.op, quote, self.rhs, quote)
        } else {
            write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
        }
    }
}

impl FromStr for ValueMap {
    type Err = MapProcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValueMap::parse(s)
    }
}

impl TryFrom<String> for ValueMap {
    type Error = MapProcError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ValueMap::parse(&s)
    }
}

impl From<ValueMap> for String {
    fn from(map: ValueMap) -> Self {
        map.to_string()
    }
}

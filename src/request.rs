//! Request context that map processors read from and write to.
//!
//! A request carries three attribute lists. Each list is an insertion-ordered
//! map from attribute name to one or more values, so repeated attributes keep
//! the order they were added in.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::MapProcError;
use crate::value::AttrValue;

/// Attribute list on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    #[default]
    Request,
    Reply,
    Control,
}

impl ListKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ListKind::Request => "request",
            ListKind::Reply => "reply",
            ListKind::Control => "control",
        }
    }
}

impl FromStr for ListKind {
    type Err = MapProcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(ListKind::Request),
            "reply" => Ok(ListKind::Reply),
            "control" => Ok(ListKind::Control),
            other => Err(MapProcError::Validation(format!("Unknown attribute list '{}'", other))),
        }
    }
}

/// Reference to an attribute in one of the request lists.
///
/// Written as `[&][list:]Name`; the list defaults to `request`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrRef {
    pub list: ListKind,
    pub name: String,
}

impl AttrRef {
    pub fn new(list: ListKind, name: impl Into<String>) -> Self {
        Self {
            list,
            name: name.into(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, MapProcError> {
        let trimmed = raw.trim();
        let body = trimmed.strip_prefix('&').unwrap_or(trimmed);

        let (list, name) = match body.split_once(':') {
            Some((list, name)) => (list.parse::<ListKind>()?, name),
            None => (ListKind::Request, body),
        };

        if name.is_empty() {
            return Err(MapProcError::Validation(format!(
                "Attribute reference '{}' has no name",
                raw
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(MapProcError::Validation(format!(
                "Invalid attribute name '{}'",
                name
            )));
        }

        Ok(Self::new(list, name))
    }
}

impl FromStr for AttrRef {
    type Err = MapProcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttrRef::parse(s)
    }
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{}:{}", self.list.as_str(), self.name)
    }
}

/// Attribute list: name -> values in insertion order
pub type AttrList = IndexMap<String, Vec<AttrValue>>;

/// A request being processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for log correlation
    pub id: Uuid,

    /// Timestamp when the request was received
    pub received_at: DateTime<Utc>,

    #[serde(default)]
    request: AttrList,

    #[serde(default)]
    reply: AttrList,

    #[serde(default)]
    control: AttrList,
}

impl Request {
    /// Create an empty request.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            request: AttrList::new(),
            reply: AttrList::new(),
            control: AttrList::new(),
        }
    }

    /// Builder helper: append a value to the `request` list.
    ///
    /// # Example
    /// ```
    /// use mapproc::Request;
    ///
    /// let request = Request::new()
    ///     .with_attribute("User-Name", "bob")
    ///     .with_attribute("NAS-Port", 7i64);
    /// assert_eq!(request.attribute_count(mapproc::ListKind::Request), 2);
    /// ```
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.add(&AttrRef::new(ListKind::Request, name), value.into());
        self
    }

    pub fn list(&self, kind: ListKind) -> &AttrList {
        match kind {
            ListKind::Request => &self.request,
            ListKind::Reply => &self.reply,
            ListKind::Control => &self.control,
        }
    }

    pub fn list_mut(&mut self, kind: ListKind) -> &mut AttrList {
        match kind {
            ListKind::Request => &mut self.request,
            ListKind::Reply => &mut self.reply,
            ListKind::Control => &mut self.control,
        }
    }

    /// First value of an attribute.
    pub fn get(&self, attr: &AttrRef) -> Option<&AttrValue> {
        self.get_all(attr).first()
    }

    /// All values of an attribute, empty if absent.
    pub fn get_all(&self, attr: &AttrRef) -> &[AttrValue] {
        self.list(attr.list)
            .get(&attr.name)
            .map(|values| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn has(&self, attr: &AttrRef) -> bool {
        !self.get_all(attr).is_empty()
    }

    /// Replace every value of an attribute with `value`.
    pub fn set(&mut self, attr: &AttrRef, value: AttrValue) {
        self.list_mut(attr.list).insert(attr.name.clone(), vec![value]);
    }

    /// Append a value, keeping existing ones.
    pub fn add(&mut self, attr: &AttrRef, value: AttrValue) {
        self.list_mut(attr.list)
            .entry(attr.name.clone())
            .or_default()
            .push(value);
    }

    /// Remove values equal to `value`, returning how many were removed.
    pub fn remove_value(&mut self, attr: &AttrRef, value: &AttrValue) -> usize {
        let list = self.list_mut(attr.list);
        let Some(values) = list.get_mut(&attr.name) else {
            return 0;
        };

        let before = values.len();
        values.retain(|v| v != value);
        let removed = before - values.len();

        if values.is_empty() {
            list.shift_remove(&attr.name);
        }
        removed
    }

    /// Remove an attribute entirely.
    pub fn remove(&mut self, attr: &AttrRef) -> Option<Vec<AttrValue>> {
        self.list_mut(attr.list).shift_remove(&attr.name)
    }

    /// Number of distinct attributes in a list.
    pub fn attribute_count(&self, kind: ListKind) -> usize {
        self.list(kind).len()
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json.clone())
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attr_ref() {
        let r = AttrRef::parse("&reply:Reply-Message").unwrap();
        assert_eq!(r.list, ListKind::Reply);
        assert_eq!(r.name, "Reply-Message");

        let r = AttrRef::parse("User-Name").unwrap();
        assert_eq!(r.list, ListKind::Request);
        assert_eq!(r.to_string(), "&request:User-Name");
    }

    #[test]
    fn test_parse_attr_ref_rejects_bad_input() {
        assert!(AttrRef::parse("").is_err());
        assert!(AttrRef::parse("&reply:").is_err());
        assert!(AttrRef::parse("session:Foo").is_err());
        assert!(AttrRef::parse("Bad Name").is_err());
    }

    #[test]
    fn test_set_add_and_remove() {
        let attr = AttrRef::new(ListKind::Reply, "Class");
        let mut request = Request::new();

        request.add(&attr, "a".into());
        request.add(&attr, "b".into());
        assert_eq!(request.get_all(&attr).len(), 2);
        assert_eq!(request.get(&attr), Some(&AttrValue::from("a")));

        request.set(&attr, "c".into());
        assert_eq!(request.get_all(&attr), &[AttrValue::from("c")]);

        assert_eq!(request.remove_value(&attr, &"c".into()), 1);
        assert!(!request.has(&attr));
        assert_eq!(request.attribute_count(ListKind::Reply), 0);
    }

    #[test]
    fn test_lists_are_independent() {
        let request = Request::new().with_attribute("User-Name", "bob");

        assert!(request.has(&AttrRef::new(ListKind::Request, "User-Name")));
        assert!(!request.has(&AttrRef::new(ListKind::Reply, "User-Name")));
    }

    #[test]
    fn test_json_roundtrip_keeps_order() {
        let request = Request::new()
            .with_attribute("B", "2")
            .with_attribute("A", "1");

        let json = request.to_json().unwrap();
        let back = Request::from_json(&json).unwrap();

        let names: Vec<&String> = back.list(ListKind::Request).keys().collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(back.id, request.id);
    }
}

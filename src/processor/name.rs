//! Processor names and the order the registry keeps them in.

use std::cmp::Ordering;
use std::fmt;

use crate::error::MapProcError;

/// Longest processor name accepted, in bytes.
pub const MAX_NAME_LEN: usize = 253;

/// Validated processor name.
///
/// Names order by byte length first and only then byte-wise, so names of
/// different lengths never compare equal even when one is a prefix of the
/// other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcName(String);

impl ProcName {
    pub fn new(name: &str) -> Result<Self, MapProcError> {
        if name.is_empty() {
            return Err(MapProcError::Validation(
                "Map processor name cannot be empty".to_string(),
            ));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(MapProcError::Validation(format!(
                "Map processor name is {} bytes, maximum is {}",
                name.len(),
                MAX_NAME_LEN
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for ProcName {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.0.len().cmp(&other.0.len()) {
            Ordering::Equal => {}
            ordering => return ordering,
        }

        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

impl PartialOrd for ProcName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ProcName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ProcName {
        ProcName::new(s).unwrap()
    }

    #[test]
    fn test_shorter_sorts_first() {
        assert!(name("zz") < name("aaa"));
        assert!(name("sql") < name("sql2"));
        assert_ne!(name("sql").cmp(&name("sql2")), Ordering::Equal);
    }

    #[test]
    fn test_equal_length_is_bytewise() {
        assert!(name("ldap") < name("sql1"));
        assert!(name("Sql") < name("sql"));
        assert_eq!(name("csv").cmp(&name("csv")), Ordering::Equal);
    }

    #[test]
    fn test_order_is_total_over_sample() {
        let mut names: Vec<ProcName> = ["json", "sql", "a", "ldap", "sql2", "b", "csv"]
            .iter()
            .map(|s| name(s))
            .collect();
        names.sort();

        let sorted: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(sorted, vec!["a", "b", "csv", "sql", "json", "ldap", "sql2"]);

        for window in names.windows(2) {
            assert_eq!(window[0].cmp(&window[1]), Ordering::Less);
            assert_eq!(window[1].cmp(&window[0]), Ordering::Greater);
        }
    }

    #[test]
    fn test_validation() {
        assert!(matches!(ProcName::new(""), Err(MapProcError::Validation(_))));
        assert!(ProcName::new(&"x".repeat(MAX_NAME_LEN)).is_ok());
        assert!(ProcName::new(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }
}

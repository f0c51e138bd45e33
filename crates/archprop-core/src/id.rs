//! Issue reference identity.
//!
//! A [`IssueRef`] is either a user-authored string (for issues supplied by
//! the caller) or an integer the engine allocates for derived issues. On the
//! wire it is a bare JSON string or number.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Propagation-tracking identity of an issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IssueRef {
    /// Engine-assigned reference of a derived issue.
    Derived(u64),
    /// Caller-assigned reference of a user-authored issue.
    Named(String),
}

impl IssueRef {
    /// Returns the numeric value for derived refs.
    pub fn as_derived(&self) -> Option<u64> {
        match self {
            IssueRef::Derived(n) => Some(*n),
            IssueRef::Named(_) => None,
        }
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueRef::Derived(n) => write!(f, "{}", n),
            IssueRef::Named(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for IssueRef {
    fn from(s: &str) -> Self {
        IssueRef::Named(s.to_string())
    }
}

impl From<String> for IssueRef {
    fn from(s: String) -> Self {
        IssueRef::Named(s)
    }
}

impl From<u64> for IssueRef {
    fn from(n: u64) -> Self {
        IssueRef::Derived(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_string_and_number() {
        let named: IssueRef = serde_json::from_str("\"bug-1\"").unwrap();
        assert_eq!(named, IssueRef::Named("bug-1".into()));

        let derived: IssueRef = serde_json::from_str("12").unwrap();
        assert_eq!(derived, IssueRef::Derived(12));
    }

    #[test]
    fn numeric_looking_string_stays_named() {
        let named: IssueRef = serde_json::from_str("\"12\"").unwrap();
        assert_eq!(named.as_derived(), None);
    }

    #[test]
    fn display_prints_inner_value() {
        assert_eq!(format!("{}", IssueRef::Derived(3)), "3");
        assert_eq!(format!("{}", IssueRef::from("seed")), "seed");
    }
}

//! Filter expression data types.
//!
//! A [`MetaFilter`] is either a leaf filter for one entity kind or one of the
//! `and` / `or` / `not` combinators. On the wire a combinator is an object
//! with exactly one key (`{"and": [...]}`, `{"or": [...]}`, `{"not": {...}}`);
//! every other object is parsed as a leaf. Leaf filters reject unknown keys so
//! that a misspelled combinator fails loudly instead of matching everything.
//!
//! Evaluation lives in `archprop-engine`; this module only holds the data.

use std::fmt;

use indexmap::IndexMap;
use regex::Regex;
use serde::de::{DeserializeOwned, Error as _};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::CoreError;

/// Per-field declarative rules, keyed by templated field name.
///
/// Each rule is an expression in the templated-field rule language and is
/// evaluated against the node's own value for that field.
pub type FieldRules = IndexMap<String, Value>;

/// A recursive boolean filter over leaf filters of type `T`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaFilter<T> {
    Leaf(T),
    /// All sub-filters match. Vacuously true when empty.
    And(Vec<MetaFilter<T>>),
    /// Any sub-filter matches. Vacuously false when empty.
    Or(Vec<MetaFilter<T>>),
    Not(Box<MetaFilter<T>>),
}

impl<T> MetaFilter<T> {
    /// The filter that matches everything (`{"and": []}`).
    pub fn all() -> Self {
        MetaFilter::And(Vec::new())
    }

    /// The filter that matches nothing (`{"or": []}`).
    pub fn none() -> Self {
        MetaFilter::Or(Vec::new())
    }

    pub fn leaf(filter: T) -> Self {
        MetaFilter::Leaf(filter)
    }

    pub fn negate(self) -> Self {
        MetaFilter::Not(Box::new(self))
    }

    /// Calls `visit` for every leaf in the tree, depth first.
    pub fn for_each_leaf<'a>(&'a self, visit: &mut impl FnMut(&'a T)) {
        match self {
            MetaFilter::Leaf(leaf) => visit(leaf),
            MetaFilter::And(filters) | MetaFilter::Or(filters) => {
                for filter in filters {
                    filter.for_each_leaf(visit);
                }
            }
            MetaFilter::Not(filter) => filter.for_each_leaf(visit),
        }
    }
}

impl<T> Default for MetaFilter<T> {
    fn default() -> Self {
        MetaFilter::all()
    }
}

impl<T: DeserializeOwned> MetaFilter<T> {
    /// Parses a filter from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let value = match value {
            Value::Object(mut map) if map.len() == 1 => {
                if let Some(inner) = map.remove("and") {
                    return Ok(MetaFilter::And(Self::list_from_value(inner)?));
                }
                if let Some(inner) = map.remove("or") {
                    return Ok(MetaFilter::Or(Self::list_from_value(inner)?));
                }
                if let Some(inner) = map.remove("not") {
                    return Ok(MetaFilter::negate(Self::from_value(inner)?));
                }
                Value::Object(map)
            }
            other => other,
        };
        serde_json::from_value(value).map(MetaFilter::Leaf)
    }

    fn list_from_value(value: Value) -> Result<Vec<Self>, serde_json::Error> {
        match value {
            Value::Array(items) => items.into_iter().map(Self::from_value).collect(),
            other => Err(serde_json::Error::custom(format!(
                "filter combinator expects a list, got {}",
                other
            ))),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for MetaFilter<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        MetaFilter::from_value(value).map_err(D::Error::custom)
    }
}

impl<T: Serialize> Serialize for MetaFilter<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetaFilter::Leaf(leaf) => leaf.serialize(serializer),
            MetaFilter::And(filters) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("and", filters)?;
                map.end()
            }
            MetaFilter::Or(filters) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("or", filters)?;
                map.end()
            }
            MetaFilter::Not(filter) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("not", filter)?;
                map.end()
            }
        }
    }
}

/// A compiled `name` regular expression. Matches anywhere in the name.
#[derive(Clone)]
pub struct NamePattern(Regex);

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self, CoreError> {
        Regex::new(pattern)
            .map(NamePattern)
            .map_err(|e| CoreError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.0.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamePattern({:?})", self.0.as_str())
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for NamePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NamePattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        NamePattern::new(&pattern).map_err(D::Error::custom)
    }
}

/// Constraints shared by every filter over a templated node.
pub trait TemplatedNodeFilter {
    /// Allowed template ids. `None` allows any template.
    fn template(&self) -> Option<&[String]>;
    /// Per-field rules that must all hold.
    fn templated_fields(&self) -> Option<&FieldRules>;
}

/// Leaf filter over issues.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IssueFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templated_fields: Option<FieldRules>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Vec<String>>,
    /// At least one of these must be present on the issue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characteristics: Option<Vec<String>>,
}

/// Leaf filter over relations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RelationFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templated_fields: Option<FieldRules>,
}

/// Kind of a graph node, as named by a filter's `type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Component,
    Interface,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Component => write!(f, "component"),
            NodeKind::Interface => write!(f, "interface"),
        }
    }
}

/// Leaf filter over a component or an interface.
///
/// Rule authors often reuse relation partner filters in these positions, so
/// an optional `type` discriminator is accepted. When present it must agree
/// with the kind of the node being tested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeFilter {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templated_fields: Option<FieldRules>,
    /// Omitted matches every name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<NamePattern>,
}

pub type ComponentFilterBase = NodeFilter;
pub type InterfaceFilterBase = NodeFilter;

/// Leaf filter over an interface used as a relation partner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InterfaceFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templated_fields: Option<FieldRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<NamePattern>,
    /// Constraint on the interface's owning component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<MetaFilter<ComponentFilterBase>>,
}

/// Leaf filter over a relation endpoint, discriminated by node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelationPartnerFilter {
    Component(NodeFilter),
    Interface(InterfaceFilter),
}

/// Leaf filter over intra-component dependency specifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntraComponentDependencySpecificationFilter {
    /// Omitted matches every specification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<NamePattern>,
    /// Allowed specification types. A specification without a type never
    /// matches a present list.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<Vec<String>>,
}

macro_rules! impl_templated_node_filter {
    ($($ty:ty),*) => {
        $(impl TemplatedNodeFilter for $ty {
            fn template(&self) -> Option<&[String]> {
                self.template.as_deref()
            }

            fn templated_fields(&self) -> Option<&FieldRules> {
                self.templated_fields.as_ref()
            }
        })*
    };
}

impl_templated_node_filter!(IssueFilter, RelationFilter, NodeFilter, InterfaceFilter);

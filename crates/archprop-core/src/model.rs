//! Architecture graph data model.
//!
//! A [`Component`] owns its [`Interface`]s and its
//! [`IntraComponentDependencySpecification`]s. [`Relation`]s connect
//! components and interfaces (the relation partners). A [`PropagatedIssue`]
//! spans one or more of these nodes.
//!
//! Wire names follow the camelCase JSON the graph loader produces.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::id::IssueRef;

/// Open attribute bag of a templated node.
pub type TemplatedFields = serde_json::Map<String, serde_json::Value>;

/// A component of the architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: String,
    pub name: String,
    /// Classification id.
    pub template: String,
    #[serde(default)]
    pub templated_fields: TemplatedFields,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    #[serde(default)]
    pub intra_component_dependency_specifications: Vec<IntraComponentDependencySpecification>,
}

/// An interface exposed by a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    /// Globally unique, not just within the owning component.
    pub id: String,
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub templated_fields: TemplatedFields,
    /// Id of the owning component. A lookup key, never an owning pointer.
    pub component: String,
}

/// A directed relation between two relation partners.
///
/// `forward` propagation walks `from -> to`, `backward` walks `to -> from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub id: String,
    pub template: String,
    #[serde(default)]
    pub templated_fields: TemplatedFields,
    pub from: String,
    pub to: String,
}

/// Declares that, within one component, issues on any `incoming` interface
/// may be relevant to any `outgoing` interface (or the reverse, depending on
/// the rule direction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntraComponentDependencySpecification {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub incoming: Vec<String>,
    #[serde(default)]
    pub outgoing: Vec<String>,
}

/// An issue attached to one or more nodes of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagatedIssue {
    /// Backing-store id of a user-authored issue, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "ref")]
    pub issue_ref: IssueRef,
    /// Refs whose propagation created or merged into this issue.
    #[serde(default)]
    pub propagations: Vec<IssueRef>,
    pub state: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub templated_fields: TemplatedFields,
    /// Free-form tags, insertion ordered, no duplicates.
    #[serde(default)]
    pub characteristics: IndexSet<String>,
    /// Node ids (components or interfaces) this issue currently spans.
    pub components_and_interfaces: Vec<String>,
}

impl PropagatedIssue {
    /// Returns `true` if the issue is attached to `node`.
    pub fn is_attached_to(&self, node: &str) -> bool {
        self.components_and_interfaces.iter().any(|n| n == node)
    }

    /// Returns `true` if `source` already propagated into this issue.
    pub fn has_propagation(&self, source: &IssueRef) -> bool {
        self.propagations.contains(source)
    }
}

/// A node carrying a classification template and an attribute bag.
pub trait TemplatedNode {
    fn template(&self) -> &str;
    fn templated_fields(&self) -> &TemplatedFields;
}

macro_rules! impl_templated_node {
    ($($ty:ty),*) => {
        $(impl TemplatedNode for $ty {
            fn template(&self) -> &str {
                &self.template
            }

            fn templated_fields(&self) -> &TemplatedFields {
                &self.templated_fields
            }
        })*
    };
}

impl_templated_node!(Component, Interface, Relation, PropagatedIssue);

/// The immutable input of one propagation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationContext {
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub issues: Vec<PropagatedIssue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_deserializes_camel_case() {
        let json = r#"{
            "id": "c1",
            "name": "checkout",
            "template": "microservice",
            "templatedFields": {"language": "go"},
            "interfaces": [
                {"id": "i1", "name": "rest", "template": "rest", "component": "c1"}
            ],
            "intraComponentDependencySpecifications": [
                {"id": "d1", "name": "passthrough", "type": "data", "incoming": ["i1"], "outgoing": []}
            ]
        }"#;
        let component: Component = serde_json::from_str(json).unwrap();
        assert_eq!(component.interfaces[0].component, "c1");
        assert_eq!(component.templated_fields["language"], "go");
        let icds = &component.intra_component_dependency_specifications[0];
        assert_eq!(icds.kind.as_deref(), Some("data"));
        assert_eq!(icds.incoming, vec!["i1".to_string()]);
    }

    #[test]
    fn issue_uses_wire_field_names() {
        let json = r#"{
            "ref": "seed",
            "state": "Open",
            "type": "Bug",
            "template": "issue",
            "characteristics": ["a", "b", "a"],
            "componentsAndInterfaces": ["c1"]
        }"#;
        let issue: PropagatedIssue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.issue_ref, IssueRef::from("seed"));
        assert_eq!(issue.kind, "Bug");
        assert!(issue.propagations.is_empty());
        assert_eq!(issue.characteristics.len(), 2);

        let back = serde_json::to_value(&issue).unwrap();
        assert_eq!(back["ref"], "seed");
        assert_eq!(back["componentsAndInterfaces"][0], "c1");
        assert!(back.get("title").is_none());
    }

    #[test]
    fn context_defaults_missing_lists() {
        let ctx: PropagationContext = serde_json::from_str("{}").unwrap();
        assert!(ctx.components.is_empty());
        assert!(ctx.relations.is_empty());
        assert!(ctx.issues.is_empty());
    }
}

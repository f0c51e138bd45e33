//! Filter evaluation against issues, relations, nodes, and dependency
//! specifications.
//!
//! All predicates are pure. They return `Err` only when a templated-field
//! rule is malformed or an interface's owning component cannot be resolved.

use archprop_core::filter::{
    IntraComponentDependencySpecificationFilter, IssueFilter, MetaFilter, NamePattern, NodeFilter,
    RelationFilter, RelationPartnerFilter, TemplatedNodeFilter,
};
use archprop_core::graph::{GraphIndex, GraphNode};
use archprop_core::model::{
    IntraComponentDependencySpecification, PropagatedIssue, Relation, TemplatedNode,
};
use serde_json::Value;

use crate::error::PropagationError;
use crate::logic;

/// Evaluates a [`MetaFilter`] tree, delegating leaves to `leaf`.
///
/// `and` short-circuits on the first non-match, `or` on the first match.
pub fn matches_meta_filter<T, V: ?Sized>(
    filter: &MetaFilter<T>,
    value: &V,
    leaf: &impl Fn(&V, &T) -> Result<bool, PropagationError>,
) -> Result<bool, PropagationError> {
    match filter {
        MetaFilter::Leaf(inner) => leaf(value, inner),
        MetaFilter::And(filters) => {
            for filter in filters {
                if !matches_meta_filter(filter, value, leaf)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        MetaFilter::Or(filters) => {
            for filter in filters {
                if matches_meta_filter(filter, value, leaf)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        MetaFilter::Not(filter) => Ok(!matches_meta_filter(filter, value, leaf)?),
    }
}

/// Template membership plus every templated-field rule.
pub fn templated_node_matches(
    node: &(impl TemplatedNode + ?Sized),
    filter: &impl TemplatedNodeFilter,
) -> Result<bool, PropagationError> {
    if let Some(templates) = filter.template() {
        if !templates.iter().any(|t| t == node.template()) {
            return Ok(false);
        }
    }
    if let Some(rules) = filter.templated_fields() {
        for (field, rule) in rules {
            let value = node.templated_fields().get(field).unwrap_or(&Value::Null);
            let holds = logic::matches(rule, value).map_err(|source| {
                PropagationError::InvalidFieldRule {
                    field: field.clone(),
                    source,
                }
            })?;
            if !holds {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Issue leaf filter. `characteristics` needs a non-empty intersection, not
/// a superset.
pub fn issue_matches(
    issue: &PropagatedIssue,
    filter: &IssueFilter,
) -> Result<bool, PropagationError> {
    if !templated_node_matches(issue, filter)? {
        return Ok(false);
    }
    if let Some(kinds) = &filter.kind {
        if !kinds.contains(&issue.kind) {
            return Ok(false);
        }
    }
    if let Some(states) = &filter.state {
        if !states.contains(&issue.state) {
            return Ok(false);
        }
    }
    if let Some(wanted) = &filter.characteristics {
        if !wanted.iter().any(|c| issue.characteristics.contains(c)) {
            return Ok(false);
        }
    }
    Ok(true)
}

pub fn relation_matches(
    relation: &Relation,
    filter: &RelationFilter,
) -> Result<bool, PropagationError> {
    templated_node_matches(relation, filter)
}

/// Base filter over a component or interface. An omitted `name` matches
/// every node; a `type` discriminator must agree with the node kind.
pub fn node_matches(node: GraphNode<'_>, filter: &NodeFilter) -> Result<bool, PropagationError> {
    if filter.kind.is_some_and(|kind| kind != node.kind()) {
        return Ok(false);
    }
    named_node_matches(node, filter, filter.name.as_ref())
}

fn named_node_matches(
    node: GraphNode<'_>,
    filter: &impl TemplatedNodeFilter,
    name: Option<&NamePattern>,
) -> Result<bool, PropagationError> {
    let templated = match node {
        GraphNode::Component(component) => templated_node_matches(component, filter)?,
        GraphNode::Interface(interface) => templated_node_matches(interface, filter)?,
    };
    if !templated {
        return Ok(false);
    }
    Ok(name.map_or(true, |pattern| pattern.is_match(node.name())))
}

/// Relation endpoint filter. The `type` discriminator must agree with the
/// node kind; interface filters may constrain the owning component.
pub fn relation_partner_matches(
    index: &GraphIndex<'_>,
    node: GraphNode<'_>,
    filter: &RelationPartnerFilter,
) -> Result<bool, PropagationError> {
    match (filter, node) {
        (RelationPartnerFilter::Component(filter), GraphNode::Component(_)) => {
            node_matches(node, filter)
        }
        (RelationPartnerFilter::Interface(filter), GraphNode::Interface(_)) => {
            if !named_node_matches(node, filter, filter.name.as_ref())? {
                return Ok(false);
            }
            match &filter.component {
                Some(component_filter) => {
                    let owner = GraphNode::Component(index.owner_of(node)?);
                    let leaf = |n: &GraphNode<'_>, f: &NodeFilter| node_matches(*n, f);
                    matches_meta_filter(component_filter, &owner, &leaf)
                }
                None => Ok(true),
            }
        }
        _ => Ok(false),
    }
}

/// Dependency specification filter. Omitted `name` and `type` match every
/// specification.
pub fn dependency_matches(
    specification: &IntraComponentDependencySpecification,
    filter: &IntraComponentDependencySpecificationFilter,
) -> Result<bool, PropagationError> {
    if let Some(kinds) = &filter.kind {
        match &specification.kind {
            Some(kind) if kinds.contains(kind) => {}
            _ => return Ok(false),
        }
    }
    Ok(filter
        .name
        .as_ref()
        .map_or(true, |pattern| pattern.is_match(&specification.name)))
}

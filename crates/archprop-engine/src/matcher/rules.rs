//! Rule admissibility: direction compatibility combined with the rule's
//! filters.
//!
//! Each check mirrors one rule shape:
//! - [`inter_component_admits`] for a step across a relation,
//! - [`component_interface_admits`] for a step between a component and one of
//!   its interfaces,
//! - [`interface_interface_targets`] for a step across a dependency
//!   specification, returning the admissible destination interfaces.

use archprop_core::config::{ComponentInterfaceRule, InterComponentRule, InterfaceInterfaceRule};
use archprop_core::filter::{NodeFilter, RelationPartnerFilter};
use archprop_core::graph::{GraphIndex, GraphNode};
use archprop_core::model::{
    Component, Interface, IntraComponentDependencySpecification, PropagatedIssue, Relation,
};
use archprop_core::MetaFilter;

use crate::error::PropagationError;
use crate::matcher::filter::{
    dependency_matches, issue_matches, matches_meta_filter, node_matches, relation_matches,
    relation_partner_matches,
};

/// A candidate propagation across one relation.
///
/// `start` and `end` are always the relation's own `from` and `to`, whichever
/// way it is being walked.
#[derive(Debug, Clone, Copy)]
pub struct RelationStep<'a> {
    pub relation: &'a Relation,
    pub start: GraphNode<'a>,
    pub end: GraphNode<'a>,
    /// `true` when walking `from -> to`.
    pub is_outgoing: bool,
}

impl<'a> RelationStep<'a> {
    /// The node the issue would propagate to.
    pub fn destination(&self) -> GraphNode<'a> {
        if self.is_outgoing {
            self.end
        } else {
            self.start
        }
    }
}

/// A candidate propagation across one dependency specification.
#[derive(Debug, Clone, Copy)]
pub struct DependencyStep<'a> {
    pub component: &'a Component,
    pub specification: &'a IntraComponentDependencySpecification,
    /// The interface the issue currently sits on.
    pub origin: &'a Interface,
    /// `true` when walking from the `incoming` side to the `outgoing` side.
    pub is_outgoing: bool,
}

pub fn inter_component_admits(
    index: &GraphIndex<'_>,
    rule: &InterComponentRule,
    issue: &PropagatedIssue,
    step: &RelationStep<'_>,
) -> Result<bool, PropagationError> {
    if !rule.propagation_direction.allows(step.is_outgoing) {
        return Ok(false);
    }
    if !matches_meta_filter(&rule.filter_issue, issue, &issue_matches)? {
        return Ok(false);
    }
    let partner = |node: &GraphNode<'_>, filter: &RelationPartnerFilter| {
        relation_partner_matches(index, *node, filter)
    };
    if !matches_meta_filter(&rule.filter_relation_start, &step.start, &partner)? {
        return Ok(false);
    }
    if !matches_meta_filter(&rule.filter_relation_end, &step.end, &partner)? {
        return Ok(false);
    }
    matches_meta_filter(&rule.filter_relation, step.relation, &relation_matches)
}

pub fn component_interface_admits(
    rule: &ComponentInterfaceRule,
    issue: &PropagatedIssue,
    component: &Component,
    interface: &Interface,
    from_component: bool,
) -> Result<bool, PropagationError> {
    if !rule.propagation_direction.allows(from_component) {
        return Ok(false);
    }
    if !matches_meta_filter(&rule.filter_issue, issue, &issue_matches)? {
        return Ok(false);
    }
    if !node_filter_matches(&rule.filter_component, GraphNode::Component(component))? {
        return Ok(false);
    }
    node_filter_matches(&rule.filter_interface, GraphNode::Interface(interface))
}

/// Returns the destination interfaces an interface-interface rule admits for
/// `step`. Empty when the rule does not apply.
pub fn interface_interface_targets<'a>(
    index: &GraphIndex<'a>,
    rule: &InterfaceInterfaceRule,
    issue: &PropagatedIssue,
    step: &DependencyStep<'a>,
) -> Result<Vec<&'a Interface>, PropagationError> {
    if !rule.propagation_direction.allows(step.is_outgoing) {
        return Ok(Vec::new());
    }
    if !matches_meta_filter(&rule.filter_issue, issue, &issue_matches)? {
        return Ok(Vec::new());
    }
    if !node_filter_matches(&rule.filter_component, GraphNode::Component(step.component))? {
        return Ok(Vec::new());
    }
    if !matches_meta_filter(
        &rule.filter_intra_component_dependency_specification,
        step.specification,
        &dependency_matches,
    )? {
        return Ok(Vec::new());
    }

    let (origin_filter, destination_filter, destination_ids) = if step.is_outgoing {
        (&rule.filter_start, &rule.filter_end, &step.specification.outgoing)
    } else {
        (&rule.filter_end, &rule.filter_start, &step.specification.incoming)
    };
    if !node_filter_matches(origin_filter, GraphNode::Interface(step.origin))? {
        return Ok(Vec::new());
    }

    let referenced_by = format!("dependency specification '{}'", step.specification.id);
    let mut targets = Vec::new();
    for id in destination_ids {
        let interface = index.require_interface(id, &referenced_by)?;
        if node_filter_matches(destination_filter, GraphNode::Interface(interface))? {
            targets.push(interface);
        }
    }
    Ok(targets)
}

fn node_filter_matches(
    filter: &MetaFilter<NodeFilter>,
    node: GraphNode<'_>,
) -> Result<bool, PropagationError> {
    let leaf = |n: &GraphNode<'_>, f: &NodeFilter| node_matches(*n, f);
    matches_meta_filter(filter, &node, &leaf)
}

//! Filter evaluation and rule admissibility.
//!
//! [`filter`] evaluates the recursive filter language against a single
//! entity; [`rules`] combines those filters with each rule's direction to
//! decide whether one propagation step is allowed.

pub mod filter;
pub mod rules;

pub use filter::{
    dependency_matches, issue_matches, matches_meta_filter, node_matches, relation_matches,
    relation_partner_matches, templated_node_matches,
};
pub use rules::{
    component_interface_admits, inter_component_admits, interface_interface_targets,
    DependencyStep, RelationStep,
};

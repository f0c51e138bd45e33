//! GraphIndex: lookup tables over one architecture graph.
//!
//! [`GraphIndex`] borrows the raw component and relation lists of a
//! [`PropagationContext`](crate::model::PropagationContext) and builds, once
//! per propagation run:
//! - a node lookup for every component and every interface,
//! - relation adjacency (incoming/outgoing per node) as a petgraph
//!   `DiGraph` whose edges carry the relations,
//! - dependency adjacency: for every interface, the dependency
//!   specifications listing it on their `incoming` or `outgoing` side.
//!
//! Building never fails. A relation whose endpoint is unknown keeps its known
//! side in the adjacency; the unknown side is held by an unresolved
//! placeholder node so that walking onto it reports a dangling reference
//! instead of silently dropping the edge. Relations with no known endpoint
//! are invisible.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::CoreError;
use crate::filter::NodeKind;
use crate::model::{Component, Interface, IntraComponentDependencySpecification, Relation};

/// A node of the architecture graph.
#[derive(Debug, Clone, Copy)]
pub enum GraphNode<'a> {
    Component(&'a Component),
    Interface(&'a Interface),
}

impl<'a> GraphNode<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            GraphNode::Component(c) => &c.id,
            GraphNode::Interface(i) => &i.id,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            GraphNode::Component(c) => &c.name,
            GraphNode::Interface(i) => &i.name,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            GraphNode::Component(_) => NodeKind::Component,
            GraphNode::Interface(_) => NodeKind::Interface,
        }
    }
}

/// Vertex weight of the relation graph.
#[derive(Debug, Clone, Copy)]
enum Vertex<'a> {
    Resolved(GraphNode<'a>),
    Unresolved(&'a str),
}

/// A dependency specification together with the component declaring it.
#[derive(Debug, Clone, Copy)]
pub struct DependencyRef<'a> {
    pub component: &'a Component,
    pub specification: &'a IntraComponentDependencySpecification,
}

/// Dependency specifications touching one interface.
#[derive(Debug, Clone, Default)]
pub struct Dependencies<'a> {
    /// Specifications listing the interface in their `incoming` list.
    pub incoming: Vec<DependencyRef<'a>>,
    /// Specifications listing the interface in their `outgoing` list.
    pub outgoing: Vec<DependencyRef<'a>>,
}

/// Read-only lookup tables for one propagation run.
#[derive(Debug)]
pub struct GraphIndex<'a> {
    relations: DiGraph<Vertex<'a>, &'a Relation, u32>,
    node_lookup: HashMap<&'a str, NodeIndex<u32>>,
    unresolved: HashMap<&'a str, NodeIndex<u32>>,
    components: HashMap<&'a str, &'a Component>,
    dependencies: HashMap<&'a str, Dependencies<'a>>,
}

impl<'a> GraphIndex<'a> {
    /// Builds the index in one pass over nodes, relations, and dependency
    /// specifications.
    pub fn new(components: &'a [Component], relations: &'a [Relation]) -> Self {
        let mut index = GraphIndex {
            relations: DiGraph::default(),
            node_lookup: HashMap::new(),
            unresolved: HashMap::new(),
            components: HashMap::new(),
            dependencies: HashMap::new(),
        };

        for component in components {
            index.components.entry(&component.id).or_insert(component);
            index.add_node(GraphNode::Component(component));
            for interface in &component.interfaces {
                index.add_node(GraphNode::Interface(interface));
            }

            for specification in &component.intra_component_dependency_specifications {
                let dependency = DependencyRef {
                    component,
                    specification,
                };
                for interface_id in &specification.incoming {
                    index
                        .dependencies
                        .entry(interface_id.as_str())
                        .or_default()
                        .incoming
                        .push(dependency);
                }
                for interface_id in &specification.outgoing {
                    index
                        .dependencies
                        .entry(interface_id.as_str())
                        .or_default()
                        .outgoing
                        .push(dependency);
                }
            }
        }

        for relation in relations {
            let from_known = index.node_lookup.contains_key(relation.from.as_str());
            let to_known = index.node_lookup.contains_key(relation.to.as_str());
            if !from_known && !to_known {
                tracing::warn!(
                    relation = %relation.id,
                    "relation has no known endpoint, ignoring"
                );
                continue;
            }
            if !from_known || !to_known {
                tracing::warn!(
                    relation = %relation.id,
                    from = %relation.from,
                    to = %relation.to,
                    "relation references an unknown node"
                );
            }
            let from = index.vertex(&relation.from);
            let to = index.vertex(&relation.to);
            index.relations.add_edge(from, to, relation);
        }

        index
    }

    fn add_node(&mut self, node: GraphNode<'a>) {
        if self.node_lookup.contains_key(node.id()) {
            tracing::warn!(node = %node.id(), "duplicate node id, keeping the first");
            return;
        }
        let idx = self.relations.add_node(Vertex::Resolved(node));
        self.node_lookup.insert(node.id(), idx);
    }

    /// Returns the vertex for `id`, adding an unresolved placeholder if the id
    /// is unknown.
    fn vertex(&mut self, id: &'a str) -> NodeIndex<u32> {
        if let Some(&idx) = self.node_lookup.get(id) {
            return idx;
        }
        if let Some(&idx) = self.unresolved.get(id) {
            return idx;
        }
        let idx = self.relations.add_node(Vertex::Unresolved(id));
        self.unresolved.insert(id, idx);
        idx
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Looks up a component or interface by id.
    pub fn node(&self, id: &str) -> Option<GraphNode<'a>> {
        let idx = self.node_lookup.get(id)?;
        match self.relations[*idx] {
            Vertex::Resolved(node) => Some(node),
            Vertex::Unresolved(_) => None,
        }
    }

    /// Like [`node`](Self::node), but reports a missing id as a dangling
    /// reference from `referenced_by`.
    pub fn require_node(&self, id: &str, referenced_by: &str) -> Result<GraphNode<'a>, CoreError> {
        self.node(id).ok_or_else(|| CoreError::DanglingReference {
            node: id.to_string(),
            referenced_by: referenced_by.to_string(),
        })
    }

    /// Looks up an interface by id.
    pub fn require_interface(
        &self,
        id: &str,
        referenced_by: &str,
    ) -> Result<&'a Interface, CoreError> {
        match self.require_node(id, referenced_by)? {
            GraphNode::Interface(interface) => Ok(interface),
            GraphNode::Component(_) => Err(CoreError::UnexpectedNodeKind {
                node: id.to_string(),
                expected: "interface",
            }),
        }
    }

    /// Looks up a component by id.
    pub fn require_component(
        &self,
        id: &str,
        referenced_by: &str,
    ) -> Result<&'a Component, CoreError> {
        self.components
            .get(id)
            .copied()
            .ok_or_else(|| CoreError::DanglingReference {
                node: id.to_string(),
                referenced_by: referenced_by.to_string(),
            })
    }

    /// Returns the component owning `node`: the component itself, or the
    /// component an interface points back to.
    pub fn owner_of(&self, node: GraphNode<'a>) -> Result<&'a Component, CoreError> {
        match node {
            GraphNode::Component(component) => Ok(component),
            GraphNode::Interface(interface) => self.require_component(
                &interface.component,
                &format!("interface '{}'", interface.id),
            ),
        }
    }

    /// Relations leaving (`Outgoing`) or entering (`Incoming`) the node.
    /// Unknown ids have no relations.
    pub fn relations(&self, id: &str, direction: Direction) -> Vec<&'a Relation> {
        match self.node_lookup.get(id) {
            Some(&idx) => self
                .relations
                .edges_directed(idx, direction)
                .map(|edge| *edge.weight())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Dependency specifications touching an interface.
    pub fn dependencies(&self, interface_id: &str) -> Option<&Dependencies<'a>> {
        self.dependencies.get(interface_id)
    }

    /// Number of known components and interfaces.
    pub fn node_count(&self) -> usize {
        self.node_lookup.len()
    }

    /// Ids of the nodes that relations reference but the graph lacks.
    pub fn unresolved_ids(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.unresolved.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TemplatedFields;

    fn component(id: &str, interfaces: &[&str]) -> Component {
        Component {
            id: id.to_string(),
            name: id.to_uppercase(),
            template: "service".to_string(),
            templated_fields: TemplatedFields::new(),
            interfaces: interfaces
                .iter()
                .map(|i| Interface {
                    id: i.to_string(),
                    name: i.to_uppercase(),
                    template: "rest".to_string(),
                    templated_fields: TemplatedFields::new(),
                    component: id.to_string(),
                })
                .collect(),
            intra_component_dependency_specifications: Vec::new(),
        }
    }

    fn relation(id: &str, from: &str, to: &str) -> Relation {
        Relation {
            id: id.to_string(),
            template: "calls".to_string(),
            templated_fields: TemplatedFields::new(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    #[test]
    fn indexes_components_and_interfaces() {
        let components = vec![component("a", &["a1", "a2"]), component("b", &[])];
        let index = GraphIndex::new(&components, &[]);

        assert_eq!(index.node_count(), 4);
        assert!(matches!(index.node("a"), Some(GraphNode::Component(_))));
        assert_eq!(index.node("a2").unwrap().name(), "A2");
        assert!(index.node("zzz").is_none());
    }

    #[test]
    fn buckets_relations_by_direction() {
        let components = vec![component("a", &["a1"]), component("b", &[])];
        let relations = vec![relation("r1", "a", "b"), relation("r2", "b", "a1")];
        let index = GraphIndex::new(&components, &relations);

        let out: Vec<_> = index.relations("a", Direction::Outgoing).iter().map(|r| r.id.clone()).collect();
        assert_eq!(out, vec!["r1"]);
        assert!(index.relations("a", Direction::Incoming).is_empty());

        let b_out = index.relations("b", Direction::Outgoing);
        assert_eq!(b_out.len(), 1);
        assert_eq!(b_out[0].id, "r2");
        assert_eq!(index.relations("a1", Direction::Incoming).len(), 1);
    }

    #[test]
    fn dangling_endpoint_is_kept_as_unresolved() {
        let components = vec![component("a", &[])];
        let relations = vec![relation("r1", "a", "ghost"), relation("r2", "x", "y")];
        let index = GraphIndex::new(&components, &relations);

        assert_eq!(index.relations("a", Direction::Outgoing).len(), 1);
        assert!(index.node("ghost").is_none());
        assert_eq!(index.unresolved_ids().collect::<Vec<_>>(), vec!["ghost"]);

        let err = index.require_node("ghost", "relation 'r1'").unwrap_err();
        assert_eq!(
            err,
            CoreError::DanglingReference {
                node: "ghost".into(),
                referenced_by: "relation 'r1'".into()
            }
        );
    }

    #[test]
    fn registers_dependencies_per_interface() {
        let mut c = component("c", &["i1", "i2", "i3"]);
        c.intra_component_dependency_specifications.push(IntraComponentDependencySpecification {
            id: "d1".into(),
            name: "flow".into(),
            kind: None,
            incoming: vec!["i1".into()],
            outgoing: vec!["i2".into(), "i3".into()],
        });
        let components = vec![c];
        let index = GraphIndex::new(&components, &[]);

        let i1 = index.dependencies("i1").unwrap();
        assert_eq!(i1.incoming.len(), 1);
        assert!(i1.outgoing.is_empty());
        assert_eq!(i1.incoming[0].component.id, "c");

        let i3 = index.dependencies("i3").unwrap();
        assert_eq!(i3.outgoing[0].specification.id, "d1");
        assert!(index.dependencies("c").is_none());
    }

    #[test]
    fn owner_of_interface_uses_back_reference() {
        let components = vec![component("a", &["a1"])];
        let index = GraphIndex::new(&components, &[]);
        let a1 = index.node("a1").unwrap();
        assert_eq!(index.owner_of(a1).unwrap().id, "a");

        assert!(matches!(
            index.require_interface("a", "test"),
            Err(CoreError::UnexpectedNodeKind { .. })
        ));
    }
}

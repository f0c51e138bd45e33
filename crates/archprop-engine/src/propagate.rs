//! Propagation fixpoint engine.
//!
//! [`propagate`] runs one propagation: every seed issue is queued at each of
//! its nodes, and the worklist is drained. For each pending `(issue, node)`:
//!
//! 1. **Inter-component pass**: every inter-component rule is tested against
//!    every relation touching the node. An admissible step records the
//!    relation as propagating and *derives* an issue at the node on the other
//!    side.
//! 2. **Intra-component pass**: component-interface and interface-interface
//!    rules are tested for the node's kind. An admissible step *widens* the
//!    same issue onto the destination node.
//!
//! Derivation is deduplicated per destination component: a triggering ref is
//! recorded at most once per component, either in a fresh issue or merged
//! into an existing issue with the same effective state, type, template, and
//! templated fields. Widening adds a node to an issue at most once. Both
//! transitions only ever grow finite state, so the worklist always drains.
//!
//! All per-run state (index, worklist, per-component issue buckets, ref
//! counter) lives in one [`IssuePropagator`] built per call; the context and
//! configuration are only read.

use std::collections::{BTreeSet, HashMap, VecDeque};

use petgraph::Direction;
use serde::{Deserialize, Serialize};

use archprop_core::config::{
    FieldSource, FixedValue, IntraComponentRule, IssuePropagationConfig, PropagatedIssueSchema,
    TemplatedFieldsSource,
};
use archprop_core::graph::{GraphIndex, GraphNode};
use archprop_core::id::IssueRef;
use archprop_core::model::{PropagatedIssue, PropagationContext, Relation, TemplatedFields};

use crate::error::PropagationError;
use crate::matcher::{
    component_interface_admits, inter_component_admits, interface_interface_targets,
    DependencyStep, RelationStep,
};

/// Order in which pending `(issue, node)` pairs are taken off the worklist.
///
/// The reached components and propagating relations do not depend on it;
/// only derived ref numbering may differ.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorklistOrder {
    /// Depth-first: most recently queued first.
    #[default]
    Lifo,
    /// Breadth-first: oldest first.
    Fifo,
}

/// Runtime knobs of a propagation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationOptions {
    pub order: WorklistOrder,
}

/// Output of one propagation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationResult {
    /// Seed issues followed by derived issues, in creation order.
    pub issues: Vec<PropagatedIssue>,
    /// Ids of the relations that satisfied an inter-component rule.
    pub propagating_relations: BTreeSet<String>,
}

/// Propagates the context's issues with default options.
pub fn propagate(
    context: &PropagationContext,
    config: &IssuePropagationConfig,
) -> Result<PropagationResult, PropagationError> {
    propagate_with(context, config, PropagationOptions::default())
}

/// Propagates the context's issues.
///
/// Fails without a partial result on the first configuration error or
/// dangling node reference.
pub fn propagate_with(
    context: &PropagationContext,
    config: &IssuePropagationConfig,
    options: PropagationOptions,
) -> Result<PropagationResult, PropagationError> {
    let mut propagator = IssuePropagator::new(context, config, options)?;
    propagator.run()?;
    Ok(propagator.finish())
}

/// Effective fields of an issue derived through a schema.
#[derive(Debug)]
struct DerivedFields {
    state: String,
    kind: String,
    template: String,
    title: Option<String>,
    templated_fields: TemplatedFields,
}

impl DerivedFields {
    fn resolve(schema: &PropagatedIssueSchema, trigger: &PropagatedIssue) -> Self {
        let title = match &schema.title {
            None => None,
            Some(FieldSource::PassThrough) => trigger.title.clone(),
            Some(FieldSource::Fixed(title)) => Some(title.clone()),
        };
        let templated_fields = match &schema.templated_fields {
            TemplatedFieldsSource::PassThrough => trigger.templated_fields.clone(),
            TemplatedFieldsSource::Fields(fields) => fields
                .iter()
                .filter_map(|(name, source)| match source {
                    FieldSource::PassThrough => trigger
                        .templated_fields
                        .get(name)
                        .map(|value| (name.clone(), value.clone())),
                    FieldSource::Fixed(FixedValue { value }) => {
                        Some((name.clone(), value.clone()))
                    }
                })
                .collect(),
        };
        DerivedFields {
            state: schema.state.resolve(&trigger.state),
            kind: schema.kind.resolve(&trigger.kind),
            template: schema.template.resolve(&trigger.template),
            title,
            templated_fields,
        }
    }

    /// Merge key: everything but the title.
    fn same_signature(&self, issue: &PropagatedIssue) -> bool {
        issue.state == self.state
            && issue.kind == self.kind
            && issue.template == self.template
            && issue.templated_fields == self.templated_fields
    }
}

/// Mutable state of one propagation run.
pub struct IssuePropagator<'a> {
    index: GraphIndex<'a>,
    config: &'a IssuePropagationConfig,
    /// Schema of each inter-component rule, by rule position.
    schemas: Vec<&'a PropagatedIssueSchema>,
    issues: Vec<PropagatedIssue>,
    /// Issue positions by owning component id.
    by_component: HashMap<&'a str, Vec<usize>>,
    worklist: VecDeque<(usize, GraphNode<'a>)>,
    order: WorklistOrder,
    next_ref: u64,
    propagating_relations: BTreeSet<String>,
    steps: usize,
}

impl<'a> IssuePropagator<'a> {
    /// Resolves every rule's schema, indexes the graph, and queues the seeds.
    pub fn new(
        context: &'a PropagationContext,
        config: &'a IssuePropagationConfig,
        options: PropagationOptions,
    ) -> Result<Self, PropagationError> {
        let schemas = config
            .inter_component_rules
            .iter()
            .enumerate()
            .map(|(rule, r)| {
                config
                    .schemas
                    .get(&r.new_issue_schema)
                    .ok_or_else(|| PropagationError::UnknownSchema {
                        rule,
                        schema: r.new_issue_schema.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let next_ref = context
            .issues
            .iter()
            .filter_map(|issue| issue.issue_ref.as_derived())
            .max()
            .map_or(0, |max| max + 1);

        let index = GraphIndex::new(&context.components, &context.relations);
        tracing::debug!(
            nodes = index.node_count(),
            unresolved = index.unresolved_ids().count(),
            seeds = context.issues.len(),
            "indexed graph"
        );

        let mut propagator = IssuePropagator {
            index,
            config,
            schemas,
            issues: context.issues.clone(),
            by_component: HashMap::new(),
            worklist: VecDeque::new(),
            order: options.order,
            next_ref,
            propagating_relations: BTreeSet::new(),
            steps: 0,
        };

        for (position, issue) in context.issues.iter().enumerate() {
            if issue.components_and_interfaces.is_empty() {
                return Err(PropagationError::EmptyFootprint {
                    issue: issue.issue_ref.clone(),
                });
            }
            let referenced_by = format!("issue '{}'", issue.issue_ref);
            for id in &issue.components_and_interfaces {
                let node = propagator.index.require_node(id, &referenced_by)?;
                let owner = propagator.index.owner_of(node)?;
                propagator.register(&owner.id, position);
                propagator.worklist.push_back((position, node));
            }
        }

        Ok(propagator)
    }

    /// Drains the worklist.
    pub fn run(&mut self) -> Result<(), PropagationError> {
        while let Some((position, node)) = self.next_pending() {
            self.steps += 1;
            self.inter_component_pass(position, node)?;
            self.intra_component_pass(position, node)?;
        }
        tracing::info!(
            issues = self.issues.len(),
            propagating_relations = self.propagating_relations.len(),
            steps = self.steps,
            "propagation finished"
        );
        Ok(())
    }

    pub fn finish(self) -> PropagationResult {
        PropagationResult {
            issues: self.issues,
            propagating_relations: self.propagating_relations,
        }
    }

    fn next_pending(&mut self) -> Option<(usize, GraphNode<'a>)> {
        match self.order {
            WorklistOrder::Lifo => self.worklist.pop_back(),
            WorklistOrder::Fifo => self.worklist.pop_front(),
        }
    }

    fn register(&mut self, component: &'a str, position: usize) {
        let bucket = self.by_component.entry(component).or_default();
        if !bucket.contains(&position) {
            bucket.push(position);
        }
    }

    // -----------------------------------------------------------------------
    // Inter-component propagation
    // -----------------------------------------------------------------------

    fn inter_component_pass(
        &mut self,
        position: usize,
        node: GraphNode<'a>,
    ) -> Result<(), PropagationError> {
        if self.config.inter_component_rules.is_empty() {
            return Ok(());
        }

        let outgoing = self.index.relations(node.id(), Direction::Outgoing);
        let incoming = self.index.relations(node.id(), Direction::Incoming);
        let issue = &self.issues[position];

        let mut derivations = Vec::new();
        for (rule_position, rule) in self.config.inter_component_rules.iter().enumerate() {
            for &relation in &outgoing {
                let step = RelationStep {
                    relation,
                    start: node,
                    end: self.index.require_node(&relation.to, &relation_label(relation))?,
                    is_outgoing: true,
                };
                if inter_component_admits(&self.index, rule, issue, &step)? {
                    derivations.push((rule_position, step));
                }
            }
            for &relation in &incoming {
                let step = RelationStep {
                    relation,
                    start: self.index.require_node(&relation.from, &relation_label(relation))?,
                    end: node,
                    is_outgoing: false,
                };
                if inter_component_admits(&self.index, rule, issue, &step)? {
                    derivations.push((rule_position, step));
                }
            }
        }

        for (rule_position, step) in derivations {
            self.propagating_relations.insert(step.relation.id.clone());
            self.derive(position, rule_position, step.destination())?;
        }
        Ok(())
    }

    /// Creates or merges an issue at `destination`'s component on behalf of
    /// the issue at `trigger`.
    fn derive(
        &mut self,
        trigger: usize,
        rule_position: usize,
        destination: GraphNode<'a>,
    ) -> Result<(), PropagationError> {
        let schema = self.schemas[rule_position];
        let owner = self.index.owner_of(destination)?;
        let (trigger_ref, fields) = {
            let issue = &self.issues[trigger];
            (issue.issue_ref.clone(), DerivedFields::resolve(schema, issue))
        };

        let bucket = self
            .by_component
            .get(owner.id.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();
        if bucket.iter().any(|&i| self.issues[i].has_propagation(&trigger_ref)) {
            tracing::trace!(trigger = %trigger_ref, component = %owner.id, "already propagated");
            return Ok(());
        }

        if let Some(&existing) = bucket.iter().find(|&&i| fields.same_signature(&self.issues[i])) {
            let target = &mut self.issues[existing];
            target.propagations.push(trigger_ref.clone());
            let mut grew = false;
            for characteristic in &schema.characteristics {
                grew |= target.characteristics.insert(characteristic.clone());
            }
            tracing::debug!(
                trigger = %trigger_ref,
                into = %target.issue_ref,
                component = %owner.id,
                grew,
                "merged propagation"
            );
            if grew {
                // New characteristics can satisfy rules the issue failed before.
                self.requeue(existing)?;
            }
            return Ok(());
        }

        let issue_ref = IssueRef::Derived(self.next_ref);
        self.next_ref += 1;
        tracing::debug!(
            trigger = %trigger_ref,
            issue = %issue_ref,
            node = %destination.id(),
            "derived issue"
        );
        let position = self.issues.len();
        self.issues.push(PropagatedIssue {
            id: None,
            issue_ref,
            propagations: vec![trigger_ref],
            state: fields.state,
            kind: fields.kind,
            template: fields.template,
            title: fields.title,
            templated_fields: fields.templated_fields,
            characteristics: schema.characteristics.iter().cloned().collect(),
            components_and_interfaces: vec![destination.id().to_string()],
        });
        self.register(&owner.id, position);
        self.worklist.push_back((position, destination));
        Ok(())
    }

    fn requeue(&mut self, position: usize) -> Result<(), PropagationError> {
        let referenced_by = format!("issue '{}'", self.issues[position].issue_ref);
        for id in &self.issues[position].components_and_interfaces {
            let node = self.index.require_node(id, &referenced_by)?;
            self.worklist.push_back((position, node));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Intra-component propagation
    // -----------------------------------------------------------------------

    fn intra_component_pass(
        &mut self,
        position: usize,
        node: GraphNode<'a>,
    ) -> Result<(), PropagationError> {
        let issue = &self.issues[position];
        let mut widenings = Vec::new();

        for rule in &self.config.intra_component_rules {
            match (rule, node) {
                (IntraComponentRule::ComponentInterface(rule), GraphNode::Component(component)) => {
                    for interface in &component.interfaces {
                        if component_interface_admits(rule, issue, component, interface, true)? {
                            widenings.push(GraphNode::Interface(interface));
                        }
                    }
                }
                (IntraComponentRule::ComponentInterface(rule), GraphNode::Interface(interface)) => {
                    let component = self.index.owner_of(node)?;
                    if component_interface_admits(rule, issue, component, interface, false)? {
                        widenings.push(GraphNode::Component(component));
                    }
                }
                (IntraComponentRule::InterfaceInterface(rule), GraphNode::Interface(interface)) => {
                    let Some(dependencies) = self.index.dependencies(&interface.id) else {
                        continue;
                    };
                    let sides = [(&dependencies.incoming, true), (&dependencies.outgoing, false)];
                    for (specifications, is_outgoing) in sides {
                        for dependency in specifications {
                            let step = DependencyStep {
                                component: dependency.component,
                                specification: dependency.specification,
                                origin: interface,
                                is_outgoing,
                            };
                            let targets =
                                interface_interface_targets(&self.index, rule, issue, &step)?;
                            widenings.extend(targets.into_iter().map(GraphNode::Interface));
                        }
                    }
                }
                (IntraComponentRule::InterfaceInterface(_), GraphNode::Component(_)) => {}
            }
        }

        for destination in widenings {
            self.widen(position, destination)?;
        }
        Ok(())
    }

    /// Extends the issue's footprint to `destination`.
    fn widen(
        &mut self,
        position: usize,
        destination: GraphNode<'a>,
    ) -> Result<(), PropagationError> {
        if self.issues[position].is_attached_to(destination.id()) {
            return Ok(());
        }
        let owner = self.index.owner_of(destination)?;
        let issue = &mut self.issues[position];
        issue.components_and_interfaces.push(destination.id().to_string());
        tracing::debug!(issue = %issue.issue_ref, node = %destination.id(), "widened issue");
        self.register(&owner.id, position);
        self.worklist.push_back((position, destination));
        Ok(())
    }
}

fn relation_label(relation: &Relation) -> String {
    format!("relation '{}'", relation.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(issues: serde_json::Value) -> PropagationContext {
        serde_json::from_value(json!({
            "components": [
                {"id": "a", "name": "A", "template": "service"},
                {"id": "b", "name": "B", "template": "service"}
            ],
            "relations": [
                {"id": "r1", "template": "calls", "from": "a", "to": "b"}
            ],
            "issues": issues
        }))
        .unwrap()
    }

    fn seed(node: &str) -> serde_json::Value {
        json!({
            "ref": "seed",
            "state": "Open",
            "type": "Bug",
            "template": "issue",
            "componentsAndInterfaces": [node]
        })
    }

    #[test]
    fn unknown_schema_fails_before_running() {
        let mut config = IssuePropagationConfig::debug();
        config.inter_component_rules[0].new_issue_schema = "missing".into();
        let err = propagate(&context(json!([seed("a")])), &config).unwrap_err();
        assert_eq!(
            err,
            PropagationError::UnknownSchema {
                rule: 0,
                schema: "missing".into()
            }
        );
    }

    #[test]
    fn seed_on_unknown_node_is_a_dangling_reference() {
        let err = propagate(&context(json!([seed("ghost")])), &IssuePropagationConfig::debug())
            .unwrap_err();
        assert!(matches!(
            err,
            PropagationError::Core(archprop_core::CoreError::DanglingReference { ref node, .. }) if node == "ghost"
        ));
    }

    #[test]
    fn seed_without_nodes_is_rejected() {
        let mut issue = seed("a");
        issue["componentsAndInterfaces"] = json!([]);
        let err = propagate(&context(json!([issue])), &IssuePropagationConfig::debug()).unwrap_err();
        assert!(matches!(err, PropagationError::EmptyFootprint { .. }));
    }

    #[test]
    fn derived_refs_continue_after_highest_numeric_ref() {
        let mut derived = seed("b");
        derived["ref"] = json!(41);
        derived["state"] = json!("Closed");
        derived["propagations"] = json!(["other"]);
        let ctx = context(json!([seed("a"), derived]));
        let result = propagate(&ctx, &IssuePropagationConfig::debug()).unwrap();

        let refs: Vec<_> = result.issues.iter().map(|i| i.issue_ref.clone()).collect();
        assert!(refs.contains(&IssueRef::Derived(42)));
        assert!(!refs.contains(&IssueRef::Derived(0)));
    }

    #[test]
    fn debug_config_copies_every_field() {
        let mut issue = seed("a");
        issue["title"] = json!("Checkout broken");
        issue["templatedFields"] = json!({"severity": 2});
        let result = propagate(&context(json!([issue])), &IssuePropagationConfig::debug()).unwrap();

        let derived = result
            .issues
            .iter()
            .find(|i| i.is_attached_to("b"))
            .unwrap();
        assert_eq!(derived.title.as_deref(), Some("Checkout broken"));
        assert_eq!(derived.templated_fields["severity"], json!(2));
        assert_eq!(derived.propagations, vec![IssueRef::from("seed")]);
        assert_eq!(
            result.propagating_relations,
            BTreeSet::from(["r1".to_string()])
        );
    }

    #[test]
    fn schema_fields_resolve_pass_through_and_literals() {
        let schema: PropagatedIssueSchema = serde_json::from_value(json!({
            "template": true,
            "type": "Bug",
            "state": "Open",
            "title": null,
            "templatedFields": {"severity": {"value": 5}, "owner": true, "absent": true},
            "characteristics": []
        }))
        .unwrap();
        let trigger: PropagatedIssue = serde_json::from_value(json!({
            "ref": "t",
            "state": "Closed",
            "type": "Feature",
            "template": "issue-template",
            "title": "ignored",
            "templatedFields": {"severity": 1, "owner": "team-a"},
            "componentsAndInterfaces": ["a"]
        }))
        .unwrap();

        let fields = DerivedFields::resolve(&schema, &trigger);
        assert_eq!(fields.template, "issue-template");
        assert_eq!(fields.kind, "Bug");
        assert_eq!(fields.state, "Open");
        assert_eq!(fields.title, None);
        assert_eq!(fields.templated_fields["severity"], json!(5));
        assert_eq!(fields.templated_fields["owner"], json!("team-a"));
        assert!(!fields.templated_fields.contains_key("absent"));
    }
}

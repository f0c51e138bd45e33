//! Scoring harness.
//!
//! Runs the propagation engine once per hand-labeled [`ValidationIssue`] and
//! compares the components the seed actually reached with the components it
//! was expected to reach. Per scenario the initial component is excluded from
//! every set, so a scenario is scored only on what propagation added.
//!
//! Ratios follow IEEE semantics: a zero denominator yields `NaN`, meaning
//! "undefined for this scenario". Macro averages skip `NaN` entries.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use archprop_core::config::IssuePropagationConfig;
use archprop_core::graph::{GraphIndex, GraphNode};
use archprop_core::id::IssueRef;
use archprop_core::model::{PropagatedIssue, PropagationContext, TemplatedFields};

use crate::error::ScoreError;
use crate::propagate::{propagate_with, PropagationOptions};

/// Seed template used when a validation entry names none.
pub const DEFAULT_SEED_TEMPLATE: &str = "IssueTemplate";

/// Ref and id given to the synthetic seed issue of every scenario.
const SEED_REF: &str = "test";

/// One hand-labeled scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: String,
    #[serde(default)]
    pub initial_characteristics: Vec<String>,
    /// Node(s) the seed issue starts on. Several interfaces of one component
    /// are allowed.
    #[serde(alias = "initialComponentOrInterfaceIds")]
    pub initial_component: InitialNodes,
    /// Nodes the issue is expected to reach, mapped to their components.
    #[serde(alias = "expectedPropagatedComponentIds", alias = "expectedPropagation")]
    pub propagation: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// A single node id or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitialNodes {
    One(String),
    Many(Vec<String>),
}

impl InitialNodes {
    pub fn ids(&self) -> &[String] {
        match self {
            InitialNodes::One(id) => std::slice::from_ref(id),
            InitialNodes::Many(ids) => ids,
        }
    }
}

/// Confusion counts and derived ratios of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// The scenario description.
    #[serde(rename = "ref")]
    pub scenario: String,
    pub true_positive: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_negative: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Confusion counts summed over all scenarios, with micro-averaged ratios.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub true_positive: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_negative: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Means of the per-scenario ratios, ignoring undefined (`NaN`) entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroAverage {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    pub per_scenario: Vec<TestResult>,
    pub aggregate: Aggregate,
    #[serde(rename = "macro")]
    pub macro_average: MacroAverage,
}

/// Scores `config` against every scenario of `validation_set`.
///
/// Issues already present in `base` are ignored; every scenario starts from
/// its own synthetic seed. The first rejected scenario aborts scoring.
pub fn score(
    config: &IssuePropagationConfig,
    base: &PropagationContext,
    validation_set: &[ValidationIssue],
) -> Result<ScoreReport, ScoreError> {
    score_with(config, base, validation_set, PropagationOptions::default())
}

/// [`score`] with explicit propagation options.
pub fn score_with(
    config: &IssuePropagationConfig,
    base: &PropagationContext,
    validation_set: &[ValidationIssue],
    options: PropagationOptions,
) -> Result<ScoreReport, ScoreError> {
    let index = GraphIndex::new(&base.components, &base.relations);
    let per_scenario = validation_set
        .iter()
        .map(|scenario| score_scenario(&index, config, base, scenario, options))
        .collect::<Result<Vec<_>, _>>()?;

    let mut aggregate = per_scenario.iter().fold(Aggregate::default(), |mut acc, r| {
        acc.true_positive += r.true_positive;
        acc.false_positive += r.false_positive;
        acc.false_negative += r.false_negative;
        acc.true_negative += r.true_negative;
        acc
    });
    aggregate.precision = precision(aggregate.true_positive, aggregate.false_positive);
    aggregate.recall = recall(aggregate.true_positive, aggregate.false_negative);
    aggregate.f1 = f1(
        aggregate.true_positive,
        aggregate.false_positive,
        aggregate.false_negative,
    );

    let macro_average = MacroAverage {
        precision: mean_defined(per_scenario.iter().map(|r| r.precision)),
        recall: mean_defined(per_scenario.iter().map(|r| r.recall)),
        f1: mean_defined(per_scenario.iter().map(|r| r.f1)),
    };
    tracing::info!(
        scenarios = per_scenario.len(),
        precision = aggregate.precision,
        recall = aggregate.recall,
        f1 = aggregate.f1,
        "scoring finished"
    );

    Ok(ScoreReport {
        per_scenario,
        aggregate,
        macro_average,
    })
}

fn score_scenario(
    index: &GraphIndex<'_>,
    config: &IssuePropagationConfig,
    base: &PropagationContext,
    scenario: &ValidationIssue,
    options: PropagationOptions,
) -> Result<TestResult, ScoreError> {
    let name = &scenario.description;
    let initial_ids = scenario.initial_component.ids();
    if initial_ids.is_empty() {
        return Err(ScoreError::NoInitialNode {
            scenario: name.clone(),
        });
    }

    let initial_components = initial_ids
        .iter()
        .map(|id| owner_id(index, name, id))
        .collect::<Result<BTreeSet<_>, _>>()?;
    let initial = match initial_components.iter().next() {
        Some(&initial) if initial_components.len() == 1 => initial,
        _ => {
            return Err(ScoreError::MultipleInitialComponents {
                scenario: name.clone(),
                count: initial_components.len(),
            })
        }
    };

    let mut expected = scenario
        .propagation
        .iter()
        .map(|id| owner_id(index, name, id))
        .collect::<Result<BTreeSet<_>, _>>()?;

    let context = PropagationContext {
        components: base.components.clone(),
        relations: base.relations.clone(),
        issues: vec![seed_issue(scenario)],
    };
    let result = propagate_with(&context, config, options).map_err(|source| {
        ScoreError::Propagation {
            scenario: name.clone(),
            source,
        }
    })?;

    let mut actual = BTreeSet::new();
    for issue in &result.issues {
        for id in &issue.components_and_interfaces {
            actual.insert(owner_id(index, name, id)?);
        }
    }

    expected.remove(initial);
    actual.remove(initial);
    let true_positive = expected.intersection(&actual).count();
    let false_positive = actual.difference(&expected).count();
    let false_negative = expected.difference(&actual).count();
    let true_negative = base
        .components
        .iter()
        .map(|c| c.id.as_str())
        .filter(|id| *id != initial && !expected.contains(id) && !actual.contains(id))
        .count();

    let describe = |ids: Vec<&str>| -> Vec<String> {
        ids.into_iter().map(|id| display_name(index, id)).collect()
    };
    tracing::debug!(
        scenario = %name,
        false_positives = ?describe(actual.difference(&expected).copied().collect()),
        false_negatives = ?describe(expected.difference(&actual).copied().collect()),
        "scenario mismatches"
    );

    let scored = TestResult {
        scenario: name.clone(),
        true_positive,
        false_positive,
        false_negative,
        true_negative,
        precision: precision(true_positive, false_positive),
        recall: recall(true_positive, false_negative),
        f1: f1(true_positive, false_positive, false_negative),
    };
    tracing::info!(
        scenario = %name,
        initial = %display_name(index, initial),
        precision = scored.precision,
        recall = scored.recall,
        f1 = scored.f1,
        "scored scenario"
    );
    Ok(scored)
}

fn seed_issue(scenario: &ValidationIssue) -> PropagatedIssue {
    PropagatedIssue {
        id: Some(SEED_REF.to_string()),
        issue_ref: IssueRef::from(SEED_REF),
        propagations: Vec::new(),
        state: scenario.state.clone(),
        kind: scenario.kind.clone(),
        template: scenario
            .template
            .clone()
            .unwrap_or_else(|| DEFAULT_SEED_TEMPLATE.to_string()),
        title: Some(scenario.description.clone()),
        templated_fields: TemplatedFields::new(),
        characteristics: scenario.initial_characteristics.iter().cloned().collect(),
        components_and_interfaces: scenario.initial_component.ids().to_vec(),
    }
}

/// Id of the component owning node `id`.
fn owner_id<'a>(index: &GraphIndex<'a>, scenario: &str, id: &str) -> Result<&'a str, ScoreError> {
    let unknown = || ScoreError::UnknownNode {
        scenario: scenario.to_string(),
        node: id.to_string(),
    };
    let node = index.node(id).ok_or_else(unknown)?;
    let owner = index.owner_of(node).map_err(|_| unknown())?;
    Ok(&owner.id)
}

/// `Component` or `Component.Interface`.
fn display_name(index: &GraphIndex<'_>, id: &str) -> String {
    match index.node(id) {
        Some(node @ GraphNode::Interface(interface)) => match index.owner_of(node) {
            Ok(owner) => format!("{}.{}", owner.name, interface.name),
            Err(_) => interface.name.clone(),
        },
        Some(node) => node.name().to_string(),
        None => id.to_string(),
    }
}

fn precision(tp: usize, fp: usize) -> f64 {
    tp as f64 / (tp + fp) as f64
}

fn recall(tp: usize, fn_: usize) -> f64 {
    tp as f64 / (tp + fn_) as f64
}

fn f1(tp: usize, fp: usize, fn_: usize) -> f64 {
    (2 * tp) as f64 / (2 * tp + fp + fn_) as f64
}

/// Mean of the non-`NaN` values; `NaN` when there are none.
fn mean_defined(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    sum / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> PropagationContext {
        serde_json::from_value(json!({
            "components": [
                {
                    "id": "a", "name": "A", "template": "service",
                    "interfaces": [
                        {"id": "a1", "name": "http", "template": "rest", "component": "a"},
                        {"id": "a2", "name": "grpc", "template": "rpc", "component": "a"}
                    ]
                },
                {"id": "b", "name": "B", "template": "service"},
                {"id": "c", "name": "C", "template": "service"},
                {"id": "d", "name": "D", "template": "service"}
            ],
            "relations": [
                {"id": "r1", "template": "calls", "from": "a", "to": "b"},
                {"id": "r2", "template": "calls", "from": "a", "to": "c"}
            ]
        }))
        .unwrap()
    }

    fn scenario(initial: serde_json::Value, expected: serde_json::Value) -> ValidationIssue {
        serde_json::from_value(json!({
            "description": "A is down",
            "type": "Bug",
            "state": "Open",
            "initialCharacteristics": ["service unreachable"],
            "initialComponent": initial,
            "propagation": expected
        }))
        .unwrap()
    }

    #[test]
    fn over_propagation_halves_precision() {
        let report = score(
            &IssuePropagationConfig::debug(),
            &base(),
            &[scenario(json!("a"), json!(["b"]))],
        )
        .unwrap();

        let r = &report.per_scenario[0];
        assert_eq!(r.scenario, "A is down");
        assert_eq!((r.true_positive, r.false_positive, r.false_negative), (1, 1, 0));
        assert_eq!(r.true_negative, 1);
        assert_eq!(r.precision, 0.5);
        assert_eq!(r.recall, 1.0);
        assert!((r.f1 - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.aggregate.precision, 0.5);
    }

    #[test]
    fn initial_component_is_excluded_from_both_sets() {
        let report = score(
            &IssuePropagationConfig::debug(),
            &base(),
            &[scenario(json!("a"), json!(["a", "b", "c"]))],
        )
        .unwrap();
        let r = &report.per_scenario[0];
        assert_eq!((r.true_positive, r.false_positive, r.false_negative), (2, 0, 0));
    }

    #[test]
    fn interfaces_of_one_component_count_as_one_start() {
        let report = score(
            &IssuePropagationConfig::debug(),
            &base(),
            &[scenario(json!(["a1", "a2"]), json!([]))],
        )
        .unwrap();
        // The debug config only follows component relations, so nothing moves.
        let r = &report.per_scenario[0];
        assert_eq!(r.true_positive + r.false_positive + r.false_negative, 0);
        assert!(r.precision.is_nan());
        assert!(r.recall.is_nan());
        assert!(r.f1.is_nan());
        assert!(report.macro_average.f1.is_nan());
    }

    #[test]
    fn macro_average_skips_undefined_scenarios() {
        let scenarios = [
            scenario(json!("a"), json!(["b"])),
            scenario(json!("d"), json!([])),
        ];
        let report = score(&IssuePropagationConfig::debug(), &base(), &scenarios).unwrap();

        assert!(report.per_scenario[1].precision.is_nan());
        assert_eq!(report.macro_average.precision, 0.5);
        assert_eq!(report.macro_average.recall, 1.0);
        assert_eq!(report.aggregate.true_negative, 1 + 3);
    }

    #[test]
    fn rejects_several_initial_components() {
        let err = score(
            &IssuePropagationConfig::debug(),
            &base(),
            &[scenario(json!(["a1", "b"]), json!([]))],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ScoreError::MultipleInitialComponents {
                scenario: "A is down".into(),
                count: 2
            }
        );
    }

    #[test]
    fn rejects_unknown_nodes() {
        let err = score(
            &IssuePropagationConfig::debug(),
            &base(),
            &[scenario(json!("a"), json!(["ghost"]))],
        )
        .unwrap_err();
        assert!(matches!(err, ScoreError::UnknownNode { ref node, .. } if node == "ghost"));

        let err = score(
            &IssuePropagationConfig::debug(),
            &base(),
            &[scenario(json!([]), json!([]))],
        )
        .unwrap_err();
        assert!(matches!(err, ScoreError::NoInitialNode { .. }));
    }

    #[test]
    fn accepts_distilled_field_names() {
        let entry: ValidationIssue = serde_json::from_value(json!({
            "description": "x",
            "type": "Bug",
            "state": "Open",
            "initialCharacteristics": [],
            "initialComponentOrInterfaceIds": ["a1"],
            "expectedPropagatedComponentIds": ["b"]
        }))
        .unwrap();
        assert_eq!(entry.initial_component.ids(), ["a1".to_string()]);
        assert_eq!(entry.propagation, vec!["b".to_string()]);
    }
}

//! Characteristic extraction.
//!
//! Lists every characteristic a configuration can react to or produce: the
//! `characteristics` of every schema plus every literal in an issue filter's
//! `characteristics` field, anywhere inside an `and`/`or`/`not` tree.

use indexmap::IndexSet;

use archprop_core::config::IssuePropagationConfig;
use archprop_core::filter::{IssueFilter, MetaFilter};

/// Returns the de-duplicated characteristics of `config`, in first-seen
/// order: schemas (by name), then inter-component rules, then
/// intra-component rules.
pub fn extract_characteristics(config: &IssuePropagationConfig) -> IndexSet<String> {
    let mut found = IndexSet::new();

    for schema in config.schemas.values() {
        found.extend(schema.characteristics.iter().cloned());
    }

    let mut collect = |filter: &MetaFilter<IssueFilter>| {
        filter.for_each_leaf(&mut |leaf: &IssueFilter| {
            if let Some(characteristics) = &leaf.characteristics {
                found.extend(characteristics.iter().cloned());
            }
        });
    };
    for rule in &config.inter_component_rules {
        collect(&rule.filter_issue);
    }
    for rule in &config.intra_component_rules {
        collect(rule.filter_issue());
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collects_from_schemas_and_nested_filters() {
        let config: IssuePropagationConfig = serde_json::from_value(json!({
            "schemas": {
                "propagatedBug": {
                    "template": true, "type": true, "state": true,
                    "characteristics": ["propagated", "api-breaking"]
                }
            },
            "interComponentRules": [{
                "filterIssue": {"or": [
                    {"characteristics": ["api-breaking"]},
                    {"not": {"characteristics": ["cosmetic"]}}
                ]},
                "propagationDirection": "backward",
                "newIssueSchema": "propagatedBug"
            }],
            "intraComponentRules": [{
                "filterIssue": {"and": [{"characteristics": ["latency"]}, {"state": ["Open"]}]},
                "propagationDirection": "both",
                "filterComponent": {},
                "filterInterface": {}
            }]
        }))
        .unwrap();

        let found: Vec<_> = extract_characteristics(&config).into_iter().collect();
        assert_eq!(found, vec!["propagated", "api-breaking", "cosmetic", "latency"]);
    }

    #[test]
    fn debug_config_has_none() {
        assert!(extract_characteristics(&IssuePropagationConfig::debug()).is_empty());
    }
}

//! Issue propagation configuration: schemas and rules.
//!
//! This is the wire contract rule authors write against. Schema fields use
//! the `true`-means-pass-through convention: `true` copies the value from the
//! triggering issue, any other value is a fixed literal.

use std::collections::BTreeMap;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::filter::{
    ComponentFilterBase, InterfaceFilterBase, IntraComponentDependencySpecificationFilter,
    IssueFilter, MetaFilter, RelationFilter, RelationPartnerFilter,
};

/// Where a derived issue field takes its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSource<T> {
    /// Copy the value of the triggering issue (`true` on the wire).
    PassThrough,
    Fixed(T),
}

impl<T: Clone> FieldSource<T> {
    /// Resolves the effective value given the triggering issue's value.
    pub fn resolve(&self, source: &T) -> T {
        match self {
            FieldSource::PassThrough => source.clone(),
            FieldSource::Fixed(value) => value.clone(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldSource<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire<T> {
            Flag(bool),
            Value(T),
        }

        match Wire::<T>::deserialize(deserializer)? {
            Wire::Flag(true) => Ok(FieldSource::PassThrough),
            Wire::Flag(false) => Err(D::Error::custom(
                "`false` is not a valid field source, use `true` or a literal",
            )),
            Wire::Value(value) => Ok(FieldSource::Fixed(value)),
        }
    }
}

impl<T: Serialize> Serialize for FieldSource<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldSource::PassThrough => serializer.serialize_bool(true),
            FieldSource::Fixed(value) => value.serialize(serializer),
        }
    }
}

/// A fixed templated field value, wrapped as `{"value": ...}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixedValue {
    pub value: Value,
}

/// Templated fields of a derived issue.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatedFieldsSource {
    /// Copy the whole attribute bag of the triggering issue (`true`).
    PassThrough,
    /// Per-field sources. Fields not listed are left out.
    Fields(BTreeMap<String, FieldSource<FixedValue>>),
}

impl Default for TemplatedFieldsSource {
    fn default() -> Self {
        TemplatedFieldsSource::Fields(BTreeMap::new())
    }
}

impl<'de> Deserialize<'de> for TemplatedFieldsSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Flag(bool),
            Fields(BTreeMap<String, FieldSource<FixedValue>>),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Flag(true) => Ok(TemplatedFieldsSource::PassThrough),
            Wire::Flag(false) => Err(D::Error::custom(
                "`false` is not a valid templatedFields source",
            )),
            Wire::Fields(fields) => Ok(TemplatedFieldsSource::Fields(fields)),
        }
    }
}

impl Serialize for TemplatedFieldsSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TemplatedFieldsSource::PassThrough => serializer.serialize_bool(true),
            TemplatedFieldsSource::Fields(fields) => fields.serialize(serializer),
        }
    }
}

/// Direction of an issue relation created towards the source issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueRelationDirection {
    Incoming,
    Outgoing,
}

/// Issue relation the rendering layer may create between a derived issue
/// and its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationIssueRelation {
    #[serde(rename = "type")]
    pub kind: String,
    pub direction: IssueRelationDirection,
}

/// Template for issues derived by an inter-component rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagatedIssueSchema {
    pub template: FieldSource<String>,
    #[serde(rename = "type")]
    pub kind: FieldSource<String>,
    pub state: FieldSource<String>,
    /// `None` leaves the title for the user to enter.
    #[serde(default)]
    pub title: Option<FieldSource<String>>,
    #[serde(default)]
    pub templated_fields: TemplatedFieldsSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_to_source: Option<PropagationIssueRelation>,
    #[serde(default)]
    pub characteristics: Vec<String>,
}

/// Direction of an inter-component or interface-interface rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagationDirection {
    /// Along `from -> to` (relation) or `incoming -> outgoing` (dependency).
    Forward,
    Backward,
    Both,
}

impl PropagationDirection {
    /// Returns `true` if a traversal in the given direction is allowed.
    pub fn allows(self, is_outgoing: bool) -> bool {
        match self {
            PropagationDirection::Both => true,
            PropagationDirection::Forward => is_outgoing,
            PropagationDirection::Backward => !is_outgoing,
        }
    }
}

/// Direction of a component-interface rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentInterfaceDirection {
    #[serde(rename = "component-interface")]
    ComponentToInterface,
    #[serde(rename = "interface-component")]
    InterfaceToComponent,
    #[serde(rename = "both")]
    Both,
}

impl ComponentInterfaceDirection {
    /// Returns `true` if propagating from the component (or towards it, when
    /// `from_component` is false) is allowed.
    pub fn allows(self, from_component: bool) -> bool {
        match self {
            ComponentInterfaceDirection::Both => true,
            ComponentInterfaceDirection::ComponentToInterface => from_component,
            ComponentInterfaceDirection::InterfaceToComponent => !from_component,
        }
    }
}

/// Propagates an issue over a relation by deriving an issue on the other
/// side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InterComponentRule {
    #[serde(default)]
    pub filter_issue: MetaFilter<IssueFilter>,
    #[serde(default)]
    pub filter_relation: MetaFilter<RelationFilter>,
    /// Applied to the relation's `from` node.
    #[serde(default)]
    pub filter_relation_start: MetaFilter<RelationPartnerFilter>,
    /// Applied to the relation's `to` node.
    #[serde(default)]
    pub filter_relation_end: MetaFilter<RelationPartnerFilter>,
    pub propagation_direction: PropagationDirection,
    /// Key into [`IssuePropagationConfig::schemas`].
    pub new_issue_schema: String,
}

/// Widens an issue between a component and its interfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ComponentInterfaceRule {
    #[serde(default)]
    pub filter_issue: MetaFilter<IssueFilter>,
    #[serde(default)]
    pub filter_component: MetaFilter<ComponentFilterBase>,
    #[serde(default)]
    pub filter_interface: MetaFilter<InterfaceFilterBase>,
    pub propagation_direction: ComponentInterfaceDirection,
}

/// Widens an issue between interfaces linked by a dependency specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InterfaceInterfaceRule {
    #[serde(default)]
    pub filter_issue: MetaFilter<IssueFilter>,
    #[serde(default)]
    pub filter_intra_component_dependency_specification:
        MetaFilter<IntraComponentDependencySpecificationFilter>,
    #[serde(default)]
    pub filter_component: MetaFilter<ComponentFilterBase>,
    /// Applied to interfaces on the `incoming` side of the specification.
    #[serde(default)]
    pub filter_start: MetaFilter<InterfaceFilterBase>,
    /// Applied to interfaces on the `outgoing` side of the specification.
    #[serde(default)]
    pub filter_end: MetaFilter<InterfaceFilterBase>,
    pub propagation_direction: PropagationDirection,
}

/// A rule for propagation inside one component.
///
/// On the wire the two shapes share a key set, so the shape is chosen by the
/// keys only one of them has: `filterInterface` for a component-interface
/// rule, `filterStart` / `filterEnd` /
/// `filterIntraComponentDependencySpecification` for an interface-interface
/// rule. Without any of those the direction value decides, and `both` alone
/// is rejected as ambiguous.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IntraComponentRule {
    ComponentInterface(ComponentInterfaceRule),
    InterfaceInterface(InterfaceInterfaceRule),
}

const INTERFACE_INTERFACE_KEYS: [&str; 3] = [
    "filterStart",
    "filterEnd",
    "filterIntraComponentDependencySpecification",
];

impl IntraComponentRule {
    pub fn filter_issue(&self) -> &MetaFilter<IssueFilter> {
        match self {
            IntraComponentRule::ComponentInterface(rule) => &rule.filter_issue,
            IntraComponentRule::InterfaceInterface(rule) => &rule.filter_issue,
        }
    }

    /// Parses a rule from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let Value::Object(map) = &value else {
            return Err(serde_json::Error::custom(format!(
                "intra-component rule must be an object, got {}",
                value
            )));
        };
        let names_interface = map.contains_key("filterInterface");
        let names_dependency = INTERFACE_INTERFACE_KEYS.iter().any(|key| map.contains_key(*key));
        let interface_interface = match (names_interface, names_dependency) {
            (true, true) => {
                return Err(serde_json::Error::custom(
                    "intra-component rule mixes `filterInterface` with \
                     `filterStart`/`filterEnd`/`filterIntraComponentDependencySpecification`",
                ))
            }
            (true, false) => false,
            (false, true) => true,
            (false, false) => match map.get("propagationDirection").and_then(Value::as_str) {
                Some("forward" | "backward") => true,
                Some("component-interface" | "interface-component") => false,
                _ => {
                    return Err(serde_json::Error::custom(
                        "ambiguous intra-component rule: give `filterInterface` for a \
                         component-interface rule, or `filterStart`/`filterEnd`/\
                         `filterIntraComponentDependencySpecification` for an \
                         interface-interface rule",
                    ))
                }
            },
        };

        if interface_interface {
            serde_json::from_value(value).map(IntraComponentRule::InterfaceInterface)
        } else {
            serde_json::from_value(value).map(IntraComponentRule::ComponentInterface)
        }
    }
}

impl<'de> Deserialize<'de> for IntraComponentRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        IntraComponentRule::from_value(value).map_err(D::Error::custom)
    }
}

/// Decodes a rule list one entry at a time so a failure names the rule.
fn decode_rules<T: DeserializeOwned, E: serde::de::Error>(
    field: &str,
    values: Vec<Value>,
) -> Result<Vec<T>, E> {
    values
        .into_iter()
        .enumerate()
        .map(|(position, value)| {
            serde_json::from_value(value)
                .map_err(|e| E::custom(format!("{}[{}]: {}", field, position, e)))
        })
        .collect()
}

fn deserialize_intra_rules<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<IntraComponentRule>, D::Error> {
    decode_rules("intraComponentRules", Vec::<Value>::deserialize(deserializer)?)
}

fn deserialize_inter_rules<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<InterComponentRule>, D::Error> {
    decode_rules("interComponentRules", Vec::<Value>::deserialize(deserializer)?)
}

/// The full rule configuration of one propagation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePropagationConfig {
    #[serde(default)]
    pub schemas: BTreeMap<String, PropagatedIssueSchema>,
    #[serde(default, deserialize_with = "deserialize_intra_rules")]
    pub intra_component_rules: Vec<IntraComponentRule>,
    #[serde(default, deserialize_with = "deserialize_inter_rules")]
    pub inter_component_rules: Vec<InterComponentRule>,
}

impl IssuePropagationConfig {
    /// Propagates every issue in both directions between components, copying
    /// all fields of the triggering issue.
    pub fn debug() -> Self {
        let schema = PropagatedIssueSchema {
            template: FieldSource::PassThrough,
            kind: FieldSource::PassThrough,
            state: FieldSource::PassThrough,
            title: Some(FieldSource::PassThrough),
            templated_fields: TemplatedFieldsSource::PassThrough,
            relation_to_source: None,
            characteristics: Vec::new(),
        };
        let component = || {
            MetaFilter::leaf(RelationPartnerFilter::Component(Default::default()))
        };
        IssuePropagationConfig {
            schemas: BTreeMap::from([("default".to_string(), schema)]),
            intra_component_rules: Vec::new(),
            inter_component_rules: vec![InterComponentRule {
                filter_issue: MetaFilter::leaf(IssueFilter::default()),
                filter_relation: MetaFilter::leaf(RelationFilter::default()),
                filter_relation_start: component(),
                filter_relation_end: component(),
                propagation_direction: PropagationDirection::Both,
                new_issue_schema: "default".to_string(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::NodeKind;
    use serde_json::json;

    #[test]
    fn schema_pass_through_and_literals() {
        let schema: PropagatedIssueSchema = serde_json::from_value(json!({
            "template": true,
            "type": "Bug",
            "state": "Open",
            "title": null,
            "templatedFields": {"severity": {"value": 3}, "owner": true},
            "relationToSource": {"type": "Depends on", "direction": "outgoing"},
            "characteristics": ["API bug"]
        }))
        .unwrap();

        assert_eq!(schema.template, FieldSource::PassThrough);
        assert_eq!(schema.kind, FieldSource::Fixed("Bug".to_string()));
        assert_eq!(schema.title, None);
        match &schema.templated_fields {
            TemplatedFieldsSource::Fields(fields) => {
                assert_eq!(fields["owner"], FieldSource::PassThrough);
                assert_eq!(
                    fields["severity"],
                    FieldSource::Fixed(FixedValue { value: json!(3) })
                );
            }
            other => panic!("expected per-field sources, got {:?}", other),
        }
        assert_eq!(
            schema.relation_to_source.unwrap().direction,
            IssueRelationDirection::Outgoing
        );
    }

    #[test]
    fn false_is_not_a_field_source() {
        let err = serde_json::from_value::<FieldSource<String>>(json!(false));
        assert!(err.is_err());
    }

    #[test]
    fn whole_templated_fields_pass_through() {
        let source: TemplatedFieldsSource = serde_json::from_value(json!(true)).unwrap();
        assert_eq!(source, TemplatedFieldsSource::PassThrough);
        assert_eq!(serde_json::to_value(&source).unwrap(), json!(true));
    }

    #[test]
    fn intra_rules_are_told_apart_by_their_fields() {
        let rules: Vec<IntraComponentRule> = serde_json::from_value(json!([
            {
                "filterIssue": {},
                "filterComponent": {},
                "filterInterface": {"name": "rest"},
                "propagationDirection": "component-interface"
            },
            {
                "filterIssue": {},
                "filterComponent": {},
                "filterStart": {},
                "filterEnd": {},
                "filterIntraComponentDependencySpecification": {"name": "db"},
                "propagationDirection": "forward"
            }
        ]))
        .unwrap();

        assert!(matches!(rules[0], IntraComponentRule::ComponentInterface(_)));
        assert!(matches!(rules[1], IntraComponentRule::InterfaceInterface(_)));
    }

    #[test]
    fn intra_rules_accept_partner_shaped_filters() {
        let microservice = json!({"type": "component", "template": ["microservice"]});
        let graphql_provided = json!({"type": "interface", "template": ["graphql-provided"]});
        let graphql_required = json!({"type": "interface", "template": ["graphql-required"]});
        let config: IssuePropagationConfig = serde_json::from_value(json!({
            "intraComponentRules": [
                {
                    "filterIssue": {"type": ["Bug"], "characteristics": ["api-breaking"]},
                    "propagationDirection": "backward",
                    "filterComponent": microservice,
                    "filterStart": graphql_provided,
                    "filterEnd": graphql_required,
                    "filterIntraComponentDependencySpecification": {"type": ["ICDS_GG"]}
                },
                {
                    "filterIssue": {"type": ["Bug"]},
                    "propagationDirection": "component-interface",
                    "filterComponent": microservice,
                    "filterInterface": {"or": [graphql_provided]}
                }
            ]
        }))
        .unwrap();

        match &config.intra_component_rules[0] {
            IntraComponentRule::InterfaceInterface(rule) => {
                assert_eq!(rule.propagation_direction, PropagationDirection::Backward);
                assert!(matches!(
                    &rule.filter_component,
                    MetaFilter::Leaf(filter) if filter.kind == Some(NodeKind::Component)
                ));
            }
            other => panic!("expected interface-interface rule, got {:?}", other),
        }
        assert!(matches!(
            config.intra_component_rules[1],
            IntraComponentRule::ComponentInterface(_)
        ));
    }

    #[test]
    fn intra_rule_with_only_shared_keys_and_both_is_ambiguous() {
        let err = serde_json::from_value::<IntraComponentRule>(json!({
            "filterIssue": {},
            "filterComponent": {},
            "propagationDirection": "both"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("ambiguous"));

        let forward: IntraComponentRule = serde_json::from_value(json!({
            "filterComponent": {},
            "propagationDirection": "forward"
        }))
        .unwrap();
        assert!(matches!(forward, IntraComponentRule::InterfaceInterface(_)));
    }

    #[test]
    fn intra_rule_mixing_both_shapes_is_rejected() {
        let err = serde_json::from_value::<IntraComponentRule>(json!({
            "filterInterface": {},
            "filterStart": {},
            "propagationDirection": "both"
        }));
        assert!(err.is_err());
    }

    #[test]
    fn rule_decode_errors_name_the_rule() {
        let err = serde_json::from_value::<IssuePropagationConfig>(json!({
            "intraComponentRules": [
                {"filterInterface": {}, "propagationDirection": "both"},
                {"filterInterface": {"colour": "red"}, "propagationDirection": "both"}
            ]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("intraComponentRules[1]"), "{}", err);

        let err = serde_json::from_value::<IssuePropagationConfig>(json!({
            "interComponentRules": [{"propagationDirection": "sideways", "newIssueSchema": "s"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("interComponentRules[0]"), "{}", err);
    }

    #[test]
    fn omitted_rule_filters_match_all() {
        let rule: InterComponentRule = serde_json::from_value(json!({
            "propagationDirection": "backward",
            "newIssueSchema": "bug"
        }))
        .unwrap();
        assert_eq!(rule.filter_issue, MetaFilter::all());
        assert_eq!(rule.filter_relation_end, MetaFilter::all());
    }

    #[test]
    fn direction_compatibility() {
        assert!(PropagationDirection::Forward.allows(true));
        assert!(!PropagationDirection::Forward.allows(false));
        assert!(PropagationDirection::Backward.allows(false));
        assert!(!PropagationDirection::Backward.allows(true));
        assert!(PropagationDirection::Both.allows(true) && PropagationDirection::Both.allows(false));

        assert!(ComponentInterfaceDirection::ComponentToInterface.allows(true));
        assert!(!ComponentInterfaceDirection::ComponentToInterface.allows(false));
        assert!(ComponentInterfaceDirection::InterfaceToComponent.allows(false));
    }

    #[test]
    fn debug_config_round_trips_through_json() {
        let config = IssuePropagationConfig::debug();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["interComponentRules"][0]["filterRelationStart"]["type"], "component");
        let back: IssuePropagationConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}

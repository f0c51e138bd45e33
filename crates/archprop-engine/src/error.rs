//! Error types for propagation, rule evaluation, and scoring.
//!
//! Every variant names the offending rule, schema, field, or node so that the
//! CLI or rendering layer can point the rule author at the exact entry. No
//! error is recovered from: a failed run returns no partial issue list.

use archprop_core::error::CoreError;
use archprop_core::id::IssueRef;

/// Errors produced while evaluating a templated-field rule.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LogicError {
    #[error("unknown operator '{op}'")]
    UnknownOperator { op: String },

    #[error("invalid arguments for '{op}': {reason}")]
    InvalidArguments { op: String, reason: String },
}

/// Errors that abort a propagation run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropagationError {
    /// An inter-component rule names a schema the configuration lacks.
    #[error("inter-component rule #{rule} references unknown schema '{schema}'")]
    UnknownSchema { rule: usize, schema: String },

    /// A `templatedFields` filter rule could not be evaluated.
    #[error("templated field rule for '{field}' is malformed: {source}")]
    InvalidFieldRule {
        field: String,
        #[source]
        source: LogicError,
    },

    /// An issue that is attached to no node at all.
    #[error("issue {issue} is attached to no component or interface")]
    EmptyFootprint { issue: IssueRef },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Errors that reject a validation scenario.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreError {
    #[error("scenario '{scenario}': {source}")]
    Propagation {
        scenario: String,
        #[source]
        source: PropagationError,
    },

    #[error("scenario '{scenario}' references unknown node '{node}'")]
    UnknownNode { scenario: String, node: String },

    #[error("scenario '{scenario}' has no initial component or interface")]
    NoInitialNode { scenario: String },

    /// Multiple interfaces of the same component are fine; several
    /// components are not.
    #[error("scenario '{scenario}' starts on {count} components, only one is allowed")]
    MultipleInitialComponents { scenario: String, count: usize },
}

//! Core error types for archprop-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of the architecture graph model and its filter data.

use thiserror::Error;

/// Core errors produced by the archprop-core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A `name` filter is not a valid regular expression.
    #[error("invalid name pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A relation, dependency specification, or issue names a node id that
    /// is not part of the graph.
    #[error("dangling reference to node '{node}' from {referenced_by}")]
    DanglingReference { node: String, referenced_by: String },

    /// A node id resolved to a node of the wrong kind.
    #[error("node '{node}' is not a {expected}")]
    UnexpectedNodeKind { node: String, expected: &'static str },
}

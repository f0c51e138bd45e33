pub mod config;
pub mod error;
pub mod filter;
pub mod graph;
pub mod id;
pub mod model;

// Re-export commonly used types
pub use config::{
    ComponentInterfaceRule, InterComponentRule, InterfaceInterfaceRule, IntraComponentRule,
    IssuePropagationConfig, PropagatedIssueSchema, PropagationDirection,
};
pub use error::CoreError;
pub use filter::MetaFilter;
pub use graph::{GraphIndex, GraphNode};
pub use id::IssueRef;
pub use model::{
    Component, Interface, IntraComponentDependencySpecification, PropagatedIssue,
    PropagationContext, Relation,
};

pub mod characteristics;
pub mod error;
pub mod logic;
pub mod matcher;
pub mod propagate;
pub mod score;

// Re-export commonly used types
pub use characteristics::extract_characteristics;
pub use error::{LogicError, PropagationError, ScoreError};
pub use propagate::{
    propagate, propagate_with, IssuePropagator, PropagationOptions, PropagationResult,
    WorklistOrder,
};
pub use score::{score, score_with, ScoreReport, TestResult, ValidationIssue};

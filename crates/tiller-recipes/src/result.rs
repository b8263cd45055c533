//! Execution results.
//!
//! An [`ExecutionResult`] is the record of a dispatch that actually
//! happened: the runtime ran, and this is what came of it. Pre-dispatch
//! failures (unknown recipe, bad parameters) never produce one. The type
//! serializes so external logging can capture runs verbatim.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// A failure recorded inside a result.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionError {
    /// Stable error kind tag.
    pub kind: String,
    pub message: String,
}

/// Outcome of one recipe execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Name of the executed recipe.
    pub recipe: String,
    pub success: bool,
    /// Runtime output. `Null` when the recipe produced nothing.
    pub output: Value,
    /// Present iff `success` is false.
    pub error: Option<ExecutionError>,
    /// Wall-clock execution time.
    pub elapsed: Duration,
    /// Ordered per-step results for workflow recipes; empty for atomic
    /// recipes. Completed steps are recorded even when a later step fails.
    pub steps: Vec<ExecutionResult>,
}

impl ExecutionResult {
    /// A successful atomic result.
    pub fn success(recipe: impl Into<String>, output: Value, elapsed: Duration) -> Self {
        Self {
            recipe: recipe.into(),
            success: true,
            output,
            error: None,
            elapsed,
            steps: Vec::new(),
        }
    }

    /// A failed result with a recorded error.
    pub fn failure(
        recipe: impl Into<String>,
        kind: &str,
        message: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            recipe: recipe.into(),
            success: false,
            output: Value::Null,
            error: Some(ExecutionError {
                kind: kind.to_string(),
                message: message.into(),
            }),
            elapsed,
            steps: Vec::new(),
        }
    }
}

//! Error types for the tiller-recipes crate.

use thiserror::Error;
use tiller_session::SessionError;

/// Errors raised by discovery, resolution, and execution of recipes.
///
/// Variants here are the pre-dispatch failures: nothing has been evaluated,
/// spawned, or sent to the browser yet. Failures that occur after dispatch
/// come back inside an `ExecutionResult` instead, so a caller can always
/// tell "never started" apart from "started and failed".
#[derive(Debug, Error)]
pub enum RecipeError {
    /// No recipe with this name exists in the current registry snapshot.
    #[error("recipe not found: {name}")]
    NotFound { name: String },

    /// The recipe participates in a dependency cycle.
    #[error("recipe '{name}' is part of a dependency cycle: {chain}")]
    CircularDependency { name: String, chain: String },

    /// Supplied parameters do not satisfy the recipe's declared inputs.
    #[error("invalid parameters for recipe '{recipe}': {detail}")]
    ParameterValidation { recipe: String, detail: String },

    /// A namespace could not be scanned at all.
    #[error("discovery failed: {detail}")]
    Discovery { detail: String },

    /// A runtime adapter failed while running a recipe.
    #[error("recipe '{recipe}' execution failed: {detail}")]
    RuntimeExecution { recipe: String, detail: String },

    /// A workflow step names a recipe outside the declared dependencies.
    #[error("workflow '{workflow}' step names undeclared dependency '{step}'")]
    UndeclaredDependency { workflow: String, step: String },

    /// A chrome-script recipe was dispatched without an attached session.
    #[error("recipe '{recipe}' requires an attached browser session")]
    SessionUnavailable { recipe: String },

    /// An underlying protocol session failure.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl RecipeError {
    /// Stable machine-readable tag for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            RecipeError::NotFound { .. } => "recipe_not_found",
            RecipeError::CircularDependency { .. } => "circular_dependency",
            RecipeError::ParameterValidation { .. } => "parameter_validation",
            RecipeError::Discovery { .. } => "discovery",
            RecipeError::RuntimeExecution { .. } => "runtime_execution",
            RecipeError::UndeclaredDependency { .. } => "undeclared_dependency",
            RecipeError::SessionUnavailable { .. } => "session_unavailable",
            RecipeError::Session(_) => "session",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_stable() {
        assert_eq!(
            RecipeError::NotFound { name: "x".into() }.kind(),
            "recipe_not_found"
        );
        assert_eq!(
            RecipeError::UndeclaredDependency {
                workflow: "w".into(),
                step: "s".into()
            }
            .kind(),
            "undeclared_dependency"
        );
        assert_eq!(
            RecipeError::Session(SessionError::NotAttached).kind(),
            "session"
        );
    }

    #[test]
    fn test_session_error_converts() {
        fn fails() -> Result<(), RecipeError> {
            Err(SessionError::NotAttached)?
        }
        let err = fails().unwrap_err();
        assert_eq!(err.kind(), "session");
        assert!(err.to_string().contains("not attached"));
    }
}

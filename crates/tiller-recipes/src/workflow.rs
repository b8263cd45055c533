//! Workflow orchestration.
//!
//! A workflow recipe's script file is its orchestration program: a TOML
//! step list, executed in order, each step going back through the
//! executor's full resolve / validate / dispatch path. Steps may only name
//! recipes the workflow declared as dependencies, checked up front before
//! any step runs; transitive cycles were already rejected at discovery.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::RecipeError;
use crate::executor::RecipeExecutor;
use crate::registry::ResolvedRecipe;
use crate::result::ExecutionResult;

/// What to do when a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    /// Stop the workflow. Completed step results are kept.
    #[default]
    Abort,
    /// Record the failure and run the remaining steps.
    Continue,
}

/// One step of a workflow program.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowStep {
    /// Name of the recipe to execute. Must be a declared dependency.
    pub recipe: String,
    /// Parameters passed to the step.
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
    /// When set, the workflow's own resolved parameters are merged in
    /// underneath the step's (step values win).
    #[serde(default)]
    pub inherit_params: bool,
    #[serde(default)]
    pub on_failure: OnFailure,
    /// Per-step timeout override, in seconds.
    pub timeout_secs: Option<u64>,
}

/// A parsed workflow program.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowProgram {
    #[serde(rename = "step", default)]
    pub steps: Vec<WorkflowStep>,
}

/// Parse a workflow program from its script file content.
pub fn parse_program(content: &str) -> Result<WorkflowProgram, String> {
    toml::from_str(content).map_err(|e| format!("invalid workflow program: {e}"))
}

/// Build a step's parameter object.
pub(crate) fn step_params(
    step: &WorkflowStep,
    workflow_params: &Value,
) -> Value {
    let mut merged = if step.inherit_params {
        workflow_params
            .as_object()
            .cloned()
            .unwrap_or_default()
    } else {
        serde_json::Map::new()
    };
    for (key, value) in &step.params {
        merged.insert(key.clone(), value.clone());
    }
    Value::Object(merged)
}

/// Run a workflow recipe.
///
/// Every step's result is recorded in order, failures included; the
/// aggregate result succeeds only if every step did. The workflow's output
/// is the output of the last executed step.
pub(crate) async fn run(
    executor: &RecipeExecutor,
    recipe: &ResolvedRecipe,
    params: Value,
    timeout: Duration,
) -> Result<ExecutionResult, RecipeError> {
    let name = &recipe.manifest.name;
    let content =
        std::fs::read_to_string(&recipe.script_path).map_err(|e| RecipeError::Discovery {
            detail: format!(
                "failed to read workflow program {}: {e}",
                recipe.script_path.display()
            ),
        })?;
    let program = parse_program(&content).map_err(|detail| RecipeError::Discovery {
        detail: format!("workflow '{name}': {detail}"),
    })?;

    // Every step must name a declared dependency, checked before any step
    // runs so a bad program never half-executes.
    for step in &program.steps {
        if !recipe.manifest.dependencies.contains(&step.recipe) {
            return Err(RecipeError::UndeclaredDependency {
                workflow: name.clone(),
                step: step.recipe.clone(),
            });
        }
    }

    let started = Instant::now();
    let mut steps: Vec<ExecutionResult> = Vec::with_capacity(program.steps.len());
    let mut all_succeeded = true;

    for (index, step) in program.steps.iter().enumerate() {
        let step_timeout = step.timeout_secs.map(Duration::from_secs).unwrap_or(timeout);
        let step_input = step_params(step, &params);
        info!(workflow = %name, step = index, recipe = %step.recipe, "running workflow step");

        let result = match executor
            .execute(&step.recipe, step_input, Some(step_timeout))
            .await
        {
            Ok(result) => result,
            // A step that never dispatched still gets a recorded failure;
            // completed step results are never discarded.
            Err(e) => ExecutionResult::failure(
                step.recipe.clone(),
                e.kind(),
                e.to_string(),
                Duration::ZERO,
            ),
        };

        let failed = !result.success;
        steps.push(result);

        if failed {
            all_succeeded = false;
            match step.on_failure {
                OnFailure::Abort => {
                    warn!(workflow = %name, step = index, recipe = %step.recipe, "step failed, aborting workflow");
                    break;
                }
                OnFailure::Continue => {
                    warn!(workflow = %name, step = index, recipe = %step.recipe, "step failed, continuing");
                }
            }
        }
    }

    let output = steps
        .last()
        .filter(|s| s.success)
        .map(|s| s.output.clone())
        .unwrap_or(Value::Null);

    let mut result = if all_succeeded {
        ExecutionResult::success(name.clone(), output, started.elapsed())
    } else {
        ExecutionResult::failure(
            name.clone(),
            "runtime_execution",
            "one or more workflow steps failed",
            started.elapsed(),
        )
    };
    result.steps = steps;
    Ok(result)
}

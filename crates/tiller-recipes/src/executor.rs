//! The recipe executor: resolve, validate, dispatch.
//!
//! `execute` draws a hard line between failing *before* dispatch and
//! failing *after* it. Unknown recipe, bad parameters, a cycle, a missing
//! session: those return `Err` and nothing has run. Once a runtime is
//! dispatched, failures come back as `Ok(ExecutionResult { success: false,
//! .. })` so the caller always gets the record of what happened.
//!
//! The executor never retries on its own. Recipes can have side effects
//! that must not be blindly repeated; a caller that wants retries wraps
//! `execute` with the exported `RetryPolicy`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{info, warn};

use tiller_session::{Session, SessionState};

use crate::error::RecipeError;
use crate::manifest::{validate_params, RecipeKind, RuntimeKind};
use crate::registry::{RecipeRegistry, ResolvedRecipe};
use crate::result::ExecutionResult;
use crate::runtime::{ChromeScriptRuntime, ProcessRuntime, RuntimeAdapter, ShellRuntime};
use crate::workflow;

/// Default per-execution timeout when the caller passes none.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Executor settings.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Timeout applied when a call and the step both specify none.
    pub default_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Executes recipes against a registry snapshot.
pub struct RecipeExecutor {
    registry: Arc<RecipeRegistry>,
    session: Option<Arc<Session>>,
    env: HashMap<String, String>,
    config: ExecutorConfig,
}

impl RecipeExecutor {
    pub fn new(registry: Arc<RecipeRegistry>) -> Self {
        Self {
            registry,
            session: None,
            env: HashMap::new(),
            config: ExecutorConfig::default(),
        }
    }

    /// Attach a browser session for chrome-script recipes. Held as an
    /// explicit handle; the executor owns no global state.
    pub fn with_session(mut self, session: Arc<Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// Environment/secret pairs injected into process and shell children.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// The registry this executor resolves against.
    pub fn registry(&self) -> &Arc<RecipeRegistry> {
        &self.registry
    }

    /// Execute a recipe by name.
    ///
    /// Returns boxed so workflow steps can recurse through the same path.
    pub fn execute<'a>(
        &'a self,
        name: &'a str,
        params: Value,
        timeout: Option<Duration>,
    ) -> BoxFuture<'a, Result<ExecutionResult, RecipeError>> {
        Box::pin(async move {
            let recipe = self.registry.resolve(name)?;
            let resolved_params = validate_params(&recipe.manifest, &params)?;
            let effective_timeout = timeout.unwrap_or(self.config.default_timeout);

            info!(
                recipe = name,
                runtime = %recipe.manifest.runtime,
                namespace = %recipe.namespace,
                "executing recipe"
            );

            if recipe.manifest.kind == RecipeKind::Workflow {
                return workflow::run(self, &recipe, resolved_params, effective_timeout).await;
            }

            let adapter = self.adapter_for(&recipe)?;
            let started = Instant::now();
            match adapter
                .run(&recipe, &resolved_params, &self.env, effective_timeout)
                .await
            {
                Ok(output) => Ok(ExecutionResult::success(name, output, started.elapsed())),
                Err(e) => {
                    warn!(recipe = name, error = %e, "recipe execution failed");
                    Ok(ExecutionResult::failure(
                        name,
                        e.kind(),
                        e.to_string(),
                        started.elapsed(),
                    ))
                }
            }
        })
    }

    /// Pick the adapter for a recipe's declared runtime.
    ///
    /// For chrome-script this is where the session requirement is checked,
    /// before dispatch, so a missing or unattached session is an `Err` and
    /// never a half-run.
    fn adapter_for(&self, recipe: &ResolvedRecipe) -> Result<Box<dyn RuntimeAdapter>, RecipeError> {
        match recipe.manifest.runtime {
            RuntimeKind::ChromeScript => {
                let session = self
                    .session
                    .as_ref()
                    .filter(|s| matches!(s.state(), SessionState::Attached(_)))
                    .ok_or_else(|| RecipeError::SessionUnavailable {
                        recipe: recipe.manifest.name.clone(),
                    })?;
                Ok(Box::new(ChromeScriptRuntime::new(Arc::clone(session))))
            }
            RuntimeKind::Process => Ok(Box::new(ProcessRuntime::new())),
            RuntimeKind::Shell => Ok(Box::new(ShellRuntime::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::NamespaceRoots;
    use std::path::Path;
    use tempfile::TempDir;
    use tiller_session::ConnectionConfig;

    fn write_shell_recipe(dir: &Path, name: &str, script: &str) {
        write_recipe_files(dir, name, "shell", "sh", script, "");
    }

    fn write_recipe_files(
        dir: &Path,
        name: &str,
        runtime: &str,
        ext: &str,
        script: &str,
        extra_metadata: &str,
    ) {
        std::fs::create_dir_all(dir).unwrap();
        let metadata = format!(
            "name = \"{name}\"\nruntime = \"{runtime}\"\nversion = \"1.0.0\"\n{extra_metadata}"
        );
        std::fs::write(dir.join(format!("{name}.toml")), metadata).unwrap();
        std::fs::write(dir.join(format!("{name}.{ext}")), script).unwrap();
    }

    fn executor_for(project: &TempDir) -> RecipeExecutor {
        let registry = Arc::new(RecipeRegistry::new());
        registry.discover(&NamespaceRoots {
            project: Some(project.path().to_path_buf()),
            user: None,
            system: None,
        });
        RecipeExecutor::new(registry)
    }

    #[tokio::test]
    async fn test_unknown_recipe_is_err_not_result() {
        let project = TempDir::new().unwrap();
        let executor = executor_for(&project);
        let err = executor
            .execute("missing", serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "recipe_not_found");
    }

    #[tokio::test]
    async fn test_validation_fails_before_any_side_effect() {
        let project = TempDir::new().unwrap();
        let marker = project.path().join("ran.marker");
        write_recipe_files(
            project.path(),
            "guarded",
            "shell",
            "sh",
            &format!("#!/bin/sh\ntouch {}\n", marker.display()),
            "[inputs.must]\ntype = \"string\"\nrequired = true\n",
        );

        let executor = executor_for(&project);
        let err = executor
            .execute("guarded", serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "parameter_validation");
        assert!(!marker.exists(), "script must not have run");
    }

    #[tokio::test]
    async fn test_successful_shell_recipe() {
        let project = TempDir::new().unwrap();
        write_shell_recipe(
            project.path(),
            "greet",
            "#!/bin/sh\nprintf '{\"greeting\": \"hello %s\"}' \"$TILLER_PARAM_WHO\"\n",
        );

        let executor = executor_for(&project);
        let result = executor
            .execute("greet", serde_json::json!({ "who": "world" }), None)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output["greeting"], "hello world");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_runtime_failure_is_ok_with_failed_result() {
        let project = TempDir::new().unwrap();
        write_shell_recipe(project.path(), "broken", "#!/bin/sh\nexit 7\n");

        let executor = executor_for(&project);
        let result = executor
            .execute("broken", serde_json::json!({}), None)
            .await
            .unwrap();
        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.kind, "runtime_execution");
        assert!(error.message.contains("code 7"));
    }

    #[tokio::test]
    async fn test_chrome_script_without_session_is_unavailable() {
        let project = TempDir::new().unwrap();
        write_recipe_files(
            project.path(),
            "page-script",
            "chrome-script",
            "js",
            "return 1;",
            "",
        );

        let executor = executor_for(&project);
        let err = executor
            .execute("page-script", serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "session_unavailable");
    }

    #[tokio::test]
    async fn test_chrome_script_with_unattached_session_is_unavailable() {
        let project = TempDir::new().unwrap();
        write_recipe_files(
            project.path(),
            "page-script",
            "chrome-script",
            "js",
            "return 1;",
            "",
        );

        let session = Arc::new(Session::new(ConnectionConfig::default()).unwrap());
        let executor = executor_for(&project).with_session(session);
        let err = executor
            .execute("page-script", serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "session_unavailable");
    }

    #[tokio::test]
    async fn test_process_recipe_gets_params_env() {
        let project = TempDir::new().unwrap();
        write_recipe_files(
            project.path(),
            "env-reader",
            "process",
            "sh",
            "#!/bin/bash\nprintf '%s' \"$TILLER_PARAMS\"\n",
            "",
        );

        let executor = executor_for(&project);
        let result = executor
            .execute("env-reader", serde_json::json!({ "n": 5 }), None)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, serde_json::json!({ "n": 5 }));
    }
}

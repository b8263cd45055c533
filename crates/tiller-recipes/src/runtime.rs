//! Runtime adapters: the closed set of ways a recipe script can run.
//!
//! Three runtimes exist: `chrome-script` (JavaScript evaluated in the
//! attached page), `process` (subprocess through an interpreter chosen by
//! file extension), and `shell` (run through the shell with parameters
//! exported as environment variables). Adding a runtime means one manifest
//! variant plus one adapter here; nothing else changes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use tiller_session::{Session, SessionState};

use crate::error::RecipeError;
use crate::registry::ResolvedRecipe;

/// Maximum stdout size read from a recipe process (10 MB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Environment variable carrying the full parameter object as JSON.
const PARAMS_ENV: &str = "TILLER_PARAMS";
/// Prefix for per-parameter shell environment variables.
const PARAM_ENV_PREFIX: &str = "TILLER_PARAM_";

/// One way of running a recipe script.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Run the recipe's script with validated parameters.
    ///
    /// `env` carries environment/secret pairs from the executor's provider.
    /// An `Err` here means the run started (or was started) and failed; the
    /// executor records it in the result rather than propagating it.
    async fn run(
        &self,
        recipe: &ResolvedRecipe,
        params: &Value,
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Value, RecipeError>;
}

// ---------------------------------------------------------------------------
// chrome-script
// ---------------------------------------------------------------------------

/// Evaluates the recipe script as JavaScript in the attached page.
pub struct ChromeScriptRuntime {
    session: Arc<Session>,
}

impl ChromeScriptRuntime {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Whether the session can currently evaluate scripts.
    pub fn attached(&self) -> bool {
        matches!(self.session.state(), SessionState::Attached(_))
    }
}

/// Wrap a recipe script in an async IIFE receiving the validated params.
/// The script's return value (promises awaited) becomes the output.
pub(crate) fn wrap_script(script: &str, params: &Value) -> String {
    format!("(async (params) => {{\n{script}\n}})({params})")
}

#[async_trait]
impl RuntimeAdapter for ChromeScriptRuntime {
    async fn run(
        &self,
        recipe: &ResolvedRecipe,
        params: &Value,
        _env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Value, RecipeError> {
        let script = read_script(recipe)?;
        let expression = wrap_script(&script, params);
        debug!(recipe = %recipe.manifest.name, "evaluating recipe script in page");

        let value = self
            .session
            .evaluate_with_timeout(&expression, Some(timeout))
            .await?;
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// process
// ---------------------------------------------------------------------------

/// Runs the recipe script as a subprocess through its interpreter.
///
/// The validated parameter object is passed both as JSON on stdin and in
/// the `TILLER_PARAMS` environment variable. Stdout is parsed as JSON,
/// falling back to the raw trimmed text.
pub struct ProcessRuntime {
    max_output_bytes: usize,
}

impl ProcessRuntime {
    pub fn new() -> Self {
        Self {
            max_output_bytes: MAX_OUTPUT_BYTES,
        }
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeAdapter for ProcessRuntime {
    async fn run(
        &self,
        recipe: &ResolvedRecipe,
        params: &Value,
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Value, RecipeError> {
        let (program, args) = resolve_interpreter(&recipe.script_path).map_err(|detail| {
            RecipeError::RuntimeExecution {
                recipe: recipe.manifest.name.clone(),
                detail,
            }
        })?;

        let params_json = params.to_string();
        let mut command = Command::new(&program);
        command
            .args(&args)
            .env(PARAMS_ENV, &params_json)
            .envs(env);
        if let Some(dir) = recipe.script_path.parent() {
            command.current_dir(dir);
        }

        debug!(
            recipe = %recipe.manifest.name,
            program = %program,
            "spawning recipe subprocess"
        );
        run_child(
            command,
            Some(&params_json),
            timeout,
            self.max_output_bytes,
            &recipe.manifest.name,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// shell
// ---------------------------------------------------------------------------

/// Runs the recipe script through the shell, with each parameter exported
/// as a `TILLER_PARAM_<NAME>` environment variable.
pub struct ShellRuntime {
    max_output_bytes: usize,
}

impl ShellRuntime {
    pub fn new() -> Self {
        Self {
            max_output_bytes: MAX_OUTPUT_BYTES,
        }
    }
}

impl Default for ShellRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeAdapter for ShellRuntime {
    async fn run(
        &self,
        recipe: &ResolvedRecipe,
        params: &Value,
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Value, RecipeError> {
        let script = recipe
            .script_path
            .to_str()
            .ok_or_else(|| RecipeError::RuntimeExecution {
                recipe: recipe.manifest.name.clone(),
                detail: "script path is not valid UTF-8".to_string(),
            })?;

        let mut command = Command::new("sh");
        command.arg(script).envs(env);
        for (key, value) in shell_param_env(params) {
            command.env(key, value);
        }
        if let Some(dir) = recipe.script_path.parent() {
            command.current_dir(dir);
        }

        debug!(recipe = %recipe.manifest.name, "running recipe through shell");
        run_child(
            command,
            None,
            timeout,
            self.max_output_bytes,
            &recipe.manifest.name,
        )
        .await
    }
}

/// Per-parameter environment pairs: `TILLER_PARAM_<NAME>` with the name
/// uppercased and non-alphanumeric characters folded to underscores.
/// String values are exported raw; everything else as JSON.
pub(crate) fn shell_param_env(params: &Value) -> Vec<(String, String)> {
    let Some(map) = params.as_object() else {
        return Vec::new();
    };
    map.iter()
        .map(|(name, value)| {
            let key: String = name
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_uppercase()
                    } else {
                        '_'
                    }
                })
                .collect();
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (format!("{PARAM_ENV_PREFIX}{key}"), rendered)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Shared subprocess plumbing
// ---------------------------------------------------------------------------

/// Determine the interpreter and arguments for a script path by extension.
pub(crate) fn resolve_interpreter(script_path: &Path) -> Result<(String, Vec<String>), String> {
    let ext = script_path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let path_str = script_path
        .to_str()
        .ok_or_else(|| "script path is not valid UTF-8".to_string())?
        .to_string();

    match ext {
        "sh" | "bash" => Ok(("bash".into(), vec![path_str])),
        "py" => Ok(("python3".into(), vec![path_str])),
        "js" | "mjs" | "cjs" => Ok(("node".into(), vec![path_str])),
        "rb" => Ok(("ruby".into(), vec![path_str])),
        "pl" => Ok(("perl".into(), vec![path_str])),
        // No or unknown extension: run the file directly.
        _ => Ok((path_str, vec![])),
    }
}

fn read_script(recipe: &ResolvedRecipe) -> Result<String, RecipeError> {
    std::fs::read_to_string(&recipe.script_path).map_err(|e| RecipeError::RuntimeExecution {
        recipe: recipe.manifest.name.clone(),
        detail: format!(
            "failed to read script {}: {e}",
            recipe.script_path.display()
        ),
    })
}

async fn run_child(
    mut command: Command,
    stdin_payload: Option<&str>,
    timeout: Duration,
    max_output_bytes: usize,
    recipe: &str,
) -> Result<Value, RecipeError> {
    command
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| RecipeError::RuntimeExecution {
        recipe: recipe.to_string(),
        detail: format!("failed to spawn process: {e}"),
    })?;

    if let Some(payload) = stdin_payload {
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| RecipeError::RuntimeExecution {
                    recipe: recipe.to_string(),
                    detail: format!("failed to write parameters to stdin: {e}"),
                })?;
            // Dropping stdin signals EOF.
        }
    } else {
        drop(child.stdin.take());
    }

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| RecipeError::RuntimeExecution {
            recipe: recipe.to_string(),
            detail: format!("timed out after {:.0}s", timeout.as_secs_f64()),
        })?
        .map_err(|e| RecipeError::RuntimeExecution {
            recipe: recipe.to_string(),
            detail: format!("process failed: {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".into());
        return Err(RecipeError::RuntimeExecution {
            recipe: recipe.to_string(),
            detail: format!("exited with code {code}: {}", stderr.trim()),
        });
    }

    if output.stdout.len() > max_output_bytes {
        return Err(RecipeError::RuntimeExecution {
            recipe: recipe.to_string(),
            detail: format!(
                "output exceeds maximum size ({} bytes > {max_output_bytes} bytes)",
                output.stdout.len()
            ),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_output(&stdout))
}

/// Parse process stdout as JSON, falling back to the raw trimmed text.
pub(crate) fn parse_output(stdout: &str) -> Value {
    serde_json::from_str(stdout)
        .unwrap_or_else(|_| Value::String(stdout.trim().to_string()))
}

//! Recipe metadata parsing and validation.
//!
//! A recipe is a script file paired with a TOML metadata document of the
//! same base filename (`navigate.js` + `navigate.toml`). The metadata
//! declares the recipe's name, type, runtime, version, input schema, and
//! dependencies. Unknown keys are ignored so older engines can load newer
//! recipe trees.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RecipeError;

/// Maximum allowed length for a recipe name.
const MAX_NAME_LEN: usize = 64;

/// Whether a recipe is a single unit of work or an orchestration of others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeKind {
    #[default]
    Atomic,
    Workflow,
}

/// Which runtime executes the recipe's script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    /// JavaScript evaluated in the attached page.
    ChromeScript,
    /// Script run as a subprocess through its interpreter.
    Process,
    /// Script run through the shell.
    Shell,
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeKind::ChromeScript => write!(f, "chrome-script"),
            RuntimeKind::Process => write!(f, "process"),
            RuntimeKind::Shell => write!(f, "shell"),
        }
    }
}

/// Declared value type of a recipe input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

/// Schema for one named recipe input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    /// Expected value type. Defaults to `any`.
    #[serde(rename = "type", default)]
    pub kind: ValueType,
    /// Whether the caller must supply this input.
    #[serde(default)]
    pub required: bool,
    /// Value applied when the caller omits this input.
    #[serde(default)]
    pub default: Option<Value>,
}

/// A parsed recipe metadata document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeManifest {
    /// Unique recipe name (alphanumeric + hyphens, 1-64 chars).
    pub name: String,
    /// Atomic or workflow. Defaults to atomic.
    #[serde(rename = "type", default)]
    pub kind: RecipeKind,
    /// Runtime that executes the paired script.
    pub runtime: RuntimeKind,
    /// Semantic version string (X.Y.Z).
    pub version: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Input schema, keyed by parameter name.
    #[serde(default)]
    pub inputs: BTreeMap<String, InputSpec>,
    /// Documented outputs, keyed by field name.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// Names of other recipes a workflow may call.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Parse a recipe manifest from a TOML string.
pub fn parse_manifest(toml_str: &str) -> Result<RecipeManifest, RecipeError> {
    toml::from_str(toml_str).map_err(|e| RecipeError::Discovery {
        detail: format!("failed to parse recipe metadata: {e}"),
    })
}

/// Validate a parsed manifest.
///
/// Checks:
/// - Name is alphanumeric + hyphens, 1-64 chars, no shell metacharacters
/// - Version matches semver X.Y.Z pattern
/// - Atomic recipes declare no dependencies
/// - Workflow recipes declare at least one dependency
pub fn validate_manifest(manifest: &RecipeManifest) -> Result<(), RecipeError> {
    validate_name(&manifest.name)?;
    validate_semver(&manifest.name, &manifest.version)?;

    match manifest.kind {
        RecipeKind::Atomic if !manifest.dependencies.is_empty() => {
            Err(invalid(
                &manifest.name,
                "atomic recipes must not declare dependencies",
            ))
        }
        RecipeKind::Workflow if manifest.dependencies.is_empty() => {
            Err(invalid(
                &manifest.name,
                "workflow recipes must declare at least one dependency",
            ))
        }
        _ => Ok(()),
    }
}

fn invalid(name: &str, detail: &str) -> RecipeError {
    RecipeError::Discovery {
        detail: format!("recipe '{name}': {detail}"),
    }
}

fn validate_name(name: &str) -> Result<(), RecipeError> {
    if name.is_empty() {
        return Err(RecipeError::Discovery {
            detail: "recipe name must not be empty".to_string(),
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid(
            name,
            &format!("name exceeds maximum length of {MAX_NAME_LEN} characters"),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid(
            name,
            "name must contain only alphanumeric characters and hyphens",
        ));
    }
    Ok(())
}

fn validate_semver(name: &str, version: &str) -> Result<(), RecipeError> {
    let parts: Vec<&str> = version.split('.').collect();
    let ok = parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.parse::<u64>().is_ok());
    if !ok {
        return Err(invalid(
            name,
            &format!("version must be semver (X.Y.Z), got: {version}"),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parameter validation
// ---------------------------------------------------------------------------

/// Validate caller-supplied parameters against the manifest's input schema.
///
/// Returns the resolved parameter object: defaults applied for omitted
/// optional inputs, every supplied value type-checked. Fails before any
/// side effect with `ParameterValidation`. Parameters not named in the
/// schema pass through untouched.
pub fn validate_params(manifest: &RecipeManifest, params: &Value) -> Result<Value, RecipeError> {
    let mut resolved = match params {
        Value::Null => serde_json::Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(RecipeError::ParameterValidation {
                recipe: manifest.name.clone(),
                detail: format!("parameters must be an object, got {}", json_type_name(other)),
            })
        }
    };

    for (name, spec) in &manifest.inputs {
        match resolved.get(name) {
            Some(value) => {
                if !matches_type(value, spec.kind) {
                    return Err(RecipeError::ParameterValidation {
                        recipe: manifest.name.clone(),
                        detail: format!(
                            "input '{name}' expects {}, got {}",
                            type_name(spec.kind),
                            json_type_name(value)
                        ),
                    });
                }
            }
            None => {
                if let Some(default) = &spec.default {
                    resolved.insert(name.clone(), default.clone());
                } else if spec.required {
                    return Err(RecipeError::ParameterValidation {
                        recipe: manifest.name.clone(),
                        detail: format!("missing required input '{name}'"),
                    });
                }
            }
        }
    }

    Ok(Value::Object(resolved))
}

fn matches_type(value: &Value, kind: ValueType) -> bool {
    match kind {
        ValueType::String => value.is_string(),
        ValueType::Number => value.is_number(),
        ValueType::Boolean => value.is_boolean(),
        ValueType::Object => value.is_object(),
        ValueType::Array => value.is_array(),
        ValueType::Any => true,
    }
}

fn type_name(kind: ValueType) -> &'static str {
    match kind {
        ValueType::String => "string",
        ValueType::Number => "number",
        ValueType::Boolean => "boolean",
        ValueType::Object => "object",
        ValueType::Array => "array",
        ValueType::Any => "any",
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_toml() -> &'static str {
        r#"
name = "extract-links"
type = "atomic"
runtime = "chrome-script"
version = "1.0.0"
description = "Collect every anchor href on the page"

[inputs.selector]
type = "string"
required = false
default = "a"

[inputs.limit]
type = "number"
required = true

[outputs]
links = "array of href strings"
"#
    }

    fn workflow_toml() -> &'static str {
        r#"
name = "login-flow"
type = "workflow"
runtime = "process"
version = "0.2.0"
dependencies = ["open-login", "submit-credentials"]
"#
    }

    #[test]
    fn test_parse_valid_manifest() {
        let manifest = parse_manifest(valid_toml()).unwrap();
        assert_eq!(manifest.name, "extract-links");
        assert_eq!(manifest.kind, RecipeKind::Atomic);
        assert_eq!(manifest.runtime, RuntimeKind::ChromeScript);
        assert_eq!(manifest.version, "1.0.0");
        assert_eq!(manifest.inputs.len(), 2);
        assert_eq!(manifest.inputs["selector"].kind, ValueType::String);
        assert_eq!(
            manifest.inputs["selector"].default,
            Some(Value::String("a".into()))
        );
        assert!(manifest.inputs["limit"].required);
        validate_manifest(&manifest).unwrap();
    }

    #[test]
    fn test_parse_workflow_manifest() {
        let manifest = parse_manifest(workflow_toml()).unwrap();
        assert_eq!(manifest.kind, RecipeKind::Workflow);
        assert_eq!(manifest.runtime, RuntimeKind::Process);
        assert_eq!(
            manifest.dependencies,
            vec!["open-login", "submit-credentials"]
        );
        validate_manifest(&manifest).unwrap();
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let toml_str = format!("{}\nfuture_field = \"whatever\"\n", workflow_toml());
        let manifest = parse_manifest(&toml_str).unwrap();
        assert_eq!(manifest.name, "login-flow");
    }

    #[test]
    fn test_defaults_for_omitted_sections() {
        let manifest = parse_manifest(
            r#"
name = "minimal"
runtime = "shell"
version = "0.1.0"
"#,
        )
        .unwrap();
        assert_eq!(manifest.kind, RecipeKind::Atomic);
        assert!(manifest.inputs.is_empty());
        assert!(manifest.dependencies.is_empty());
        validate_manifest(&manifest).unwrap();
    }

    #[test]
    fn test_rejects_bad_names() {
        let base = parse_manifest(valid_toml()).unwrap();
        for name in ["", "bad name", "bad/name", "bad;name", "../etc"] {
            let mut m = base.clone();
            m.name = name.to_string();
            assert!(
                validate_manifest(&m).is_err(),
                "name {name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_bad_version() {
        let mut manifest = parse_manifest(valid_toml()).unwrap();
        manifest.version = "1.0".to_string();
        let err = validate_manifest(&manifest).unwrap_err();
        assert!(err.to_string().contains("semver"));
    }

    #[test]
    fn test_atomic_must_not_declare_dependencies() {
        let mut manifest = parse_manifest(valid_toml()).unwrap();
        manifest.dependencies = vec!["other".into()];
        let err = validate_manifest(&manifest).unwrap_err();
        assert!(err.to_string().contains("must not declare dependencies"));
    }

    #[test]
    fn test_workflow_must_declare_dependencies() {
        let mut manifest = parse_manifest(workflow_toml()).unwrap();
        manifest.dependencies.clear();
        let err = validate_manifest(&manifest).unwrap_err();
        assert!(err.to_string().contains("at least one dependency"));
    }

    // -- Parameter validation -------------------------------------------------

    #[test]
    fn test_params_defaults_applied() {
        let manifest = parse_manifest(valid_toml()).unwrap();
        let resolved =
            validate_params(&manifest, &serde_json::json!({ "limit": 10 })).unwrap();
        assert_eq!(resolved["selector"], "a");
        assert_eq!(resolved["limit"], 10);
    }

    #[test]
    fn test_params_missing_required() {
        let manifest = parse_manifest(valid_toml()).unwrap();
        let err = validate_params(&manifest, &serde_json::json!({})).unwrap_err();
        assert_eq!(err.kind(), "parameter_validation");
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn test_params_type_mismatch() {
        let manifest = parse_manifest(valid_toml()).unwrap();
        let err = validate_params(
            &manifest,
            &serde_json::json!({ "limit": "ten" }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "parameter_validation");
        assert!(err.to_string().contains("expects number"));
    }

    #[test]
    fn test_params_null_treated_as_empty() {
        let manifest = parse_manifest(workflow_toml()).unwrap();
        let resolved = validate_params(&manifest, &Value::Null).unwrap();
        assert_eq!(resolved, serde_json::json!({}));
    }

    #[test]
    fn test_params_must_be_object() {
        let manifest = parse_manifest(workflow_toml()).unwrap();
        let err = validate_params(&manifest, &serde_json::json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn test_params_extra_fields_pass_through() {
        let manifest = parse_manifest(valid_toml()).unwrap();
        let resolved = validate_params(
            &manifest,
            &serde_json::json!({ "limit": 1, "extra": true }),
        )
        .unwrap();
        assert_eq!(resolved["extra"], true);
    }
}

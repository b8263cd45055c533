//! Recipe discovery, registry, and execution for tiller.
//!
//! Recipes are reusable units of browser-automation work: a script file
//! paired with a TOML metadata document declaring its name, runtime, input
//! schema, and (for workflows) dependencies. They are discovered from
//! layered namespaces (Project > User > System), registered in immutable
//! snapshots, and executed through one of three runtime adapters.
//!
//! - [`RecipeManifest`] -- parsed from the `.toml` document paired with a script
//! - [`Namespace`] / [`NamespaceRoots`] / [`scan_namespace`] -- filesystem discovery
//! - [`RecipeRegistry`] -- atomic snapshots with shadowing and cycle detection
//! - [`RecipeExecutor`] -- resolve / validate / dispatch, workflows included
//! - [`RuntimeAdapter`] -- chrome-script, process, and shell runtimes
//! - [`ExecutionResult`] -- the serializable record of a dispatched run

pub mod discovery;
pub mod error;
pub mod executor;
pub mod manifest;
pub mod registry;
pub mod result;
pub mod runtime;
pub mod workflow;

pub use discovery::{
    scan_namespace, DiscoveredRecipe, DiscoveryDiagnostic, Namespace, NamespaceRoots,
};
pub use error::RecipeError;
pub use executor::{ExecutorConfig, RecipeExecutor};
pub use manifest::{
    parse_manifest, validate_manifest, validate_params, InputSpec, RecipeKind, RecipeManifest,
    RuntimeKind, ValueType,
};
pub use registry::{DiscoverySummary, RecipeRegistry, RegistrySnapshot, ResolvedRecipe};
pub use result::{ExecutionError, ExecutionResult};
pub use runtime::{ChromeScriptRuntime, ProcessRuntime, RuntimeAdapter, ShellRuntime};
pub use workflow::{parse_program, OnFailure, WorkflowProgram, WorkflowStep};

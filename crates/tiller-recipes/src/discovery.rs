//! Recipe discovery from namespace directory trees.
//!
//! Recipes live in up to three namespaces. Each namespace root is walked
//! recursively; every `.toml` metadata document is paired with its sibling
//! script by base filename. A document that fails to parse or validate, or
//! that has no sibling script, is skipped with a recorded diagnostic so one
//! broken recipe never blocks the rest of the tree.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::manifest::{parse_manifest, validate_manifest, RecipeManifest};

/// The metadata document extension.
const METADATA_EXT: &str = "toml";

/// Recipe namespaces, lowest priority first.
///
/// When the same recipe name appears in several namespaces, the highest
/// priority wins: Project > User > System.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Recipes bundled with the installation.
    System,
    /// Per-user recipes under the home directory.
    User,
    /// Recipes local to the current project tree.
    Project,
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::System => write!(f, "system"),
            Namespace::User => write!(f, "user"),
            Namespace::Project => write!(f, "project"),
        }
    }
}

/// Root directories for each namespace. A `None` root means the namespace
/// does not participate in discovery.
#[derive(Debug, Clone, Default)]
pub struct NamespaceRoots {
    pub project: Option<PathBuf>,
    pub user: Option<PathBuf>,
    pub system: Option<PathBuf>,
}

impl NamespaceRoots {
    /// The standard layout: `<project>/.tiller/recipes`, `~/.tiller/recipes`,
    /// and a bundled `recipes/` directory near the running binary.
    pub fn standard(project_dir: &Path) -> Self {
        Self {
            project: Some(project_dir.join(".tiller").join("recipes")),
            user: dirs::home_dir().map(|home| home.join(".tiller").join("recipes")),
            system: bundled_recipes_dir(),
        }
    }

    /// Roots in descending priority order: Project, User, System.
    pub fn by_priority(&self) -> Vec<(Namespace, &Path)> {
        let mut roots = Vec::new();
        if let Some(path) = &self.project {
            roots.push((Namespace::Project, path.as_path()));
        }
        if let Some(path) = &self.user {
            roots.push((Namespace::User, path.as_path()));
        }
        if let Some(path) = &self.system {
            roots.push((Namespace::System, path.as_path()));
        }
        roots
    }
}

/// Search order for the bundled system recipes directory:
/// 1. `<binary_dir>/../recipes/` (standard install layout)
/// 2. `<binary_dir>/recipes/` (dev/local builds)
fn bundled_recipes_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let exe_dir = exe.parent()?;
    let candidates = [exe_dir.join("../recipes"), exe_dir.join("recipes")];
    candidates.into_iter().find(|p| p.is_dir())
}

/// One recipe found during a namespace scan.
#[derive(Debug, Clone)]
pub struct DiscoveredRecipe {
    pub manifest: RecipeManifest,
    pub namespace: Namespace,
    /// The paired script file, executed by the recipe's runtime.
    pub script_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// A recipe document that was skipped, and why.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryDiagnostic {
    pub path: PathBuf,
    pub namespace: Namespace,
    pub reason: String,
}

/// Scan one namespace root.
///
/// A missing root yields no recipes and no diagnostics; the namespace
/// simply does not participate. Every other problem is per-document and
/// recorded, never fatal.
pub fn scan_namespace(
    root: &Path,
    namespace: Namespace,
) -> (Vec<DiscoveredRecipe>, Vec<DiscoveryDiagnostic>) {
    let mut recipes = Vec::new();
    let mut diagnostics = Vec::new();

    if !root.is_dir() {
        return (recipes, diagnostics);
    }

    let mut metadata_files = Vec::new();
    collect_metadata_files(root, &mut metadata_files);
    // Deterministic scan order regardless of filesystem iteration order.
    metadata_files.sort();

    for manifest_path in metadata_files {
        match load_recipe(&manifest_path, namespace) {
            Ok(recipe) => recipes.push(recipe),
            Err(reason) => {
                tracing::warn!(
                    path = %manifest_path.display(),
                    %namespace,
                    %reason,
                    "skipping recipe document"
                );
                diagnostics.push(DiscoveryDiagnostic {
                    path: manifest_path,
                    namespace,
                    reason,
                });
            }
        }
    }

    (recipes, diagnostics)
}

fn collect_metadata_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_symlink() {
            continue;
        }
        if path.is_dir() {
            collect_metadata_files(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some(METADATA_EXT) {
            out.push(path);
        }
    }
}

fn load_recipe(manifest_path: &Path, namespace: Namespace) -> Result<DiscoveredRecipe, String> {
    let content = std::fs::read_to_string(manifest_path)
        .map_err(|e| format!("failed to read metadata: {e}"))?;
    let manifest = parse_manifest(&content).map_err(|e| e.to_string())?;
    validate_manifest(&manifest).map_err(|e| e.to_string())?;

    let script_path = sibling_script(manifest_path)
        .ok_or_else(|| "no sibling script file for metadata document".to_string())?;

    Ok(DiscoveredRecipe {
        manifest,
        namespace,
        script_path,
        manifest_path: manifest_path.to_path_buf(),
    })
}

/// Find the script paired with a metadata document: same directory, same
/// base filename, any extension other than `.toml`.
fn sibling_script(manifest_path: &Path) -> Option<PathBuf> {
    let dir = manifest_path.parent()?;
    let stem = manifest_path.file_stem()?;

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_stem() == Some(stem)
                && p.extension().and_then(|e| e.to_str()) != Some(METADATA_EXT)
        })
        .collect();

    // Deterministic choice when several scripts share the stem.
    candidates.sort();
    candidates.into_iter().next()
}

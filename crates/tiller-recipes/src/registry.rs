//! The recipe registry: immutable snapshots of the discovered recipe set.
//!
//! `discover` rebuilds the whole view of the namespace roots and swaps it
//! in atomically, so a concurrent `resolve` sees either the old snapshot or
//! the new one, never a half-applied update. Dependency cycles are detected
//! here, at discovery time, so execution never has to unwind a partially
//! run cyclic workflow.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::discovery::{
    scan_namespace, DiscoveryDiagnostic, Namespace, NamespaceRoots,
};
use crate::error::RecipeError;
use crate::manifest::RecipeManifest;

/// A recipe as registered in a snapshot: its manifest, where it came from,
/// and which lower-priority namespaces it shadows.
#[derive(Debug, Clone)]
pub struct ResolvedRecipe {
    pub manifest: RecipeManifest,
    pub namespace: Namespace,
    pub script_path: PathBuf,
    /// Namespaces holding a recipe of the same name that lost the
    /// collision, highest priority first.
    pub shadowed: Vec<Namespace>,
}

/// An immutable view of the recipe set at one discovery instant.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    recipes: HashMap<String, Arc<ResolvedRecipe>>,
    /// Names that participate in a dependency cycle.
    cyclic: HashSet<String>,
    pub diagnostics: Vec<DiscoveryDiagnostic>,
}

impl RegistrySnapshot {
    /// Number of registered recipes.
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

/// Counts from one discovery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverySummary {
    pub registered: usize,
    pub shadowed: usize,
    pub skipped: usize,
    pub cyclic: usize,
}

/// The shared recipe registry.
#[derive(Debug, Default)]
pub struct RecipeRegistry {
    snapshot: RwLock<Arc<RegistrySnapshot>>,
}

impl RecipeRegistry {
    /// Create an empty registry. `discover` populates it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every namespace root and atomically install the new snapshot.
    ///
    /// Re-discovering an unchanged tree produces an equivalent snapshot;
    /// the operation is idempotent.
    pub fn discover(&self, roots: &NamespaceRoots) -> DiscoverySummary {
        let mut recipes: HashMap<String, ResolvedRecipe> = HashMap::new();
        let mut diagnostics = Vec::new();
        let mut shadowed_count = 0;

        for (namespace, root) in roots.by_priority() {
            let (found, mut diags) = scan_namespace(root, namespace);
            diagnostics.append(&mut diags);

            for discovered in found {
                let name = discovered.manifest.name.clone();
                match recipes.get_mut(&name) {
                    Some(winner) => {
                        // Seen in a higher-priority namespace already.
                        tracing::debug!(
                            recipe = %name,
                            winner = %winner.namespace,
                            loser = %namespace,
                            "recipe shadowed by higher-priority namespace"
                        );
                        winner.shadowed.push(namespace);
                        shadowed_count += 1;
                    }
                    None => {
                        recipes.insert(
                            name,
                            ResolvedRecipe {
                                manifest: discovered.manifest,
                                namespace,
                                script_path: discovered.script_path,
                                shadowed: Vec::new(),
                            },
                        );
                    }
                }
            }
        }

        let cyclic = find_cyclic(&recipes);
        for name in &cyclic {
            tracing::warn!(recipe = %name, "recipe participates in a dependency cycle");
        }
        for recipe in recipes.values() {
            for dep in &recipe.manifest.dependencies {
                if !recipes.contains_key(dep) {
                    diagnostics.push(DiscoveryDiagnostic {
                        path: recipe.script_path.clone(),
                        namespace: recipe.namespace,
                        reason: format!(
                            "recipe '{}' declares unknown dependency '{dep}'",
                            recipe.manifest.name
                        ),
                    });
                }
            }
        }

        let summary = DiscoverySummary {
            registered: recipes.len(),
            shadowed: shadowed_count,
            skipped: diagnostics.len(),
            cyclic: cyclic.len(),
        };

        let snapshot = RegistrySnapshot {
            recipes: recipes
                .into_iter()
                .map(|(name, recipe)| (name, Arc::new(recipe)))
                .collect(),
            cyclic,
            diagnostics,
        };

        *self.snapshot.write().expect("snapshot lock") = Arc::new(snapshot);
        tracing::info!(
            registered = summary.registered,
            shadowed = summary.shadowed,
            skipped = summary.skipped,
            cyclic = summary.cyclic,
            "recipe discovery complete"
        );
        summary
    }

    /// Resolve a recipe by name against the current snapshot.
    pub fn resolve(&self, name: &str) -> Result<Arc<ResolvedRecipe>, RecipeError> {
        let snapshot = self.snapshot();
        let recipe = snapshot
            .recipes
            .get(name)
            .cloned()
            .ok_or_else(|| RecipeError::NotFound {
                name: name.to_string(),
            })?;

        if snapshot.cyclic.contains(name) {
            let mut chain: Vec<&str> = snapshot
                .cyclic
                .iter()
                .map(String::as_str)
                .collect();
            chain.sort_unstable();
            return Err(RecipeError::CircularDependency {
                name: name.to_string(),
                chain: chain.join(" -> "),
            });
        }
        Ok(recipe)
    }

    /// All registered recipes, sorted by name.
    pub fn list(&self) -> Vec<Arc<ResolvedRecipe>> {
        let snapshot = self.snapshot();
        let mut entries: Vec<Arc<ResolvedRecipe>> = snapshot.recipes.values().cloned().collect();
        entries.sort_by(|a, b| a.manifest.name.cmp(&b.manifest.name));
        entries
    }

    /// The current snapshot handle.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.snapshot.read().expect("snapshot lock"))
    }
}

/// Names participating in any dependency cycle, found by depth-first walk
/// over declared dependencies. Dependencies on unknown names are ignored
/// here; they surface as diagnostics and fail at execution instead.
fn find_cyclic(recipes: &HashMap<String, ResolvedRecipe>) -> HashSet<String> {
    let mut cyclic = HashSet::new();
    for start in recipes.keys() {
        if reaches(start, start, recipes, &mut HashSet::new()) {
            cyclic.insert(start.clone());
        }
    }
    cyclic
}

fn reaches(
    target: &str,
    current: &str,
    recipes: &HashMap<String, ResolvedRecipe>,
    visited: &mut HashSet<String>,
) -> bool {
    let Some(recipe) = recipes.get(current) else {
        return false;
    };
    for dep in &recipe.manifest.dependencies {
        if dep == target {
            return true;
        }
        if visited.insert(dep.clone()) && reaches(target, dep, recipes, visited) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_recipe(dir: &Path, name: &str) {
        write_recipe_with(dir, name, "atomic", &[]);
    }

    fn write_recipe_with(dir: &Path, name: &str, kind: &str, deps: &[&str]) {
        std::fs::create_dir_all(dir).unwrap();
        let deps_toml = deps
            .iter()
            .map(|d| format!("\"{d}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let metadata = format!(
            r#"
name = "{name}"
type = "{kind}"
runtime = "shell"
version = "1.0.0"
dependencies = [{deps_toml}]
"#
        );
        std::fs::write(dir.join(format!("{name}.toml")), metadata).unwrap();
        let ext = if kind == "workflow" { "workflow" } else { "sh" };
        std::fs::write(dir.join(format!("{name}.{ext}")), "echo hi").unwrap();
    }

    fn roots(project: &TempDir, user: &TempDir, system: &TempDir) -> NamespaceRoots {
        NamespaceRoots {
            project: Some(project.path().to_path_buf()),
            user: Some(user.path().to_path_buf()),
            system: Some(system.path().to_path_buf()),
        }
    }

    #[test]
    fn test_project_namespace_wins_with_shadow_diagnostics() {
        let (project, user, system) = (
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
        );
        write_recipe(project.path(), "login");
        write_recipe(user.path(), "login");
        write_recipe(system.path(), "login");
        write_recipe(user.path(), "scrape");

        let registry = RecipeRegistry::new();
        let summary = registry.discover(&roots(&project, &user, &system));
        assert_eq!(summary.registered, 2);
        assert_eq!(summary.shadowed, 2);

        let login = registry.resolve("login").unwrap();
        assert_eq!(login.namespace, Namespace::Project);
        assert_eq!(login.shadowed, vec![Namespace::User, Namespace::System]);

        let scrape = registry.resolve("scrape").unwrap();
        assert_eq!(scrape.namespace, Namespace::User);
        assert!(scrape.shadowed.is_empty());
    }

    #[test]
    fn test_rediscovery_is_idempotent() {
        let (project, user, system) = (
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
        );
        write_recipe(project.path(), "alpha");
        write_recipe(project.path(), "beta");

        let registry = RecipeRegistry::new();
        let first = registry.discover(&roots(&project, &user, &system));
        let names_first: Vec<String> = registry
            .list()
            .iter()
            .map(|r| r.manifest.name.clone())
            .collect();

        let second = registry.discover(&roots(&project, &user, &system));
        let names_second: Vec<String> = registry
            .list()
            .iter()
            .map(|r| r.manifest.name.clone())
            .collect();

        assert_eq!(first, second);
        assert_eq!(names_first, names_second);
        assert_eq!(names_first, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_resolve_unknown_is_not_found() {
        let registry = RecipeRegistry::new();
        let err = registry.resolve("missing").unwrap_err();
        assert_eq!(err.kind(), "recipe_not_found");
    }

    #[test]
    fn test_cycles_detected_at_discovery() {
        let (project, user, system) = (
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
        );
        // a -> b -> a, plus an innocent bystander.
        write_recipe_with(project.path(), "flow-a", "workflow", &["flow-b"]);
        write_recipe_with(project.path(), "flow-b", "workflow", &["flow-a"]);
        write_recipe(project.path(), "standalone");

        let registry = RecipeRegistry::new();
        let summary = registry.discover(&roots(&project, &user, &system));
        assert_eq!(summary.cyclic, 2);

        let err = registry.resolve("flow-a").unwrap_err();
        assert_eq!(err.kind(), "circular_dependency");
        assert!(err.to_string().contains("flow-b"));

        registry.resolve("standalone").unwrap();
    }

    #[test]
    fn test_self_cycle_detected() {
        let (project, user, system) = (
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
        );
        write_recipe_with(project.path(), "ouroboros", "workflow", &["ouroboros"]);

        let registry = RecipeRegistry::new();
        registry.discover(&roots(&project, &user, &system));
        let err = registry.resolve("ouroboros").unwrap_err();
        assert_eq!(err.kind(), "circular_dependency");
    }

    #[test]
    fn test_unknown_dependency_is_a_diagnostic_not_fatal() {
        let (project, user, system) = (
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
        );
        write_recipe_with(project.path(), "flow", "workflow", &["ghost"]);

        let registry = RecipeRegistry::new();
        registry.discover(&roots(&project, &user, &system));

        // Resolvable; the missing step fails at execution instead.
        registry.resolve("flow").unwrap();
        let snapshot = registry.snapshot();
        assert!(snapshot
            .diagnostics
            .iter()
            .any(|d| d.reason.contains("ghost")));
    }

    #[test]
    fn test_snapshot_is_stable_across_rediscovery() {
        let (project, user, system) = (
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
        );
        write_recipe(project.path(), "pinned");

        let registry = RecipeRegistry::new();
        registry.discover(&roots(&project, &user, &system));
        let held = registry.snapshot();

        // A later discovery must not disturb a snapshot a caller holds.
        write_recipe(project.path(), "newcomer");
        registry.discover(&roots(&project, &user, &system));

        assert_eq!(held.len(), 1);
        assert_eq!(registry.snapshot().len(), 2);
    }
}

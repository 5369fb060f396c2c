//! Environment definition store
//!
//! Definitions are kept in load order; redefining a name replaces the
//! earlier definition in place so reloading a configuration is idempotent.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{ActionStep, AddTarget, EnvironmentDefinition};

/// Named environment definitions for one configuration load
#[derive(Debug, Clone, Default)]
pub struct DefinitionStore {
    definitions: Vec<EnvironmentDefinition>,
    index: HashMap<String, usize>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Last write wins.
    pub fn define(&mut self, definition: EnvironmentDefinition) {
        match self.index.get(&definition.name) {
            Some(&slot) => {
                debug!("Redefining environment '{}'", definition.name);
                self.definitions[slot] = definition;
            }
            None => {
                debug!("Defining environment '{}'", definition.name);
                self.index
                    .insert(definition.name.clone(), self.definitions.len());
                self.definitions.push(definition);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&EnvironmentDefinition> {
        self.index.get(name).map(|&slot| &self.definitions[slot])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Names in load order
    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Active definitions whose root contains `file`, in load order
    pub fn names_for_file(&self, file: &Path) -> Vec<String> {
        self.definitions
            .iter()
            .filter(|d| d.active)
            .filter(|d| d.root.as_deref().is_some_and(|root| file.starts_with(root)))
            .map(|d| d.name.clone())
            .collect()
    }

    // ========================================================================
    // Definition files
    // ========================================================================

    /// Load a YAML definition file and register it, returning its name.
    ///
    /// The definition's root is the file's directory unless `custom_paths`
    /// maps the environment name somewhere else.
    pub fn load_file(
        &mut self,
        path: &Path,
        custom_paths: &BTreeMap<String, PathBuf>,
    ) -> Result<String> {
        let content = std::fs::read_to_string(path)?;
        let file: DefinitionFile = serde_yaml::from_str(&content)?;
        let root = custom_paths
            .get(&file.name)
            .cloned()
            .or_else(|| path.parent().map(Path::to_path_buf));
        let definition = file.into_definition(path, root)?;
        let name = definition.name.clone();

        info!(
            "Loaded environment '{}' ({} steps) from {}",
            name,
            definition.actions.len(),
            path.display()
        );
        self.define(definition);
        Ok(name)
    }

    /// Load several definition files in order
    pub fn load_all(
        &mut self,
        paths: &[PathBuf],
        custom_paths: &BTreeMap<String, PathBuf>,
    ) -> Result<Vec<String>> {
        paths
            .iter()
            .map(|path| self.load_file(path, custom_paths))
            .collect()
    }

    /// Load every `*.env.yaml` / `*.env.yml` file below `dir`, sorted by path
    pub fn load_dir(
        &mut self,
        dir: &Path,
        custom_paths: &BTreeMap<String, PathBuf>,
    ) -> Result<Vec<String>> {
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let name = e.file_name().to_string_lossy();
                name.ends_with(".env.yaml") || name.ends_with(".env.yml")
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();
        self.load_all(&paths, custom_paths)
    }
}

// ============================================================================
// YAML format
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionFile {
    name: String,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default)]
    focus: bool,
    #[serde(default)]
    clean: bool,
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    steps: Vec<StepSpec>,
}

fn default_active() -> bool {
    true
}

/// One step, written as a single-key map such as `add: sampleLib.js`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StepSpec {
    Use(Vec<String>),
    Add(String),
    Lib(String),
    /// Inline add assigning globals
    Globals(BTreeMap<String, serde_json::Value>),
    Custom(CustomSpec),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CustomSpec {
    kind: String,
    #[serde(default)]
    args: Vec<String>,
}

impl DefinitionFile {
    fn into_definition(self, path: &Path, root: Option<PathBuf>) -> Result<EnvironmentDefinition> {
        let actions = self
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| step.into_action(path, i + 1))
            .collect::<Result<Vec<_>>>()?;

        Ok(EnvironmentDefinition {
            name: self.name,
            active: self.active,
            focus: self.focus,
            clean: self.clean,
            root,
            actions,
        })
    }
}

impl StepSpec {
    fn into_action(self, path: &Path, position: usize) -> Result<ActionStep> {
        let step = match self {
            StepSpec::Use(frameworks) => ActionStep::Use(frameworks),
            StepSpec::Add(script) => ActionStep::Add(AddTarget::from(script)),
            StepSpec::Lib(name) => ActionStep::lib(name),
            StepSpec::Globals(globals) => ActionStep::Add(AddTarget::inline(move |window| {
                for (key, value) in &globals {
                    window.set_global(key.clone(), value.clone());
                }
                Ok(())
            })),
            StepSpec::Custom(custom) if custom.kind.trim().is_empty() => {
                return Err(Error::InvalidConfig(format!(
                    "{} step #{}: custom step needs a kind",
                    path.display(),
                    position
                )));
            }
            StepSpec::Custom(custom) => ActionStep::Custom {
                kind: custom.kind,
                args: custom.args,
            },
        };
        Ok(step)
    }
}

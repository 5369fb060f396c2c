//! Environment resolution
//!
//! Merges the base definitions selected for a spec file with the file's
//! banner directives into one ordered pipeline:
//!
//! 1. base definitions, in the given order
//! 2. environments named by banner `use`
//! 3. banner `add` scripts
//! 4. banner `lib` entries, as `lib` custom steps

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::directive::Directives;
use crate::error::{Error, Result};
use crate::store::DefinitionStore;
use crate::types::{ActionStep, AddTarget, EnvironmentDefinition};

/// Origin recorded for steps contributed by the banner comment
pub const BANNER_ORIGIN: &str = "banner";

/// A step together with where it came from
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub step: ActionStep,
    /// Environment name, or `banner`
    pub origin: String,
    /// Directory relative script references resolve against
    pub root: Option<PathBuf>,
}

/// The pipeline for one spec file
#[derive(Debug, Clone)]
pub struct ResolvedEnvironment {
    pub file: PathBuf,
    /// Environments that contributed steps, in order
    pub environments: Vec<String>,
    pub steps: Vec<ResolvedStep>,
    pub active: bool,
    pub focus: bool,
    pub clean: bool,
}

impl ResolvedEnvironment {
    pub fn empty(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            environments: Vec::new(),
            steps: Vec::new(),
            active: true,
            focus: false,
            clean: false,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step kinds in execution order
    pub fn kinds(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step.kind()).collect()
    }

    /// Insert steps ahead of everything resolved so far
    pub fn prepend(&mut self, steps: impl IntoIterator<Item = ResolvedStep>) {
        let mut combined: Vec<ResolvedStep> = steps.into_iter().collect();
        combined.append(&mut self.steps);
        self.steps = combined;
    }

    fn append_definition(&mut self, definition: &EnvironmentDefinition) {
        self.environments.push(definition.name.clone());
        self.focus |= definition.focus;
        self.clean |= definition.clean;
        self.steps
            .extend(definition.actions.iter().map(|step| ResolvedStep {
                step: step.clone(),
                origin: definition.name.clone(),
                root: definition.root.clone(),
            }));
    }

    fn append_banner(&mut self, step: ActionStep) {
        let root = self.file.parent().map(Path::to_path_buf);
        self.steps.push(ResolvedStep {
            step,
            origin: BANNER_ORIGIN.to_string(),
            root,
        });
    }
}

/// Resolves spec files against a definition store
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    store: &'a DefinitionStore,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a DefinitionStore) -> Self {
        Self { store }
    }

    pub fn resolve(
        &self,
        file: &Path,
        base_names: &[String],
        directives: &Directives,
    ) -> Result<ResolvedEnvironment> {
        let mut resolved = ResolvedEnvironment::empty(file);
        resolved.focus = directives.focus.unwrap_or(false);
        resolved.clean = directives.clean.unwrap_or(false);

        if directives.active == Some(false) {
            debug!("{} disabled by banner", file.display());
            resolved.active = false;
            return Ok(resolved);
        }

        let mut bases = Vec::with_capacity(base_names.len());
        for name in base_names {
            let definition = self.lookup(name, file)?;
            if definition.active {
                bases.push(definition);
            } else {
                debug!("Skipping inactive environment '{}' for {}", name, file.display());
            }
        }
        if bases.iter().any(|d| d.focus) {
            bases.retain(|d| d.focus);
        }
        for definition in bases {
            resolved.append_definition(definition);
        }

        for entry in &directives.uses {
            let name = entry.primary();
            if resolved.environments.iter().any(|e| e == name) {
                continue;
            }
            let definition = self.lookup(name, file)?;
            if !definition.active {
                debug!("Banner of {} uses inactive environment '{}'", file.display(), name);
                continue;
            }
            resolved.append_definition(definition);
        }

        for script in &directives.adds {
            resolved.append_banner(ActionStep::Add(AddTarget::Script(script.clone())));
        }
        for lib in &directives.libs {
            resolved.append_banner(ActionStep::lib(lib.primary()));
        }

        // An explicit banner flag beats whatever the environments declared
        if let Some(focus) = directives.focus {
            resolved.focus = focus;
        }
        if let Some(clean) = directives.clean {
            resolved.clean = clean;
        }

        debug!(
            "Resolved {} to {} steps from [{}]",
            file.display(),
            resolved.len(),
            resolved.environments.join(", ")
        );
        Ok(resolved)
    }

    fn lookup(&self, name: &str, file: &Path) -> Result<&'a EnvironmentDefinition> {
        self.store.get(name).ok_or_else(|| Error::UnknownEnvironment {
            name: name.to_string(),
            file: file.to_path_buf(),
        })
    }
}

//! Environment runner
//!
//! Drives one run over a batch of spec files: parse each banner, resolve
//! the pipeline, apply run-scoped focus, then execute the pipelines one
//! after another against a shared browser context. A file whose setup fails
//! is recorded and the run moves on.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use specenv_common::window::RestoreSummary;
use specenv_common::{
    parse_directives, ActionStep, BrowserContext, Config, DefinitionStore, Discovery, Done,
    EnvironmentHandle, Error, GlobalSnapshot, ResolvedEnvironment, ResolvedStep, Resolver,
    Result, TEMPLATE_METHOD,
};

use crate::fixtures::TemplateFixtures;
use crate::hooks::TestDoneHooks;
use crate::pipeline::PipelineExecutor;
use crate::registry::{MethodFn, MethodRegistry};

/// Origin recorded for fixture seeding steps
pub const TEMPLATES_ORIGIN: &str = "templates";

/// A spec file and its source text
#[derive(Debug, Clone)]
pub struct SpecFile {
    pub path: PathBuf,
    pub source: String,
}

impl SpecFile {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn read(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let source = std::fs::read_to_string(&path)?;
        Ok(Self { path, source })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Disabled by its banner
    Inactive,
    /// Another file in the run is focused
    Unfocused,
}

#[derive(Debug)]
pub enum FileStatus {
    Executed { steps: usize },
    Skipped(SkipReason),
    Failed(Error),
}

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    /// Environments that contributed steps
    pub environments: Vec<String>,
    pub status: FileStatus,
}

/// Result of a run over a batch of spec files
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<FileOutcome>,
    /// Whether focus narrowed the run
    pub focused: bool,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn executed(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Executed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Failed(_)))
    }

    pub fn outcome(&self, path: impl AsRef<Path>) -> Option<&FileOutcome> {
        self.outcomes.iter().find(|o| o.path == path.as_ref())
    }

    fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

pub struct EnvironmentRunner {
    config: Config,
    store: DefinitionStore,
    executor: PipelineExecutor,
    context: BrowserContext,
    fixtures: TemplateFixtures,
    templates: Vec<PathBuf>,
    /// Baseline left by the last `clean` pipeline
    pending_clean: Option<GlobalSnapshot>,
}

impl EnvironmentRunner {
    pub fn new(config: Config, store: DefinitionStore, registry: MethodRegistry) -> Result<Self> {
        Self::with_context(config, store, registry, BrowserContext::new())
    }

    /// Run against an existing browser context
    pub fn with_context(
        config: Config,
        store: DefinitionStore,
        mut registry: MethodRegistry,
        context: BrowserContext,
    ) -> Result<Self> {
        config.validate()?;

        let fixtures =
            TemplateFixtures::new(context.clone(), &config.environments.template_namespace);
        registry.register_builtin(TEMPLATE_METHOD, seed_templates(fixtures.clone()));
        let executor = PipelineExecutor::from_config(&config, registry)?;

        Ok(Self {
            config,
            store,
            executor,
            context,
            fixtures,
            templates: Vec::new(),
            pending_clean: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &DefinitionStore {
        &self.store
    }

    pub fn context(&self) -> &BrowserContext {
        &self.context
    }

    pub fn fixtures(&self) -> &TemplateFixtures {
        &self.fixtures
    }

    pub fn templates(&self) -> &[PathBuf] {
        &self.templates
    }

    /// Load the definition files behind the `definitions` patterns
    pub fn load_definitions<D>(&mut self, discovery: &D) -> Result<Vec<String>>
    where
        D: Discovery + ?Sized,
    {
        let paths = discovery.discover(&self.config.environments.definitions)?;
        self.store
            .load_all(&paths, &self.config.environments.custom_paths)
    }

    /// Locate template fixtures; each active pipeline seeds them first
    pub fn discover_templates<D>(&mut self, discovery: &D) -> Result<usize>
    where
        D: Discovery + ?Sized,
    {
        if self.config.environments.templates.is_empty() {
            return Ok(0);
        }
        self.templates = discovery.discover(&self.config.environments.templates)?;
        info!("Found {} template fixture file(s)", self.templates.len());
        Ok(self.templates.len())
    }

    /// Read the spec files behind the `tests` patterns, in discovery order
    pub fn discover_specs<D>(&self, discovery: &D) -> Result<Vec<SpecFile>>
    where
        D: Discovery + ?Sized,
    {
        let paths = discovery.discover(&self.config.environments.tests)?;
        debug!("Found {} spec file(s)", paths.len());
        paths.into_iter().map(SpecFile::read).collect()
    }

    /// Reset fixtures after every reported test
    pub fn attach_hooks(&self, hooks: &TestDoneHooks) {
        self.fixtures.attach(hooks);
    }

    /// Resolve the pipeline for one spec file without running it
    pub fn prepare(&self, file: &SpecFile) -> Result<ResolvedEnvironment> {
        let directives = parse_directives(
            &file.path,
            &file.source,
            &self.config.environments.banner_marker,
        )?;
        let bases = self.store.names_for_file(&file.path);
        let mut resolved = Resolver::new(&self.store).resolve(&file.path, &bases, &directives)?;

        if resolved.active && !self.templates.is_empty() {
            resolved.prepend(self.templates.iter().map(|path| ResolvedStep {
                step: ActionStep::template(path.to_string_lossy()),
                origin: TEMPLATES_ORIGIN.to_string(),
                root: None,
            }));
        }
        Ok(resolved)
    }

    /// Resolve every file, in order
    pub fn plan(&self, files: &[SpecFile]) -> Vec<Result<ResolvedEnvironment>> {
        files.iter().map(|file| self.prepare(file)).collect()
    }

    /// Execute the environments of `files` one after another.
    ///
    /// When any active file is focused, unfocused files are skipped.
    pub async fn run(&mut self, files: &[SpecFile]) -> RunReport {
        let start = Instant::now();
        let plan = self.plan(files);
        let focused = plan
            .iter()
            .any(|r| matches!(r, Ok(env) if env.active && env.focus));
        if focused {
            info!("Focused environments present, running only those");
        }

        let mut outcomes = Vec::with_capacity(files.len());
        for (file, resolved) in files.iter().zip(plan) {
            let outcome = match resolved {
                Err(e) => {
                    error!("✗ {} - {}", file.path.display(), e);
                    FileOutcome {
                        path: file.path.clone(),
                        environments: Vec::new(),
                        status: FileStatus::Failed(e),
                    }
                }
                Ok(env) => {
                    let status = if !env.active {
                        debug!("Skipping inactive {}", file.path.display());
                        FileStatus::Skipped(SkipReason::Inactive)
                    } else if focused && !env.focus {
                        debug!("Skipping unfocused {}", file.path.display());
                        FileStatus::Skipped(SkipReason::Unfocused)
                    } else {
                        self.execute(&env).await
                    };
                    FileOutcome {
                        path: env.file,
                        environments: env.environments,
                        status,
                    }
                }
            };
            outcomes.push(outcome);
        }

        let report = RunReport {
            outcomes,
            focused,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Environment run: {} executed, {} skipped, {} failed ({} ms)",
            report.executed(),
            report.skipped(),
            report.failed(),
            report.duration_ms
        );
        report
    }

    /// Restore globals left by a trailing `clean` pipeline
    pub fn finish(&mut self) -> Option<RestoreSummary> {
        self.restore_pending()
    }

    async fn execute(&mut self, env: &ResolvedEnvironment) -> FileStatus {
        self.restore_pending();

        match self.executor.run(env, &self.context).await {
            Ok(report) => {
                info!(
                    "✓ {} ({} steps, {} ms)",
                    report.file.display(),
                    report.steps_run,
                    report.duration_ms
                );
                self.pending_clean = report.snapshot;
                FileStatus::Executed {
                    steps: report.steps_run,
                }
            }
            Err(e) => {
                error!("✗ {} - {}", env.file.display(), e);
                FileStatus::Failed(e)
            }
        }
    }

    fn restore_pending(&mut self) -> Option<RestoreSummary> {
        let snapshot = self.pending_clean.take()?;
        let summary = snapshot.restore(&mut self.context.lock());
        debug!("Restored clean baseline: {:?}", summary);
        Some(summary)
    }
}

impl std::fmt::Debug for EnvironmentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentRunner")
            .field("store", &self.store.names())
            .field("executor", &self.executor)
            .field("templates", &self.templates)
            .finish_non_exhaustive()
    }
}

/// Handler for the built-in `template` step
fn seed_templates(fixtures: TemplateFixtures) -> MethodFn {
    Arc::new(
        move |_: EnvironmentHandle, args: &[String], done: Done| {
            for path in args {
                if let Err(e) = fixtures.load_fixture_file(Path::new(path)) {
                    warn!("Failed to seed fixture {}: {}", path, e);
                    return Err(e.to_string());
                }
            }
            done.done();
            Ok(())
        },
    )
}

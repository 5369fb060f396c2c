//! Completion signals and the environment handle given to async steps

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

use crate::types::{AddTarget, ScriptRef};
use crate::window::BrowserContext;

/// Outcome a step reports through its `Done` signal
pub type StepOutcome = std::result::Result<(), String>;

/// Receiving side of a `Done` signal, awaited by the executor
pub type Completion = oneshot::Receiver<StepOutcome>;

/// One-shot completion signal for `call` and custom steps.
///
/// Consuming `self` makes a second signal impossible. Dropping it without
/// signaling leaves the step to fail at its timeout.
#[derive(Debug)]
pub struct Done {
    tx: oneshot::Sender<StepOutcome>,
}

impl Done {
    pub fn channel() -> (Done, Completion) {
        let (tx, rx) = oneshot::channel();
        (Done { tx }, rx)
    }

    /// Signal successful completion
    pub fn done(self) {
        // The executor may already have timed the step out
        let _ = self.tx.send(Ok(()));
    }

    /// Signal failure, aborting the rest of the pipeline
    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(reason.into()));
    }

    /// Forward a result as the completion signal
    pub fn finish(self, outcome: StepOutcome) {
        let _ = self.tx.send(outcome);
    }
}

/// Live environment given to `call` and custom step handlers.
///
/// Cloneable and `Send`, so a handler may move it into a timer task and keep
/// adding to the environment before it signals `Done`.
#[derive(Clone)]
pub struct EnvironmentHandle {
    context: BrowserContext,
    root: Option<PathBuf>,
    custom_paths: Arc<BTreeMap<String, PathBuf>>,
}

impl EnvironmentHandle {
    pub fn new(
        context: BrowserContext,
        root: Option<PathBuf>,
        custom_paths: Arc<BTreeMap<String, PathBuf>>,
    ) -> Self {
        Self {
            context,
            root,
            custom_paths,
        }
    }

    pub fn context(&self) -> &BrowserContext {
        &self.context
    }

    /// Directory relative script references resolve against
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Add a script reference or run an inline function against the window
    pub fn add(&self, target: impl Into<AddTarget>) -> StepOutcome {
        match target.into() {
            AddTarget::Script(script) => {
                let path = self.resolve_script(&script);
                debug!("Loading script {}", path.display());
                self.context.lock().load_script(path);
                Ok(())
            }
            AddTarget::Inline(f) => {
                let mut window = self.context.lock();
                f(&mut *window)
            }
        }
    }

    /// Record framework selections on the window
    pub fn use_frameworks(&self, frameworks: &[String]) {
        let mut window = self.context.lock();
        for framework in frameworks {
            window.use_framework(framework);
        }
    }

    /// Resolve a script reference to the path handed to the host.
    ///
    /// Only the primary name is considered. A bare name with a
    /// `customPaths` entry maps to that path; other relative names are
    /// joined to the root of the definition that declared the step.
    pub fn resolve_script(&self, script: &ScriptRef) -> PathBuf {
        let name = script.primary();
        if let Some(path) = self.custom_paths.get(name) {
            return path.clone();
        }
        let path = Path::new(name);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl std::fmt::Debug for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentHandle")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

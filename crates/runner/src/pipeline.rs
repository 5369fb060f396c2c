//! Pipeline executor
//!
//! Runs a resolved environment against a browser context one step at a
//! time. Synchronous steps complete before the next begins; `call` and
//! custom steps suspend the pipeline until their `Done` signal fires or the
//! step's timeout elapses.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use specenv_common::signal::Completion;
use specenv_common::{
    ActionStep, BrowserContext, Config, Done, EnvironmentHandle, Error, GlobalSnapshot,
    ResolvedEnvironment, ResolvedStep, Result,
};

use crate::registry::MethodRegistry;

/// Result of a completed pipeline
#[derive(Debug)]
pub struct PipelineReport {
    pub file: PathBuf,
    pub steps_run: usize,
    /// Baseline to restore before the next environment, for `clean` pipelines
    pub snapshot: Option<GlobalSnapshot>,
    pub duration_ms: u64,
}

pub struct PipelineExecutor {
    registry: Arc<MethodRegistry>,
    custom_paths: Arc<BTreeMap<String, PathBuf>>,
    step_timeout: Duration,
}

impl PipelineExecutor {
    pub fn new(
        registry: MethodRegistry,
        custom_paths: BTreeMap<String, PathBuf>,
        step_timeout: Duration,
    ) -> Result<Self> {
        if step_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "step timeout must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            registry: Arc::new(registry),
            custom_paths: Arc::new(custom_paths),
            step_timeout,
        })
    }

    pub fn from_config(config: &Config, registry: MethodRegistry) -> Result<Self> {
        config.validate()?;
        Self::new(
            registry,
            config.environments.custom_paths.clone(),
            config.step_timeout(),
        )
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Execute every step of `environment` in order.
    ///
    /// A failing step aborts the rest of the pipeline. For `clean`
    /// pipelines the globals are restored right away on failure; on success
    /// the snapshot is handed back so the caller can restore it before the
    /// next environment runs.
    pub async fn run(
        &self,
        environment: &ResolvedEnvironment,
        context: &BrowserContext,
    ) -> Result<PipelineReport> {
        let start = std::time::Instant::now();
        let file = environment.file.clone();

        if !environment.active {
            debug!("Pipeline for {} is inactive, nothing to run", file.display());
            return Ok(PipelineReport {
                file,
                steps_run: 0,
                snapshot: None,
                duration_ms: 0,
            });
        }

        let snapshot = environment
            .clean
            .then(|| GlobalSnapshot::capture(&context.lock()));

        info!(
            "Running {} step(s) for {}",
            environment.len(),
            file.display()
        );

        for (index, step) in environment.steps.iter().enumerate() {
            if let Err(e) = self.run_step(step, index + 1, context).await {
                error!("Pipeline for {} aborted: {}", file.display(), e);
                if let Some(snapshot) = &snapshot {
                    let summary = snapshot.restore(&mut context.lock());
                    debug!("Restored globals after failure: {:?}", summary);
                }
                return Err(e);
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!("Pipeline for {} finished in {} ms", file.display(), duration_ms);

        Ok(PipelineReport {
            file,
            steps_run: environment.len(),
            snapshot,
            duration_ms,
        })
    }

    async fn run_step(
        &self,
        resolved: &ResolvedStep,
        position: usize,
        context: &BrowserContext,
    ) -> Result<()> {
        let kind = resolved.step.kind();
        debug!("Step #{} ({}) from {}", position, kind, resolved.origin);

        let handle = EnvironmentHandle::new(
            context.clone(),
            resolved.root.clone(),
            self.custom_paths.clone(),
        );
        let failed = |reason: String| Error::PipelineExecution {
            kind: kind.to_string(),
            position,
            reason,
        };

        match &resolved.step {
            ActionStep::Use(frameworks) => {
                handle.use_frameworks(frameworks);
                Ok(())
            }
            ActionStep::Add(target) => handle.add(target.clone()).map_err(failed),
            ActionStep::Call { handler, timeout } => {
                let (done, completion) = Done::channel();
                handler(done, handle).map_err(failed)?;
                let timeout = timeout.unwrap_or(self.step_timeout);
                self.await_completion(completion, kind, position, timeout)
                    .await
            }
            ActionStep::Custom { kind: method, args } => {
                let entry = self
                    .registry
                    .get(method)
                    .ok_or_else(|| failed(format!("no handler registered for '{}'", method)))?;
                let (done, completion) = Done::channel();
                (entry.handler)(handle, args.as_slice(), done).map_err(failed)?;
                let timeout = entry.timeout.unwrap_or(self.step_timeout);
                self.await_completion(completion, kind, position, timeout)
                    .await
            }
        }
    }

    async fn await_completion(
        &self,
        completion: Completion,
        kind: &str,
        position: usize,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let timed_out = || Error::StepTimeout {
            kind: kind.to_string(),
            position,
            timeout_ms: timeout.as_millis() as u64,
        };

        match tokio::time::timeout_at(deadline, completion).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(Error::PipelineExecution {
                kind: kind.to_string(),
                position,
                reason,
            }),
            Ok(Err(_)) => {
                // The signal can no longer fire; the step still fails at its bound
                warn!("Step #{} ({}) dropped its completion signal", position, kind);
                tokio::time::sleep_until(deadline).await;
                Err(timed_out())
            }
            Err(_) => Err(timed_out()),
        }
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("registry", &self.registry)
            .field("step_timeout", &self.step_timeout)
            .finish_non_exhaustive()
    }
}

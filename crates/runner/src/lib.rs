//! specenv Runner
//!
//! Executes resolved environments against a browser context:
//!
//! - `registry`: custom step handlers, including `lib`
//! - `pipeline`: step-by-step execution with completion signals and timeouts
//! - `fixtures`: template fixtures and their per-test reset
//! - `hooks`: reporter bridge firing `on_test_done` listeners
//! - `runner`: batch orchestration with run-scoped focus

pub mod fixtures;
pub mod hooks;
pub mod pipeline;
pub mod registry;
pub mod runner;

pub use fixtures::{TemplateFixture, TemplateFixtures};
pub use hooks::{HookBridge, Reporter, RunCompletion, SpecResult, TestDoneHooks};
pub use pipeline::{PipelineExecutor, PipelineReport};
pub use registry::{Method, MethodFn, MethodRegistry};
pub use runner::{
    EnvironmentRunner, FileOutcome, FileStatus, RunReport, SkipReason, SpecFile,
};

//! specenv Common Library
//!
//! Environment definitions, banner directives, configuration and the
//! resolver that turns them into a per-file pipeline. Execution lives in
//! `specenv-runner`.

pub mod config;
pub mod directive;
pub mod discovery;
pub mod error;
pub mod resolver;
pub mod signal;
pub mod store;
pub mod types;
pub mod window;

// Re-export commonly used types
pub use config::{Config, EnvironmentsConfig};
pub use directive::{parse_directives, Directives};
pub use discovery::Discovery;
pub use error::{Error, Result};
pub use resolver::{ResolvedEnvironment, ResolvedStep, Resolver};
pub use signal::{Done, EnvironmentHandle, StepOutcome};
pub use store::DefinitionStore;
pub use types::*;
pub use window::{BrowserContext, Document, GlobalSnapshot, NodeId, Window};

/// specenv version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

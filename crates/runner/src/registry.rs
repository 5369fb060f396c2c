//! Custom method registry
//!
//! Maps a step kind to the handler that executes it. `lib` steps dispatch
//! here under the `"lib"` key; the host supplies that handler like any
//! other custom method.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use specenv_common::{Done, EnvironmentHandle, Error, Result, StepOutcome, TEMPLATE_METHOD};

/// Handler signature: `(environment, args, done)`.
///
/// Returning `Err` is a synchronous failure. Otherwise the handler must
/// eventually consume `done`.
pub type MethodFn = Arc<dyn Fn(EnvironmentHandle, &[String], Done) -> StepOutcome + Send + Sync>;

/// Kinds handled by the executor itself
const RESERVED: [&str; 4] = ["use", "add", "call", TEMPLATE_METHOD];

#[derive(Clone)]
pub struct Method {
    pub handler: MethodFn,
    /// Overrides the executor's default step timeout
    pub timeout: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: BTreeMap<String, Method>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `kind`, replacing any earlier one
    pub fn register<F>(&mut self, kind: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(EnvironmentHandle, &[String], Done) -> StepOutcome + Send + Sync + 'static,
    {
        self.insert(kind, Arc::new(handler), None)
    }

    /// Register a handler with its own completion bound
    pub fn register_with_timeout<F>(
        &mut self,
        kind: &str,
        timeout: Duration,
        handler: F,
    ) -> Result<&mut Self>
    where
        F: Fn(EnvironmentHandle, &[String], Done) -> StepOutcome + Send + Sync + 'static,
    {
        if timeout.is_zero() {
            return Err(Error::InvalidConfig(format!(
                "timeout for custom method '{}' must be greater than zero",
                kind
            )));
        }
        self.insert(kind, Arc::new(handler), Some(timeout))
    }

    pub fn get(&self, kind: &str) -> Option<&Method> {
        self.methods.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.methods.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }

    /// Install a handler under a reserved kind
    pub(crate) fn register_builtin(&mut self, kind: &str, handler: MethodFn) {
        self.methods.insert(
            kind.to_string(),
            Method {
                handler,
                timeout: None,
            },
        );
    }

    fn insert(&mut self, kind: &str, handler: MethodFn, timeout: Option<Duration>) -> Result<&mut Self> {
        let kind = kind.trim();
        if kind.is_empty() {
            return Err(Error::InvalidConfig(
                "custom method name must not be empty".to_string(),
            ));
        }
        if RESERVED.contains(&kind) {
            return Err(Error::InvalidConfig(format!(
                "'{}' is a built-in step and cannot be registered as a custom method",
                kind
            )));
        }
        self.methods
            .insert(kind.to_string(), Method { handler, timeout });
        Ok(self)
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

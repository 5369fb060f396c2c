//! Environment definitions and the steps they are made of

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::signal::{Done, EnvironmentHandle, StepOutcome};
use crate::window::Window;

/// Kind key custom `lib` steps dispatch through
pub const LIB_METHOD: &str = "lib";

/// Built-in kind used to seed template fixtures
pub const TEMPLATE_METHOD: &str = "template";

/// Inline function run synchronously against the window
pub type InlineFn = Arc<dyn Fn(&mut Window) -> StepOutcome + Send + Sync>;

/// Explicitly asynchronous step body
pub type CallFn = Arc<dyn Fn(Done, EnvironmentHandle) -> StepOutcome + Send + Sync>;

// ============================================================================
// Script references
// ============================================================================

/// A script name with optional `a | b` alternatives.
///
/// Resolution always takes the first name. The alternatives are kept so a
/// host can report them, but nothing ever falls back to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRef {
    names: Vec<String>,
}

impl ScriptRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            names: vec![name.into()],
        }
    }

    /// Parse `name` or `name | altName | ...`. Returns None if any
    /// alternative is empty.
    pub fn parse(entry: &str) -> Option<Self> {
        let names: Vec<String> = entry.split('|').map(|n| n.trim().to_string()).collect();
        if names.iter().any(String::is_empty) {
            return None;
        }
        Some(Self { names })
    }

    pub fn primary(&self) -> &str {
        &self.names[0]
    }

    pub fn alternatives(&self) -> &[String] {
        &self.names[1..]
    }
}

impl fmt::Display for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names.join(" | "))
    }
}

// ============================================================================
// Steps
// ============================================================================

/// Target of an `add` step
#[derive(Clone)]
pub enum AddTarget {
    Script(ScriptRef),
    Inline(InlineFn),
}

impl AddTarget {
    pub fn inline<F>(f: F) -> Self
    where
        F: Fn(&mut Window) -> StepOutcome + Send + Sync + 'static,
    {
        AddTarget::Inline(Arc::new(f))
    }
}

impl From<&str> for AddTarget {
    fn from(entry: &str) -> Self {
        AddTarget::Script(ScriptRef::parse(entry).unwrap_or_else(|| ScriptRef::new(entry)))
    }
}

impl From<String> for AddTarget {
    fn from(entry: String) -> Self {
        AddTarget::from(entry.as_str())
    }
}

impl From<ScriptRef> for AddTarget {
    fn from(script: ScriptRef) -> Self {
        AddTarget::Script(script)
    }
}

impl fmt::Debug for AddTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddTarget::Script(script) => f.debug_tuple("Script").field(script).finish(),
            AddTarget::Inline(_) => f.write_str("Inline(<fn>)"),
        }
    }
}

/// A single pipeline instruction
#[derive(Clone)]
pub enum ActionStep {
    /// Framework selection, recorded but never run against the DOM
    Use(Vec<String>),
    Add(AddTarget),
    Call {
        handler: CallFn,
        timeout: Option<Duration>,
    },
    /// Dispatched through the method registry by `kind`
    Custom { kind: String, args: Vec<String> },
}

impl ActionStep {
    pub fn lib(name: impl Into<String>) -> Self {
        ActionStep::Custom {
            kind: LIB_METHOD.to_string(),
            args: vec![name.into()],
        }
    }

    pub fn template(path: impl Into<String>) -> Self {
        ActionStep::Custom {
            kind: TEMPLATE_METHOD.to_string(),
            args: vec![path.into()],
        }
    }

    /// Kind name used in logs and errors
    pub fn kind(&self) -> &str {
        match self {
            ActionStep::Use(_) => "use",
            ActionStep::Add(_) => "add",
            ActionStep::Call { .. } => "call",
            ActionStep::Custom { kind, .. } => kind,
        }
    }
}

impl fmt::Debug for ActionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStep::Use(frameworks) => f.debug_tuple("Use").field(frameworks).finish(),
            ActionStep::Add(target) => f.debug_tuple("Add").field(target).finish(),
            ActionStep::Call { timeout, .. } => f
                .debug_struct("Call")
                .field("timeout", timeout)
                .finish_non_exhaustive(),
            ActionStep::Custom { kind, args } => f
                .debug_struct("Custom")
                .field("kind", kind)
                .field("args", args)
                .finish(),
        }
    }
}

// ============================================================================
// Definitions
// ============================================================================

/// A named, reusable environment
#[derive(Debug, Clone)]
pub struct EnvironmentDefinition {
    pub name: String,
    pub active: bool,
    pub focus: bool,
    pub clean: bool,
    /// Spec files under this directory select the definition
    pub root: Option<PathBuf>,
    pub actions: Vec<ActionStep>,
}

impl EnvironmentDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            focus: false,
            clean: false,
            root: None,
            actions: Vec::new(),
        }
    }

    pub fn builder(name: impl Into<String>) -> EnvironmentBuilder {
        EnvironmentBuilder::new(name)
    }
}

/// Chainable definition contract mirroring what definition files declare
#[derive(Debug)]
pub struct EnvironmentBuilder {
    definition: EnvironmentDefinition,
}

impl EnvironmentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            definition: EnvironmentDefinition::new(name),
        }
    }

    pub fn use_frameworks<I, S>(mut self, frameworks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let frameworks = frameworks.into_iter().map(Into::into).collect();
        self.definition.actions.push(ActionStep::Use(frameworks));
        self
    }

    pub fn add(mut self, target: impl Into<AddTarget>) -> Self {
        self.definition.actions.push(ActionStep::Add(target.into()));
        self
    }

    pub fn add_fn<F>(self, f: F) -> Self
    where
        F: Fn(&mut Window) -> StepOutcome + Send + Sync + 'static,
    {
        self.add(AddTarget::inline(f))
    }

    pub fn call<F>(mut self, f: F) -> Self
    where
        F: Fn(Done, EnvironmentHandle) -> StepOutcome + Send + Sync + 'static,
    {
        self.definition.actions.push(ActionStep::Call {
            handler: Arc::new(f),
            timeout: None,
        });
        self
    }

    pub fn call_with_timeout<F>(mut self, timeout: Duration, f: F) -> Self
    where
        F: Fn(Done, EnvironmentHandle) -> StepOutcome + Send + Sync + 'static,
    {
        self.definition.actions.push(ActionStep::Call {
            handler: Arc::new(f),
            timeout: Some(timeout),
        });
        self
    }

    pub fn lib(mut self, name: impl Into<String>) -> Self {
        self.definition.actions.push(ActionStep::lib(name));
        self
    }

    pub fn custom<I, S>(mut self, kind: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.definition.actions.push(ActionStep::Custom {
            kind: kind.into(),
            args: args.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.definition.active = active;
        self
    }

    pub fn focus(mut self, focus: bool) -> Self {
        self.definition.focus = focus;
        self
    }

    pub fn clean(mut self, clean: bool) -> Self {
        self.definition.clean = clean;
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.definition.root = Some(root.into());
        self
    }

    pub fn build(self) -> EnvironmentDefinition {
        self.definition
    }
}

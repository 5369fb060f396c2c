//! Completion hook bridge
//!
//! Sits between the spec runner and its reporter. Every reported result is
//! forwarded unchanged, then the `on_test_done` listeners fire. Run
//! completion drops all listeners before the reporter sees it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Result of one spec, as the spec runner reports it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecResult {
    pub id: String,
    pub description: String,
    pub suite: Vec<String>,
    pub success: bool,
    pub skipped: bool,
    pub time_ms: u64,
    pub log: Vec<String>,
}

/// Summary passed to `Reporter::complete`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCompletion {
    pub total: usize,
    pub failed: usize,
    /// Set when the run itself errored outside any spec
    pub error: bool,
}

/// Reporting entry points of the spec runner
pub trait Reporter {
    fn result(&mut self, result: &SpecResult);
    fn complete(&mut self, info: &RunCompletion);
}

type Listener = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct Listeners {
    list: Vec<Listener>,
    /// Bumped by every `clear`
    generation: u64,
}

/// Listeners run after every reported test
#[derive(Clone, Default)]
pub struct TestDoneHooks {
    listeners: Arc<Mutex<Listeners>>,
}

impl TestDoneHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_test_done<F>(&self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.listeners.lock().list.push(Box::new(callback));
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every listener in registration order.
    ///
    /// The list is taken out while firing, so a listener may subscribe
    /// further listeners; those run from the next test on. A `clear` issued
    /// while firing stands.
    pub fn fire(&self) {
        let (firing, generation) = {
            let mut listeners = self.listeners.lock();
            (std::mem::take(&mut listeners.list), listeners.generation)
        };
        let mut batch = FiringBatch {
            hooks: self,
            firing,
            generation,
        };
        for listener in batch.firing.iter_mut() {
            listener();
        }
    }

    pub fn clear(&self) {
        let mut listeners = self.listeners.lock();
        let dropped = std::mem::take(&mut listeners.list);
        listeners.generation += 1;
        debug!("Cleared {} test-done listener(s)", dropped.len());
    }
}

/// Puts a fired batch back ahead of listeners added meanwhile, also when a
/// listener panics
struct FiringBatch<'a> {
    hooks: &'a TestDoneHooks,
    firing: Vec<Listener>,
    generation: u64,
}

impl Drop for FiringBatch<'_> {
    fn drop(&mut self) {
        let mut listeners = self.hooks.listeners.lock();
        if listeners.generation != self.generation {
            return;
        }
        let added = std::mem::replace(&mut listeners.list, std::mem::take(&mut self.firing));
        listeners.list.extend(added);
    }
}

impl std::fmt::Debug for TestDoneHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDoneHooks")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Reporter wrapper that drives `TestDoneHooks`
pub struct HookBridge<R> {
    inner: R,
    hooks: TestDoneHooks,
}

impl<R: Reporter> HookBridge<R> {
    pub fn new(inner: R) -> Self {
        Self::with_hooks(inner, TestDoneHooks::new())
    }

    pub fn with_hooks(inner: R, hooks: TestDoneHooks) -> Self {
        Self { inner, hooks }
    }

    pub fn hooks(&self) -> TestDoneHooks {
        self.hooks.clone()
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Reporter> Reporter for HookBridge<R> {
    fn result(&mut self, result: &SpecResult) {
        self.inner.result(result);
        self.hooks.fire();
    }

    fn complete(&mut self, info: &RunCompletion) {
        self.hooks.clear();
        self.inner.complete(info);
    }
}

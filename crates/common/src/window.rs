//! Headless browser context
//!
//! The pipeline runs against a `Window`: a global namespace, a document
//! holding fixture nodes, and the ordered list of scripts and frameworks the
//! environment asked the host to load. The host runner owns the real
//! browser; this is the state specenv reads and writes on its behalf.

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared handle to the window a pipeline runs against
#[derive(Clone, Default)]
pub struct BrowserContext {
    window: Arc<Mutex<Window>>,
}

impl BrowserContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_window(window: Window) -> Self {
        Self {
            window: Arc::new(Mutex::new(window)),
        }
    }

    /// Lock the window. Never hold the guard across an `.await`.
    pub fn lock(&self) -> MutexGuard<'_, Window> {
        self.window.lock()
    }
}

impl std::fmt::Debug for BrowserContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BrowserContext").field(&*self.window.lock()).finish()
    }
}

/// The global object plus document
#[derive(Debug, Clone, Default)]
pub struct Window {
    globals: BTreeMap<String, Value>,
    document: Document,
    scripts: Vec<PathBuf>,
    frameworks: Vec<String>,
}

impl Window {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(&self, key: &str) -> Option<&Value> {
        self.globals.get(key)
    }

    pub fn has_global(&self, key: &str) -> bool {
        self.globals.contains_key(key)
    }

    /// Set a global, returning the previous value
    pub fn set_global(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.globals.insert(key.into(), value.into())
    }

    pub fn remove_global(&mut self, key: &str) -> Option<Value> {
        self.globals.remove(key)
    }

    pub fn globals(&self) -> &BTreeMap<String, Value> {
        &self.globals
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Append a script to the load order
    pub fn load_script(&mut self, path: impl Into<PathBuf>) {
        self.scripts.push(path.into());
    }

    /// Scripts in the order they were loaded
    pub fn scripts(&self) -> &[PathBuf] {
        &self.scripts
    }

    pub fn has_script(&self, path: impl AsRef<Path>) -> bool {
        self.scripts.iter().any(|s| s == path.as_ref())
    }

    /// Record a framework selection; repeats are ignored
    pub fn use_framework(&mut self, name: &str) {
        if !self.frameworks.iter().any(|f| f == name) {
            self.frameworks.push(name.to_string());
        }
    }

    pub fn frameworks(&self) -> &[String] {
        &self.frameworks
    }
}

// ============================================================================
// Global snapshots
// ============================================================================

/// Baseline of the global namespace taken before a `clean` environment runs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalSnapshot {
    values: BTreeMap<String, Value>,
}

/// What a snapshot restore changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Keys added after the snapshot, now removed
    pub removed: Vec<String>,
    /// Keys overwritten or deleted after the snapshot, now put back
    pub restored: Vec<String>,
}

impl RestoreSummary {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.restored.is_empty()
    }
}

impl GlobalSnapshot {
    pub fn capture(window: &Window) -> Self {
        Self {
            values: window.globals.clone(),
        }
    }

    /// Keys present now but absent from the baseline
    pub fn added_keys(&self, window: &Window) -> Vec<String> {
        window
            .globals
            .keys()
            .filter(|k| !self.values.contains_key(*k))
            .cloned()
            .collect()
    }

    /// Put the global namespace back to the baseline
    pub fn restore(&self, window: &mut Window) -> RestoreSummary {
        let removed = self.added_keys(window);
        for key in &removed {
            window.globals.remove(key);
        }

        let mut restored = Vec::new();
        for (key, value) in &self.values {
            if window.globals.get(key) != Some(value) {
                window.globals.insert(key.clone(), value.clone());
                restored.push(key.clone());
            }
        }

        RestoreSummary { removed, restored }
    }
}

// ============================================================================
// Document
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Element {
    tag_name: String,
    id: Option<String>,
    classes: Vec<String>,
    inner_html: String,
    attached: bool,
}

/// Flat document body: elements are appended to the body and can be
/// detached, which is all fixtures need.
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Element>,
    id_index: HashMap<String, Vec<NodeId>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element to the body
    pub fn create_element(
        &mut self,
        tag_name: &str,
        id: Option<&str>,
        classes: &[&str],
        inner_html: &str,
    ) -> NodeId {
        let node = NodeId(self.nodes.len());
        self.nodes.push(Element {
            tag_name: tag_name.to_string(),
            id: id.map(str::to_string),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            inner_html: inner_html.to_string(),
            attached: true,
        });
        if let Some(id) = id {
            self.id_index.entry(id.to_string()).or_default().push(node);
        }
        node
    }

    /// First attached element with the given id
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.id_index
            .get(id)?
            .iter()
            .copied()
            .find(|n| self.nodes[n.0].attached)
    }

    pub fn get_elements_by_class_name(&self, class: &str) -> Vec<NodeId> {
        self.attached()
            .filter(|(_, el)| el.classes.iter().any(|c| c == class))
            .map(|(node, _)| node)
            .collect()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node)
            .map(|el| el.classes.iter().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn element_id(&self, node: NodeId) -> Option<&str> {
        self.element(node).and_then(|el| el.id.as_deref())
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|el| el.tag_name.as_str())
    }

    pub fn inner_html(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|el| el.inner_html.as_str())
    }

    /// Returns false if the node is detached or unknown
    pub fn set_inner_html(&mut self, node: NodeId, html: &str) -> bool {
        match self.nodes.get_mut(node.0) {
            Some(el) if el.attached => {
                el.inner_html = html.to_string();
                true
            }
            _ => false,
        }
    }

    /// Detach a node from the body
    pub fn remove(&mut self, node: NodeId) -> bool {
        let Some(el) = self.nodes.get_mut(node.0) else {
            return false;
        };
        if !el.attached {
            return false;
        }
        el.attached = false;
        if let Some(id) = &el.id {
            if let Some(ids) = self.id_index.get_mut(id) {
                ids.retain(|n| *n != node);
            }
        }
        true
    }

    /// Number of attached elements
    pub fn len(&self) -> usize {
        self.attached().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn element(&self, node: NodeId) -> Option<&Element> {
        self.nodes.get(node.0).filter(|el| el.attached)
    }

    fn attached(&self) -> impl Iterator<Item = (NodeId, &Element)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, el)| el.attached)
            .map(|(i, el)| (NodeId(i), el))
    }
}

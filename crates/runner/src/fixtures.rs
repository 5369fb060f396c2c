//! Template fixtures
//!
//! HTML fragments inserted into the document under a namespace class. The
//! markup seen at first load is the baseline every test starts from:
//! `reset_all` runs after each test and puts it back.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use specenv_common::{BrowserContext, Document, Error, NodeId, Result};

use crate::hooks::TestDoneHooks;

const FIXTURE_TAG: &str = "div";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFixture {
    pub id: String,
    pub original_html: String,
}

/// Owner of the fixture nodes for one run
#[derive(Clone)]
pub struct TemplateFixtures {
    context: BrowserContext,
    namespace: Arc<str>,
    fixtures: Arc<Mutex<Vec<TemplateFixture>>>,
}

impl TemplateFixtures {
    pub fn new(context: BrowserContext, namespace: &str) -> Self {
        Self {
            context,
            namespace: Arc::from(namespace),
            fixtures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Insert a fixture unless one with this id is already loaded.
    ///
    /// Returns true if a node was created. A fixture is only ever recorded
    /// once; loading it again never replaces the original markup.
    pub fn load_fixture(&self, id: &str, html: &str) -> bool {
        let mut fixtures = self.fixtures.lock();
        let mut window = self.context.lock();
        let document = window.document_mut();

        if let Some(existing) = fixtures.iter().find(|f| f.id == id) {
            if self.find_node(document, id).is_some() {
                debug!("Fixture '{}' already loaded", id);
                return false;
            }
            // A test detached the node; bring back the original
            self.insert_node(document, id, &existing.original_html);
            return true;
        }

        if self.find_node(document, id).is_some() {
            debug!("Fixture node '{}' already present in the document", id);
            return false;
        }

        self.insert_node(document, id, html);
        fixtures.push(TemplateFixture {
            id: id.to_string(),
            original_html: html.to_string(),
        });
        info!("Loaded fixture '{}'", id);
        true
    }

    /// Load a fixture file; its id is the file stem
    pub fn load_fixture_file(&self, path: &Path) -> Result<bool> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::InvalidConfig(format!("cannot derive a fixture id from {}", path.display()))
            })?;
        let html = std::fs::read_to_string(path)?;
        Ok(self.load_fixture(id, &html))
    }

    /// Restore every fixture's markup to its first-load baseline
    pub fn reset_all(&self) -> usize {
        let fixtures = self.fixtures.lock();
        let mut window = self.context.lock();
        let document = window.document_mut();

        for fixture in fixtures.iter() {
            match self.find_node(document, &fixture.id) {
                Some(node) => {
                    document.set_inner_html(node, &fixture.original_html);
                }
                None => {
                    self.insert_node(document, &fixture.id, &fixture.original_html);
                }
            }
        }

        debug!("Reset {} fixture(s)", fixtures.len());
        fixtures.len()
    }

    /// Reset fixtures after every reported test
    pub fn attach(&self, hooks: &TestDoneHooks) {
        let fixtures = self.clone();
        hooks.on_test_done(move || {
            fixtures.reset_all();
        });
    }

    pub fn get(&self, id: &str) -> Option<TemplateFixture> {
        self.fixtures.lock().iter().find(|f| f.id == id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.fixtures.lock().iter().map(|f| f.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fixtures.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_node(&self, document: &Document, id: &str) -> Option<NodeId> {
        document
            .get_elements_by_class_name(&self.namespace)
            .into_iter()
            .find(|node| document.element_id(*node) == Some(id))
    }

    fn insert_node(&self, document: &mut Document, id: &str, html: &str) -> NodeId {
        document.create_element(FIXTURE_TAG, Some(id), &[&*self.namespace, id], html)
    }
}

impl std::fmt::Debug for TemplateFixtures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateFixtures")
            .field("namespace", &self.namespace)
            .field("fixtures", &*self.fixtures.lock())
            .finish()
    }
}

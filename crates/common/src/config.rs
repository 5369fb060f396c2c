//! specenv configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::directive::DEFAULT_MARKER;
use crate::error::{Error, Result};

/// Top-level configuration as handed over by the host runner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environments: EnvironmentsConfig,
}

/// The `environments` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentsConfig {
    /// Patterns locating environment definition files
    pub definitions: Vec<String>,

    /// Patterns locating spec files resolution applies to
    pub tests: Vec<String>,

    /// Patterns locating template fixture HTML files
    pub templates: Vec<String>,

    /// Class tagging fixture nodes in the document
    pub template_namespace: String,

    /// Name to path overrides for bare framework/lib names and definition roots
    pub custom_paths: BTreeMap<String, PathBuf>,

    /// Marker line introducing banner directives
    pub banner_marker: String,

    /// Default bound for `call` and custom steps
    pub step_timeout_ms: u64,
}

impl Default for EnvironmentsConfig {
    fn default() -> Self {
        Self {
            definitions: vec!["**/*.env.yaml".to_string()],
            tests: vec!["**/*Spec.js".to_string()],
            templates: Vec::new(),
            template_namespace: "ke-fixture".to_string(),
            custom_paths: BTreeMap::new(),
            banner_marker: DEFAULT_MARKER.to_string(),
            step_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, falling back to defaults if it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_yaml(&content)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        let env = &self.environments;
        if env.step_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "stepTimeoutMs must be greater than zero".to_string(),
            ));
        }
        if env.template_namespace.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "templateNamespace must not be empty".to_string(),
            ));
        }
        if env.banner_marker.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "bannerMarker must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Default step timeout
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.environments.step_timeout_ms)
    }
}

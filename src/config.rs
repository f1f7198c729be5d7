//! Configuration for the manager and for the execution engine.
//!
//! Both are plain structs built once, when the [`Manager`](crate::Manager) is
//! created. They can be assembled in code with the builder-style setters or
//! deserialized from JSON.

use std::collections::BTreeSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings governing how addons are loaded and how their tasks are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// If `true`, stop the current run on the first task generation error.
    pub strict: bool,
    /// Prepended to every generated task group identifier, so that several
    /// managers can share one execution backend.
    pub task_prefix: String,
    /// Names of registry entries which should not be instantiated.
    pub disable_addons: BTreeSet<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            strict: true,
            task_prefix: String::new(),
            disable_addons: BTreeSet::new(),
        }
    }
}

impl ManagerConfig {
    /// Loads the configuration from a JSON file. Missing keys take their
    /// default values.
    pub fn from_json_file(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_owned(), e))?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse(path.to_owned(), e))
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn task_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.task_prefix = prefix.into();
        self
    }

    pub fn disable_addon(mut self, name: impl Into<String>) -> Self {
        self.disable_addons.insert(name.into());
        self
    }
}

/// Serialization format of the engine's state file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Cbor,
    Json,
}

/// Fixed configuration handed to the execution engine on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where the engine keeps its staleness tracking state.
    pub dep_file: Utf8PathBuf,
    pub backend: Backend,
    /// 0 is silent, 1 reports task names, 2 also shows command output.
    pub verbosity: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dep_file: Utf8PathBuf::from(".shikumi.db"),
            backend: Backend::Cbor,
            verbosity: 2,
        }
    }
}

impl EngineConfig {
    pub fn dep_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.dep_file = path.into();
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }
}

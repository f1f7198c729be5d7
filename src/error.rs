use camino::Utf8PathBuf;
use thiserror::Error;

/// Top-level error returned by [`Manager`](crate::Manager) operations.
#[derive(Debug, Error)]
pub enum ShikumiError {
    #[error("Error while loading configuration:\n{0}")]
    Config(#[from] ConfigError),

    #[error("Invalid hook lattice:\n{0}")]
    Lattice(#[from] LatticeError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read config file '{0}'.\n{1}")]
    Read(Utf8PathBuf, std::io::Error),

    #[error("Couldn't parse config file '{0}'.\n{1}")]
    Parse(Utf8PathBuf, serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LatticeError {
    #[error("Hook '{0}' is declared more than once")]
    DuplicateHook(String),

    #[error("Hook '{0}' is not part of the hook order")]
    UnknownHook(String),

    #[error("Hook '{hook}' can't have '{parent}' as its parent, it doesn't come earlier")]
    ForwardParent { hook: String, parent: String },

    #[error("Hooks '{first}' and '{second}' both produce the task group '{key}'")]
    KeyCollision {
        key: String,
        first: String,
        second: String,
    },
}

/// An addon factory failed while being instantiated.
///
/// These never abort a build; the registry logs them and leaves the addon
/// out.
#[derive(Debug, Error)]
#[error("Addon '{name}' failed to load:\n{cause}")]
pub struct AddonError {
    pub name: String,
    pub cause: anyhow::Error,
}

/// An addon failed while producing tasks for a task group.
#[derive(Debug, Error)]
#[error("[{attr}] [{addon}] {cause}")]
pub struct GenerationError {
    /// Task group identifier, e.g. `post_build`.
    pub attr: String,
    /// Name of the offending addon.
    pub addon: String,
    pub cause: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    #[error("Unknown flag '{0}'")]
    UnknownFlag(String),

    #[error("Task group '{0}' ended up waiting on itself")]
    Cycle(String),

    #[error("Task generation failed.\n{0}")]
    Generation(#[from] GenerationError),

    #[error("Task '{0}':\n{1}")]
    Action(String, anyhow::Error),

    #[error("Task '{0}' depends on missing file '{1}'")]
    MissingDependency(String, Utf8PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Couldn't access the state file.\n{0}")]
    State(#[from] StateError),
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    CborRead(#[from] ciborium::de::Error<std::io::Error>),

    #[error(transparent)]
    CborWrite(#[from] ciborium::ser::Error<std::io::Error>),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

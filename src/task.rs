//! Task records produced by addons.

use std::fmt::Debug;
use std::sync::Arc;

use camino::Utf8PathBuf;

type ActionFn = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// A single executable step of a [`Task`].
#[derive(Clone)]
pub enum Action {
    /// Program and arguments, executed as a child process.
    Cmd(Vec<String>),
    /// In-process callback.
    Func(ActionFn),
}

impl Action {
    pub fn cmd<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Action::Cmd(argv.into_iter().map(Into::into).collect())
    }

    pub fn func<F>(func: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Action::Func(Arc::new(func))
    }
}

impl Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Cmd(argv) => f.debug_tuple("Action::Cmd").field(argv).finish(),
            Action::Func(_) => write!(f, "Action::Func(*)"),
        }
    }
}

/// An atomic unit of work with declared inputs and outputs.
///
/// Addons yield these from their capabilities. The `name` only has to be
/// unique within the addon; the generator prefixes it with the addon name.
#[derive(Debug, Clone, Default)]
pub struct Task {
    pub name: String,
    pub actions: Vec<Action>,
    /// Files read by the task, used for staleness tracking.
    pub file_dep: Vec<Utf8PathBuf>,
    /// Files written by the task.
    pub targets: Vec<Utf8PathBuf>,
    /// Task identifiers which must run before this one.
    pub task_dep: Vec<String>,
    pub doc: Option<String>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn file_dep(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.file_dep.push(path.into());
        self
    }

    pub fn target(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.targets.push(path.into());
        self
    }

    pub fn task_dep(mut self, id: impl Into<String>) -> Self {
        self.task_dep.push(id.into());
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Returns a copy named `<addon>:<name>`, leaving `self` as it was.
    pub(crate) fn namespaced(&self, addon: &str) -> Self {
        Self {
            name: format!("{addon}:{}", self.name),
            ..self.clone()
        }
    }
}

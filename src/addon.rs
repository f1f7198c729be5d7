//! The capability interface addons implement.
//!
//! An addon declares a set of capability names, each of which is the
//! identifier of a task group (`pre_build`, `build`, `post_build`, ...). When
//! the execution engine enumerates that group, every addon declaring it is
//! asked for a lazy stream of [`Task`]s.

use std::collections::{BTreeMap, BTreeSet};

use crate::Context;
use crate::task::Task;

/// A lazy sequence of tasks. Pulling from it may fail, which counts as a
/// task generation error for the addon that produced it.
pub type TaskStream = Box<dyn Iterator<Item = anyhow::Result<Task>>>;

/// A pluggable unit of build logic contributing tasks.
pub trait Addon<G: Send + Sync = ()>: Send + Sync {
    /// Capability names this addon responds to.
    fn capabilities(&self) -> BTreeSet<String>;

    /// Produces the tasks for `capability`.
    ///
    /// Only ever called with names contained in
    /// [`capabilities`](Addon::capabilities).
    fn invoke(&self, capability: &str, context: &Context<G>) -> anyhow::Result<TaskStream>;
}

type CapabilityFn<G> = Box<dyn Fn(&Context<G>) -> anyhow::Result<Vec<Task>> + Send + Sync>;

/// An addon assembled from closures, one per capability.
///
/// # Example
///
/// ```rust
/// use shikumi::{Action, FnAddon, Task};
///
/// let addon: FnAddon = FnAddon::new()
///     .on("build", |_| {
///         Ok(vec![Task::new("hello").action(Action::func(|| Ok(())))])
///     });
/// ```
pub struct FnAddon<G: Send + Sync = ()> {
    capabilities: BTreeMap<String, CapabilityFn<G>>,
}

impl<G: Send + Sync> FnAddon<G> {
    pub fn new() -> Self {
        Self {
            capabilities: BTreeMap::new(),
        }
    }

    /// Registers the task producer for `capability`, replacing any previous
    /// one.
    pub fn on<F>(mut self, capability: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Context<G>) -> anyhow::Result<Vec<Task>> + Send + Sync + 'static,
    {
        self.capabilities.insert(capability.into(), Box::new(func));
        self
    }
}

impl<G: Send + Sync> Default for FnAddon<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Send + Sync> Addon<G> for FnAddon<G> {
    fn capabilities(&self) -> BTreeSet<String> {
        self.capabilities.keys().cloned().collect()
    }

    fn invoke(&self, capability: &str, context: &Context<G>) -> anyhow::Result<TaskStream> {
        let func = self
            .capabilities
            .get(capability)
            .ok_or_else(|| anyhow::anyhow!("no capability named '{capability}'"))?;

        let tasks = func(context)?;
        Ok(Box::new(tasks.into_iter().map(Ok)))
    }
}

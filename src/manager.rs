use std::sync::Arc;

use camino::Utf8Path;

use crate::Context;
use crate::config::{EngineConfig, ManagerConfig};
use crate::engine::{Engine, Report, Runner};
use crate::error::{EngineError, ShikumiError};
use crate::generator::{TaskTable, build_task_table};
use crate::lattice::Lattice;
use crate::registry::{Addons, Registry, load_addons};

/// Builds and runs a site from a set of addons.
///
/// Creating a manager instantiates every enabled addon from the registry
/// and registers one task group per (hook, phase) slot of the lattice. No
/// addon is asked for tasks at this point; that happens when the engine
/// pulls a group during [`run`](Manager::run).
///
/// # Example
///
/// ```rust,no_run
/// use shikumi::{Action, FnAddon, Manager, ManagerConfig, Registry, Task};
///
/// let mut registry = Registry::new();
/// registry.register("static", |_| {
///     Ok(FnAddon::<()>::new().on("init", |_| {
///         Ok(vec![Task::new("copy").action(Action::cmd(["cp", "-r", "static", "dist"]))])
///     }))
/// });
///
/// let manager = Manager::new(ManagerConfig::default(), (), &registry);
/// manager.run("build", &[]).unwrap();
/// ```
pub struct Manager<G: Send + Sync = ()> {
    context: Arc<Context<G>>,
    addons: Addons<G>,
    table: TaskTable,
    engine: EngineConfig,
}

impl<G: Send + Sync + 'static> Manager<G> {
    /// Creates a manager using the stock [`Lattice::lite`] hooks.
    pub fn new(config: ManagerConfig, data: G, registry: &Registry<G>) -> Self {
        Self::with_lattice(config, data, registry, &Lattice::lite())
    }

    pub fn with_lattice(
        config: ManagerConfig,
        data: G,
        registry: &Registry<G>,
        lattice: &Lattice,
    ) -> Self {
        let context = Arc::new(Context::new(config, data));

        tracing::debug!("[addon] loading ...");
        let addons = load_addons(registry, &context.config.disable_addons, &context);
        tracing::debug!("[addon] ... OK {} addons", addons.len());

        tracing::debug!("[tasks] loading ...");
        let table = build_task_table(lattice, &addons, &context);
        tracing::debug!("[tasks] ... OK {} task groups", table.len());

        Self {
            context,
            addons,
            table,
            engine: EngineConfig::default(),
        }
    }

    /// Same as [`Manager::new`], with the configuration read from a JSON
    /// file.
    pub fn from_config_file(
        path: impl AsRef<Utf8Path>,
        data: G,
        registry: &Registry<G>,
    ) -> Result<Self, ShikumiError> {
        let config = ManagerConfig::from_json_file(path)?;
        Ok(Self::new(config, data, registry))
    }

    /// Replaces the configuration handed to the engine.
    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine = config;
        self
    }

    pub fn context(&self) -> &Context<G> {
        &self.context
    }

    /// Names of the addons which loaded successfully.
    pub fn addons(&self) -> impl Iterator<Item = &str> {
        self.addons.keys().map(String::as_str)
    }

    pub fn table(&self) -> &TaskTable {
        &self.table
    }

    /// Runs `task` (a group id, qualified task name or pattern) with the
    /// bundled [`Runner`].
    pub fn run(&self, task: &str, args: &[&str]) -> Result<Report, EngineError> {
        self.run_with(&mut Runner::new(), task, args)
    }

    /// Runs `task` with a custom engine. Whatever the engine reports is
    /// passed through as is.
    pub fn run_with<E>(&self, engine: &mut E, task: &str, args: &[&str]) -> Result<Report, EngineError>
    where
        E: Engine,
    {
        let argv: Vec<String> = std::iter::once(task)
            .chain(args.iter().copied())
            .map(String::from)
            .collect();

        tracing::debug!("[run] {}", argv.join(" "));
        engine.run(&self.table, &self.engine, &argv)
    }
}

//! The execution side: the interface a task engine implements, plus a
//! reference engine.
//!
//! The manager never drives task groups itself. It hands the finished
//! [`TaskTable`] to an [`Engine`] together with a fixed [`EngineConfig`] and
//! the requested task selectors, and the engine decides when each group is
//! enumerated and executed.

mod runner;
mod state;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::generator::TaskTable;

pub use runner::Runner;

/// Something able to execute a task table.
pub trait Engine {
    /// Runs the tasks selected by `args`.
    ///
    /// `args[0]` is the task group id or pattern requested by the caller,
    /// the rest are extra selectors or engine flags. An engine must not
    /// enumerate a group before the group it waits on (see
    /// [`Producer::after`](crate::Producer::after)) has completed.
    fn run(
        &mut self,
        table: &TaskTable,
        config: &EngineConfig,
        args: &[String],
    ) -> Result<Report, EngineError>;
}

/// Outcome of a successful engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Fully qualified names of the tasks whose actions ran, in order.
    pub executed: Vec<String>,
    /// Tasks skipped because their inputs didn't change.
    pub up_to_date: Vec<String>,
}

/// Name a task goes by inside the engine, `<group>:<addon>:<task>`.
pub(crate) fn qualified(group: &str, task: &str) -> String {
    format!("{group}:{task}")
}

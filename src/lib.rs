#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod addon;
mod config;
mod core;
mod engine;
mod error;
mod generator;
mod lattice;
mod manager;
mod registry;
mod task;
mod utils;

pub use crate::addon::{Addon, FnAddon, TaskStream};
pub use crate::config::{Backend, EngineConfig, ManagerConfig};
pub use crate::core::Context;
pub use crate::engine::{Engine, Report, Runner};
pub use crate::error::*;
pub use crate::generator::{Producer, TaskTable, Tasks, build_task_table};
pub use crate::lattice::{Entry, Lattice, Phase};
pub use crate::manager::Manager;
pub use crate::registry::{Addons, Factory, Registry, load_addons};
pub use crate::task::{Action, Task};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;

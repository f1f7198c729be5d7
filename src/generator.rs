//! Turns the lattice and the loaded addons into a table of task groups.
//!
//! Every (hook, phase) slot becomes one [`Producer`]. A producer doesn't hold
//! any tasks; it knows which addons declared its capability and asks them
//! for tasks only when the engine pulls from it. Groups are linked by
//! create-after edges, so a group is never enumerated before the group it
//! waits on has finished, which lets addons derive task names or targets
//! from files an earlier phase produced.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use petgraph::Graph;
use petgraph::graph::NodeIndex;

use crate::Context;
use crate::addon::{Addon, TaskStream};
use crate::error::GenerationError;
use crate::lattice::Lattice;
use crate::registry::Addons;
use crate::task::Task;
use crate::utils::catch_panic;

/// Lazy stream of tasks pulled out of a task group.
pub type Tasks<'a> = Box<dyn Iterator<Item = Result<Task, GenerationError>> + 'a>;

/// Type-erased source of tasks, hides the user data type `G` from the
/// engine.
trait Enumerate: Send + Sync {
    fn enumerate(&self) -> Tasks<'_>;
}

/// Everything needed to query the addons contributing to a single group.
struct Gather<G: Send + Sync> {
    attr: String,
    addons: Vec<(String, Arc<dyn Addon<G>>)>,
    context: Arc<Context<G>>,
}

impl<G: Send + Sync + 'static> Enumerate for Gather<G> {
    fn enumerate(&self) -> Tasks<'_> {
        Box::new(Pull {
            gather: self,
            next: 0,
            current: None,
            halted: false,
        })
    }
}

/// Walks the contributing addons one at a time, draining each stream before
/// invoking the next addon.
struct Pull<'a, G: Send + Sync> {
    gather: &'a Gather<G>,
    next: usize,
    current: Option<(&'a str, TaskStream)>,
    halted: bool,
}

impl<G: Send + Sync> Pull<'_, G> {
    /// Logs a failed addon. Returns the error to surface if the run is
    /// strict, in which case nothing more is pulled from this group.
    fn fail(&mut self, addon: &str, cause: anyhow::Error) -> Option<GenerationError> {
        let attr = &self.gather.attr;
        tracing::error!("[{attr}] [{addon}] [ERR] {cause:#}");

        if !self.gather.context.is_strict() {
            return None;
        }

        self.halted = true;
        Some(GenerationError {
            attr: attr.clone(),
            addon: addon.to_owned(),
            cause,
        })
    }
}

impl<G: Send + Sync> Iterator for Pull<'_, G> {
    type Item = Result<Task, GenerationError>;

    fn next(&mut self) -> Option<Self::Item> {
        let gather = self.gather;

        while !self.halted {
            if let Some((name, mut stream)) = self.current.take() {
                match catch_panic(|| stream.next().transpose()) {
                    Ok(Some(task)) => {
                        self.current = Some((name, stream));
                        return Some(Ok(task.namespaced(name)));
                    }
                    // stream exhausted, move on to the next addon
                    Ok(None) => continue,
                    Err(cause) => match self.fail(name, cause) {
                        Some(err) => return Some(Err(err)),
                        None => continue,
                    },
                }
            }

            let (name, addon) = gather.addons.get(self.next)?;
            self.next += 1;

            match catch_panic(|| addon.invoke(&gather.attr, &gather.context)) {
                Ok(stream) => self.current = Some((name.as_str(), stream)),
                Err(cause) => {
                    if let Some(err) = self.fail(name, cause) {
                        return Some(Err(err));
                    }
                }
            }
        }

        None
    }
}

/// A registered task group.
pub struct Producer {
    id: String,
    after: Option<String>,
    providers: Vec<String>,
    source: Arc<dyn Enumerate>,
}

impl Producer {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The group which must complete before this one may be enumerated.
    pub fn after(&self) -> Option<&str> {
        self.after.as_deref()
    }

    /// Names of the addons which declared this group's capability.
    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    /// Starts pulling tasks out of the contributing addons.
    ///
    /// Nothing is asked of the addons before this is called, and then only
    /// as far as the returned iterator is driven.
    pub fn enumerate(&self) -> Tasks<'_> {
        tracing::debug!("[tasks] [{}] enumerating", self.id);
        self.source.enumerate()
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("id", &self.id)
            .field("after", &self.after)
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}

/// All task groups of a manager, linked by create-after edges.
///
/// Nodes are kept in lattice order; an edge `a -> b` means `b` waits for
/// `a`.
#[derive(Default)]
pub struct TaskTable {
    graph: Graph<Producer, ()>,
    index: HashMap<String, NodeIndex>,
}

impl TaskTable {
    fn insert(&mut self, producer: Producer) {
        let after = producer.after.clone();
        let id = producer.id.clone();
        let node = self.graph.add_node(producer);

        if let Some(after) = after {
            match self.index.get(&after) {
                Some(&prev) => {
                    self.graph.add_edge(prev, node, ());
                }
                None => tracing::warn!("[tasks] [{id}] waits on unknown group '{after}'"),
            }
        }

        self.index.insert(id, node);
    }

    pub fn get(&self, id: &str) -> Option<&Producer> {
        self.index.get(id).map(|&node| &self.graph[node])
    }

    /// Group identifiers in lattice order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(Producer::id)
    }

    pub fn producers(&self) -> impl Iterator<Item = &Producer> {
        self.graph.node_weights()
    }

    /// The group `id` has to wait for, if any.
    pub fn predecessor(&self, id: &str) -> Option<&Producer> {
        let node = *self.index.get(id)?;
        self.graph
            .neighbors_directed(node, petgraph::Direction::Incoming)
            .next()
            .map(|prev| &self.graph[prev])
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

impl Display for TaskTable {
    /// Renders the table as a Mermaid flowchart, with the contributing
    /// addons listed under each group.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            let producer = &self.graph[index];
            let id = producer.id.replace('"', "\\\"");

            if producer.providers.is_empty() {
                writeln!(f, "    {}[\"{}\"]", index.index(), id)?;
            } else {
                let providers = producer.providers.join(", ");
                writeln!(f, "    {}[\"{}\\n{}\"]", index.index(), id, providers)?;
            }
        }

        for edge in self.graph.raw_edges() {
            writeln!(
                f,
                "    {} --> {}",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        Ok(())
    }
}

/// Registers one producer per (hook, phase) slot of `lattice`.
///
/// Group identifiers and capability names are `prefix + phase + hook`, with
/// the prefix and the strictness taken from the context configuration.
pub fn build_task_table<G>(
    lattice: &Lattice,
    addons: &Addons<G>,
    context: &Arc<Context<G>>,
) -> TaskTable
where
    G: Send + Sync + 'static,
{
    let mut table = TaskTable::default();

    for entry in lattice.entries(context.task_prefix()) {
        let contributing: Vec<_> = addons
            .iter()
            .filter(|(_, addon)| addon.capabilities().contains(&entry.attr))
            .map(|(name, addon)| (name.clone(), addon.clone()))
            .collect();

        let providers = contributing.iter().map(|(name, _)| name.clone()).collect();

        tracing::debug!(
            "[tasks] [{}] {} addon(s), after {:?}",
            entry.attr,
            contributing.len(),
            entry.after
        );

        table.insert(Producer {
            id: entry.attr.clone(),
            after: entry.after,
            providers,
            source: Arc::new(Gather {
                attr: entry.attr,
                addons: contributing,
                context: context.clone(),
            }),
        });
    }

    table
}

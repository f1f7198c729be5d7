//! Hooks, phases, and the order in which their task groups are chained.
//!
//! Every hook is split into three phases, `pre_`, main and `post_`. Walking
//! the hooks in order and the phases within each hook yields a flat sequence
//! of task groups, each waiting on the one before it. A hook may name a
//! *parent*; its `pre_` group then waits on the parent's `post_` group
//! instead, so sibling hooks such as `serve` and `archive` can both hang off
//! `build` without depending on each other.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::ArcStr;
use crate::error::LatticeError;

/// A sub-stage applied to every hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Pre,
    Main,
    Post,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 3] = [Phase::Pre, Phase::Main, Phase::Post];

    /// Prefix this phase contributes to a task group identifier.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Pre => "pre_",
            Phase::Main => "",
            Phase::Post => "post_",
        }
    }
}

/// One (hook, phase) slot of the lattice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub hook: ArcStr,
    pub phase: Phase,
    /// Task group identifier, `prefix + phase label + hook`. This is also
    /// the capability name addons declare to contribute to the group.
    pub attr: String,
    /// Identifier of the group which has to finish before this one is
    /// enumerated. `None` only for the very first entry.
    pub after: Option<String>,
}

/// Ordered hooks plus the parent relation between them.
#[derive(Debug, Clone)]
pub struct Lattice {
    hooks: Vec<ArcStr>,
    parents: HashMap<ArcStr, ArcStr>,
}

impl Lattice {
    /// Builds a lattice, checking that every parent comes strictly earlier
    /// than its child. Backward edges can't be expressed, so the result is
    /// always acyclic.
    pub fn new<H, P, S>(hooks: H, parents: P) -> Result<Self, LatticeError>
    where
        H: IntoIterator<Item = S>,
        P: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut order: Vec<ArcStr> = Vec::new();

        for hook in hooks {
            let hook = hook.as_ref();
            if !seen.insert(hook.to_owned()) {
                return Err(LatticeError::DuplicateHook(hook.to_owned()));
            }
            order.push(Arc::from(hook));
        }

        // `post_init` as a hook name would share a group with the post
        // phase of `init`.
        let mut keys: HashMap<String, &str> = HashMap::new();
        for hook in &order {
            for phase in Phase::ALL {
                let key = format!("{}{hook}", phase.label());
                if let Some(first) = keys.insert(key.clone(), hook) {
                    return Err(LatticeError::KeyCollision {
                        key,
                        first: first.to_owned(),
                        second: hook.to_string(),
                    });
                }
            }
        }

        let position = |name: &str| order.iter().position(|hook| &**hook == name);
        let mut map = HashMap::new();

        for (hook, parent) in parents {
            let (hook, parent) = (hook.as_ref(), parent.as_ref());
            let child = position(hook).ok_or_else(|| LatticeError::UnknownHook(hook.into()))?;
            let above = position(parent).ok_or_else(|| LatticeError::UnknownHook(parent.into()))?;

            if above >= child {
                return Err(LatticeError::ForwardParent {
                    hook: hook.into(),
                    parent: parent.into(),
                });
            }

            map.insert(order[child].clone(), order[above].clone());
        }

        Ok(Self {
            hooks: order,
            parents: map,
        })
    }

    /// The stock lattice used for site builds.
    ///
    /// `init` lays down the pristine site, `build` adds user content on top,
    /// and `check`, `serve` and `archive` all consume the finished build.
    /// `status` reports without side effects and comes first.
    pub fn lite() -> Self {
        let hooks: Vec<ArcStr> = ["status", "init", "build", "check", "serve", "archive"]
            .into_iter()
            .map(Arc::from)
            .collect();

        let parents = [
            ("build", "init"),
            ("check", "build"),
            ("serve", "build"),
            ("archive", "build"),
        ]
        .into_iter()
        .map(|(hook, parent)| (Arc::from(hook), Arc::from(parent)))
        .collect();

        Self { hooks, parents }
    }

    pub fn hooks(&self) -> impl Iterator<Item = &str> {
        self.hooks.iter().map(|hook| &**hook)
    }

    pub fn parent(&self, hook: &str) -> Option<&str> {
        self.parents.get(hook).map(|parent| &**parent)
    }

    /// Lays the lattice out as a flat sequence of task groups, each entry
    /// pointing at the group it has to wait for.
    pub fn entries(&self, prefix: &str) -> Vec<Entry> {
        let mut entries = Vec::with_capacity(self.hooks.len() * Phase::ALL.len());
        let mut prev: Option<String> = None;

        for hook in &self.hooks {
            for phase in Phase::ALL {
                if phase == Phase::Pre
                    && let Some(parent) = self.parents.get(hook)
                {
                    prev = Some(format!("{prefix}{}{parent}", Phase::Post.label()));
                }

                let attr = format!("{prefix}{}{hook}", phase.label());
                let after = prev.replace(attr.clone());

                entries.push(Entry {
                    hook: hook.clone(),
                    phase,
                    attr,
                    after,
                });
            }
        }

        entries
    }
}

impl Default for Lattice {
    fn default() -> Self {
        Self::lite()
    }
}

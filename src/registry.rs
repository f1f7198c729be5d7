//! Named addon factories and their instantiation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::Context;
use crate::addon::Addon;
use crate::error::AddonError;
use crate::utils::catch_panic;

/// Builds an addon instance against the manager context.
pub type Factory<G> =
    Box<dyn Fn(&Context<G>) -> anyhow::Result<Box<dyn Addon<G>>> + Send + Sync>;

/// Addon instances keyed by their registry name.
pub type Addons<G> = BTreeMap<String, Arc<dyn Addon<G>>>;

/// Explicit table of addon factories, filled in at startup.
pub struct Registry<G: Send + Sync = ()> {
    entries: BTreeMap<String, Factory<G>>,
}

impl<G: Send + Sync + 'static> Registry<G> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registers a factory under `name`. A later registration with the same
    /// name replaces the earlier one.
    pub fn register<F, A>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Context<G>) -> anyhow::Result<A> + Send + Sync + 'static,
        A: Addon<G> + 'static,
    {
        let name = name.into();
        let factory: Factory<G> = Box::new(move |ctx: &Context<G>| {
            factory(ctx).map(|addon| Box::new(addon) as Box<dyn Addon<G>>)
        });

        if self.entries.insert(name.clone(), factory).is_some() {
            tracing::debug!("[addon] [{name}] replaced an earlier registration");
        }

        self
    }

    pub fn get_named_entries(&self) -> &BTreeMap<String, Factory<G>> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Instantiates a single entry, turning both errors and panics from the
    /// factory into an [`AddonError`].
    fn instantiate(
        &self,
        name: &str,
        factory: &Factory<G>,
        context: &Context<G>,
    ) -> Result<Arc<dyn Addon<G>>, AddonError> {
        catch_panic(|| factory(context))
            .map(Arc::from)
            .map_err(|cause| AddonError {
                name: name.to_owned(),
                cause,
            })
    }
}

impl<G: Send + Sync + 'static> Default for Registry<G> {
    fn default() -> Self {
        Self::new()
    }
}

/// Instantiates every registered addon not named in `disabled`.
///
/// A factory failing is never fatal, regardless of `strict`: the failure is
/// logged and the addon is left out of the result.
pub fn load_addons<G>(
    registry: &Registry<G>,
    disabled: &BTreeSet<String>,
    context: &Context<G>,
) -> Addons<G>
where
    G: Send + Sync + 'static,
{
    let mut addons = Addons::new();

    for (name, factory) in registry.get_named_entries() {
        if disabled.contains(name) {
            tracing::info!("[addon] [{name}] skipped by config");
            continue;
        }

        tracing::debug!("[addon] [{name}] load ...");

        match registry.instantiate(name, factory, context) {
            Ok(addon) => {
                for capability in addon.capabilities() {
                    tracing::debug!("[addon] [{name}] ... will {capability}");
                }
                addons.insert(name.clone(), addon);
            }
            Err(err) => tracing::warn!("[addon] [{name}] FAIL\n{err}"),
        }
    }

    addons
}

use std::sync::Arc;

use crate::config::ManagerConfig;

/// Atomic reference-counted string type used for hook names.
pub(crate) type ArcStr = Arc<str>;

/// A 32-byte BLAKE3 hash used to fingerprint task inputs.
///
/// The reference engine stores one of these per `file_dep` entry in the
/// state file and compares them on the next run to decide whether a task is
/// up to date.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    #[cfg(test)]
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub(crate) fn hash_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        Ok(blake3::Hasher::new()
            .update_mmap_rayon(path)?
            .finalize()
            .into())
    }

    pub(crate) fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for byte in self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

/// Shared state handed to every addon factory and every capability call.
///
/// This plays the role of "the manager" from the addon's point of view: it
/// exposes the manager configuration and any user data, but not the addon
/// map or the task table, which stay owned by the [`Manager`](crate::Manager).
///
/// # Type Parameters
///
/// * `G`: user-defined global data. Use `()` if you don't need any.
pub struct Context<G: Send + Sync = ()> {
    /// Manager configuration in effect for this build.
    pub config: ManagerConfig,
    /// User-defined global data.
    pub data: G,
}

impl<G: Send + Sync> Context<G> {
    pub fn new(config: ManagerConfig, data: G) -> Self {
        Self { config, data }
    }

    /// Shorthand for `self.config.task_prefix`.
    pub fn task_prefix(&self) -> &str {
        &self.config.task_prefix
    }

    /// Shorthand for `self.config.strict`.
    pub fn is_strict(&self) -> bool {
        self.config.strict
    }
}

impl<G> std::fmt::Debug for Context<G>
where
    G: Send + Sync + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("data", &self.data)
            .finish()
    }
}

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::config::Backend;
use crate::error::StateError;

/// Digests of a task's `file_dep` set, taken when the task last succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Record {
    pub deps: BTreeMap<Utf8PathBuf, String>,
}

/// Contents of the state file, keyed by qualified task name.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct State {
    tasks: BTreeMap<String, Record>,
}

impl State {
    /// Reads the state file; a file which doesn't exist yet is an empty state.
    pub fn load(path: &Utf8Path, backend: Backend) -> Result<Self, StateError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let reader = BufReader::new(File::open(path)?);

        Ok(match backend {
            Backend::Cbor => ciborium::from_reader(reader)?,
            Backend::Json => serde_json::from_reader(reader)?,
        })
    }

    pub fn save(&self, path: &Utf8Path, backend: Backend) -> Result<(), StateError> {
        if let Some(dir) = path.parent()
            && !dir.as_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }

        let mut writer = BufWriter::new(File::create(path)?);

        match backend {
            Backend::Cbor => ciborium::into_writer(self, &mut writer)?,
            Backend::Json => serde_json::to_writer(&mut writer, self)?,
        }

        writer.flush()?;
        Ok(())
    }

    /// A task is up to date if it ran before with the same inputs and all of
    /// its targets are still there.
    pub fn is_up_to_date(&self, name: &str, record: &Record, targets: &[Utf8PathBuf]) -> bool {
        self.tasks.get(name) == Some(record) && targets.iter().all(|target| target.exists())
    }

    pub fn record(&mut self, name: String, record: Record) {
        self.tasks.insert(name, record);
    }

    pub fn forget(&mut self, name: &str) {
        self.tasks.remove(name);
    }
}

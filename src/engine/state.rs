//! Engine state persisted across restarts.
//!
//! Holds the registry entries and the generated monitoring password as JSON.
//! Writes go to a sibling temp file that is renamed over the target, so a
//! crash mid-write leaves the previous state intact.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::Backend;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error on state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Serializable engine state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineState {
    pub backends: Vec<Backend>,
    pub generated_password: Option<String>,
}

impl EngineState {
    /// Load state from `path`; a missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = ?path, "No state file, starting empty");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(StateError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let state: Self =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| StateError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(
            path = ?path,
            backends = state.backends.len(),
            "Restored engine state"
        );
        Ok(state)
    }

    /// Write state to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let io_err = |source| StateError::Io {
            path: path.to_path_buf(),
            source,
        };
        let contents = serde_json::to_vec_pretty(self).map_err(|source| StateError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

        let mut temp = path.as_os_str().to_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        let mut file = File::create(&temp).map_err(io_err)?;
        file.write_all(&contents).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        fs::rename(&temp, path).map_err(io_err)?;

        tracing::debug!(path = ?path, backends = self.backends.len(), "Saved engine state");
        Ok(())
    }
}

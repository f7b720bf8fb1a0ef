//! Persistence adapter for the "was running" hint.
//!
//! The hint survives restarts so the first paint can show the last known state
//! before the engine answers. It is advisory only; the session never treats it
//! as ground truth.

use crate::error::HintError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "mining-control";
const HINT_FILE: &str = "session_hint.json";

pub trait HintStore: Send {
    /// `None` when no hint has been recorded.
    fn load(&self) -> Result<Option<bool>, HintError>;

    fn store(&self, was_running: bool) -> Result<(), HintError>;

    fn clear(&self) -> Result<(), HintError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct HintFile {
    was_running: bool,
}

/// JSON file under the platform data directory.
#[derive(Debug, Clone)]
pub struct FileHintStore {
    path: PathBuf,
}

/// Directory holding the session hint and the TUI log file.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join(APP_DIR))
}

impl FileHintStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_local_dir>/mining-control/session_hint.json`
    pub fn default_path() -> Result<PathBuf, HintError> {
        let dir = data_dir().ok_or(HintError::NoDataDir)?;
        Ok(dir.join(HINT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> HintError {
        HintError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl HintStore for FileHintStore {
    fn load(&self) -> Result<Option<bool>, HintError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        let hint: HintFile = serde_json::from_slice(&raw).map_err(|source| HintError::Decode {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(hint.was_running))
    }

    fn store(&self, was_running: bool) -> Result<(), HintError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let body = serde_json::to_vec(&HintFile { was_running }).map_err(|source| {
            HintError::Encode {
                path: self.path.clone(),
                source,
            }
        })?;
        // Write-then-rename so a crash never leaves a torn file behind.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }

    fn clear(&self) -> Result<(), HintError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

/// In-memory store that records every write.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub(crate) struct MemoryHintStore {
    inner: std::sync::Arc<std::sync::Mutex<(Option<bool>, Vec<bool>)>>,
}

#[cfg(test)]
impl MemoryHintStore {
    pub fn with_hint(hint: Option<bool>) -> Self {
        let store = Self::default();
        store.inner.lock().expect("hint lock").0 = hint;
        store
    }

    pub fn current(&self) -> Option<bool> {
        self.inner.lock().expect("hint lock").0
    }

    pub fn writes(&self) -> Vec<bool> {
        self.inner.lock().expect("hint lock").1.clone()
    }
}

#[cfg(test)]
impl HintStore for MemoryHintStore {
    fn load(&self) -> Result<Option<bool>, HintError> {
        Ok(self.current())
    }

    fn store(&self, was_running: bool) -> Result<(), HintError> {
        let mut inner = self.inner.lock().expect("hint lock");
        inner.0 = Some(was_running);
        inner.1.push(was_running);
        Ok(())
    }

    fn clear(&self) -> Result<(), HintError> {
        self.inner.lock().expect("hint lock").0 = None;
        Ok(())
    }
}

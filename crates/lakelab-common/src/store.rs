//! On-disk persistence for [`LabState`]
//!
//! One JSON document per lab at `<dir>/<lab>.json`. Saves always replace the
//! whole record through a temp file in the same directory followed by a
//! rename, so a crash leaves either the previous record or the new one.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::state::{migrate, LabState};
use crate::{Error, Result};

/// Loads and saves lab records
#[derive(Clone, Debug)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Create a store rooted at `dir` (created lazily on first save)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the state files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the state file for a lab
    pub fn path_for(&self, lab_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", lab_name))
    }

    /// Load the record for a lab.
    ///
    /// A missing file yields a fresh initial record. A file that does not
    /// parse, fails migration, names a different lab, or violates the phase
    /// chain is `StateCorruption`.
    pub fn load(&self, lab_name: &str) -> Result<LabState> {
        let path = self.path_for(lab_name);

        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(lab = %lab_name, path = %path.display(), "no state file, starting fresh");
                return Ok(LabState::new(lab_name));
            }
            Err(e) => return Err(e.into()),
        };

        let doc: serde_json::Value = serde_json::from_slice(&data)
            .map_err(|e| Error::corruption(&path, format!("invalid JSON: {}", e)))?;
        let doc = migrate(doc).map_err(|e| Error::corruption(&path, e))?;
        let state: LabState = serde_json::from_value(doc)
            .map_err(|e| Error::corruption(&path, format!("schema mismatch: {}", e)))?;

        if state.lab_name != lab_name {
            return Err(Error::corruption(
                &path,
                format!("record belongs to lab '{}'", state.lab_name),
            ));
        }
        state
            .validate()
            .map_err(|e| Error::corruption(&path, e.to_string()))?;

        debug!(lab = %lab_name, phase = %state.phase(), "loaded lab state");
        Ok(state)
    }

    /// Persist the full record, refreshing `updatedAt`.
    ///
    /// The record is validated first; an invalid record is never written.
    pub fn save(&self, state: &mut LabState) -> Result<()> {
        state.validate()?;
        state.touch();

        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&state.lab_name);
        let data = serde_json::to_vec_pretty(state)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;

        info!(lab = %state.lab_name, phase = %state.phase(), "saved lab state");
        Ok(())
    }
}

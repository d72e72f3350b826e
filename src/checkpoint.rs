use crate::config::RunMode;
use crate::util::{ensure_parent_dir, now_rfc3339};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Sentinel for "no row committed yet".
pub const NO_ROW: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub last_completed_index: i64,
    pub total_row_count: usize,
    pub output_file: String,
    pub mode: RunMode,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_sha256: Option<String>,
}

impl CheckpointState {
    pub fn fresh(output_file: &Path) -> Self {
        Self {
            last_completed_index: NO_ROW,
            total_row_count: 0,
            output_file: output_file.display().to_string(),
            mode: RunMode::Production,
            timestamp: now_rfc3339(),
            input_sha256: None,
        }
    }

    /// First row index the next production batch should start from.
    pub fn next_index(&self) -> usize {
        (self.last_completed_index + 1).max(0) as usize
    }

    pub fn committed_rows(&self) -> usize {
        self.next_index()
    }

    /// Copy of this state advanced to `index`, stamped now.
    pub fn advanced_to(&self, index: usize) -> Self {
        Self {
            last_completed_index: index as i64,
            timestamp: now_rfc3339(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Missing,
    Loaded,
    /// The store held something unusable; the state fell back to a fresh one.
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct LoadedCheckpoint {
    pub state: CheckpointState,
    pub status: LoadStatus,
}

impl LoadedCheckpoint {
    fn fresh(default_output: &Path, status: LoadStatus) -> Self {
        if let LoadStatus::Corrupt(reason) = &status {
            warn!("checkpoint unusable, restarting from row 0: {reason}");
        }
        Self {
            state: CheckpointState::fresh(default_output),
            status,
        }
    }
}

/// Persistence seam for resume state. One writer at a time; no locking.
pub trait CheckpointStore {
    /// Never fails: absent or invalid state degrades to a fresh one.
    fn load(&self, default_output: &Path) -> LoadedCheckpoint;
    fn save(&mut self, state: &CheckpointState) -> Result<()>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for &mut S {
    fn load(&self, default_output: &Path) -> LoadedCheckpoint {
        (**self).load(default_output)
    }

    fn save(&mut self, state: &CheckpointState) -> Result<()> {
        (**self).save(state)
    }
}

/// Structural validation shared by every store.
pub fn decode_state(raw: &[u8]) -> std::result::Result<CheckpointState, String> {
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        return Err("checkpoint is empty".to_string());
    }
    let state: CheckpointState =
        serde_json::from_slice(raw).map_err(|e| format!("invalid checkpoint JSON: {e}"))?;
    if state.last_completed_index < NO_ROW {
        return Err(format!(
            "last_completed_index {} is below {}",
            state.last_completed_index, NO_ROW
        ));
    }
    if state.mode != RunMode::Production {
        return Err(format!("checkpoint mode is {:?}, expected production", state.mode));
    }
    if state.total_row_count > 0 && state.last_completed_index >= state.total_row_count as i64 {
        return Err(format!(
            "last_completed_index {} exceeds total_row_count {}",
            state.last_completed_index, state.total_row_count
        ));
    }
    if state.output_file.trim().is_empty() {
        return Err("checkpoint has no output_file".to_string());
    }
    Ok(state)
}

pub fn encode_state(state: &CheckpointState) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(state).context("serializing checkpoint")
}

fn load_from(raw: Option<Vec<u8>>, default_output: &Path) -> LoadedCheckpoint {
    let Some(raw) = raw else {
        return LoadedCheckpoint::fresh(default_output, LoadStatus::Missing);
    };
    match decode_state(&raw) {
        Ok(state) => LoadedCheckpoint {
            state,
            status: LoadStatus::Loaded,
        },
        Err(reason) => LoadedCheckpoint::fresh(default_output, LoadStatus::Corrupt(reason)),
    }
}

/// JSON checkpoint on disk, replaced via write-temp-then-rename.
pub struct FileCheckpointStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: &Path) -> Self {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        Self {
            path: path.to_path_buf(),
            tmp_path: PathBuf::from(tmp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, default_output: &Path) -> LoadedCheckpoint {
        let raw = match fs::read(&self.path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return LoadedCheckpoint::fresh(
                    default_output,
                    LoadStatus::Corrupt(format!("reading {}: {e}", self.path.display())),
                );
            }
        };
        load_from(raw, default_output)
    }

    fn save(&mut self, state: &CheckpointState) -> Result<()> {
        ensure_parent_dir(&self.path)?;
        let bytes = encode_state(state)?;
        {
            let mut file = File::create(&self.tmp_path)
                .with_context(|| format!("creating {}", self.tmp_path.display()))?;
            file.write_all(&bytes)
                .with_context(|| format!("writing {}", self.tmp_path.display()))?;
            file.sync_all()
                .with_context(|| format!("syncing {}", self.tmp_path.display()))?;
        }
        fs::rename(&self.tmp_path, &self.path).with_context(|| {
            format!(
                "renaming {} -> {}",
                self.tmp_path.display(),
                self.path.display()
            )
        })?;
        sync_parent(&self.path);
        debug!(
            last_completed_index = state.last_completed_index,
            "checkpoint saved"
        );
        Ok(())
    }
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    // Makes the rename itself durable; failure only weakens crash guarantees.
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

/// Process-local store with the same encoding and validation as the file store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    raw: Option<Vec<u8>>,
    saves: Vec<CheckpointState>,
    fail_after: Option<usize>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with arbitrary bytes, valid or not.
    pub fn with_raw(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            raw: Some(raw.into()),
            ..Self::default()
        }
    }

    /// Makes every `save` fail, as an unwritable store would.
    pub fn failing() -> Self {
        Self::failing_after(0)
    }

    /// Accepts `n` saves, then fails every later one.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn saves(&self) -> &[CheckpointState] {
        &self.saves
    }

    pub fn current(&self) -> Option<CheckpointState> {
        self.raw.as_deref().and_then(|raw| decode_state(raw).ok())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, default_output: &Path) -> LoadedCheckpoint {
        load_from(self.raw.clone(), default_output)
    }

    fn save(&mut self, state: &CheckpointState) -> Result<()> {
        if self.fail_after.is_some_and(|n| self.saves.len() >= n) {
            bail!("checkpoint store is not writable");
        }
        self.raw = Some(encode_state(state)?);
        self.saves.push(state.clone());
        Ok(())
    }
}

//! Persisted run state (status flag) and completion record formats.
//!
//! The status flag is the only memory that survives a reboot. Its layout is
//! versioned through `schema_version`; files written by a newer layout are
//! rejected instead of half-parsed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::UpgradeOptions;
use crate::error::DistupError;
use crate::phase::Phase;

/// Current layout of the status flag file.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Durable state of one upgrade run.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RunState {
    pub schema_version: u32,
    pub upgrader: String,
    pub phase: Phase,
    /// Last stage of `phase` that ran to completion.
    #[serde(default)]
    pub last_completed_stage: Option<String>,
    /// Options the run was started with; reused on resume.
    pub options: UpgradeOptions,
    /// Set once the finish pass has run all of its stages.
    #[serde(default)]
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(upgrader: &str, options: UpgradeOptions) -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            upgrader: upgrader.to_string(),
            phase: Phase::Prepare,
            last_completed_stage: None,
            options,
            completed: false,
            updated_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize run state")
    }

    /// Parse a status flag, checking the schema version before the body.
    pub fn from_json(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| DistupError::State(format!("malformed status file: {e}")))?;

        let found = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| DistupError::State("missing schema_version".to_string()))?;
        if found != u64::from(STATE_SCHEMA_VERSION) {
            return Err(DistupError::StateSchema {
                found: u32::try_from(found).unwrap_or(u32::MAX),
                supported: STATE_SCHEMA_VERSION,
            }
            .into());
        }

        serde_json::from_value(value)
            .map_err(|e| DistupError::State(format!("invalid status file: {e}")).into())
    }
}

/// Storage for the run state.
pub trait StateStore {
    fn load(&self) -> Result<Option<RunState>>;
    fn save(&self, state: &RunState) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Status flag stored as a JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<RunState>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => RunState::from_json(&content)
                .with_context(|| format!("Failed to load {}", self.path.display()))
                .map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        }
    }

    fn save(&self, state: &RunState) -> Result<()> {
        let content = state.to_json()?;
        write_atomic(&self.path, content.as_bytes())
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        debug!(
            "Saved run state to {}: phase={}",
            self.path.display(),
            state.phase
        );
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove {}", self.path.display()))
            }
        }
    }
}

/// Write `data` to a sibling temp file, fsync it, rename it over `path`, then
/// fsync the directory so the rename itself is durable. An existing file keeps
/// its permissions.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "status".to_string());
    let tmp_path = dir.join(format!(".{file_name}.tmp"));

    {
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(data)?;
        if let Ok(existing) = fs::metadata(path) {
            tmp.set_permissions(existing.permissions())?;
        }
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    File::open(&dir)?.sync_all()
}

/// In-memory store. Clones share the same slot, so a test can hand one clone
/// to the runner and inspect another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryStateStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>> {
        self.slot
            .lock()
            .map_err(|_| anyhow::anyhow!("state store mutex poisoned"))
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<RunState>> {
        self.lock()?
            .as_deref()
            .map(RunState::from_json)
            .transpose()
    }

    fn save(&self, state: &RunState) -> Result<()> {
        *self.lock()? = Some(state.to_json()?);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}

/// Outcome recorded in the completion flag.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionResult {
    Success,
    Failure,
}

impl std::fmt::Display for CompletionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Content of the completion flag file.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct CompletionRecord {
    pub result: CompletionResult,
    pub upgrader: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn success(upgrader: &str, message: impl Into<String>) -> Self {
        Self {
            result: CompletionResult::Success,
            upgrader: upgrader.to_string(),
            message: Some(message.into()),
            finished_at: Utc::now(),
        }
    }

    pub fn failure(upgrader: &str, message: impl Into<String>) -> Self {
        Self {
            result: CompletionResult::Failure,
            upgrader: upgrader.to_string(),
            message: Some(message.into()),
            finished_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize completion record")
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse completion record")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_state() -> RunState {
        let mut state = RunState::new("Plesk::Debian11to12Upgrader", UpgradeOptions::default());
        state.phase = Phase::Convert;
        state.last_completed_stage = Some("Pre-install packages".to_string());
        state
    }

    #[test]
    fn test_file_store_missing_file_loads_none() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("status.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_save_and_load() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("nested/status.json"));
        let state = sample_state();
        store.save(&state).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(!dir.path().join("nested/.status.json.tmp").exists());
    }

    #[test]
    fn test_file_store_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("status.json"));
        store.save(&sample_state()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_state_json_uses_lowercase_phase() {
        let json = sample_state().to_json().unwrap();
        assert!(json.contains("\"phase\": \"convert\""));
        assert!(json.contains("\"schema_version\": 1"));
    }

    #[test]
    fn test_from_json_rejects_unknown_schema() {
        let json = sample_state()
            .to_json()
            .unwrap()
            .replace("\"schema_version\": 1", "\"schema_version\": 2");
        let err = RunState::from_json(&json).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DistupError>(),
            Some(DistupError::StateSchema {
                found: 2,
                supported: 1
            })
        ));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(RunState::from_json("not json").is_err());
        assert!(RunState::from_json("{\"phase\": \"prepare\"}").is_err());
    }

    #[test]
    fn test_memory_store_clones_share_slot() {
        let store = MemoryStateStore::default();
        let other = store.clone();
        store.save(&sample_state()).unwrap();
        assert_eq!(other.load().unwrap().unwrap().phase, Phase::Convert);
        other.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_completion_record_round_trip() {
        let record = CompletionRecord::failure("Plesk::Debian11to12Upgrader", "dist-upgrade failed");
        let parsed = CompletionRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(parsed.result, CompletionResult::Failure);
        assert_eq!(parsed.message.as_deref(), Some("dist-upgrade failed"));
    }
}

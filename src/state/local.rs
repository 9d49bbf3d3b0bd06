//! JSON state file on the local filesystem.
//!
//! Writes go through a sibling `.tmp` file and a rename so a crash never
//! leaves a half-written state behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_STATE_FILE;
use crate::error::{PlanGraphError, Result, StateError};

use super::store::StateStore;
use super::types::{STATE_VERSION, State};

/// State store backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct LocalStateStore {
    path: PathBuf,
}

impl LocalStateStore {
    /// Uses [`DEFAULT_STATE_FILE`] inside `dir`.
    #[must_use]
    pub fn with_base_dir(dir: impl AsRef<Path>) -> Self {
        Self::with_state_path(dir.as_ref().join(DEFAULT_STATE_FILE))
    }

    /// Uses an explicit state file path.
    #[must_use]
    pub fn with_state_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the state file.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Option<State>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).await.map_err(|e| corrupted(format!("unreadable state file: {e}")))?;
        let state: State = serde_json::from_str(&raw).map_err(|e| corrupted(format!("invalid state JSON: {e}")))?;
        Ok(Some(state))
    }
}

fn corrupted(message: String) -> PlanGraphError {
    PlanGraphError::State(StateError::Corrupted { message })
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<State>> {
        let Some(state) = self.read().await? else {
            debug!(path = %self.path.display(), "No state file yet");
            return Ok(None);
        };

        if state.version > STATE_VERSION {
            return Err(PlanGraphError::State(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: state.version.to_string(),
            }));
        }

        info!(
            path = %self.path.display(),
            serial = state.serial,
            resources = state.resources.len(),
            "Loaded state"
        );
        Ok(Some(state))
    }

    async fn save(&self, state: &State) -> Result<()> {
        if let Some(existing) = self.read().await?
            && existing.lineage != state.lineage
        {
            warn!(on_disk = %existing.lineage, writing = %state.lineage, "Refusing to overwrite foreign state");
            return Err(PlanGraphError::State(StateError::LineageMismatch {
                on_disk: existing.lineage,
                writing: state.lineage.clone(),
            }));
        }

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }

        let body = serde_json::to_vec_pretty(state)
            .map_err(|e| PlanGraphError::State(StateError::serialization(format!("cannot encode state: {e}"))))?;

        let staging = self.path.with_extension("tmp");
        let mut file = fs::File::create(&staging).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        fs::rename(&staging, &self.path).await?;

        info!(path = %self.path.display(), serial = state.serial, "Saved state");
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in_tempdir() -> (LocalStateStore, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        (LocalStateStore::with_base_dir(dir.path()), dir)
    }

    #[tokio::test]
    async fn test_missing_file_loads_as_none() {
        let (store, _dir) = store_in_tempdir();
        assert!(store.load().await.expect("load").is_none());
    }

    #[tokio::test]
    async fn test_saved_state_reloads() {
        let (store, _dir) = store_in_tempdir();
        let mut state = State::new();
        state.serial = 7;
        store.save(&state).await.expect("save");

        let loaded = store.load().await.expect("load").expect("state present");
        assert_eq!(loaded.lineage, state.lineage);
        assert_eq!(loaded.serial, 7);
        assert!(!store.state_path().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_nested_directory_is_created() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStateStore::with_state_path(dir.path().join("a/b/state.json"));
        store.save(&State::new()).await.expect("save");
        assert!(store.state_path().exists());
    }

    #[tokio::test]
    async fn test_same_lineage_overwrites() {
        let (store, _dir) = store_in_tempdir();
        let mut state = State::new();
        store.save(&state).await.expect("first save");
        state.serial += 1;
        store.save(&state).await.expect("second save");
        assert_eq!(store.load().await.expect("load").expect("state").serial, state.serial);
    }

    #[tokio::test]
    async fn test_foreign_lineage_rejected() {
        let (store, _dir) = store_in_tempdir();
        store.save(&State::new()).await.expect("save");

        let err = store.save(&State::new()).await.expect_err("other lineage");
        assert!(matches!(err, PlanGraphError::State(StateError::LineageMismatch { .. })));
    }

    #[tokio::test]
    async fn test_newer_state_version_rejected() {
        let (store, _dir) = store_in_tempdir();
        let mut state = State::new();
        state.version = STATE_VERSION + 1;
        store.save(&state).await.expect("save");

        let err = store.load().await.expect_err("newer version");
        assert!(matches!(err, PlanGraphError::State(StateError::VersionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_garbage_file_is_corrupted() {
        let (store, _dir) = store_in_tempdir();
        std::fs::write(store.state_path(), "{ not json").expect("write");

        let err = store.load().await.expect_err("corrupted");
        assert!(matches!(err, PlanGraphError::State(StateError::Corrupted { .. })));
    }
}

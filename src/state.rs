//! Persisted relay cursor.
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

/// Id of the last post that was fully published.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct State {
    #[serde(default)]
    pub last_post: u64,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns the default state when nothing was saved yet.
    async fn load(&self) -> Result<State>;

    async fn save(&self, state: &State) -> Result<()>;
}

/// JSON file backed store.
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

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    #[instrument(skip_all)]
    async fn load(&self) -> Result<State> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(State::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read state: {}", self.path.display()))
            }
        };
        serde_json::from_slice(&content)
            .with_context(|| format!("invalid state file: {}", self.path.display()))
    }

    #[instrument(skip_all, fields(last_post = state.last_post))]
    async fn save(&self, state: &State) -> Result<()> {
        let content = serde_json::to_vec(state)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        // Rename over the target so readers never see a half-written file.
        let tmp = self.temp_path();
        fs::write(&tmp, &content)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace state: {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_loads_zero() {
        let td = tempdir().unwrap();
        let store = FileStateStore::new(td.path().join("state.json"));
        assert_eq!(store.load().await.unwrap(), State { last_post: 0 });
    }

    #[tokio::test]
    async fn save_then_load() {
        let td = tempdir().unwrap();
        let store = FileStateStore::new(td.path().join("nested").join("state.json"));
        store.save(&State { last_post: 4213 }).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, r#"{"last_post":4213}"#);
        assert_eq!(store.load().await.unwrap().last_post, 4213);
        assert!(!td.path().join("nested").join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let td = tempdir().unwrap();
        let path = td.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        let store = FileStateStore::new(&path);
        assert!(store.load().await.is_err());
    }
}

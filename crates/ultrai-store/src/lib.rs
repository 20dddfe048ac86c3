use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use ultrai_types::is_valid_run_id;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("bad run id: {0:?}")]
    BadRunId(String),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("corrupt artifact {name}: {source}")]
    CorruptArtifact {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize failed: {0}")]
    Serialize(serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Filesystem store for run artifacts. One directory per run under a fixed
/// runs root; every write is atomic (sibling temp file, fsync, rename), so a
/// reader sees either the previous artifact or the new one, never a torn
/// file.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    runs_root: PathBuf,
}

impl ArtifactStore {
    pub fn new(runs_root: impl Into<PathBuf>) -> Self {
        Self {
            runs_root: runs_root.into(),
        }
    }

    pub fn runs_root(&self) -> &Path {
        &self.runs_root
    }

    /// Resolves the directory for a run, rejecting any ID that could escape
    /// the runs root. The character class leaves no room for separators or
    /// parent references.
    pub fn build_dir(&self, run_id: &str) -> Result<PathBuf> {
        if !is_valid_run_id(run_id) {
            return Err(StoreError::BadRunId(run_id.to_string()));
        }
        let dir = self.runs_root.join(run_id);
        if !dir.starts_with(&self.runs_root) {
            return Err(StoreError::BadRunId(run_id.to_string()));
        }
        Ok(dir)
    }

    pub async fn create_run_dir(&self, run_id: &str) -> Result<PathBuf> {
        let dir = self.build_dir(run_id)?;
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    pub async fn run_exists(&self, run_id: &str) -> Result<bool> {
        let dir = self.build_dir(run_id)?;
        Ok(fs::metadata(&dir).await.is_ok())
    }

    /// Serializes `value` and commits it under `name` in the run directory.
    pub async fn write<T: Serialize>(&self, run_id: &str, name: &str, value: &T) -> Result<()> {
        let dir = self.build_dir(run_id)?;
        fs::create_dir_all(&dir).await?;
        let payload = serde_json::to_vec_pretty(value).map_err(StoreError::Serialize)?;

        let tmp = dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4()));
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&payload).await?;
        file.sync_all().await?;
        drop(file);

        let target = dir.join(name);
        if let Err(err) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    pub async fn read(&self, run_id: &str, name: &str) -> Result<Value> {
        let dir = self.build_dir(run_id)?;
        let raw = match fs::read_to_string(dir.join(name)).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(format!("{run_id}/{name}")));
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw).map_err(|source| StoreError::CorruptArtifact {
            name: format!("{run_id}/{name}"),
            source,
        })
    }

    pub async fn read_typed<T: DeserializeOwned>(&self, run_id: &str, name: &str) -> Result<T> {
        let value = self.read(run_id, name).await?;
        serde_json::from_value(value).map_err(|source| StoreError::CorruptArtifact {
            name: format!("{run_id}/{name}"),
            source,
        })
    }

    pub async fn exists(&self, run_id: &str, name: &str) -> Result<bool> {
        let dir = self.build_dir(run_id)?;
        Ok(fs::metadata(dir.join(name)).await.is_ok())
    }

    /// Committed artifact filenames for a run, sorted ascending so numeric
    /// prefixes come back in phase order.
    pub async fn list(&self, run_id: &str) -> Result<Vec<String>> {
        let dir = self.build_dir(run_id)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(run_id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".json") && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, ArtifactStore) {
        let dir = TempDir::new().expect("temp dir");
        let store = ArtifactStore::new(dir.path().join("runs"));
        (dir, store)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (_guard, store) = store();
        let value = json!({"run_id": "r1", "readyList": ["a", "b"]});
        store.write("r1", "00_ready.json", &value).await.expect("write");
        let back = store.read("r1", "00_ready.json").await.expect("read");
        assert_eq!(back, value);
    }

    #[tokio::test]
    async fn build_dir_rejects_traversal_and_separators() {
        let (_guard, store) = store();
        for bad in ["../etc", "a/b", "a\\b", "", ".", "run id"] {
            match store.build_dir(bad) {
                Err(StoreError::BadRunId(_)) => {}
                other => panic!("expected BadRunId for {bad:?}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn read_missing_artifact_is_not_found() {
        let (_guard, store) = store();
        store.create_run_dir("r1").await.expect("create");
        match store.read("r1", "01_inputs.json").await {
            Err(StoreError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_unparseable_artifact_is_corrupt() {
        let (_guard, store) = store();
        let dir = store.create_run_dir("r1").await.expect("create");
        std::fs::write(dir.join("stats.json"), "{not json").expect("raw write");
        match store.read("r1", "stats.json").await {
            Err(StoreError::CorruptArtifact { .. }) => {}
            other => panic!("expected CorruptArtifact, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn overwrite_replaces_whole_file() {
        let (_guard, store) = store();
        store
            .write("r1", "status.json", &json!({"progress": 10}))
            .await
            .expect("first");
        store
            .write("r1", "status.json", &json!({"progress": 90}))
            .await
            .expect("second");
        let back = store.read("r1", "status.json").await.expect("read");
        assert_eq!(back, json!({"progress": 90}));
    }

    #[tokio::test]
    async fn list_returns_sorted_names_and_hides_temp_files() {
        let (_guard, store) = store();
        store.write("r1", "01_inputs.json", &json!({})).await.expect("w1");
        store.write("r1", "00_ready.json", &json!({})).await.expect("w0");
        let dir = store.build_dir("r1").expect("dir");
        std::fs::write(dir.join(".00_ready.json.x.tmp"), "{}").expect("tmp");
        std::fs::write(dir.join("notes.txt"), "x").expect("txt");
        let names = store.list("r1").await.expect("list");
        assert_eq!(names, vec!["00_ready.json", "01_inputs.json"]);
    }

    #[tokio::test]
    async fn list_unknown_run_is_not_found() {
        let (_guard, store) = store();
        match store.list("missing").await {
            Err(StoreError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}

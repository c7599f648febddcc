use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capabilities::Capabilities;
use crate::model::download::DownloadSession;
use crate::model::{ModelArtifact, ModelCatalog, ModelError};

/// Absolute floor for a plausible model file. Any real GGUF model is larger,
/// so anything below it is a truncated download.
pub const MIN_MODEL_BYTES: u64 = 50 * 1024 * 1024;

/// How long a download may go without its first byte before a warning.
const DEFAULT_STALL_WARNING: Duration = Duration::from_secs(15);

/// Result of inspecting an artifact's file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileState {
    Missing,
    Valid { size: u64 },
    TooSmall { size: u64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStatus {
    pub id: String,
    pub path: PathBuf,
    pub present: bool,
    pub size_bytes: Option<u64>,
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub model_dir: PathBuf,
    pub filesystem: bool,
    pub inference_runtime: bool,
    pub min_model_bytes: u64,
    pub artifacts: Vec<ArtifactStatus>,
    pub active_downloads: Vec<DownloadSession>,
}

/// Owns the on-disk lifecycle of the catalog's model artifacts.
/// Constructed once at startup and shared as `Arc<ModelManager>`.
pub struct ModelManager {
    pub(super) catalog: ModelCatalog,
    pub(super) model_dir: PathBuf,
    pub(super) capabilities: Arc<dyn Capabilities>,
    pub(super) client: Client,
    pub(super) min_bytes: u64,
    pub(super) stall_warning: Duration,
    pub(super) active: Mutex<HashMap<Uuid, DownloadSession>>,
}

impl ModelManager {
    pub fn new(
        catalog: ModelCatalog,
        model_dir: PathBuf,
        capabilities: Arc<dyn Capabilities>,
    ) -> Self {
        Self {
            catalog,
            model_dir,
            capabilities,
            client: Client::builder()
                .connect_timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            min_bytes: MIN_MODEL_BYTES,
            stall_warning: DEFAULT_STALL_WARNING,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the minimum plausible size.
    pub fn with_min_bytes(mut self, min_bytes: u64) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    pub fn with_stall_warning(mut self, after: Duration) -> Self {
        self.stall_warning = after;
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn is_available(&self) -> bool {
        self.capabilities.has_filesystem()
    }

    pub fn model_path(&self, artifact: &ModelArtifact) -> PathBuf {
        self.model_dir.join(&artifact.filename)
    }

    /// Path of the first catalog artifact present on disk, else the default
    /// artifact's destination. `None` without filesystem access.
    pub async fn resolve_model_path(&self) -> Option<PathBuf> {
        if !self.is_available() {
            return None;
        }
        for artifact in self.catalog.iter() {
            let path = self.model_path(artifact);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        Some(self.model_path(self.catalog.default_artifact()))
    }

    /// First catalog artifact that passes `check_artifact`, else the default
    /// artifact. A present but truncated file is skipped (and removed), so
    /// a later valid entry wins over it. `None` without filesystem access.
    pub async fn resolve_artifact(&self) -> Option<&ModelArtifact> {
        if !self.is_available() {
            return None;
        }
        for artifact in self.catalog.iter() {
            if self.check_artifact(artifact).await {
                return Some(artifact);
            }
        }
        Some(self.catalog.default_artifact())
    }

    /// Whether a download of `artifact_id` is in flight.
    pub fn is_downloading(&self, artifact_id: &str) -> bool {
        self.active
            .lock()
            .map(|sessions| sessions.values().any(|s| s.artifact_id == artifact_id))
            .unwrap_or(false)
    }

    pub(crate) async fn inspect(&self, path: &Path) -> Result<FileState, ModelError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() < self.min_bytes => Ok(FileState::TooSmall { size: meta.len() }),
            Ok(meta) => Ok(FileState::Valid { size: meta.len() }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(FileState::Missing),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes `path` if present. Returns whether a file was removed.
    pub(crate) async fn remove_if_present(&self, path: &Path) -> Result<bool, ModelError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Checks one artifact. A truncated file is deleted as a side effect,
    /// unless a download is still writing it; an artifact being downloaded
    /// is never valid.
    pub(crate) async fn check_artifact(&self, artifact: &ModelArtifact) -> bool {
        if self.is_downloading(&artifact.id) {
            debug!(model_id = %artifact.id, "Model download in progress");
            return false;
        }
        let path = self.model_path(artifact);
        match self.inspect(&path).await {
            Ok(FileState::Valid { size }) => {
                debug!(model_id = %artifact.id, size, "Model file is valid");
                true
            }
            Ok(FileState::Missing) => false,
            Ok(FileState::TooSmall { size }) => {
                warn!(
                    model_id = %artifact.id,
                    size,
                    floor = self.min_bytes,
                    "Model file too small, likely incomplete; removing"
                );
                if let Err(e) = self.remove_if_present(&path).await {
                    warn!("Failed to remove incomplete model file {}: {e}", path.display());
                }
                false
            }
            Err(e) => {
                warn!("Could not inspect model file {}: {e}", path.display());
                false
            }
        }
    }

    /// Whether a usable artifact is on disk. `Some` checks that artifact;
    /// `None` checks every catalog entry and succeeds on the first valid one.
    ///
    /// Invalid (truncated) files found along the way are deleted, so a
    /// `false` result does not mean the directory was left untouched.
    pub async fn exists_and_valid(&self, artifact: Option<&ModelArtifact>) -> bool {
        if !self.is_available() {
            return false;
        }

        match artifact {
            Some(artifact) => self.check_artifact(artifact).await,
            None => {
                for artifact in self.catalog.iter() {
                    if self.check_artifact(artifact).await {
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Deletes the artifact's file. `None` targets the resolved model path.
    pub async fn delete(&self, artifact: Option<&ModelArtifact>) -> Result<bool, ModelError> {
        if !self.is_available() {
            return Err(ModelError::FilesystemUnavailable);
        }

        let path = match artifact {
            Some(artifact) => self.model_path(artifact),
            None => match self.resolve_model_path().await {
                Some(path) => path,
                None => return Ok(false),
            },
        };

        let deleted = self.remove_if_present(&path).await?;
        if deleted {
            info!("Deleted model file {}", path.display());
        }
        Ok(deleted)
    }

    /// Purges every catalog destination that fails validation. Recovers
    /// from the process dying mid-download. Returns the purged paths.
    pub async fn reconcile_on_startup(&self) -> Result<Vec<PathBuf>, ModelError> {
        if !self.is_available() {
            debug!("Skipping model reconciliation: no filesystem access");
            return Ok(vec![]);
        }

        let mut purged = Vec::new();
        for artifact in self.catalog.iter() {
            if self.is_downloading(&artifact.id) {
                continue;
            }
            let path = self.model_path(artifact);
            if let FileState::TooSmall { size } = self.inspect(&path).await? {
                warn!(
                    model_id = %artifact.id,
                    size,
                    "Found incomplete model file at startup; removing"
                );
                if self.remove_if_present(&path).await? {
                    purged.push(path);
                }
            }
        }

        info!(purged = purged.len(), "Model reconciliation complete");
        Ok(purged)
    }

    /// On-disk size in MB, or the catalog's expected size when absent.
    pub async fn model_size_mb(&self, artifact: &ModelArtifact) -> u64 {
        if !self.is_available() {
            return 0;
        }
        match self.inspect(&self.model_path(artifact)).await {
            Ok(FileState::Valid { size }) | Ok(FileState::TooSmall { size }) => {
                (size as f64 / (1024.0 * 1024.0)).round() as u64
            }
            _ => artifact.size_mb,
        }
    }

    /// Read-only report; unlike `exists_and_valid` it never deletes.
    pub async fn diagnose(&self) -> Diagnostics {
        let mut artifacts = Vec::new();
        for artifact in self.catalog.iter() {
            let path = self.model_path(artifact);
            let state = if self.is_available() {
                self.inspect(&path).await.ok()
            } else {
                None
            };
            let (present, size_bytes, valid) = match state {
                Some(FileState::Valid { size }) => (true, Some(size), true),
                Some(FileState::TooSmall { size }) => (true, Some(size), false),
                _ => (false, None, false),
            };
            artifacts.push(ArtifactStatus {
                id: artifact.id.clone(),
                path,
                present,
                size_bytes,
                valid,
            });
        }

        Diagnostics {
            model_dir: self.model_dir.clone(),
            filesystem: self.capabilities.has_filesystem(),
            inference_runtime: self.capabilities.has_inference_runtime(),
            min_model_bytes: self.min_bytes,
            artifacts,
            active_downloads: self.active_downloads(),
        }
    }

    pub fn active_downloads(&self) -> Vec<DownloadSession> {
        self.active
            .lock()
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::capabilities::StaticCapabilities;

    #[tokio::test]
    async fn test_truncated_file_is_invalid_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(dir.path(), &[("small", "http://unused".to_string())]);
        let artifact = manager.catalog().default_artifact().clone();
        let path = manager.model_path(&artifact);
        write_file(&path, 10);

        assert!(!manager.exists_and_valid(Some(&artifact)).await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_valid_file_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(dir.path(), &[("big", "http://unused".to_string())]);
        let artifact = manager.catalog().default_artifact().clone();
        let path = manager.model_path(&artifact);
        write_file(&path, TEST_FLOOR as usize * 2);

        assert!(manager.exists_and_valid(Some(&artifact)).await);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_exists_without_artifact_scans_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(
            dir.path(),
            &[
                ("first", "http://unused/1".to_string()),
                ("second", "http://unused/2".to_string()),
            ],
        );
        let first = manager.catalog().get("first").unwrap().clone();
        let second = manager.catalog().get("second").unwrap().clone();
        write_file(&manager.model_path(&first), 5);
        write_file(&manager.model_path(&second), TEST_FLOOR as usize);

        assert!(manager.exists_and_valid(None).await);
        assert!(!manager.model_path(&first).exists());
        assert!(manager.model_path(&second).exists());
    }

    #[tokio::test]
    async fn test_file_being_downloaded_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(dir.path(), &[("m", "http://unused".to_string())]);
        let artifact = manager.catalog().default_artifact().clone();
        let path = manager.model_path(&artifact);
        write_file(&path, 10);
        mark_downloading(&manager, "m");

        assert!(manager.is_downloading("m"));
        assert!(!manager.exists_and_valid(Some(&artifact)).await);
        assert!(!manager.exists_and_valid(None).await);
        assert!(manager.reconcile_on_startup().await.unwrap().is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_large_partial_download_is_not_reported_valid() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(dir.path(), &[("m", "http://unused".to_string())]);
        let artifact = manager.catalog().default_artifact().clone();
        write_file(&manager.model_path(&artifact), TEST_FLOOR as usize * 2);
        mark_downloading(&manager, "m");

        assert!(!manager.exists_and_valid(Some(&artifact)).await);
        assert!(manager.model_path(&artifact).exists());
    }

    #[tokio::test]
    async fn test_resolve_artifact_skips_truncated_entry() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(
            dir.path(),
            &[
                ("a", "http://unused/1".to_string()),
                ("b", "http://unused/2".to_string()),
            ],
        );
        let a = manager.catalog().get("a").unwrap().clone();
        let b = manager.catalog().get("b").unwrap().clone();
        write_file(&manager.model_path(&a), 10);
        write_file(&manager.model_path(&b), TEST_FLOOR as usize * 2);

        let resolved = manager.resolve_artifact().await.unwrap();
        assert_eq!(resolved.id, "b");
        assert!(!manager.model_path(&a).exists());
    }

    #[tokio::test]
    async fn test_resolve_artifact_defaults_when_nothing_valid() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(
            dir.path(),
            &[
                ("a", "http://unused/1".to_string()),
                ("b", "http://unused/2".to_string()),
            ],
        );
        assert_eq!(manager.resolve_artifact().await.unwrap().id, "a");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_valid() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(dir.path(), &[("m", "http://unused".to_string())]);
        assert!(!manager.exists_and_valid(None).await);
    }

    #[tokio::test]
    async fn test_reconcile_removes_only_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(
            dir.path(),
            &[
                ("valid", "http://unused/1".to_string()),
                ("partial", "http://unused/2".to_string()),
            ],
        );
        let valid = manager.model_path(manager.catalog().get("valid").unwrap());
        let partial = manager.model_path(manager.catalog().get("partial").unwrap());
        write_file(&valid, TEST_FLOOR as usize + 1);
        write_file(&partial, 100);

        let purged = manager.reconcile_on_startup().await.unwrap();

        assert_eq!(purged, vec![partial.clone()]);
        assert!(valid.exists());
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn test_delete_reports_whether_removed() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(dir.path(), &[("m", "http://unused".to_string())]);
        let artifact = manager.catalog().default_artifact().clone();
        write_file(&manager.model_path(&artifact), 2048);

        assert!(manager.delete(Some(&artifact)).await.unwrap());
        assert!(!manager.delete(Some(&artifact)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_without_artifact_targets_resolved_path() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(
            dir.path(),
            &[
                ("default", "http://unused/1".to_string()),
                ("other", "http://unused/2".to_string()),
            ],
        );
        let other = manager.model_path(manager.catalog().get("other").unwrap());
        write_file(&other, 2048);

        assert_eq!(manager.resolve_model_path().await, Some(other.clone()));
        assert!(manager.delete(None).await.unwrap());
        assert!(!other.exists());
    }

    #[tokio::test]
    async fn test_headless_manager_is_inert() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(
            ModelCatalog::builtin().unwrap(),
            dir.path().to_path_buf(),
            Arc::new(StaticCapabilities::headless()),
        );
        let artifact = manager.catalog().default_artifact().clone();
        write_file(&manager.model_path(&artifact), 10);

        assert!(!manager.exists_and_valid(None).await);
        assert!(manager.reconcile_on_startup().await.unwrap().is_empty());
        assert!(matches!(
            manager.delete(None).await,
            Err(ModelError::FilesystemUnavailable)
        ));
        assert_eq!(manager.resolve_model_path().await, None);
        // nothing was touched
        assert!(manager.model_path(&artifact).exists());
    }

    #[tokio::test]
    async fn test_model_size_falls_back_to_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(dir.path(), &[("m", "http://unused".to_string())]);
        let artifact = manager.catalog().default_artifact().clone();
        assert_eq!(manager.model_size_mb(&artifact).await, artifact.size_mb);

        write_file(&manager.model_path(&artifact), 3 * 1024 * 1024);
        assert_eq!(manager.model_size_mb(&artifact).await, 3);
    }

    #[tokio::test]
    async fn test_diagnose_does_not_delete() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(dir.path(), &[("m", "http://unused".to_string())]);
        let artifact = manager.catalog().default_artifact().clone();
        let path = manager.model_path(&artifact);
        write_file(&path, 10);

        let report = manager.diagnose().await;
        assert!(report.filesystem);
        assert!(!report.inference_runtime);
        assert_eq!(report.artifacts.len(), 1);
        assert!(report.artifacts[0].present);
        assert!(!report.artifacts[0].valid);
        assert!(path.exists());
    }
}

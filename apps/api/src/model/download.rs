//! Streaming download with progress. Progress, completion and failure travel
//! on one `Stream` of `DownloadEvent`s.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::manager::FileState;
use crate::model::{ModelArtifact, ModelError, ModelManager};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
    Started { session_id: Uuid, artifact_id: String },
    /// Percentage, never decreasing within one download.
    Progress { percent: u8 },
    Completed { path: PathBuf },
}

/// State of one in-flight download. Dropped when the download ends.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadSession {
    pub id: Uuid,
    pub artifact_id: String,
    pub bytes_written: u64,
    pub total_bytes: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

/// Turns byte counts into a monotone percentage, emitting only changes.
#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    last: Option<u8>,
}

impl ProgressTracker {
    fn emit(&mut self, percent: u8) -> Option<u8> {
        let percent = percent.max(self.last.unwrap_or(0));
        if self.last == Some(percent) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }

    pub fn start(&mut self) -> Option<u8> {
        self.emit(0)
    }

    /// Unknown total: 1% once bytes flow, to show the download is alive.
    pub fn update(&mut self, written: u64, total: Option<u64>) -> Option<u8> {
        match total {
            Some(total) if total > 0 => {
                let percent = ((written as f64 / total as f64) * 100.0).round().min(100.0) as u8;
                self.emit(percent)
            }
            _ if written > 0 => self.emit(1),
            _ => None,
        }
    }

    pub fn finish(&mut self) -> Option<u8> {
        self.emit(100)
    }
}

/// Removes the session from the active set when the download ends or the
/// stream is dropped.
struct SessionGuard {
    manager: Arc<ModelManager>,
    id: Uuid,
}

impl SessionGuard {
    /// Registers a session for `artifact`, or `None` when one is already
    /// active for it. Check and insert happen under one lock.
    fn try_begin(manager: Arc<ModelManager>, artifact: &ModelArtifact) -> Option<Self> {
        let now = Utc::now();
        let session = DownloadSession {
            id: Uuid::new_v4(),
            artifact_id: artifact.id.clone(),
            bytes_written: 0,
            total_bytes: None,
            started_at: now,
            last_update: now,
        };
        let id = session.id;
        {
            let mut active = manager
                .active
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if active.values().any(|s| s.artifact_id == artifact.id) {
                return None;
            }
            active.insert(id, session);
        }
        Some(Self { manager, id })
    }

    fn set_total(&self, total: Option<u64>) {
        if let Ok(mut active) = self.manager.active.lock() {
            if let Some(session) = active.get_mut(&self.id) {
                session.total_bytes = total;
            }
        }
    }

    fn record(&self, bytes_written: u64) {
        if let Ok(mut active) = self.manager.active.lock() {
            if let Some(session) = active.get_mut(&self.id) {
                session.bytes_written = bytes_written;
                session.last_update = Utc::now();
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.manager.active.lock() {
            active.remove(&self.id);
        }
    }
}

impl ModelManager {
    /// Downloads `artifact` to its destination.
    ///
    /// Idempotent: an already valid artifact yields `Progress(100)` and
    /// `Completed` without touching the network. On any failure the partial
    /// file is removed before the error is yielded; the error is always the
    /// last item. Dropping the stream abandons the download and leaves the
    /// partial file for `reconcile_on_startup`.
    ///
    /// Only one download per artifact runs at a time; a second one yields
    /// `DownloadInProgress` and leaves the running one untouched.
    pub fn download(
        self: Arc<Self>,
        artifact: ModelArtifact,
    ) -> impl Stream<Item = Result<DownloadEvent, ModelError>> + Send + 'static {
        stream! {
            if !self.is_available() {
                yield Err(ModelError::FilesystemUnavailable);
                return;
            }

            let path = self.model_path(&artifact);
            let mut progress = ProgressTracker::default();

            // Registered before the file is touched, so validity checks
            // running concurrently leave the partial file alone.
            let Some(session) = SessionGuard::try_begin(self.clone(), &artifact) else {
                warn!(model_id = %artifact.id, "Download already in progress");
                yield Err(ModelError::DownloadInProgress(artifact.id.clone()));
                return;
            };

            match self.inspect(&path).await {
                Ok(FileState::Valid { .. }) => {
                    drop(session);
                    info!(model_id = %artifact.id, "Model already downloaded");
                    if let Some(percent) = progress.finish() {
                        yield Ok(DownloadEvent::Progress { percent });
                    }
                    yield Ok(DownloadEvent::Completed { path });
                    return;
                }
                // a truncated leftover is overwritten below
                Ok(FileState::TooSmall { .. }) | Ok(FileState::Missing) => {}
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }

            if let Err(e) = tokio::fs::create_dir_all(&self.model_dir).await {
                yield Err(ModelError::Io(e));
                return;
            }

            info!(model_id = %artifact.id, url = %artifact.url, "Starting model download to {}", path.display());

            let response = match self.client.get(&artifact.url).send().await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(self.abort(&path, ModelError::Transport(e)).await);
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                yield Err(self.abort(&path, ModelError::HttpStatus { status: status.as_u16() }).await);
                return;
            }

            let total = response.content_length();
            session.set_total(total);

            let mut file = match tokio::fs::File::create(&path).await {
                Ok(file) => file,
                Err(e) => {
                    yield Err(self.abort(&path, ModelError::Io(e)).await);
                    return;
                }
            };

            yield Ok(DownloadEvent::Started {
                session_id: session.id,
                artifact_id: artifact.id.clone(),
            });
            if let Some(percent) = progress.start() {
                yield Ok(DownloadEvent::Progress { percent });
            }

            let mut chunks = Box::pin(response.bytes_stream());
            let mut written: u64 = 0;

            loop {
                let next = if written == 0 {
                    match tokio::time::timeout(self.stall_warning, chunks.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            warn!(
                                model_id = %artifact.id,
                                "No data received after {}s - download may be stalled",
                                self.stall_warning.as_secs()
                            );
                            chunks.next().await
                        }
                    }
                } else {
                    chunks.next().await
                };

                let bytes = match next {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        drop(file);
                        yield Err(self.abort(&path, ModelError::Transport(e)).await);
                        return;
                    }
                    None => break,
                };

                if let Err(e) = file.write_all(&bytes).await {
                    drop(file);
                    yield Err(self.abort(&path, ModelError::Io(e)).await);
                    return;
                }

                written += bytes.len() as u64;
                session.record(written);
                if let Some(percent) = progress.update(written, total) {
                    debug!(model_id = %artifact.id, written, ?total, percent, "Download progress");
                    yield Ok(DownloadEvent::Progress { percent });
                }
            }

            if let Err(e) = file.flush().await {
                drop(file);
                yield Err(self.abort(&path, ModelError::Io(e)).await);
                return;
            }
            drop(file);

            match self.inspect(&path).await {
                Ok(FileState::Valid { size }) => {
                    info!(model_id = %artifact.id, size, "Model downloaded to {}", path.display());
                }
                Ok(FileState::TooSmall { size }) => {
                    let floor = self.min_bytes;
                    yield Err(self.abort(&path, ModelError::Corrupted { path: path.clone(), size, floor }).await);
                    return;
                }
                Ok(FileState::Missing) => {
                    let floor = self.min_bytes;
                    yield Err(self.abort(&path, ModelError::Corrupted { path: path.clone(), size: 0, floor }).await);
                    return;
                }
                Err(e) => {
                    yield Err(self.abort(&path, e).await);
                    return;
                }
            }

            drop(session);
            if let Some(percent) = progress.finish() {
                yield Ok(DownloadEvent::Progress { percent });
            }
            yield Ok(DownloadEvent::Completed { path });
        }
    }

    /// Looks `id` up in the catalog and downloads it.
    pub fn download_by_id(
        self: Arc<Self>,
        id: &str,
    ) -> Result<impl Stream<Item = Result<DownloadEvent, ModelError>> + Send + 'static, ModelError>
    {
        let artifact = self.catalog.get(id)?.clone();
        Ok(self.download(artifact))
    }

    /// Drains `download`, forwarding percentages to `on_progress`.
    pub async fn download_to_path<F>(
        self: Arc<Self>,
        artifact: ModelArtifact,
        mut on_progress: F,
    ) -> Result<PathBuf, ModelError>
    where
        F: FnMut(u8) + Send,
    {
        let artifact_id = artifact.id.clone();
        let events = self.download(artifact);
        futures::pin_mut!(events);

        let mut completed = None;
        while let Some(event) = events.next().await {
            match event? {
                DownloadEvent::Progress { percent } => on_progress(percent),
                DownloadEvent::Completed { path } => completed = Some(path),
                DownloadEvent::Started { .. } => {}
            }
        }
        completed.ok_or_else(|| ModelError::Incomplete(artifact_id))
    }

    /// Deletes the partial file, then hands the error back for propagation.
    async fn abort(&self, path: &Path, error: ModelError) -> ModelError {
        warn!("Model download failed: {error}; cleaning up {}", path.display());
        match self.remove_if_present(path).await {
            Ok(true) => info!("Incomplete download cleaned up"),
            Ok(false) => {}
            Err(e) => warn!("Failed to clean up incomplete download: {e}"),
        }
        error
    }
}

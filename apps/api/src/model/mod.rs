//! Model lifecycle: catalog, download with progress, size validation,
//! eviction and startup reconciliation of the on-disk model artifact.
//!
//! Everything here is a no-op (or a `FilesystemUnavailable` error) when the
//! deployment has no filesystem capability.

pub mod catalog;
pub mod download;
pub mod handlers;
pub mod manager;

use std::path::PathBuf;

use thiserror::Error;

pub use catalog::{ModelArtifact, ModelCatalog};
pub use download::{DownloadEvent, DownloadSession};
pub use manager::{Diagnostics, ModelManager, MIN_MODEL_BYTES};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Network error while downloading: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Download failed with status code: {status}")]
    HttpStatus { status: u16 },

    #[error(
        "Model file {} is {size} bytes, below the {floor}-byte minimum; it is likely incomplete. Please download again.",
        path.display()
    )]
    Corrupted { path: PathBuf, size: u64, floor: u64 },

    #[error("File system access is not available in this build")]
    FilesystemUnavailable,

    #[error("Model with id '{0}' not found")]
    UnknownArtifact(String),

    #[error("Model '{0}' is already being downloaded")]
    DownloadInProgress(String),

    #[error("Download of '{0}' ended before the file was complete")]
    Incomplete(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    /// Transport and validation failures may succeed on retry; a missing
    /// filesystem capability will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::Transport(_)
                | ModelError::HttpStatus { .. }
                | ModelError::Corrupted { .. }
                | ModelError::DownloadInProgress(_)
                | ModelError::Incomplete(_)
                | ModelError::Io(_)
        )
    }

    /// Stable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            ModelError::Transport(_) | ModelError::HttpStatus { .. } => "TRANSPORT_FAILURE",
            ModelError::Corrupted { .. } => "MODEL_CORRUPTED",
            ModelError::FilesystemUnavailable => "FILESYSTEM_UNAVAILABLE",
            ModelError::UnknownArtifact(_) => "NOT_FOUND",
            ModelError::DownloadInProgress(_) => "DOWNLOAD_IN_PROGRESS",
            ModelError::Incomplete(_) => "TRANSPORT_FAILURE",
            ModelError::Io(_) => "IO_ERROR",
        }
    }
}

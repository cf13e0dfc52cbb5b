//! Stored videos and their transcode lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Explicit lifecycle of a stored video.
///
/// Persisted per video instead of being inferred from which sibling files
/// exist on disk, so a run interrupted mid-sequence is unambiguous after a
/// restart. `Swapped` and `Failed` are terminal; every other state found at
/// startup marks an interrupted run.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VideoState {
    /// Original bytes stored at the served path; transcode not started.
    Uploaded,
    /// `_orig` backup copy written.
    BackedUp,
    /// External encoder running against the backup.
    Encoding,
    /// Encoded output renamed over the served path.
    Swapped,
    /// Backup, encode or swap failed; served path still holds complete bytes.
    Failed,
}

impl VideoState {
    pub fn is_terminal(self) -> bool {
        matches!(self, VideoState::Swapped | VideoState::Failed)
    }
}

/// Metadata row for a video file on durable storage.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct VideoRecord {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Generated unique file name under the public videos directory.
    pub file_name: String,

    /// Declared content type of the upload (always `video/*`).
    pub content_type: String,

    /// Size of the uploaded bytes. The file on disk shrinks once the
    /// transcode swaps in the compressed output.
    pub size_bytes: i64,

    /// MD5 of the uploaded bytes, computed while streaming to disk.
    pub checksum: String,

    /// Current lifecycle state.
    pub state: VideoState,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The three on-disk locations a stored video occupies.
///
/// `_orig` and `_tmp` siblings share the served file's directory and base
/// name. Only the served path is ever visible to clients; at all times it
/// holds a complete, playable file.
#[derive(Clone, Debug)]
pub struct VideoPaths {
    /// The path clients stream from.
    pub served: PathBuf,
}

impl VideoPaths {
    pub fn new(served: impl Into<PathBuf>) -> Self {
        Self {
            served: served.into(),
        }
    }

    /// Backup copy of the pre-transcode bytes, retained for recovery.
    pub fn backup(&self) -> PathBuf {
        self.sibling("_orig")
    }

    /// Transient encoder output, renamed over `served` on success.
    pub fn temp(&self) -> PathBuf {
        self.sibling("_tmp")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let stem = self
            .served
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.served.extension() {
            Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
            None => format!("{}{}", stem, suffix),
        };
        self.served
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(name)
    }
}

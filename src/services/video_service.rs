//! VideoStore — durable storage for lesson videos backed by SQLite for
//! metadata and local disk for payloads. Uploads are streamed to a
//! dot-prefixed temp file, checksummed and size-checked on the way through,
//! fsynced, and renamed into place under a generated unique name. The served
//! path never receives a partial write.

use crate::models::video::{VideoRecord, VideoState};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("`{0}` is not a video content type")]
    NotVideo(String),
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("invalid video file name")]
    InvalidFileName,
    #[error("video `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type VideoResult<T> = Result<T, VideoError>;

const MAX_FILE_NAME_LEN: usize = 255;
const FALLBACK_EXTENSION: &str = "mp4";

/// VideoStore provides the storage operations behind upload and playback:
/// - Save an upload (streams bytes to disk and inserts metadata into SQLite)
/// - Look up a stored video for streaming
/// - Track the per-video transcode state
#[derive(Clone)]
pub struct VideoStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Public directory on disk where served videos live.
    pub base_path: PathBuf,

    /// Uploads larger than this are rejected mid-stream.
    pub max_upload_bytes: u64,
}

impl VideoStore {
    /// Create a new VideoStore backed by the provided SQLite pool and using
    /// `base_path` as the public videos directory.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>, max_upload_bytes: u64) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            max_upload_bytes,
        }
    }

    /// Generate a unique served name of the form
    /// `<field>-<timestamp-millis>-<random>.<ext>`.
    ///
    /// The extension is taken from the original upload name, lowercased and
    /// reduced to ASCII alphanumerics; anything unusable falls back to `mp4`.
    pub fn generate_file_name(field: &str, original_name: &str) -> String {
        let ext = Path::new(original_name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());
        format!(
            "{}-{}-{}.{}",
            field,
            Utc::now().timestamp_millis(),
            rand::random::<u32>(),
            ext
        )
    }

    /// Basic name validation to avoid trivial path traversal vectors.
    ///
    /// Served names are always generated by this service, so anything with a
    /// separator or parent reference is an attack, not a miss.
    fn ensure_name_safe(&self, name: &str) -> VideoResult<()> {
        if name.is_empty() || name.len() > MAX_FILE_NAME_LEN {
            return Err(VideoError::InvalidFileName);
        }
        if name.starts_with('.') || name.contains('/') || name.contains("..") {
            return Err(VideoError::InvalidFileName);
        }
        if name
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(VideoError::InvalidFileName);
        }
        Ok(())
    }

    /// Absolute path a served name maps to.
    pub fn served_path(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    /// Stream-save an upload to disk and record its metadata.
    ///
    /// - Rejects non-`video/*` declared content types before touching disk.
    /// - Writes bytes incrementally to a dot-prefixed temp file, counting
    ///   size and computing MD5 while streaming; crossing the configured
    ///   limit aborts and removes the temp file, so nothing oversized ever
    ///   reaches final storage.
    /// - Fsyncs and renames into the generated served name.
    /// - Inserts the metadata row in state `uploaded`.
    pub async fn save_upload<S>(
        &self,
        field: &str,
        original_name: &str,
        content_type: &str,
        stream: S,
    ) -> VideoResult<VideoRecord>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        if !content_type.starts_with("video/") {
            return Err(VideoError::NotVideo(content_type.to_string()));
        }

        fs::create_dir_all(&self.base_path).await?;
        let file_name = Self::generate_file_name(field, original_name);
        let file_path = self.served_path(&file_name);
        let tmp_path = self.base_path.join(format!(".upload-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: u64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(VideoError::Io(err));
                }
            };
            size_bytes += chunk.len() as u64;
            if size_bytes > self.max_upload_bytes {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(VideoError::TooLarge {
                    limit: self.max_upload_bytes,
                });
            }
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(VideoError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(VideoError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(VideoError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(VideoError::Io(err));
        }

        let now = Utc::now();
        let checksum = format!("{:x}", digest.compute());

        let insert_result = sqlx::query_as::<_, VideoRecord>(
            r#"
            INSERT INTO videos (
                id, file_name, content_type, size_bytes, checksum, state,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, file_name, content_type, size_bytes, checksum, state,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&file_name)
        .bind(content_type)
        .bind(size_bytes as i64)
        .bind(&checksum)
        .bind(VideoState::Uploaded)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(rec) => Ok(rec),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(VideoError::Sqlx(err))
            }
        }
    }

    /// Look up a stored video for streaming.
    ///
    /// Validates the name, fetches the metadata row and returns it with the
    /// served path. The caller opens the file itself; its current size on
    /// disk is authoritative because the transcode shrinks the payload
    /// without touching the row.
    pub async fn lookup(&self, name: &str) -> VideoResult<(VideoRecord, PathBuf)> {
        self.ensure_name_safe(name)?;
        let record = sqlx::query_as::<_, VideoRecord>(
            "SELECT id, file_name, content_type, size_bytes, checksum, state,
                    created_at, updated_at
             FROM videos WHERE file_name = ?",
        )
        .bind(name)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => VideoError::NotFound(name.to_string()),
            other => VideoError::Sqlx(other),
        })?;

        Ok((record, self.served_path(name)))
    }

    /// Record a lifecycle transition for a video.
    pub async fn set_state(&self, id: Uuid, state: VideoState) -> VideoResult<()> {
        let result = sqlx::query("UPDATE videos SET state = ?, updated_at = ? WHERE id = ?")
            .bind(state)
            .bind(Utc::now())
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(VideoError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Videos whose last run never reached a terminal state.
    pub async fn stale_records(&self) -> VideoResult<Vec<VideoRecord>> {
        let rows = sqlx::query_as::<_, VideoRecord>(
            "SELECT id, file_name, content_type, size_bytes, checksum, state,
                    created_at, updated_at
             FROM videos WHERE state IN (?, ?, ?)",
        )
        .bind(VideoState::Uploaded)
        .bind(VideoState::BackedUp)
        .bind(VideoState::Encoding)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }
}

/// Map an upload-stream error into `io::Error` for `save_upload`.
pub fn stream_io_error<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(ErrorKind::Other, err)
}

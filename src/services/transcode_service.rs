//! Background transcoding of stored lesson videos.
//!
//! The worker turns an uploaded video into a web-streaming-friendly encoding
//! without ever exposing a partial file at the served path: it copies the
//! served file to an `_orig` backup, runs the external encoder against the
//! backup writing to a `_tmp` sibling, and atomically renames `_tmp` over
//! the served path. The rename is the only moment the served bytes change.

use crate::models::video::{VideoPaths, VideoState};
use crate::services::video_service::{VideoError, VideoStore};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::{fs, process::Command, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Hard wall-clock bound on the external encoder.
const ENCODE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("backing up `{path}` failed: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("spawning encoder `{program}` failed: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("encoder exited with {status}: {stderr}")]
    Encoder { status: String, stderr: String },
    #[error("encoder timed out after {0:?}")]
    TimedOut(Duration),
    #[error("swapping encoded output into place failed: {0}")]
    Swap(#[source] io::Error),
    #[error(transparent)]
    State(#[from] VideoError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Before/after sizes of a completed transcode, for logging only.
#[derive(Debug, Clone)]
pub struct TranscodeReport {
    pub video_id: Uuid,
    pub original_bytes: u64,
    pub encoded_bytes: u64,
}

impl TranscodeReport {
    pub fn ratio(&self) -> f64 {
        if self.original_bytes == 0 {
            return 1.0;
        }
        self.encoded_bytes as f64 / self.original_bytes as f64
    }
}

/// Runs the external encoder against stored videos and tracks their
/// lifecycle state. Cheap to clone; each transcode owns disjoint paths so
/// concurrent runs need no coordination.
#[derive(Clone)]
pub struct Transcoder {
    store: VideoStore,
    program: PathBuf,
    timeout: Duration,
}

impl Transcoder {
    pub fn new(store: VideoStore, program: impl Into<PathBuf>) -> Self {
        Self {
            store,
            program: program.into(),
            timeout: ENCODE_TIMEOUT,
        }
    }

    /// Override the encoder timeout. Used by tests with stub encoders.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Launch a transcode detached from the calling request.
    ///
    /// The returned handle carries the typed outcome so a supervising layer
    /// could consume it; nothing in the upload path waits on it, and failure
    /// is reported to the log only.
    pub fn spawn(&self, video_id: Uuid, file_name: &str) -> JoinHandle<Result<TranscodeReport, TranscodeError>> {
        let this = self.clone();
        let served = this.store.served_path(file_name);
        let name = file_name.to_string();
        tokio::spawn(async move {
            let result = this.transcode(video_id, &served).await;
            match &result {
                Ok(report) => {
                    info!(
                        video = %name,
                        before = report.original_bytes,
                        after = report.encoded_bytes,
                        ratio = report.ratio(),
                        "transcode complete"
                    );
                }
                Err(err) => {
                    error!(video = %name, "transcode failed: {err}");
                }
            }
            result
        })
    }

    /// Run the full backup → encode → swap sequence for one video.
    ///
    /// On any failure the served path is left untouched: the backup copy
    /// happens before the encoder runs, the encoder writes only to the
    /// `_tmp` sibling, and a failed rename leaves the pre-rename file
    /// intact. No error here is ever surfaced to the uploader.
    pub async fn transcode(
        &self,
        video_id: Uuid,
        served: &Path,
    ) -> Result<TranscodeReport, TranscodeError> {
        let paths = VideoPaths::new(served);
        let backup = paths.backup();
        let temp = paths.temp();

        let original_bytes = fs::metadata(served)
            .await
            .map_err(|source| TranscodeError::Backup {
                path: served.to_path_buf(),
                source,
            })?
            .len();

        fs::copy(served, &backup)
            .await
            .map_err(|source| TranscodeError::Backup {
                path: backup.clone(),
                source,
            })?;
        self.store.set_state(video_id, VideoState::BackedUp).await?;

        self.store.set_state(video_id, VideoState::Encoding).await?;
        if let Err(err) = self.run_encoder(&backup, &temp).await {
            remove_if_present(&temp).await;
            self.store.set_state(video_id, VideoState::Failed).await?;
            return Err(err);
        }

        let encoded_bytes = match fs::metadata(&temp).await {
            Ok(meta) => meta.len(),
            Err(err) => {
                remove_if_present(&temp).await;
                self.store.set_state(video_id, VideoState::Failed).await?;
                return Err(TranscodeError::Io(err));
            }
        };

        // The atomic boundary: a concurrent reader sees either the complete
        // pre-transcode file or the complete post-transcode file, never a mix.
        if let Err(err) = fs::rename(&temp, served).await {
            remove_if_present(&temp).await;
            self.store.set_state(video_id, VideoState::Failed).await?;
            return Err(TranscodeError::Swap(err));
        }
        self.store.set_state(video_id, VideoState::Swapped).await?;

        Ok(TranscodeReport {
            video_id,
            original_bytes,
            encoded_bytes,
        })
    }

    /// Invoke the external encoder with fixed parameters: H.264 at CRF 23,
    /// yuv420p for broad playback compatibility, AAC audio at 128k, and the
    /// moov atom moved up front so playback can begin mid-download.
    async fn run_encoder(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-c:v", "libx264"])
            .args(["-crf", "23"])
            .args(["-pix_fmt", "yuv420p"])
            .args(["-c:a", "aac"])
            .args(["-b:a", "128k"])
            .args(["-movflags", "+faststart"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| TranscodeError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(out)) if out.status.success() => Ok(()),
            Ok(Ok(out)) => Err(TranscodeError::Encoder {
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            }),
            Ok(Err(err)) => Err(TranscodeError::Io(err)),
            // Dropping the cancelled future kills the child (kill_on_drop).
            Err(_elapsed) => Err(TranscodeError::TimedOut(self.timeout)),
        }
    }

    /// Resolve videos left in a non-terminal state by a previous process.
    ///
    /// A row in `uploaded`, `backed_up` or `encoding` means the process died
    /// mid-sequence. The served path is still a complete file (only a
    /// completed rename ever changes it), so the row is marked `failed`, any
    /// leftover `_tmp` output is deleted, and the `_orig` backup is kept.
    /// Nothing is re-queued.
    pub async fn recover_interrupted(&self) -> Result<usize, TranscodeError> {
        let stale = self.store.stale_records().await?;
        for record in &stale {
            let paths = VideoPaths::new(self.store.served_path(&record.file_name));
            remove_if_present(&paths.temp()).await;
            self.store.set_state(record.id, VideoState::Failed).await?;
            warn!(
                video = %record.file_name,
                state = ?record.state,
                "marking interrupted transcode as failed"
            );
        }
        Ok(stale.len())
    }
}

/// Best-effort removal of a transient file.
async fn remove_if_present(path: &Path) {
    match fs::remove_file(path).await {
        Ok(_) => debug!("removed {}", path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => debug!("failed to remove {}: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::video::VideoRecord;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    async fn test_store(dir: &Path) -> VideoStore {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE videos (
                id BLOB PRIMARY KEY,
                file_name TEXT NOT NULL UNIQUE,
                content_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&db)
        .await
        .unwrap();
        VideoStore::new(Arc::new(db), dir, 10 * 1024 * 1024)
    }

    async fn insert_video(store: &VideoStore, file_name: &str, bytes: &[u8]) -> VideoRecord {
        std::fs::write(store.served_path(file_name), bytes).unwrap();
        sqlx::query_as::<_, VideoRecord>(
            "INSERT INTO videos (id, file_name, content_type, size_bytes, checksum, state,
                                 created_at, updated_at)
             VALUES (?, ?, 'video/mp4', ?, ?, ?, ?, ?)
             RETURNING id, file_name, content_type, size_bytes, checksum, state,
                       created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(file_name)
        .bind(bytes.len() as i64)
        .bind(format!("{:x}", md5::compute(bytes)))
        .bind(VideoState::Uploaded)
        .bind(chrono::Utc::now())
        .bind(chrono::Utc::now())
        .fetch_one(&*store.db)
        .await
        .unwrap()
    }

    /// Write an executable shell script standing in for ffmpeg. Its arg list
    /// matches the real invocation: `$3` is the input (after `-y -i`), the
    /// last argument is the output path.
    fn stub_encoder(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("stub-encoder.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    const COPY_STUB: &str = r#"for arg in "$@"; do out="$arg"; done
printf 'encoded' > "$out""#;

    async fn current_state(store: &VideoStore, id: Uuid) -> VideoState {
        sqlx::query_as::<_, VideoRecord>(
            "SELECT id, file_name, content_type, size_bytes, checksum, state,
                    created_at, updated_at
             FROM videos WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*store.db)
        .await
        .unwrap()
        .state
    }

    #[tokio::test]
    async fn successful_transcode_swaps_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;
        let original: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let record = insert_video(&store, "video-1-1.mp4", &original).await;

        let encoder = stub_encoder(dir.path(), COPY_STUB);
        let transcoder = Transcoder::new(store.clone(), encoder);
        let report = transcoder
            .transcode(record.id, &store.served_path(&record.file_name))
            .await
            .unwrap();

        let served = std::fs::read(store.served_path(&record.file_name)).unwrap();
        assert_eq!(served, b"encoded");
        assert_eq!(report.original_bytes, 4096);
        assert_eq!(report.encoded_bytes, 7);

        // Backup is byte-identical to the pre-transcode served file.
        let paths = VideoPaths::new(store.served_path(&record.file_name));
        let backup = std::fs::read(paths.backup()).unwrap();
        assert_eq!(backup, original);

        assert!(!paths.temp().exists());
        assert_eq!(current_state(&store, record.id).await, VideoState::Swapped);
    }

    #[tokio::test]
    async fn failed_encode_leaves_served_bytes_and_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;
        let original = b"original bytes".to_vec();
        let record = insert_video(&store, "video-2-2.mp4", &original).await;

        let encoder = stub_encoder(dir.path(), "exit 1");
        let transcoder = Transcoder::new(store.clone(), encoder);
        let err = transcoder
            .transcode(record.id, &store.served_path(&record.file_name))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Encoder { .. }));

        let served = std::fs::read(store.served_path(&record.file_name)).unwrap();
        assert_eq!(served, original);
        let paths = VideoPaths::new(store.served_path(&record.file_name));
        assert!(!paths.temp().exists());
        assert_eq!(current_state(&store, record.id).await, VideoState::Failed);
    }

    #[tokio::test]
    async fn encoder_timeout_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;
        let record = insert_video(&store, "video-3-3.mp4", b"payload").await;

        let encoder = stub_encoder(dir.path(), "sleep 10");
        let transcoder = Transcoder::new(store.clone(), encoder)
            .with_timeout(Duration::from_millis(100));
        let err = transcoder
            .transcode(record.id, &store.served_path(&record.file_name))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::TimedOut(_)));
        assert_eq!(
            std::fs::read(store.served_path(&record.file_name)).unwrap(),
            b"payload"
        );
        assert_eq!(current_state(&store, record.id).await, VideoState::Failed);
    }

    #[tokio::test]
    async fn missing_served_file_fails_before_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;
        let record = insert_video(&store, "video-4-4.mp4", b"x").await;
        std::fs::remove_file(store.served_path(&record.file_name)).unwrap();

        let encoder = stub_encoder(dir.path(), COPY_STUB);
        let transcoder = Transcoder::new(store.clone(), encoder);
        let err = transcoder
            .transcode(record.id, &store.served_path(&record.file_name))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Backup { .. }));
    }

    #[tokio::test]
    async fn concurrent_transcodes_do_not_interfere() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;
        let rec_ok = insert_video(&store, "video-5-5.mp4", b"first original").await;
        let rec_bad = insert_video(&store, "video-6-6.mp4", b"second original").await;

        let good = Transcoder::new(store.clone(), stub_encoder(dir.path(), COPY_STUB));
        let bad_script = dir.path().join("bad-encoder.sh");
        std::fs::write(&bad_script, "#!/bin/sh\nexit 1\n").unwrap();
        let mut perms = std::fs::metadata(&bad_script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&bad_script, perms).unwrap();
        let bad = Transcoder::new(store.clone(), bad_script);

        let h1 = good.spawn(rec_ok.id, &rec_ok.file_name);
        let h2 = bad.spawn(rec_bad.id, &rec_bad.file_name);
        let (r1, r2) = tokio::join!(h1, h2);
        assert!(r1.unwrap().is_ok());
        assert!(r2.unwrap().is_err());

        assert_eq!(
            std::fs::read(store.served_path(&rec_ok.file_name)).unwrap(),
            b"encoded"
        );
        assert_eq!(
            std::fs::read(store.served_path(&rec_bad.file_name)).unwrap(),
            b"second original"
        );
        assert_eq!(current_state(&store, rec_ok.id).await, VideoState::Swapped);
        assert_eq!(current_state(&store, rec_bad.id).await, VideoState::Failed);
    }

    #[tokio::test]
    async fn recovery_marks_stale_rows_failed_and_clears_temp() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;
        let record = insert_video(&store, "video-7-7.mp4", b"still complete").await;
        store
            .set_state(record.id, VideoState::Encoding)
            .await
            .unwrap();
        let paths = VideoPaths::new(store.served_path(&record.file_name));
        std::fs::write(paths.temp(), b"half written").unwrap();

        let transcoder = Transcoder::new(store.clone(), "ffmpeg");
        let swept = transcoder.recover_interrupted().await.unwrap();
        assert_eq!(swept, 1);
        assert!(!paths.temp().exists());
        assert_eq!(current_state(&store, record.id).await, VideoState::Failed);
        assert_eq!(
            std::fs::read(store.served_path(&record.file_name)).unwrap(),
            b"still complete"
        );
    }
}

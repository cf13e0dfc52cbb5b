//! Lesson ingestion and video streaming handlers.
//!
//! Upload writes the file synchronously, records the lesson against the
//! served path, and answers with a redirect before the transcode has run;
//! the worker is spawned detached and its outcome goes to the log only.
//! Streaming honors single-range `Range` requests so playback can seek.

use crate::{
    errors::AppError,
    models::video::VideoRecord,
    services::{catalog_service::LessonInput, video_service},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Redirect, Response},
};
use futures::StreamExt;
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::warn;
use uuid::Uuid;

/// Collected metadata fields of the lesson form.
#[derive(Default)]
struct LessonForm {
    course_id: Option<Uuid>,
    title: Option<String>,
    slug: Option<String>,
    description: String,
    duration_minutes: i64,
    sort_order: i64,
    content: String,
}

/// `POST /admin/lessons` — multipart lesson form with an optional video.
///
/// The video part is validated (declared `video/*` type, size cap) and
/// persisted before any catalog write; the lesson row then references the
/// served path immediately, so readers may briefly stream original-quality
/// bytes until the background transcode swaps in the compressed file.
pub async fn upload_lesson(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Redirect, AppError> {
    let mut form = LessonForm::default();
    let mut video: Option<VideoRecord> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("reading multipart field: {err}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "video" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let original_name = field.file_name().unwrap_or("upload").to_string();
                let stream = field.map(|chunk| chunk.map_err(video_service::stream_io_error));
                let record = state
                    .videos
                    .save_upload("video", &original_name, &content_type, stream)
                    .await?;
                video = Some(record);
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("reading field `{name}`: {err}")))?;
                apply_field(&mut form, &name, value)?;
            }
        }
    }

    let course_id = form
        .course_id
        .ok_or_else(|| AppError::bad_request("missing course_id"))?;
    let title = form
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("missing title"))?;
    let slug = form
        .slug
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("missing slug"))?;

    let input = LessonInput {
        course_id,
        title,
        slug,
        description: form.description,
        duration_minutes: form.duration_minutes,
        sort_order: form.sort_order,
        content: form.content,
        video_url: video
            .as_ref()
            .map(|rec| format!("/videos/{}", rec.file_name)),
    };

    let lesson = match state.catalog.create_lesson(input).await {
        Ok(lesson) => lesson,
        Err(err) => {
            if let Some(rec) = &video {
                warn!(video = %rec.file_name, "lesson create failed, stored video is orphaned");
            }
            return Err(err.into());
        }
    };

    if let Some(rec) = &video {
        // Fire-and-forget: the handle carries the outcome, but nothing in
        // the request path waits on it.
        let _handle = state.transcoder.spawn(rec.id, &rec.file_name);
    }

    tracing::info!(lesson = %lesson.id, "lesson created");
    Ok(Redirect::to("/admin/lessons"))
}

fn apply_field(form: &mut LessonForm, name: &str, value: String) -> Result<(), AppError> {
    match name {
        "course_id" => {
            let id = value
                .parse::<Uuid>()
                .map_err(|_| AppError::bad_request(format!("invalid course_id `{value}`")))?;
            form.course_id = Some(id);
        }
        "title" => form.title = Some(value),
        "slug" => form.slug = Some(value),
        "description" => form.description = value,
        "duration" => {
            form.duration_minutes = value
                .parse::<i64>()
                .map_err(|_| AppError::bad_request(format!("invalid duration `{value}`")))?;
        }
        "sort_order" => {
            form.sort_order = value
                .parse::<i64>()
                .map_err(|_| AppError::bad_request(format!("invalid sort_order `{value}`")))?;
        }
        "content" => form.content = value,
        // Unknown fields are ignored rather than rejected.
        _ => {}
    }
    Ok(())
}

/// Outcome of parsing a `Range` header against a known file size.
#[derive(Debug, PartialEq, Eq)]
enum RangeRequest {
    /// A serveable window, inclusive on both ends.
    Window(u64, u64),
    /// Syntactically a range, but nothing in it can be served.
    Unsatisfiable,
    /// Not a single byte range; serve the whole file instead.
    Malformed,
}

/// Parse a single-range `Range` header.
///
/// Supports `bytes=0-499`, `bytes=500-`, and `bytes=-500`; the end is
/// clamped to the file. Multi-range requests are treated as malformed and
/// answered with the full file.
fn parse_range_header(raw: &str, file_size: u64) -> RangeRequest {
    let Some(spec) = raw.strip_prefix("bytes=") else {
        return RangeRequest::Malformed;
    };
    let parts: Vec<&str> = spec.split('-').collect();
    if parts.len() != 2 {
        return RangeRequest::Malformed;
    }
    let (start, end) = (parts[0].trim(), parts[1].trim());

    match (start.is_empty(), end.is_empty()) {
        // bytes=-500 (last 500 bytes)
        (true, false) => {
            let Ok(suffix_len) = end.parse::<u64>() else {
                return RangeRequest::Malformed;
            };
            if suffix_len == 0 || file_size == 0 {
                return RangeRequest::Unsatisfiable;
            }
            let start = file_size.saturating_sub(suffix_len);
            RangeRequest::Window(start, file_size - 1)
        }
        // bytes=500- (from 500 to end)
        (false, true) => {
            let Ok(start) = start.parse::<u64>() else {
                return RangeRequest::Malformed;
            };
            if start >= file_size {
                return RangeRequest::Unsatisfiable;
            }
            RangeRequest::Window(start, file_size - 1)
        }
        // bytes=0-499
        (false, false) => {
            let (Ok(start), Ok(end)) = (start.parse::<u64>(), end.parse::<u64>()) else {
                return RangeRequest::Malformed;
            };
            if start > end {
                return RangeRequest::Malformed;
            }
            if start >= file_size {
                return RangeRequest::Unsatisfiable;
            }
            RangeRequest::Window(start, end.min(file_size - 1))
        }
        (true, true) => RangeRequest::Malformed,
    }
}

/// `GET /videos/{file_name}` — stream a stored video.
///
/// The file's current size on disk is authoritative: the transcode may have
/// swapped smaller bytes under the stable served path. A stream opened
/// before that rename keeps reading the original file through its open
/// handle; one opened after reads the new file.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let (record, path) = state.videos.lookup(&file_name).await?;

    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|_| AppError::not_found(format!("video `{file_name}` not found")))?;
    let file_size = metadata.len();

    let content_type = HeaderValue::from_str(&record.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let range = headers
        .get(header::RANGE)
        .and_then(|h| h.to_str().ok())
        .map(|raw| parse_range_header(raw, file_size));

    match range {
        Some(RangeRequest::Window(start, end)) => {
            let length = end - start + 1;

            let mut file = File::open(&path)
                .await
                .map_err(|_| AppError::not_found(format!("video `{file_name}` not found")))?;
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|err| AppError::internal(format!("seeking video: {err}")))?;

            let stream = ReaderStream::new(file.take(length));
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, length.to_string())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, file_size),
                )
                .header(header::ACCEPT_RANGES, "bytes")
                .body(Body::from_stream(stream))
                .map_err(|err| AppError::internal(err.to_string()))
        }
        Some(RangeRequest::Unsatisfiable) => Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{}", file_size))
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::empty())
            .map_err(|err| AppError::internal(err.to_string())),
        Some(RangeRequest::Malformed) | None => {
            let file = File::open(&path)
                .await
                .map_err(|_| AppError::not_found(format!("video `{file_name}` not found")))?;

            let stream = ReaderStream::new(file);
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, file_size.to_string())
                .header(header::ACCEPT_RANGES, "bytes")
                .body(Body::from_stream(stream))
                .map_err(|err| AppError::internal(err.to_string()))
        }
    }
}

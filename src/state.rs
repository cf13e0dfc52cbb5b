//! Shared application state handed to every handler.

use crate::config::AppConfig;
use crate::services::{
    auth_service::AuthService, catalog_service::CatalogService, transcode_service::Transcoder,
    video_service::VideoStore,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Cheap-to-clone bundle of the services behind the router.
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub videos: VideoStore,
    pub transcoder: Transcoder,
    pub auth: AuthService,
    pub max_upload_bytes: u64,
}

impl AppState {
    pub fn new(db: Arc<SqlitePool>, cfg: &AppConfig) -> Self {
        let videos = VideoStore::new(db.clone(), &cfg.video_dir, cfg.max_upload_bytes);
        Self {
            catalog: CatalogService::new(db.clone()),
            transcoder: Transcoder::new(videos.clone(), &cfg.ffmpeg_path),
            videos,
            auth: AuthService::new(db),
            max_upload_bytes: cfg.max_upload_bytes,
        }
    }
}

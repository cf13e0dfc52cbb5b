use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Default cap on accepted upload size: 500 MiB.
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub video_dir: String,
    pub database_url: String,
    pub ffmpeg_path: String,
    pub max_upload_bytes: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Course catalog and video lesson server")]
pub struct Args {
    /// Host to bind to (overrides COURSEBOX_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides COURSEBOX_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where lesson videos are stored (overrides COURSEBOX_VIDEO_DIR)
    #[arg(long)]
    pub video_dir: Option<String>,

    /// Database URL (overrides COURSEBOX_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Encoder binary used for background transcodes (overrides COURSEBOX_FFMPEG)
    #[arg(long)]
    pub ffmpeg: Option<String>,

    /// Maximum accepted upload size in bytes (overrides COURSEBOX_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("COURSEBOX_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("COURSEBOX_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing COURSEBOX_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading COURSEBOX_PORT"),
        };
        let env_video_dir =
            env::var("COURSEBOX_VIDEO_DIR").unwrap_or_else(|_| "./data/videos".into());
        let env_db = env::var("COURSEBOX_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/coursebox.db".into());
        let env_ffmpeg = env::var("COURSEBOX_FFMPEG").unwrap_or_else(|_| "ffmpeg".into());
        let env_max_upload = match env::var("COURSEBOX_MAX_UPLOAD_BYTES") {
            Ok(value) => value
                .parse::<u64>()
                .with_context(|| format!("parsing COURSEBOX_MAX_UPLOAD_BYTES value `{}`", value))?,
            Err(env::VarError::NotPresent) => DEFAULT_MAX_UPLOAD_BYTES,
            Err(err) => return Err(err).context("reading COURSEBOX_MAX_UPLOAD_BYTES"),
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            video_dir: args.video_dir.unwrap_or(env_video_dir),
            database_url: args.database_url.unwrap_or(env_db),
            ffmpeg_path: args.ffmpeg.unwrap_or(env_ffmpeg),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

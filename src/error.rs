//! Error taxonomy for the frame pipeline.
//!
//! Configuration errors are fatal at startup. Video, encoding and publish errors
//! are fatal to the current job only; the daemon logs them and keeps scheduling.

use thiserror::Error;

/// Boxed cause carried by publish failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BLUESKY_HANDLE and BLUESKY_PASSWORD must be set")]
    MissingCredentials,
    #[error("VIDEO_PATH must be set for daemon mode")]
    MissingVideoPath,
    #[error("invalid schedule time '{0}' (expected HH:MM)")]
    InvalidScheduleTime(String),
    #[error("BLUESKY_MAX_UPLOAD_SIZE must be an integer number of bytes, got '{0}'")]
    InvalidUploadSize(String),
}

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("video source not found: {path} ({reason})")]
    SourceNotFound { path: String, reason: String },
    #[error("video source has no frames: {path}")]
    NoFrames { path: String },
    #[error("failed to decode frame from {path}: {reason}")]
    DecodeFailure { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("cannot fit image into {budget} bytes (smallest encoding was {smallest} bytes)")]
    BudgetUnsatisfiable { budget: u64, smallest: u64 },
    #[error("invalid frame buffer: {0}")]
    InvalidFrame(String),
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to log in as {handle}: {cause}")]
    AuthFailure {
        handle: String,
        #[source]
        cause: BoxError,
    },
    #[error("failed to upload image blob: {0}")]
    UploadFailure(#[source] BoxError),
    #[error("failed to create post record: {0}")]
    RecordFailure(#[source] BoxError),
}

/// Failure of a single job execution.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Video(#[from] VideoError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("frame artifact i/o failed: {0}")]
    Artifact(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("no daily fire times registered")]
    NothingScheduled,
}

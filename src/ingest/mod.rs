//! Random frame sampling from video sources.
//!
//! This module provides:
//! - `VideoSource`: the path of a local video (or a `stub://` synthetic source)
//! - `VideoDecoder` / `VideoHandle`: the decoder seam (synthetic, FFmpeg)
//! - `FrameSampler`: picks one frame uniformly at random and materializes it
//!   as a temporary PNG
//!
//! Decoder handles are opened and released inside a single `sample` call.
//! Nothing keeps a source open between jobs.

mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

use rand::Rng;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::VideoError;
use crate::frame::{FrameArtifact, SampledFrame};

pub use file::FileDecoder;

/// Identifier of a decodable frame sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoSource {
    path: String,
}

impl VideoSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Short display name (the file name, or the full identifier as a fallback).
    pub fn name(&self) -> &str {
        if self.is_synthetic() {
            return &self.path;
        }
        Path::new(&self.path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.path)
    }

    pub fn is_synthetic(&self) -> bool {
        self.path.starts_with(file::STUB_SCHEME)
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Decoded RGB8 pixels of one frame.
#[derive(Debug)]
pub struct DecodedFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Opens video sources.
pub trait VideoDecoder {
    /// Open `source`. Missing or unopenable sources fail with `SourceNotFound`.
    fn open(&self, source: &VideoSource) -> Result<Box<dyn VideoHandle>, VideoError>;
}

/// An open video. Dropping the handle releases every decoder resource.
pub trait VideoHandle {
    /// Total number of frames reported by the container.
    fn frame_count(&self) -> u64;

    /// Position the decoder so the next `read_frame` returns frame `index`.
    fn seek(&mut self, index: u64) -> Result<(), VideoError>;

    /// Decode the frame at the current position.
    fn read_frame(&mut self) -> Result<DecodedFrame, VideoError>;

    /// Playback position of the last decoded frame, in milliseconds.
    fn position_msec(&self) -> f64;
}

/// Samples one random frame per call.
pub struct FrameSampler {
    decoder: Box<dyn VideoDecoder>,
    artifact_dir: PathBuf,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(FileDecoder)
    }
}

impl FrameSampler {
    pub fn new(decoder: impl VideoDecoder + 'static) -> Self {
        Self {
            decoder: Box::new(decoder),
            artifact_dir: std::env::temp_dir(),
        }
    }

    /// Place artifacts in `dir` instead of the system temp directory root.
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Sample one frame uniformly at random from `source`.
    ///
    /// The returned frame owns a temporary PNG of the decoded pixels; it is
    /// deleted when the frame is dropped or discarded.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        source: &VideoSource,
        rng: &mut R,
    ) -> Result<SampledFrame, VideoError> {
        let (decoded, index, position_msec) = {
            let mut handle = self.decoder.open(source)?;
            let frame_count = handle.frame_count();
            if frame_count == 0 {
                return Err(VideoError::NoFrames {
                    path: source.to_string(),
                });
            }

            let index = rng.gen_range(0..frame_count);
            log::debug!(
                "sampling frame {} of {} from {}",
                index,
                frame_count,
                source
            );
            handle.seek(index)?;
            let decoded = handle.read_frame()?;
            (decoded, index, handle.position_msec())
        };

        let timestamp_seconds = position_msec / 1000.0;
        let artifact = FrameArtifact::write_png(
            &self.artifact_dir,
            &decoded.pixels,
            decoded.width,
            decoded.height,
        )
        .map_err(|e| VideoError::DecodeFailure {
            path: source.to_string(),
            reason: format!("failed to write frame artifact: {}", e),
        })?;
        log::info!(
            "sampled frame {} at {:.2}s from {} -> {}",
            index,
            timestamp_seconds,
            source,
            artifact.path().display()
        );

        Ok(
            SampledFrame::from_rgb(decoded.pixels, decoded.width, decoded.height, timestamp_seconds)
                .with_index(index)
                .with_artifact(artifact),
        )
    }
}

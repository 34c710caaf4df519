//! Local file decoder.
//!
//! `FileDecoder` opens:
//! - `stub://<frames>` synthetic sources (deterministic gradients, 25 fps)
//! - local video files via FFmpeg (feature: ingest-file-ffmpeg)
//!
//! Remote URLs are rejected; only local paths are sampled.

use super::{DecodedFrame, VideoDecoder, VideoHandle, VideoSource};
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegVideoHandle;
use crate::error::VideoError;

pub(crate) const STUB_SCHEME: &str = "stub://";

const SYNTHETIC_DEFAULT_FRAMES: u64 = 250;
const SYNTHETIC_FPS: f64 = 25.0;
const SYNTHETIC_WIDTH: u32 = 320;
const SYNTHETIC_HEIGHT: u32 = 240;

/// Default decoder: synthetic `stub://` sources plus FFmpeg-backed local files.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileDecoder;

impl VideoDecoder for FileDecoder {
    fn open(&self, source: &VideoSource) -> Result<Box<dyn VideoHandle>, VideoError> {
        let path = source.path();
        if !is_local_file_path(path) {
            return Err(VideoError::SourceNotFound {
                path: path.to_string(),
                reason: "only local paths are supported (no URL schemes)".to_string(),
            });
        }
        if source.is_synthetic() {
            return Ok(Box::new(SyntheticVideo::parse(path)?));
        }
        if !std::path::Path::new(path).is_file() {
            return Err(VideoError::SourceNotFound {
                path: path.to_string(),
                reason: "no such file".to_string(),
            });
        }

        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Box::new(FfmpegVideoHandle::open(path)?))
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(VideoError::SourceNotFound {
                path: path.to_string(),
                reason: "video decoding requires the ingest-file-ffmpeg feature".to_string(),
            })
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and dry runs
// ----------------------------------------------------------------------------

struct SyntheticVideo {
    path: String,
    frame_count: u64,
    cursor: u64,
    position_msec: f64,
}

impl SyntheticVideo {
    fn parse(path: &str) -> Result<Self, VideoError> {
        let count = path.trim_start_matches(STUB_SCHEME);
        let frame_count = if count.is_empty() {
            SYNTHETIC_DEFAULT_FRAMES
        } else {
            count.parse().map_err(|_| VideoError::SourceNotFound {
                path: path.to_string(),
                reason: "synthetic sources are written stub://<frame count>".to_string(),
            })?
        };
        log::debug!("synthetic source {} with {} frames", path, frame_count);
        Ok(Self {
            path: path.to_string(),
            frame_count,
            cursor: 0,
            position_msec: 0.0,
        })
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let (w, h) = (SYNTHETIC_WIDTH as u64, SYNTHETIC_HEIGHT as u64);
        let mut pixels = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                pixels.push(((x + self.cursor) % 256) as u8);
                pixels.push(((y + self.cursor * 3) % 256) as u8);
                pixels.push(((x + y) % 256) as u8);
            }
        }
        pixels
    }
}

impl VideoHandle for SyntheticVideo {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn seek(&mut self, index: u64) -> Result<(), VideoError> {
        if index >= self.frame_count {
            return Err(VideoError::DecodeFailure {
                path: self.path.clone(),
                reason: format!("seek past end ({} >= {})", index, self.frame_count),
            });
        }
        self.cursor = index;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<DecodedFrame, VideoError> {
        let pixels = self.generate_pixels();
        self.position_msec = self.cursor as f64 * 1000.0 / SYNTHETIC_FPS;
        self.cursor += 1;
        Ok(DecodedFrame {
            pixels,
            width: SYNTHETIC_WIDTH,
            height: SYNTHETIC_HEIGHT,
        })
    }

    fn position_msec(&self) -> f64 {
        self.position_msec
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with(STUB_SCHEME) {
        return true;
    }
    !path.contains("://")
}

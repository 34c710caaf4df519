//! Frame and image containers passed between pipeline stages.
//!
//! - `SampledFrame`: one decoded frame plus its position in the source video.
//! - `FrameArtifact`: the temporary PNG backing a sampled frame. Removed on drop.
//! - `EncodedImage`: the final bytes handed to the publisher.
//! - `ByteBudget`: upper bound on the size of an `EncodedImage`.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::fmt;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tempfile::TempPath;

/// Default upload ceiling for Bluesky image blobs (900 KiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 900 * 1024;

const ARTIFACT_PREFIX: &str = "framedrop_";

// ----------------------------------------------------------------------------
// Format tags
// ----------------------------------------------------------------------------

/// Pixel layout of a decoded frame buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit RGB, row-major, no padding.
    Rgb8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// Container format of an encoded image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    pub fn is_lossy(&self) -> bool {
        matches!(self, ImageFormat::Jpeg)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Jpeg => f.write_str("jpeg"),
            ImageFormat::Png => f.write_str("png"),
        }
    }
}

// ----------------------------------------------------------------------------
// ByteBudget
// ----------------------------------------------------------------------------

/// Maximum size in bytes of the artifact handed to the publisher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteBudget(u64);

impl ByteBudget {
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Returns true when `len` bytes fit within the budget.
    pub fn fits(&self, len: usize) -> bool {
        (len as u64) <= self.0
    }
}

impl Default for ByteBudget {
    fn default() -> Self {
        Self(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl fmt::Display for ByteBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

// ----------------------------------------------------------------------------
// FrameArtifact: temporary PNG on disk
// ----------------------------------------------------------------------------

/// Temporary PNG rendition of a sampled frame.
///
/// The file lives in the given temp directory under a unique `framedrop_*.png`
/// name. It is deleted exactly once: either by `remove()` or when dropped.
#[derive(Debug)]
pub struct FrameArtifact {
    path: TempPath,
}

impl FrameArtifact {
    pub(crate) fn write_png(dir: &Path, pixels: &[u8], width: u32, height: u32) -> io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(ARTIFACT_PREFIX)
            .suffix(".png")
            .tempfile_in(dir)?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            PngEncoder::new(&mut writer)
                .write_image(pixels, width, height, ExtendedColorType::Rgb8)
                .map_err(io::Error::other)?;
            writer.flush()?;
        }
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the encoded artifact back from disk.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    /// Delete the file now, surfacing any I/O error.
    pub fn remove(self) -> io::Result<()> {
        self.path.close()
    }
}

// ----------------------------------------------------------------------------
// SampledFrame
// ----------------------------------------------------------------------------

/// A single decoded frame sampled from a video source.
///
/// Immutable once produced. Dropping the frame deletes its backing artifact.
#[derive(Debug)]
pub struct SampledFrame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    frame_index: u64,
    timestamp_seconds: f64,
    source_format: Option<ImageFormat>,
    artifact: Option<FrameArtifact>,
}

impl SampledFrame {
    /// Wrap a packed RGB8 buffer. Buffer length is checked at encode time.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, timestamp_seconds: f64) -> Self {
        Self {
            pixels,
            width,
            height,
            pixel_format: PixelFormat::Rgb8,
            frame_index: 0,
            timestamp_seconds,
            source_format: None,
            artifact: None,
        }
    }

    pub(crate) fn with_index(mut self, frame_index: u64) -> Self {
        self.frame_index = frame_index;
        self
    }

    pub(crate) fn with_artifact(mut self, artifact: FrameArtifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Record the container format the pixels originally came from.
    pub fn with_source_format(mut self, format: ImageFormat) -> Self {
        self.source_format = Some(format);
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Index of the sampled frame within the source.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Playback position of the frame in seconds (unrounded).
    pub fn timestamp_seconds(&self) -> f64 {
        self.timestamp_seconds
    }

    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }

    pub fn artifact(&self) -> Option<&FrameArtifact> {
        self.artifact.as_ref()
    }

    /// Copy the pixels into an `RgbImage`, or `None` if the buffer length
    /// does not match the dimensions.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        let expected = (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.pixel_format.bytes_per_pixel())?;
        if self.pixels.len() != expected {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.pixels.clone())
    }

    /// Drop the frame and delete its artifact, reporting removal errors.
    pub fn discard(mut self) -> io::Result<()> {
        match self.artifact.take() {
            Some(artifact) => artifact.remove(),
            None => Ok(()),
        }
    }
}

// ----------------------------------------------------------------------------
// EncodedImage
// ----------------------------------------------------------------------------

/// Final encoded bytes ready for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_is_removed_on_drop() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let artifact = FrameArtifact::write_png(dir.path(), &[128u8; 4 * 4 * 3], 4, 4)?;
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        assert!(path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(ARTIFACT_PREFIX) && name.ends_with(".png")));

        drop(artifact);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn discard_removes_artifact() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let artifact = FrameArtifact::write_png(dir.path(), &[0u8; 2 * 2 * 3], 2, 2)?;
        let path = artifact.path().to_path_buf();
        let frame = SampledFrame::from_rgb(vec![0u8; 12], 2, 2, 0.0).with_artifact(artifact);

        frame.discard()?;
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn rgb_image_rejects_short_buffers() {
        let frame = SampledFrame::from_rgb(vec![0u8; 10], 2, 2, 0.0);
        assert!(frame.to_rgb_image().is_none());
    }

    #[test]
    fn budget_fits_is_inclusive() {
        let budget = ByteBudget::new(1000);
        assert!(budget.fits(1000));
        assert!(!budget.fits(1001));
        assert_eq!(ByteBudget::default().bytes(), 921_600);
    }
}

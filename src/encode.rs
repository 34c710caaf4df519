//! Size-constrained image encoding.
//!
//! `encode` shrinks a frame until it fits a byte budget in two bounded phases:
//!
//! 1. Quality ladder: JPEG quality 95, 90, ... 15 at full resolution.
//! 2. Resolution steps: scale both sides by 0.9 (Lanczos3) and re-encode at
//!    quality 95, stopping before either side drops below 100 px.
//!
//! If nothing fits, the caller gets `EncodingError::BudgetUnsatisfiable` with the
//! smallest size that was reached.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, RgbImage};

use crate::error::EncodingError;
use crate::frame::{ByteBudget, EncodedImage, ImageFormat, SampledFrame};

/// First rung of the quality ladder.
pub const MAX_QUALITY: u8 = 95;
/// Quality decrement between rungs.
pub const QUALITY_STEP: u8 = 5;
/// Ladder stops before reaching this quality.
pub const QUALITY_FLOOR: u8 = 10;
/// Per-step scale factor in the resolution phase.
pub const SCALE_FACTOR: f64 = 0.9;
/// Smallest allowed side length in the resolution phase.
pub const MIN_DIMENSION: u32 = 100;

/// Quality levels tried in order: 95, 90, ..., 15.
pub fn quality_ladder() -> impl Iterator<Item = u8> {
    (QUALITY_FLOOR + QUALITY_STEP..=MAX_QUALITY)
        .rev()
        .step_by(QUALITY_STEP as usize)
}

/// Successive (width, height) pairs for the resolution phase.
///
/// Each step scales the previous one by `SCALE_FACTOR`, rounded to the nearest
/// pixel. The sequence ends before either side would fall below `MIN_DIMENSION`;
/// since `round(0.9 * d) < d` for every `d >= MIN_DIMENSION` it is finite.
pub fn scale_steps(width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    std::iter::successors(Some((width, height)), |&(w, h)| {
        let next = (scale(w), scale(h));
        (next.0 >= MIN_DIMENSION && next.1 >= MIN_DIMENSION && next != (w, h)).then_some(next)
    })
    .skip(1)
}

fn scale(side: u32) -> u32 {
    (f64::from(side) * SCALE_FACTOR).round() as u32
}

/// Encode `frame` so the result fits in `budget`.
///
/// `preferred_format` falls back to the frame's source format, then JPEG.
/// A PNG preference gets a single lossless attempt before the lossy ladder,
/// because quality has no effect on PNG size.
pub fn encode(
    frame: &SampledFrame,
    budget: ByteBudget,
    preferred_format: Option<ImageFormat>,
) -> Result<EncodedImage, EncodingError> {
    let image = frame.to_rgb_image().ok_or_else(|| {
        EncodingError::InvalidFrame(format!(
            "{} bytes for {}x{} {:?}",
            frame.pixels().len(),
            frame.width(),
            frame.height(),
            frame.pixel_format()
        ))
    })?;
    let format = preferred_format
        .or(frame.source_format())
        .unwrap_or(ImageFormat::Jpeg);
    encode_image(&image, budget, format)
}

/// Encode an in-memory RGB image against a budget. See [`encode`].
pub fn encode_image(
    image: &RgbImage,
    budget: ByteBudget,
    format: ImageFormat,
) -> Result<EncodedImage, EncodingError> {
    let mut smallest = u64::MAX;
    let mut attempt = |bytes: Vec<u8>, format: ImageFormat, width: u32, height: u32| {
        smallest = smallest.min(bytes.len() as u64);
        budget.fits(bytes.len()).then_some(EncodedImage {
            bytes,
            format,
            width,
            height,
        })
    };

    let (width, height) = image.dimensions();

    if !format.is_lossy() {
        let bytes = encode_png(image)?;
        log::debug!("png attempt: {} bytes (budget {})", bytes.len(), budget);
        if let Some(encoded) = attempt(bytes, ImageFormat::Png, width, height) {
            return Ok(encoded);
        }
    }

    for quality in quality_ladder() {
        let bytes = encode_jpeg(image, quality)?;
        log::debug!(
            "quality {}: {} bytes (budget {})",
            quality,
            bytes.len(),
            budget
        );
        if let Some(encoded) = attempt(bytes, ImageFormat::Jpeg, width, height) {
            return Ok(encoded);
        }
    }

    log::info!(
        "quality ladder exhausted for {}x{}, reducing resolution",
        width,
        height
    );
    for (w, h) in scale_steps(width, height) {
        let resized = imageops::resize(image, w, h, FilterType::Lanczos3);
        let bytes = encode_jpeg(&resized, MAX_QUALITY)?;
        log::debug!("{}x{}: {} bytes (budget {})", w, h, bytes.len(), budget);
        if let Some(encoded) = attempt(bytes, ImageFormat::Jpeg, w, h) {
            return Ok(encoded);
        }
    }

    Err(EncodingError::BudgetUnsatisfiable {
        budget: budget.bytes(),
        smallest,
    })
}

/// Encode as baseline JPEG at the given quality (1-100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, CompressionType::Best, PngFilter::Adaptive)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn solid(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb([40, 120, 200]))
    }

    fn noise(width: u32, height: u32, seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        RgbImage::from_fn(width, height, |_, _| image::Rgb(rng.gen()))
    }

    #[test]
    fn ladder_is_95_down_to_15() {
        let ladder: Vec<u8> = quality_ladder().collect();
        assert_eq!(ladder.first(), Some(&95));
        assert_eq!(ladder.last(), Some(&15));
        assert_eq!(ladder.len(), 17);
        assert!(ladder.windows(2).all(|pair| pair[0] - pair[1] == 5));
    }

    #[test]
    fn scale_steps_stop_at_minimum_dimension() {
        let steps: Vec<(u32, u32)> = scale_steps(200, 150).collect();
        assert_eq!(steps.first(), Some(&(180, 135)));
        assert!(steps.iter().all(|&(w, h)| w >= MIN_DIMENSION && h >= MIN_DIMENSION));
        let &(w, h) = steps.last().unwrap();
        assert!(scale(w) < MIN_DIMENSION || scale(h) < MIN_DIMENSION);
    }

    #[test]
    fn scale_steps_empty_for_small_images() {
        assert_eq!(scale_steps(100, 100).count(), 0);
        assert_eq!(scale_steps(50, 400).count(), 0);
    }

    #[test]
    fn generous_budget_takes_first_rung() -> anyhow::Result<()> {
        let image = noise(64, 64, 7);
        let expected = encode_jpeg(&image, MAX_QUALITY)?;
        let encoded = encode_image(&image, ByteBudget::new(10_000_000), ImageFormat::Jpeg)?;
        assert_eq!(encoded.bytes, expected);
        assert_eq!((encoded.width, encoded.height), (64, 64));
        Ok(())
    }

    #[test]
    fn result_never_exceeds_budget() -> anyhow::Result<()> {
        let image = noise(256, 256, 11);
        for budget in [200_000u64, 60_000, 20_000, 8_000, 3_000] {
            let budget = ByteBudget::new(budget);
            match encode_image(&image, budget, ImageFormat::Jpeg) {
                Ok(encoded) => assert!(budget.fits(encoded.size())),
                Err(EncodingError::BudgetUnsatisfiable { smallest, .. }) => {
                    assert!(smallest > budget.bytes())
                }
                Err(other) => return Err(other.into()),
            }
        }
        Ok(())
    }

    #[test]
    fn ladder_sizes_shrink_on_average() -> anyhow::Result<()> {
        let image = noise(128, 128, 3);
        let sizes = quality_ladder()
            .map(|quality| encode_jpeg(&image, quality).map(|bytes| bytes.len()))
            .collect::<Result<Vec<_>, _>>()?;
        let increases = sizes.windows(2).filter(|pair| pair[1] > pair[0]).count();
        assert!(sizes.first() > sizes.last());
        assert!(increases * 2 < sizes.len());
        Ok(())
    }

    #[test]
    fn tiny_budget_on_solid_image_reduces_resolution() -> anyhow::Result<()> {
        let image = solid(200, 200);
        assert!(encode_jpeg(&image, 15)?.len() > 1000);

        let encoded = encode_image(&image, ByteBudget::new(1000), ImageFormat::Jpeg)?;
        assert!(encoded.size() <= 1000);
        assert!(encoded.width < 200 && encoded.height < 200);
        assert!(encoded.width >= MIN_DIMENSION && encoded.height >= MIN_DIMENSION);
        Ok(())
    }

    #[test]
    fn ladder_fit_keeps_full_resolution() -> anyhow::Result<()> {
        let image = noise(256, 256, 11);
        let budget = ByteBudget::new(60_000);
        assert!(encode_jpeg(&image, MAX_QUALITY)?.len() > 60_000);
        assert!(encode_jpeg(&image, 15)?.len() <= 60_000);

        let encoded = encode_image(&image, budget, ImageFormat::Jpeg)?;
        assert!(budget.fits(encoded.size()));
        assert_eq!((encoded.width, encoded.height), (256, 256));
        Ok(())
    }

    #[test]
    fn impossible_budget_is_unsatisfiable() {
        let image = solid(200, 200);
        let err = encode_image(&image, ByteBudget::new(10), ImageFormat::Jpeg).unwrap_err();
        match err {
            EncodingError::BudgetUnsatisfiable { budget, smallest } => {
                assert_eq!(budget, 10);
                assert!(smallest > 10);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn png_preference_keeps_png_when_it_fits() -> anyhow::Result<()> {
        let image = solid(120, 80);
        let encoded = encode_image(&image, ByteBudget::new(1_000_000), ImageFormat::Png)?;
        assert_eq!(encoded.format, ImageFormat::Png);
        Ok(())
    }

    #[test]
    fn png_preference_falls_back_to_jpeg() -> anyhow::Result<()> {
        let image = noise(128, 128, 5);
        let png_len = encode_png(&image)?.len() as u64;
        let encoded = encode_image(&image, ByteBudget::new(png_len - 1), ImageFormat::Png)?;
        assert_eq!(encoded.format, ImageFormat::Jpeg);
        Ok(())
    }

    #[test]
    fn source_format_is_used_when_no_preference() -> anyhow::Result<()> {
        let image = solid(120, 80);
        let frame = SampledFrame::from_rgb(image.into_raw(), 120, 80, 0.0)
            .with_source_format(ImageFormat::Png);
        let encoded = encode(&frame, ByteBudget::new(1_000_000), None)?;
        assert_eq!(encoded.format, ImageFormat::Png);

        let encoded = encode(&frame, ByteBudget::new(1_000_000), Some(ImageFormat::Jpeg))?;
        assert_eq!(encoded.format, ImageFormat::Jpeg);
        Ok(())
    }

    #[test]
    fn frame_with_bad_buffer_is_rejected() {
        let frame = SampledFrame::from_rgb(vec![0u8; 5], 4, 4, 0.0);
        assert!(matches!(
            encode(&frame, ByteBudget::default(), None),
            Err(EncodingError::InvalidFrame(_))
        ));
    }
}

//! Local video file decoder using FFmpeg.
//!
//! Frame count comes from stream metadata, falling back to duration times the
//! average frame rate for containers that do not record it. Seeking jumps to the
//! nearest keyframe at or before the target, then decodes forward until the
//! target presentation timestamp is reached. Seek targets and reported
//! positions are relative to the stream's start time, so containers that begin
//! at a nonzero timestamp (MPEG-TS) still index from frame 0 at 0 ms.

use ffmpeg_next as ffmpeg;

use super::{DecodedFrame, VideoHandle};
use crate::error::VideoError;

pub(crate) struct FfmpegVideoHandle {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    time_base: f64,
    start_pts: i64,
    frame_rate: f64,
    frame_count: u64,
    target_pts: i64,
    position_msec: f64,
}

impl FfmpegVideoHandle {
    pub(crate) fn open(path: &str) -> Result<Self, VideoError> {
        let not_found = |reason: String| VideoError::SourceNotFound {
            path: path.to_string(),
            reason,
        };
        ffmpeg::init().map_err(|e| not_found(format!("initialize ffmpeg: {}", e)))?;
        let input = ffmpeg::format::input(&path)
            .map_err(|e| not_found(format!("open input with ffmpeg: {}", e)))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| VideoError::NoFrames {
                path: path.to_string(),
            })?;
        let stream_index = input_stream.index();
        let time_base = f64::from(input_stream.time_base());
        let start_pts = stream_start_pts(input_stream.start_time());
        let frame_rate = f64::from(input_stream.avg_frame_rate());
        let reported_frames = input_stream.frames();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .map_err(|e| decode_failure(path, format!("load decoder parameters: {}", e)))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| decode_failure(path, format!("open video decoder: {}", e)))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| decode_failure(path, format!("create scaler: {}", e)))?;

        let frame_count = if reported_frames > 0 {
            reported_frames as u64
        } else {
            estimate_frame_count(input.duration(), frame_rate)
        };
        log::debug!(
            "ffmpeg opened {}: {} frames at {:.3} fps, start pts {}",
            path,
            frame_count,
            frame_rate,
            start_pts
        );

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            time_base,
            start_pts,
            frame_rate,
            frame_count,
            target_pts: 0,
            position_msec: 0.0,
        })
    }
}

impl VideoHandle for FfmpegVideoHandle {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn seek(&mut self, index: u64) -> Result<(), VideoError> {
        if self.frame_rate <= 0.0 || self.time_base <= 0.0 {
            return Err(decode_failure(&self.path, "stream has no frame rate"));
        }
        let (target_us, target_pts) =
            seek_target(index, self.frame_rate, self.time_base, self.start_pts);
        self.input
            .seek(target_us, ..target_us)
            .map_err(|e| decode_failure(&self.path, format!("seek to frame {}: {}", index, e)))?;
        self.decoder.flush();
        self.target_pts = target_pts;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<DecodedFrame, VideoError> {
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| decode_failure(&self.path, format!("send packet: {}", e)))?;

            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let pts = decoded.timestamp().unwrap_or(0);
                if pts < self.target_pts {
                    continue;
                }
                self.scaler
                    .run(&decoded, &mut rgb_frame)
                    .map_err(|e| decode_failure(&self.path, format!("scale frame: {}", e)))?;
                self.position_msec = relative_msec(pts, self.start_pts, self.time_base);
                return frame_to_pixels(&self.path, &rgb_frame);
            }
        }

        // Drain frames buffered by the decoder at end of stream.
        let _ = self.decoder.send_eof();
        let mut last = None;
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            last = decoded.timestamp();
            self.scaler
                .run(&decoded, &mut rgb_frame)
                .map_err(|e| decode_failure(&self.path, format!("scale frame: {}", e)))?;
            if last.unwrap_or(0) >= self.target_pts {
                break;
            }
        }
        match last {
            Some(pts) => {
                self.position_msec = relative_msec(pts, self.start_pts, self.time_base);
                frame_to_pixels(&self.path, &rgb_frame)
            }
            None => Err(decode_failure(&self.path, "stream ended before target frame")),
        }
    }

    fn position_msec(&self) -> f64 {
        self.position_msec
    }
}

fn estimate_frame_count(duration_us: i64, frame_rate: f64) -> u64 {
    if duration_us <= 0 || frame_rate <= 0.0 {
        return 0;
    }
    let seconds = duration_us as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE);
    (seconds * frame_rate).floor() as u64
}

/// Stream start in stream time base; unset start times count as 0.
fn stream_start_pts(start_time: i64) -> i64 {
    if start_time == ffmpeg::ffi::AV_NOPTS_VALUE {
        0
    } else {
        start_time
    }
}

/// Absolute seek position in `AV_TIME_BASE` units and the first acceptable
/// stream pts for frame `index`.
fn seek_target(index: u64, frame_rate: f64, time_base: f64, start_pts: i64) -> (i64, i64) {
    let offset_secs = index as f64 / frame_rate;
    let start_secs = start_pts as f64 * time_base;
    let seek_us = ((start_secs + offset_secs) * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
    let target_pts = start_pts + (offset_secs / time_base).round() as i64;
    (seek_us, target_pts)
}

fn relative_msec(pts: i64, start_pts: i64, time_base: f64) -> f64 {
    ((pts - start_pts) as f64 * time_base * 1000.0).max(0.0)
}

fn decode_failure(path: &str, reason: impl Into<String>) -> VideoError {
    VideoError::DecodeFailure {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn frame_to_pixels(path: &str, frame: &ffmpeg::frame::Video) -> Result<DecodedFrame, VideoError> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let pixels = data
            .get(..row_bytes * height as usize)
            .ok_or_else(|| decode_failure(path, "frame buffer is shorter than expected"))?;
        return Ok(DecodedFrame {
            pixels: pixels.to_vec(),
            width,
            height,
        });
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .ok_or_else(|| decode_failure(path, "frame row is out of bounds"))?,
        );
    }

    Ok(DecodedFrame {
        pixels,
        width,
        height,
    })
}

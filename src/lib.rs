//! framedrop
//!
//! Posts a random frame from a video file to Bluesky, once or on a daily
//! schedule.
//!
//! # Pipeline
//!
//! 1. **Sample**: pick a frame uniformly at random and record its playback
//!    position (`ingest`).
//! 2. **Caption**: build the post text and alt text (`caption`).
//! 3. **Fit**: pass the frame through if it is under the upload budget,
//!    otherwise re-encode it until it fits (`encode`).
//! 4. **Publish**: log in, upload the blob, create the post (`publish`).
//! 5. **Cleanup**: remove the temporary frame file on every path (`frame`).
//!
//! `job` sequences one pass of the pipeline; `schedule` repeats it at fixed
//! times of day in daemon mode.
//!
//! # Module Structure
//!
//! - `config`: environment configuration, read once at startup
//! - `error`: error taxonomy (config, video, encoding, publish)
//! - `frame`: frame, artifact, and encoded image containers
//! - `ingest`: video decoders and the random frame sampler
//! - `encode`: size-constrained JPEG/PNG encoding
//! - `publish`: publisher trait and Bluesky client
//! - `job`: single pipeline execution
//! - `schedule`: daily scheduler for daemon mode

pub mod caption;
pub mod config;
pub mod encode;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod job;
pub mod publish;
pub mod schedule;

pub use config::FramedropConfig;
pub use error::{ConfigError, EncodingError, JobError, PublishError, ScheduleError, VideoError};
pub use frame::{ByteBudget, EncodedImage, FrameArtifact, ImageFormat, PixelFormat, SampledFrame};
pub use ingest::{FileDecoder, FrameSampler, VideoDecoder, VideoHandle, VideoSource};
pub use job::{JobRunner, PostJob};
pub use publish::{BlueskyClient, Credentials, PostRequest, PublishReceipt, Publisher};
pub use schedule::{Clock, DailyTime, Scheduler, SchedulerState, SystemClock};

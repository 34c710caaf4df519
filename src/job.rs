//! One pipeline execution: sample -> caption -> fit to budget -> publish -> cleanup.
//!
//! Each run is single-attempt. The temporary frame artifact is owned by the
//! `SampledFrame`, so it is removed exactly once on every exit path: explicitly
//! after a successful publish, or by drop when any stage fails.

use rand::Rng;

use crate::caption::{build_alt_text, build_caption};
use crate::encode;
use crate::error::JobError;
use crate::frame::{ByteBudget, EncodedImage, ImageFormat, SampledFrame};
use crate::ingest::{FrameSampler, VideoSource};
use crate::publish::{publish_post, Credentials, PostRequest, PublishReceipt, Publisher};

/// What to post for one job.
#[derive(Clone, Debug)]
pub struct PostJob {
    pub video: VideoSource,
    pub text: String,
    pub include_timestamp: bool,
    pub budget: ByteBudget,
}

pub struct JobRunner {
    sampler: FrameSampler,
    credentials: Credentials,
}

impl JobRunner {
    pub fn new(sampler: FrameSampler, credentials: Credentials) -> Self {
        Self {
            sampler,
            credentials,
        }
    }

    /// Execute `job` once against `publisher`.
    pub fn run<P, R>(
        &self,
        job: &PostJob,
        publisher: &mut P,
        rng: &mut R,
    ) -> Result<PublishReceipt, JobError>
    where
        P: Publisher + ?Sized,
        R: Rng + ?Sized,
    {
        let frame = self.sampler.sample(&job.video, rng)?;
        let timestamp = frame.timestamp_seconds();

        let post = PostRequest {
            text: build_caption(&job.text, job.include_timestamp, timestamp),
            alt_text: build_alt_text(&job.video, timestamp),
            image: fit_to_budget(&frame, job.budget)?,
        };

        let receipt = publish_post(publisher, &self.credentials, &post)?;
        log::info!("posted frame from {} as {}", job.video, receipt.uri);

        if let Err(e) = frame.discard() {
            log::warn!("failed to remove frame artifact: {}", e);
        }
        Ok(receipt)
    }
}

/// Pass the frame's PNG artifact through when it already fits, otherwise
/// re-encode it under the budget.
pub fn fit_to_budget(frame: &SampledFrame, budget: ByteBudget) -> Result<EncodedImage, JobError> {
    if let Some(artifact) = frame.artifact() {
        let baseline = artifact.read()?;
        if budget.fits(baseline.len()) {
            log::debug!(
                "frame artifact is {} bytes, within {}",
                baseline.len(),
                budget
            );
            return Ok(EncodedImage {
                bytes: baseline,
                format: ImageFormat::Png,
                width: frame.width(),
                height: frame.height(),
            });
        }
        log::info!(
            "frame artifact is {} bytes, over {}; re-encoding",
            baseline.len(),
            budget
        );
    }

    let encoded = encode::encode(frame, budget, frame.source_format())?;
    log::info!(
        "re-encoded frame to {} bytes ({}, {}x{})",
        encoded.size(),
        encoded.format,
        encoded.width,
        encoded.height
    );
    Ok(encoded)
}

//! framedrop - post random video frames to Bluesky.
//!
//! With `--video`, runs the pipeline once and exits (non-zero on failure).
//! Without it, runs as a daemon and posts at each `SCHEDULE_TIMES` entry every
//! day until interrupted.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use framedrop::{
    BlueskyClient, FrameSampler, FramedropConfig, JobRunner, PostJob, Scheduler, SystemClock,
    VideoSource,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "FrameDrop: post random video frames to Bluesky"
)]
struct Args {
    /// Path to the video file for a single run. Omit to run as a daemon.
    #[arg(long)]
    video: Option<String>,

    /// Text to accompany the frame for a single run.
    #[arg(long, default_value = "")]
    text: String,

    /// Include the frame timestamp in the post for a single run.
    #[arg(long)]
    timestamp: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = FramedropConfig::load().context("load configuration")?;

    match args.video.clone() {
        Some(video) => run_single(&config, &args, video),
        None => run_daemon(&config),
    }
}

fn run_single(config: &FramedropConfig, args: &Args, video: String) -> Result<()> {
    log::info!("starting single run");
    config.validate_for_single_run()?;

    let runner = JobRunner::new(FrameSampler::default(), config.credentials()?);
    let mut publisher = BlueskyClient::new(&config.pds_url)?;
    let job = PostJob {
        video: VideoSource::new(video),
        text: args.text.clone(),
        include_timestamp: args.timestamp,
        budget: config.max_upload_size,
    };

    let receipt = runner.run(&job, &mut publisher, &mut rand::thread_rng())?;
    log::info!("successfully posted to Bluesky: {}", receipt.uri);
    Ok(())
}

fn run_daemon(config: &FramedropConfig) -> Result<()> {
    log::info!("starting daemon mode");
    config.validate_for_daemon()?;
    let video = config
        .video_path
        .clone()
        .ok_or_else(|| anyhow!("VIDEO_PATH must be set for daemon mode"))?;

    let runner = JobRunner::new(FrameSampler::default(), config.credentials()?);
    let mut publisher = BlueskyClient::new(&config.pds_url)?;
    let job = PostJob {
        video: VideoSource::new(video),
        text: config.post_text.clone(),
        include_timestamp: config.add_timestamp,
        budget: config.max_upload_size,
    };

    let mut scheduler = Scheduler::new(SystemClock);
    for at in config.schedule_times()? {
        scheduler.register(at);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    log::info!(
        "framedrop daemon running for {} (upload budget {})",
        job.video,
        job.budget
    );
    scheduler.run(&shutdown, |_| {
        runner
            .run(&job, &mut publisher, &mut rand::thread_rng())
            .map(|receipt| log::info!("successfully posted to Bluesky: {}", receipt.uri))
    })?;
    log::info!("shutdown signal received, exiting");
    Ok(())
}

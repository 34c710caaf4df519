//! Daily scheduler for daemon mode.
//!
//! The scheduler holds a list of wall-clock times of day. Each registered time
//! fires once per calendar day. The tick loop polls the clock at a fixed
//! interval and runs due jobs synchronously on the polling thread, so jobs never
//! overlap with each other or with the next poll.
//!
//! State: `Idle` (nothing registered) -> `Armed` (at least one time) ->
//! `Running` (loop active until the shutdown flag is raised).

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{ConfigError, ScheduleError};

/// Default interval between clock polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// ----------------------------------------------------------------------------
// DailyTime
// ----------------------------------------------------------------------------

/// A time of day with minute resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DailyTime {
    hour: u32,
    minute: u32,
}

impl DailyTime {
    pub const NOON: DailyTime = DailyTime {
        hour: 12,
        minute: 0,
    };

    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }

    /// First occurrence of this time strictly after `now`.
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date().and_time(self.time());
        if today > now {
            today
        } else {
            today + ChronoDuration::days(1)
        }
    }
}

impl FromStr for DailyTime {
    type Err = ConfigError;

    /// Parse `H:MM` or `HH:MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidScheduleTime(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(hour) || hour.len() > 2 || !all_digits(minute) || minute.len() != 2 {
            return Err(invalid());
        }
        let hour = hour.parse().map_err(|_| invalid())?;
        let minute = minute.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl fmt::Display for DailyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

// ----------------------------------------------------------------------------
// Clock
// ----------------------------------------------------------------------------

/// Time source for the scheduler.
pub trait Clock {
    /// Current local wall-clock time.
    fn now(&self) -> NaiveDateTime;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Local system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
    Running,
}

#[derive(Clone, Debug)]
struct ScheduledJob {
    at: DailyTime,
    next_fire: NaiveDateTime,
}

pub struct Scheduler<C: Clock> {
    clock: C,
    jobs: Vec<ScheduledJob>,
    state: SchedulerState,
    poll_interval: Duration,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            jobs: Vec::new(),
            state: SchedulerState::Idle,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Register a daily fire time. Duplicates are kept and fire independently.
    ///
    /// The first firing is today if `at` is still ahead, otherwise tomorrow.
    pub fn register(&mut self, at: DailyTime) {
        let next_fire = at.next_after(self.clock.now());
        log::info!("scheduled daily post at {} (next: {})", at, next_fire);
        self.jobs.push(ScheduledJob { at, next_fire });
        if self.state == SchedulerState::Idle {
            self.state = SchedulerState::Armed;
        }
    }

    pub fn registered(&self) -> Vec<DailyTime> {
        self.jobs.iter().map(|job| job.at).collect()
    }

    /// Earliest pending fire time, if any.
    pub fn next_fire(&self) -> Option<NaiveDateTime> {
        self.jobs.iter().map(|job| job.next_fire).min()
    }

    /// Run every job that is due at the current clock reading.
    ///
    /// Failures are logged; the job stays registered and fires again on its
    /// next daily occurrence. Returns the number of jobs that fired.
    pub fn run_pending<F, E>(&mut self, job: &mut F) -> usize
    where
        F: FnMut(DailyTime) -> Result<(), E>,
        E: fmt::Display,
    {
        let now = self.clock.now();
        let mut fired = 0;
        for scheduled in self.jobs.iter_mut() {
            if now < scheduled.next_fire {
                continue;
            }
            log::info!("running scheduled post for {}", scheduled.at);
            if let Err(e) = job(scheduled.at) {
                log::error!("scheduled post for {} failed: {}", scheduled.at, e);
            }
            scheduled.next_fire = scheduled.at.next_after(now);
            fired += 1;
        }
        fired
    }

    /// Poll until `shutdown` is raised, running due jobs as they come up.
    pub fn run<F, E>(&mut self, shutdown: &AtomicBool, mut job: F) -> Result<(), ScheduleError>
    where
        F: FnMut(DailyTime) -> Result<(), E>,
        E: fmt::Display,
    {
        if self.state == SchedulerState::Idle {
            return Err(ScheduleError::NothingScheduled);
        }
        self.state = SchedulerState::Running;
        log::info!(
            "scheduler running with {} daily time(s), polling every {:?}",
            self.jobs.len(),
            self.poll_interval
        );
        while !shutdown.load(Ordering::SeqCst) {
            self.run_pending(&mut job);
            self.clock.sleep(self.poll_interval);
        }
        log::info!("scheduler stopped");
        Ok(())
    }
}

//! Process configuration, read once from the environment at startup.

use std::str::FromStr;

use crate::error::ConfigError;
use crate::frame::{ByteBudget, DEFAULT_MAX_UPLOAD_BYTES};
use crate::publish::bluesky::DEFAULT_PDS_URL;
use crate::publish::Credentials;
use crate::schedule::DailyTime;

const DEFAULT_SCHEDULE_TIMES: &str = "12:00";

pub const ENV_HANDLE: &str = "BLUESKY_HANDLE";
pub const ENV_PASSWORD: &str = "BLUESKY_PASSWORD";
pub const ENV_PDS_URL: &str = "BLUESKY_PDS_URL";
pub const ENV_VIDEO_PATH: &str = "VIDEO_PATH";
pub const ENV_SCHEDULE_TIMES: &str = "SCHEDULE_TIMES";
pub const ENV_POST_TEXT: &str = "POST_TEXT";
pub const ENV_ADD_TIMESTAMP: &str = "ADD_TIMESTAMP";
pub const ENV_MAX_UPLOAD_SIZE: &str = "BLUESKY_MAX_UPLOAD_SIZE";

/// Every environment variable the program reads.
pub const ENV_KEYS: [&str; 8] = [
    ENV_HANDLE,
    ENV_PASSWORD,
    ENV_PDS_URL,
    ENV_VIDEO_PATH,
    ENV_SCHEDULE_TIMES,
    ENV_POST_TEXT,
    ENV_ADD_TIMESTAMP,
    ENV_MAX_UPLOAD_SIZE,
];

#[derive(Clone, Debug)]
pub struct FramedropConfig {
    pub bluesky_handle: Option<String>,
    pub bluesky_password: Option<String>,
    pub pds_url: String,
    pub video_path: Option<String>,
    /// Raw `SCHEDULE_TIMES` value; parsed by [`FramedropConfig::schedule_times`]
    /// so single runs never depend on it.
    pub schedule_setting: String,
    pub post_text: String,
    pub add_timestamp: bool,
    pub max_upload_size: ByteBudget,
}

impl Default for FramedropConfig {
    fn default() -> Self {
        Self {
            bluesky_handle: None,
            bluesky_password: None,
            pds_url: DEFAULT_PDS_URL.to_string(),
            video_path: None,
            schedule_setting: DEFAULT_SCHEDULE_TIMES.to_string(),
            post_text: String::new(),
            add_timestamp: true,
            max_upload_size: ByteBudget::new(DEFAULT_MAX_UPLOAD_BYTES),
        }
    }
}

impl FramedropConfig {
    /// Read the configuration from process environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        cfg.apply_env(lookup)?;
        Ok(cfg)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.bluesky_handle = lookup(ENV_HANDLE).filter(|v| !v.is_empty());
        self.bluesky_password = lookup(ENV_PASSWORD).filter(|v| !v.is_empty());
        self.video_path = lookup(ENV_VIDEO_PATH).filter(|v| !v.trim().is_empty());
        if let Some(url) = lookup(ENV_PDS_URL) {
            if !url.trim().is_empty() {
                self.pds_url = url.trim().to_string();
            }
        }
        // Empty values fall back to the defaults.
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(times) = non_empty(ENV_SCHEDULE_TIMES) {
            self.schedule_setting = times;
        }
        if let Some(text) = lookup(ENV_POST_TEXT) {
            self.post_text = text;
        }
        if let Some(flag) = non_empty(ENV_ADD_TIMESTAMP) {
            self.add_timestamp = flag.trim().eq_ignore_ascii_case("true");
        }
        if let Some(size) = non_empty(ENV_MAX_UPLOAD_SIZE) {
            let bytes: u64 = size
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidUploadSize(size.clone()))?;
            self.max_upload_size = ByteBudget::new(bytes);
        }
        Ok(())
    }

    /// Credentials are required in every mode.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        match (&self.bluesky_handle, &self.bluesky_password) {
            (Some(handle), Some(password)) => Ok(Credentials {
                handle: handle.clone(),
                password: password.clone(),
            }),
            _ => Err(ConfigError::MissingCredentials),
        }
    }

    pub fn validate_for_single_run(&self) -> Result<(), ConfigError> {
        self.credentials().map(|_| ())
    }

    /// Daily post times from `SCHEDULE_TIMES`.
    pub fn schedule_times(&self) -> Result<Vec<DailyTime>, ConfigError> {
        parse_schedule_times(&self.schedule_setting)
    }

    pub fn validate_for_daemon(&self) -> Result<(), ConfigError> {
        self.credentials()?;
        if self.video_path.is_none() {
            return Err(ConfigError::MissingVideoPath);
        }
        self.schedule_times().map(|_| ())
    }
}

fn parse_schedule_times(value: &str) -> Result<Vec<DailyTime>, ConfigError> {
    let times = split_csv(value)
        .iter()
        .map(|entry| DailyTime::from_str(entry))
        .collect::<Result<Vec<_>, _>>()?;
    if times.is_empty() {
        return Err(ConfigError::InvalidScheduleTime(value.to_string()));
    }
    Ok(times)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() -> Result<(), ConfigError> {
        let cfg = FramedropConfig::from_lookup(lookup(&[]))?;
        assert_eq!(cfg.schedule_times()?, vec![DailyTime::NOON]);
        assert_eq!(cfg.post_text, "");
        assert!(cfg.add_timestamp);
        assert_eq!(cfg.max_upload_size.bytes(), 921_600);
        assert_eq!(cfg.pds_url, DEFAULT_PDS_URL);
        assert!(cfg.video_path.is_none());
        Ok(())
    }

    #[test]
    fn reads_all_settings() -> Result<(), ConfigError> {
        let cfg = FramedropConfig::from_lookup(lookup(&[
            (ENV_HANDLE, "user"),
            (ENV_PASSWORD, "pass"),
            (ENV_VIDEO_PATH, "/vids/test.mp4"),
            (ENV_SCHEDULE_TIMES, "08:00, 20:00"),
            (ENV_POST_TEXT, "Hello"),
            (ENV_ADD_TIMESTAMP, "FALSE"),
            (ENV_MAX_UPLOAD_SIZE, "500000"),
        ]))?;
        assert_eq!(cfg.bluesky_handle.as_deref(), Some("user"));
        assert_eq!(cfg.bluesky_password.as_deref(), Some("pass"));
        assert_eq!(cfg.video_path.as_deref(), Some("/vids/test.mp4"));
        assert_eq!(
            cfg.schedule_times()?,
            vec![DailyTime::new(8, 0).unwrap(), DailyTime::new(20, 0).unwrap()]
        );
        assert_eq!(cfg.post_text, "Hello");
        assert!(!cfg.add_timestamp);
        assert_eq!(cfg.max_upload_size.bytes(), 500_000);
        cfg.validate_for_daemon()
    }

    #[test]
    fn only_true_enables_timestamp() -> Result<(), ConfigError> {
        for (value, expected) in [("true", true), ("True", true), ("yes", false), ("1", false)] {
            let cfg = FramedropConfig::from_lookup(lookup(&[(ENV_ADD_TIMESTAMP, value)]))?;
            assert_eq!(cfg.add_timestamp, expected, "ADD_TIMESTAMP={}", value);
        }
        Ok(())
    }

    #[test]
    fn daemon_requires_video_path() -> Result<(), ConfigError> {
        let cfg = FramedropConfig::from_lookup(lookup(&[(ENV_HANDLE, "user"), (ENV_PASSWORD, "pass")]))?;
        assert!(cfg.validate_for_single_run().is_ok());
        assert!(matches!(
            cfg.validate_for_daemon(),
            Err(ConfigError::MissingVideoPath)
        ));
        Ok(())
    }

    #[test]
    fn missing_or_empty_credentials_fail() -> Result<(), ConfigError> {
        let cfg = FramedropConfig::from_lookup(lookup(&[]))?;
        assert!(matches!(
            cfg.validate_for_single_run(),
            Err(ConfigError::MissingCredentials)
        ));
        let cfg = FramedropConfig::from_lookup(lookup(&[(ENV_HANDLE, "user"), (ENV_PASSWORD, "")]))?;
        assert!(matches!(
            cfg.validate_for_daemon(),
            Err(ConfigError::MissingCredentials)
        ));
        Ok(())
    }

    #[test]
    fn rejects_bad_schedule_and_size() {
        for value in ["25:00", " , "] {
            let parsed = FramedropConfig::from_lookup(lookup(&[(ENV_SCHEDULE_TIMES, value)]))
                .and_then(|cfg| cfg.schedule_times());
            assert!(
                matches!(parsed, Err(ConfigError::InvalidScheduleTime(_))),
                "SCHEDULE_TIMES={:?}",
                value
            );
        }
        assert!(matches!(
            FramedropConfig::from_lookup(lookup(&[(ENV_MAX_UPLOAD_SIZE, "900KB")])),
            Err(ConfigError::InvalidUploadSize(_))
        ));
    }

    #[test]
    fn bad_schedule_only_blocks_daemon_mode() -> Result<(), ConfigError> {
        let cfg = FramedropConfig::from_lookup(lookup(&[
            (ENV_HANDLE, "user"),
            (ENV_PASSWORD, "pass"),
            (ENV_VIDEO_PATH, "/vids/test.mp4"),
            (ENV_SCHEDULE_TIMES, "noon"),
        ]))?;
        cfg.validate_for_single_run()?;
        assert!(matches!(
            cfg.validate_for_daemon(),
            Err(ConfigError::InvalidScheduleTime(_))
        ));
        Ok(())
    }

    #[test]
    fn empty_values_use_defaults() -> Result<(), ConfigError> {
        let cfg = FramedropConfig::from_lookup(lookup(&[
            (ENV_SCHEDULE_TIMES, ""),
            (ENV_MAX_UPLOAD_SIZE, " "),
            (ENV_ADD_TIMESTAMP, ""),
            (ENV_PDS_URL, ""),
        ]))?;
        assert_eq!(cfg.schedule_times()?, vec![DailyTime::NOON]);
        assert_eq!(cfg.max_upload_size.bytes(), 921_600);
        assert!(cfg.add_timestamp);
        assert_eq!(cfg.pds_url, DEFAULT_PDS_URL);
        Ok(())
    }
}

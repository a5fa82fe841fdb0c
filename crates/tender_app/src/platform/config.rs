//! Optional RON configuration, overlaid by command-line flags.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::LevelFilter;
use serde::Deserialize;
use tender_core::RetryPolicy;
use tender_engine::EngineSettings;
use thiserror::Error;

use super::logging::LogDestination;
use crate::cli::Cli;

const DEFAULT_CONFIG_FILENAME: &str = "tender.ron";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub state_dir: PathBuf,
    pub log_destination: LogDestination,
    pub log_level: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub submit_retry_delays_secs: Vec<u64>,
    pub reconnect_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub progress_tick_ms: u64,
    pub countdown_tick_ms: u64,
    pub auto_retry_cooldowns_secs: Vec<u32>,
    pub max_auto_retries: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        let engine = EngineSettings::default();
        let policy = RetryPolicy::default();
        Self {
            base_url: engine.base_url,
            bearer_token: None,
            state_dir: PathBuf::from("."),
            log_destination: LogDestination::File,
            log_level: "info".to_string(),
            connect_timeout_secs: engine.connect_timeout.as_secs(),
            request_timeout_secs: engine.request_timeout.as_secs(),
            submit_retry_delays_secs: engine
                .submit_retry_delays
                .iter()
                .map(Duration::as_secs)
                .collect(),
            reconnect_delay_ms: millis(engine.reconnect_delay),
            poll_interval_ms: millis(engine.poll_interval),
            progress_tick_ms: millis(engine.progress_tick),
            countdown_tick_ms: millis(engine.countdown_tick),
            auto_retry_cooldowns_secs: policy.cooldowns,
            max_auto_retries: policy.max_auto_retries,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl AppConfig {
    /// Reads `explicit`, or `./tender.ron` if it exists, or falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILENAME);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn parse(content: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(content)
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(base_url) = &cli.base_url {
            self.base_url = base_url.clone();
        }
        if let Some(token) = &cli.token {
            self.bearer_token = Some(token.clone());
        }
        if let Some(state_dir) = &cli.state_dir {
            self.state_dir = state_dir.clone();
        }
        match cli.verbose {
            0 => {}
            1 => self.log_level = "debug".to_string(),
            _ => self.log_level = "trace".to_string(),
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            base_url: self.base_url.clone(),
            bearer_token: self.bearer_token.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            submit_retry_delays: self
                .submit_retry_delays_secs
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            progress_tick: Duration::from_millis(self.progress_tick_ms),
            countdown_tick: Duration::from_millis(self.countdown_tick_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            cooldowns: self.auto_retry_cooldowns_secs.clone(),
            max_auto_retries: self.max_auto_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_engine_and_retry_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine_settings().submit_retry_delays, EngineSettings::default().submit_retry_delays);
        assert_eq!(config.engine_settings().poll_interval, Duration::from_secs(3));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AppConfig::parse(
            r#"(
                base_url: "https://tenders.example.org/api/",
                bearer_token: Some("abc"),
                auto_retry_cooldowns_secs: [5, 15],
                log_destination: Both,
            )"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "https://tenders.example.org/api/");
        assert_eq!(config.bearer_token.as_deref(), Some("abc"));
        assert_eq!(config.retry_policy().cooldown_for(4), 15);
        assert_eq!(config.log_destination, LogDestination::Both);
        assert_eq!(config.reconnect_delay_ms, 2000);
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tender.ron");
        fs::write(&path, "(base_url: 42)").unwrap();
        let err = AppConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let missing = AppConfig::load(Some(&dir.path().join("nope.ron"))).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }

    #[test]
    fn command_line_overrides_file() {
        let cli = Cli::try_parse_from(["tender", "--token", "cli-token", "-vv", "show"]).unwrap();
        let mut config = AppConfig::default();
        config.apply_cli(&cli);
        assert_eq!(config.bearer_token.as_deref(), Some("cli-token"));
        assert_eq!(config.level(), LevelFilter::Trace);
    }
}

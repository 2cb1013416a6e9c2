//! Configuration management for the herald pipeline
//!
//! This module handles loading and validating configuration from environment
//! variables, TOML files, and command-line overrides. Validation failures are
//! fatal: the process aborts at startup with a non-zero exit code.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Platform;
use crate::planner::SlotTemplate;
use crate::utils::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Pipeline configuration (what to publish, where, how often)
    pub pipeline: PipelineConfig,

    /// Scheduling configuration (timing, retries, slot table)
    pub schedule: ScheduleConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Pipeline-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Platforms to generate for and publish to
    pub platforms: Vec<Platform>,

    /// Keywords handed to the trend collaborator
    pub keywords: Vec<String>,

    /// Time zone label, logged at startup
    pub time_zone: String,

    /// Simulate publishing without any external call
    pub dry_run: bool,

    /// Require human approval before scheduling a post
    pub human_review: bool,

    /// Hours between trend refreshes
    pub trend_scan_interval_hours: u64,

    /// Hours between content generation passes
    pub content_creation_interval_hours: u64,

    /// Maximum posts scheduled per day, keyed by lowercase platform name
    #[serde(default = "default_max_posts")]
    pub max_posts_per_day: BTreeMap<String, u32>,
}

/// Scheduling and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Wall-clock time of the daily cycle trigger (HH:MM)
    pub daily_cycle_time: String,

    /// Background worker poll tick in seconds
    pub poll_tick_secs: u64,

    /// Minutes from "now" before the first schedulable slot
    pub schedule_lead_minutes: u32,

    /// Minimum hours between two posts on one platform
    pub min_gap_hours: u32,

    /// Minimum minutes between posts across platforms
    pub stagger_minutes: u32,

    /// Maximum publish retries per post
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    pub retry_base_delay_ms: u64,

    /// Backoff delay cap in milliseconds
    pub retry_max_delay_ms: u64,

    /// Bound on any single external call, in seconds
    pub external_timeout_secs: u64,

    /// Weekly publish-slot table
    #[serde(default)]
    pub slot_template: SlotTemplate,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding every persisted document
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn content_pool_path(&self) -> PathBuf {
        self.data_dir.join("content_pool.json")
    }

    pub fn post_log_path(&self) -> PathBuf {
        self.data_dir.join("post_log.json")
    }

    pub fn cycle_state_path(&self) -> PathBuf {
        self.data_dir.join("cycle_state.json")
    }

    pub fn trend_report_path(&self) -> PathBuf {
        self.data_dir.join("trend_report.json")
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

fn default_max_posts() -> BTreeMap<String, u32> {
    BTreeMap::from([
        (String::from("twitter"), 5),
        (String::from("instagram"), 2),
        (String::from("linkedin"), 1),
    ])
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(platforms) = std::env::var("HERALD_PLATFORMS") {
            config.pipeline.platforms = parse_platform_list(&platforms)?;
        }

        if let Ok(keywords) = std::env::var("HERALD_KEYWORDS") {
            config.pipeline.keywords = keywords
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(tz) = std::env::var("HERALD_TIME_ZONE") {
            config.pipeline.time_zone = tz;
        }

        if let Some(hours) = env_parse::<u64>("HERALD_TREND_INTERVAL_HOURS") {
            config.pipeline.trend_scan_interval_hours = hours;
        }

        if let Some(hours) = env_parse::<u64>("HERALD_CONTENT_INTERVAL_HOURS") {
            config.pipeline.content_creation_interval_hours = hours;
        }

        if let Some(secs) = env_parse::<u64>("HERALD_EXTERNAL_TIMEOUT_SECS") {
            config.schedule.external_timeout_secs = secs;
        }

        if let Some(retries) = env_parse::<u32>("HERALD_MAX_RETRIES") {
            config.schedule.max_retries = retries;
        }

        if let Ok(dir) = std::env::var("HERALD_DATA_DIR") {
            config.storage.data_dir = dir.into();
        }

        if let Ok(level) = std::env::var("HERALD_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(format) = std::env::var("HERALD_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.platforms.is_empty() {
            anyhow::bail!("at least one platform must be configured");
        }

        if self.pipeline.keywords.is_empty() {
            anyhow::bail!("at least one trend keyword must be configured");
        }

        if self.pipeline.time_zone.is_empty() {
            anyhow::bail!("time_zone cannot be empty");
        }

        if self.pipeline.trend_scan_interval_hours == 0 {
            anyhow::bail!("trend_scan_interval_hours must be greater than 0");
        }

        if self.pipeline.content_creation_interval_hours == 0 {
            anyhow::bail!("content_creation_interval_hours must be greater than 0");
        }

        for (platform, &max) in &self.pipeline.max_posts_per_day {
            if Platform::parse(platform).is_none() {
                anyhow::bail!("max_posts_per_day references unknown platform: {platform}");
            }
            if max == 0 {
                anyhow::bail!("max_posts_per_day for {platform} must be greater than 0");
            }
        }

        if NaiveTime::parse_from_str(&self.schedule.daily_cycle_time, "%H:%M").is_err() {
            anyhow::bail!(
                "invalid daily_cycle_time '{}', expected HH:MM",
                self.schedule.daily_cycle_time
            );
        }

        if self.schedule.poll_tick_secs == 0 {
            anyhow::bail!("poll_tick_secs must be greater than 0");
        }

        if self.schedule.external_timeout_secs == 0 {
            anyhow::bail!("external_timeout_secs must be greater than 0");
        }

        self.schedule
            .slot_template
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid slot template: {e}"))?;

        Ok(())
    }

    /// Daily post cap for a platform (1 when unconfigured)
    pub fn max_posts_for(&self, platform: Platform) -> u32 {
        self.pipeline
            .max_posts_per_day
            .get(platform.as_str())
            .copied()
            .unwrap_or(1)
    }

    /// Trend refresh interval as a chrono duration
    pub fn trend_scan_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.pipeline.trend_scan_interval_hours as i64)
    }

    /// Content generation interval as a chrono duration
    pub fn content_creation_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.pipeline.content_creation_interval_hours as i64)
    }

    /// Bound for a single external call
    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.schedule.external_timeout_secs)
    }

    /// Retry policy derived from the schedule section
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(
            self.schedule.max_retries,
            self.schedule.retry_base_delay_ms,
            self.schedule.retry_max_delay_ms,
        )
    }

    /// Parsed daily cycle trigger time
    pub fn daily_cycle_time(&self) -> NaiveTime {
        NaiveTime::parse_from_str(&self.schedule.daily_cycle_time, "%H:%M")
            .expect("validated daily_cycle_time")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig {
                platforms: Platform::ALL.to_vec(),
                keywords: vec![
                    String::from("astronomy"),
                    String::from("physics"),
                    String::from("space"),
                ],
                time_zone: String::from("UTC"),
                dry_run: false,
                human_review: false,
                trend_scan_interval_hours: 4,
                content_creation_interval_hours: 24,
                max_posts_per_day: default_max_posts(),
            },
            schedule: ScheduleConfig {
                daily_cycle_time: String::from("08:00"),
                poll_tick_secs: 60,
                schedule_lead_minutes: 15,
                min_gap_hours: 3,
                stagger_minutes: 15,
                max_retries: 3,
                retry_base_delay_ms: 5_000,
                retry_max_delay_ms: 60_000,
                external_timeout_secs: 30,
                slot_template: SlotTemplate::default(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("data"),
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}

/// Parse a comma-separated platform list, rejecting unknown names
pub fn parse_platform_list(raw: &str) -> Result<Vec<Platform>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            Platform::parse(name).ok_or_else(|| anyhow::anyhow!("unknown platform: {name}"))
        })
        .collect()
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.parse::<T>().ok())
}

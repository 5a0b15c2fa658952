//! # Configuration
//!
//! TOML configuration with defaults for every field. A missing file means
//! the defaults; a present file is parsed and validated.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [calendar]
//! workday_start = "09:00"
//! workday_end = "19:00"
//!
//! [[calendar.holidays]]
//! name = "National Day"
//! from = "2025-10-01"
//! to = "2025-10-08"
//! ```

use crate::error::{AppError, AppResult};
use chrono::{Duration, NaiveDate, NaiveTime, Weekday};
use labres_core::{WorkCalendar, WorkDay};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub calendar: CalendarConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Bearer token required on every route except `/health`.
    pub api_key: Option<String>,
    pub rate_limit_per_second: u32,
    pub rate_limit_burst: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            api_key: None,
            rate_limit_per_second: 50,
            rate_limit_burst: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("labres.redb"),
        }
    }
}

/// A named block of listed holidays. `to` defaults to `from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidayRange {
    #[serde(default)]
    pub name: Option<String>,
    pub from: NaiveDate,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

impl HolidayRange {
    fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        let last = self.to.unwrap_or(self.from);
        self.from.iter_days().take_while(move |d| *d <= last)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// `HH:MM`
    pub workday_start: String,
    /// `HH:MM`
    pub workday_end: String,
    /// Weekday names, e.g. `["Sat", "Sun"]`.
    pub rest_days: Vec<String>,
    pub holidays: Vec<HolidayRange>,
    pub makeup_workdays: Vec<NaiveDate>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            workday_start: "09:00".to_string(),
            workday_end: "19:00".to_string(),
            rest_days: vec!["Sat".to_string(), "Sun".to_string()],
            holidays: Vec::new(),
            makeup_workdays: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub enabled: bool,
    pub calibration_refresh_secs: u64,
    pub remind_interval_secs: u64,
    /// Delay before the next run after a failed one.
    pub error_retry_secs: u64,
    pub reminder_lead_hours: u32,
    /// Rate table endpoint returning `conversion_rates` against CNY, e.g.
    /// `https://v6.exchangerate-api.com/v6/<key>/latest/CNY`. No fetch when unset.
    pub currency_rates_url: Option<String>,
    pub currency_refresh_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            calibration_refresh_secs: 24 * 60 * 60,
            remind_interval_secs: 30 * 60,
            error_retry_secs: 60,
            reminder_lead_hours: 24,
            currency_rates_url: None,
            currency_refresh_secs: 24 * 60 * 60,
            http_timeout_secs: 30,
        }
    }
}

impl JobsConfig {
    #[must_use]
    pub fn reminder_lead(&self) -> Duration {
        Duration::hours(i64::from(self.reminder_lead_hours))
    }
}

impl Config {
    /// Load from `path`, or the defaults when there is no file.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let Some(path) = path.filter(|p| p.exists()) else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.server.rate_limit_per_second == 0 || self.server.rate_limit_burst == 0 {
            return Err(AppError::config("rate limits must be greater than 0"));
        }
        if self.server.api_key.as_deref().is_some_and(str::is_empty) {
            return Err(AppError::config("api_key cannot be empty"));
        }
        let jobs = &self.jobs;
        if jobs.calibration_refresh_secs == 0
            || jobs.remind_interval_secs == 0
            || jobs.error_retry_secs == 0
            || jobs.currency_refresh_secs == 0
            || jobs.http_timeout_secs == 0
        {
            return Err(AppError::config("job intervals must be greater than 0"));
        }
        let not_http = |url: &&str| !(url.starts_with("http://") || url.starts_with("https://"));
        if let Some(url) = jobs.currency_rates_url.as_deref().filter(not_http) {
            return Err(AppError::config(format!("currency_rates_url {} is not an http url", url)));
        }
        for range in &self.calendar.holidays {
            if range.to.is_some_and(|to| to < range.from) {
                return Err(AppError::config(format!(
                    "holiday range {} ends before it starts",
                    range.name.as_deref().unwrap_or("(unnamed)")
                )));
            }
        }
        self.build_calendar().map(|_| ())
    }

    pub fn build_calendar(&self) -> AppResult<WorkCalendar> {
        let cal = &self.calendar;
        let workday = WorkDay::new(parse_time(&cal.workday_start)?, parse_time(&cal.workday_end)?)?;
        let rest_days = cal
            .rest_days
            .iter()
            .map(|d| {
                d.parse::<Weekday>()
                    .map_err(|_| AppError::config(format!("unknown weekday {}", d)))
            })
            .collect::<AppResult<Vec<_>>>()?;
        Ok(WorkCalendar::new(workday)
            .with_rest_days(rest_days)
            .with_holidays(cal.holidays.iter().flat_map(HolidayRange::dates))
            .with_makeup_workdays(cal.makeup_workdays.iter().copied()))
    }
}

fn parse_time(text: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
        .map_err(|_| AppError::config(format!("invalid time {}, expected HH:MM", text)))
}

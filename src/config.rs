//! Runtime configuration read from the environment
//!
//! `main` loads a `.env` file first (if any), then calls [`Config::from_env`]
//! once and passes the result down. Nothing else reads the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Days, Utc};
use thiserror::Error;

use crate::pagination::MAX_PAGE_LIMIT;
use crate::rotator::{QuotaPolicy, DEFAULT_CALL_COST, DEFAULT_MAX_WINDOW_BUDGET};
use crate::youtube::DEFAULT_BASE_URL;

/// Longest accepted quota window, a little over a year
pub const MAX_WINDOW_HOURS: i64 = 24 * 366;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub api_keys: Vec<String>,
    pub api_base_url: String,
    /// `None` disables the background job
    pub fetch_interval: Option<Duration>,
    pub fetch_keywords: Vec<String>,
    pub default_page_limit: usize,
    pub default_fetch_limit: u32,
    pub published_after_days: u64,
    pub quota: QuotaPolicy,
    pub cors_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 9000,
            database_path: "videos.db".to_string(),
            api_keys: Vec::new(),
            api_base_url: DEFAULT_BASE_URL.to_string(),
            fetch_interval: Some(Duration::from_secs(15 * 60)),
            fetch_keywords: ["cricket", "politics", "entertainment", "vlogs", "music"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_page_limit: 10,
            default_fetch_limit: 20,
            published_after_days: 15,
            quota: QuotaPolicy::default(),
            cors_origin: "http://localhost:5173".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut api_keys = get("YOUTUBE_API_KEYS").map(|v| split_list(&v)).unwrap_or_default();
        for name in ["YOUTUBE_APIKEY_1", "YOUTUBE_APIKEY_2", "YOUTUBE_APIKEY_3"] {
            if let Some(key) = get(name) {
                api_keys.push(key.trim().to_string());
            }
        }

        let interval_minutes: u64 = parse_or(&get, "FETCH_INTERVAL_MINUTES", 15)?;
        let fetch_interval = match interval_minutes {
            0 => None,
            minutes => Some(
                minutes
                    .checked_mul(60)
                    .map(Duration::from_secs)
                    .ok_or_else(|| invalid("FETCH_INTERVAL_MINUTES", minutes))?,
            ),
        };

        let window_hours: i64 = parse_or(&get, "QUOTA_WINDOW_HOURS", 24)?;
        let window = Some(window_hours)
            .filter(|h| (1..=MAX_WINDOW_HOURS).contains(h))
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| invalid("QUOTA_WINDOW_HOURS", window_hours))?;

        let call_cost: u32 = parse_or(&get, "QUOTA_COST_PER_SEARCH", DEFAULT_CALL_COST)?;
        if call_cost == 0 {
            return Err(invalid("QUOTA_COST_PER_SEARCH", call_cost));
        }

        // every key must afford at least one call per window
        let max_window_budget: u32 = parse_or(&get, "QUOTA_MAX_PER_WINDOW", DEFAULT_MAX_WINDOW_BUDGET)?;
        if max_window_budget < call_cost {
            return Err(invalid("QUOTA_MAX_PER_WINDOW", max_window_budget));
        }

        let default_page_limit: usize = parse_or(&get, "DEFAULT_PAGE_LIMIT", defaults.default_page_limit)?;
        if !(1..=MAX_PAGE_LIMIT).contains(&default_page_limit) {
            return Err(invalid("DEFAULT_PAGE_LIMIT", default_page_limit));
        }

        Ok(Self {
            port: parse_or(&get, "PORT", defaults.port)?,
            database_path: get("DATABASE_URL").unwrap_or(defaults.database_path),
            api_keys,
            api_base_url: get("YOUTUBE_API_BASE_URL").unwrap_or(defaults.api_base_url),
            fetch_interval,
            fetch_keywords: get("FETCH_KEYWORDS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.fetch_keywords),
            default_page_limit,
            default_fetch_limit: parse_or(&get, "DEFAULT_VIDEO_FETCH_LIMIT", defaults.default_fetch_limit)?,
            published_after_days: parse_or(&get, "PUBLISHED_AFTER_DAYS", defaults.published_after_days)?,
            quota: QuotaPolicy {
                max_window_budget,
                call_cost,
                window,
            },
            cors_origin: get("CORS_ALLOWED_ORIGIN").unwrap_or(defaults.cors_origin),
        })
    }

    /// Start of the default search window: midnight UTC, `published_after_days` ago
    pub fn default_published_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);
        midnight
            .checked_sub_days(Days::new(self.published_after_days))
            .unwrap_or(midnight)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn invalid(name: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}

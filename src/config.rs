use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Tunables for the detection heuristics. Defaults match the rules the
/// registrar's office signed off on; every field can be overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub signature_weight: f64,
    pub department_weight: f64,
    pub concentration_weight: f64,
    /// Share of the latest terms the concentration strategy looks at.
    pub concentration_fraction: f64,
    pub confidence_cap: f64,
    pub certainty_threshold: f64,
    pub review_threshold: f64,
    pub graduate_level_floor: u32,
    pub undergraduate_credit_threshold: f64,
    pub graduate_credit_threshold: f64,
    pub include_in_progress_credits: bool,
    /// Count a course code passed more than once at its best attempt only.
    pub count_repeated_courses_once: bool,
    pub recency_window_days: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            signature_weight: 1.0,
            department_weight: 0.6,
            concentration_weight: 0.8,
            concentration_fraction: 0.4,
            confidence_cap: 0.95,
            certainty_threshold: 0.8,
            review_threshold: 0.7,
            graduate_level_floor: 500,
            undergraduate_credit_threshold: 100.0,
            graduate_credit_threshold: 30.0,
            include_in_progress_credits: false,
            count_repeated_courses_once: false,
            recency_window_days: 365,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub concurrency: usize,
    pub log_level: String,
    pub catalog_path: Option<PathBuf>,
    pub engine: EngineSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let concurrency = parse_var("PROGRESSION_CONCURRENCY", 8usize)?;
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "PROGRESSION_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        let mut engine = EngineSettings::default();
        engine.recency_window_days = recency_days(parse_var(
            "PROGRESSION_RECENCY_DAYS",
            engine.recency_window_days,
        )?)?;
        engine.include_in_progress_credits = parse_var(
            "PROGRESSION_INCLUDE_IN_PROGRESS",
            engine.include_in_progress_credits,
        )?;
        engine.count_repeated_courses_once = parse_var(
            "PROGRESSION_COUNT_REPEATS_ONCE",
            engine.count_repeated_courses_once,
        )?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok(),
            concurrency,
            log_level: env::var("PROGRESSION_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            catalog_path: env::var("PROGRESSION_CATALOG").ok().map(PathBuf::from),
            engine,
        })
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}

/// Longest recency window accepted from the environment, in days.
const MAX_RECENCY_DAYS: i64 = 36_500;

fn recency_days(days: i64) -> Result<i64, ConfigError> {
    if (0..=MAX_RECENCY_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(ConfigError::Invalid {
            key: "PROGRESSION_RECENCY_DAYS",
            value: days.to_string(),
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

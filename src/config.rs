use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

const DEFAULT_DATABASE_PATH: &str = "battery_history.sqlite3";
pub const DEFAULT_INGEST_QUEUE: usize = 256;
pub const DEFAULT_FALLBACK_DESIGN_CAPACITY_MAH: i64 = 4000;

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigOverrides {
    #[serde(default)]
    database_path: Option<String>,
    #[serde(default)]
    bucket_timezone: Option<String>,
    #[serde(default)]
    ingest_queue: Option<usize>,
    #[serde(default)]
    fallback_design_capacity_mah: Option<i64>,
}

fn load_overrides(path: &Path) -> Option<ConfigOverrides> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read config overrides; using env defaults"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse config overrides; using env defaults"
            );
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub bucket_timezone: Tz,
    pub ingest_queue: usize,
    /// Used when a snapshot carries no design capacity. `None` disables it.
    pub fallback_design_capacity_mah: Option<i64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            bucket_timezone: host_timezone(),
            ingest_queue: DEFAULT_INGEST_QUEUE,
            fallback_design_capacity_mah: Some(DEFAULT_FALLBACK_DESIGN_CAPACITY_MAH),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let lookup = |key: &str| env_optional(key);
        let overrides = lookup("BATTERY_CONFIG_PATH")
            .map(PathBuf::from)
            .and_then(|path| load_overrides(&path));
        Self::build(lookup, overrides)
    }

    fn build(
        lookup: impl Fn(&str) -> Option<String>,
        overrides: Option<ConfigOverrides>,
    ) -> Result<Self> {
        let overrides = overrides.unwrap_or_default();

        let database_path = lookup("BATTERY_DB_PATH")
            .or_else(|| non_empty(overrides.database_path.as_deref()))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        let bucket_timezone = match lookup("BATTERY_BUCKET_TZ") {
            Some(raw) => parse_timezone(&raw).context("invalid BATTERY_BUCKET_TZ")?,
            None => match non_empty(overrides.bucket_timezone.as_deref()) {
                Some(raw) => parse_timezone(&raw).context("invalid bucket_timezone override")?,
                None => host_timezone(),
            },
        };

        let ingest_queue = match lookup("BATTERY_INGEST_QUEUE") {
            Some(raw) => raw
                .parse::<usize>()
                .context("invalid BATTERY_INGEST_QUEUE")?,
            None => overrides
                .ingest_queue
                .filter(|v| *v != 0)
                .unwrap_or(DEFAULT_INGEST_QUEUE),
        };
        if ingest_queue == 0 {
            return Err(anyhow!("BATTERY_INGEST_QUEUE must be at least 1"));
        }

        let fallback_mah = match lookup("BATTERY_FALLBACK_DESIGN_CAPACITY_MAH") {
            Some(raw) => raw
                .parse::<i64>()
                .context("invalid BATTERY_FALLBACK_DESIGN_CAPACITY_MAH")?,
            None => overrides
                .fallback_design_capacity_mah
                .unwrap_or(DEFAULT_FALLBACK_DESIGN_CAPACITY_MAH),
        };
        let fallback_design_capacity_mah = Some(fallback_mah).filter(|v| *v > 0);

        Ok(Self {
            database_path,
            bucket_timezone,
            ingest_queue,
            fallback_design_capacity_mah,
        })
    }
}

fn host_timezone() -> Tz {
    iana_time_zone::get_timezone()
        .ok()
        .and_then(|name| name.parse::<Tz>().ok())
        .unwrap_or(Tz::UTC)
}

fn parse_timezone(raw: &str) -> Result<Tz> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|err| anyhow!("unknown time zone {raw:?}: {err}"))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

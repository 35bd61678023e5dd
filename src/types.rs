use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// One battery-changed event as the host platform reports it, before any
/// normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub level_raw: i32,
    pub scale_raw: i32,
    pub status_code: i32,
    pub temperature_tenths: i32,
    pub voltage_millivolts: i32,
    #[serde(default)]
    pub charge_counter_micro_ah: i64,
    #[serde(default)]
    pub current_now_micro_amps: i64,
    #[serde(default)]
    pub health_code: i32,
    #[serde(default)]
    pub cycle_count: i32,
    #[serde(default)]
    pub design_capacity_mah: i32,
}

impl RawSnapshot {
    pub fn temperature_c(&self) -> f64 {
        f64::from(self.temperature_tenths) / 10.0
    }

    pub fn voltage_v(&self) -> f64 {
        f64::from(self.voltage_millivolts) / 1000.0
    }

    pub fn charge_status(&self) -> ChargeStatus {
        ChargeStatus::from_code(self.status_code)
    }

    pub fn health_state(&self) -> HealthState {
        HealthState::from_code(self.health_code)
    }

    /// Remaining charge in mAh, truncated.
    pub fn charge_mah(&self) -> i64 {
        self.charge_counter_micro_ah / 1000
    }
}

/// A normalized, persisted telemetry observation. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub level_percent: u8,
    pub temperature_c: f64,
    pub voltage_v: f64,
    pub is_charging: bool,
    pub since_last_sample_minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Unknown,
    Charging,
    Discharging,
    NotCharging,
    Full,
}

impl ChargeStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => Self::Charging,
            3 => Self::Discharging,
            4 => Self::NotCharging,
            5 => Self::Full,
            _ => Self::Unknown,
        }
    }

    /// Connected to a charger, whether or not current is still flowing in.
    pub fn is_plugged(self) -> bool {
        matches!(self, Self::Charging | Self::Full)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Good,
    Overheat,
    Dead,
    OverVoltage,
    Cold,
    Unknown,
    /// Unspecified failure or any code the platform adds later.
    Other,
}

impl HealthState {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Unknown,
            2 => Self::Good,
            3 => Self::Overheat,
            4 => Self::Dead,
            5 => Self::OverVoltage,
            7 => Self::Cold,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hour,
    Day,
}

impl Granularity {
    /// `strftime`-style pattern for the bucket label. Both patterns sort
    /// lexicographically in chronological order within their range.
    pub(crate) fn key_format(self) -> &'static str {
        match self {
            Self::Hour => "%H:00",
            Self::Day => "%Y-%m-%d",
        }
    }
}

/// The three history tabs: last day by hour, last week and last month by day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryWindow {
    Day,
    Week,
    Month,
}

impl HistoryWindow {
    pub fn length(self) -> ChronoDuration {
        match self {
            Self::Day => ChronoDuration::hours(24),
            Self::Week => ChronoDuration::days(7),
            Self::Month => ChronoDuration::days(30),
        }
    }

    pub fn granularity(self) -> Granularity {
        match self {
            Self::Day => Granularity::Hour,
            Self::Week | Self::Month => Granularity::Day,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub bucket_key: String,
    pub avg_level: f64,
    pub avg_temperature: f64,
    pub max_level: u8,
    pub min_level: u8,
    pub sample_count: usize,
}

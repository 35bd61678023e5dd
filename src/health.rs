use crate::error::TelemetryError;
use crate::types::HealthState;
use serde::Serialize;
use std::fmt;

pub const REPLACEMENT_ADVISORY: &str = "Consider battery replacement soon";
pub const THERMAL_ADVISORY: &str = "Avoid charging while using heavy apps";
pub const HIGH_CYCLE_ADVISORY: &str = "Battery has high cycle count, monitor health closely";
pub const CAPACITY_LOSS_ADVISORY: &str = "Battery capacity significantly reduced";
pub const NOMINAL_MESSAGE: &str = "Battery is in good condition";

const REPLACEMENT_SCORE_BELOW: f64 = 80.0;
const THERMAL_LIMIT_C: f64 = 40.0;
const HIGH_CYCLE_COUNT: i64 = 500;
const CAPACITY_RATIO_FLOOR: f64 = 0.8;

impl HealthState {
    /// Score comes straight from the reported state; capacity never moves it.
    pub fn score_percent(self) -> f64 {
        match self {
            Self::Good => 95.0,
            Self::Overheat => 70.0,
            Self::Dead => 20.0,
            Self::OverVoltage => 60.0,
            Self::Cold => 80.0,
            Self::Unknown | Self::Other => 85.0,
        }
    }

    pub fn status_label(self) -> &'static str {
        match self {
            Self::Good => "Good condition",
            Self::Overheat => "Overheated",
            Self::Dead => "Dead",
            Self::OverVoltage => "Over Voltage",
            Self::Cold => "Too Cold",
            Self::Unknown => "Unknown",
            Self::Other => "Fair condition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "ratio", rename_all = "snake_case")]
pub enum CapacityDescription {
    Ratio(f64),
    Unavailable,
}

impl fmt::Display for CapacityDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ratio(ratio) => write!(f, "{:.0}%", ratio * 100.0),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthAssessment {
    pub score_percent: f64,
    pub status_label: &'static str,
    pub recommendations: Vec<String>,
    pub capacity: CapacityDescription,
}

pub fn capacity_ratio(current_capacity_mah: i64, design_capacity_mah: i64) -> Result<f64, TelemetryError> {
    if design_capacity_mah <= 0 {
        return Err(TelemetryError::DivisionUndefined {
            design_capacity_mah,
        });
    }
    Ok(current_capacity_mah as f64 / design_capacity_mah as f64)
}

/// Each advisory is checked independently and appended in a fixed order:
/// health, thermal, cycles, capacity. With none firing the list holds the
/// single nominal message. A non-positive design capacity skips the capacity
/// check and reports the capacity as unavailable.
pub fn score(
    state: HealthState,
    current_capacity_mah: i64,
    design_capacity_mah: i64,
    cycle_count: i64,
    temperature_c: f64,
) -> HealthAssessment {
    let score_percent = state.score_percent();

    let capacity = match capacity_ratio(current_capacity_mah, design_capacity_mah) {
        Ok(ratio) => CapacityDescription::Ratio(ratio),
        Err(err) => {
            tracing::debug!(error = %err, "skipping capacity advisory");
            CapacityDescription::Unavailable
        }
    };

    let mut recommendations = Vec::new();
    if score_percent < REPLACEMENT_SCORE_BELOW {
        recommendations.push(REPLACEMENT_ADVISORY.to_string());
    }
    if temperature_c > THERMAL_LIMIT_C {
        recommendations.push(THERMAL_ADVISORY.to_string());
    }
    if cycle_count > HIGH_CYCLE_COUNT {
        recommendations.push(HIGH_CYCLE_ADVISORY.to_string());
    }
    if let CapacityDescription::Ratio(ratio) = capacity {
        if ratio < CAPACITY_RATIO_FLOOR {
            recommendations.push(CAPACITY_LOSS_ADVISORY.to_string());
        }
    }
    if recommendations.is_empty() {
        recommendations.push(NOMINAL_MESSAGE.to_string());
    }

    HealthAssessment {
        score_percent,
        status_label: state.status_label(),
        recommendations,
        capacity,
    }
}

use crate::types::Sample;
use serde::Serialize;

pub const UNDETERMINED_LABEL: &str = "Calculating...";

/// Instantaneous current draw and the naive time-to-empty it implies.
///
/// `projected_minutes_remaining` is `None` when no current is measured; that
/// is "unknown", never "zero minutes left".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DischargeEstimate {
    pub rate_milliamps: u64,
    pub projected_minutes_remaining: Option<u64>,
}

impl DischargeEstimate {
    pub fn is_undetermined(&self) -> bool {
        self.projected_minutes_remaining.is_none()
    }

    pub fn remaining_label(&self) -> String {
        match self.projected_minutes_remaining {
            Some(minutes) => format!("{}h {}m", minutes / 60, minutes % 60),
            None => UNDETERMINED_LABEL.to_string(),
        }
    }
}

/// Rate is `|current| / 1000` truncated; projection is
/// `floor(charge_mAh / rate_mA * 60)`. No filtering: a noisy current reading
/// gives a noisy projection.
pub fn estimate_discharge(charge_micro_ah: i64, current_micro_amps: i64) -> DischargeEstimate {
    let rate_milliamps = current_micro_amps.unsigned_abs() / 1000;
    if rate_milliamps == 0 {
        return DischargeEstimate {
            rate_milliamps,
            projected_minutes_remaining: None,
        };
    }

    let charge_mah = (charge_micro_ah / 1000).max(0) as u64;
    DischargeEstimate {
        rate_milliamps,
        projected_minutes_remaining: Some(charge_mah * 60 / rate_milliamps),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelTrend {
    Rising,
    Falling,
    Steady,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelProjection {
    /// Signed; positive while the level climbs.
    pub percent_per_hour: f64,
    pub trend: LevelTrend,
    /// Minutes to 0% when falling, to 100% when rising, `None` when steady.
    pub projected_minutes: Option<u64>,
}

/// Level-based projection from two consecutive samples. `None` when the
/// samples carry no elapsed time.
pub fn project_from_samples(previous: &Sample, current: &Sample) -> Option<LevelProjection> {
    let elapsed_secs = (current.timestamp - previous.timestamp).num_seconds();
    if elapsed_secs <= 0 {
        return None;
    }

    let delta = f64::from(current.level_percent) - f64::from(previous.level_percent);
    let percent_per_hour = delta * 3600.0 / elapsed_secs as f64;
    let level = f64::from(current.level_percent);

    let (trend, projected_minutes) = if delta < 0.0 {
        let minutes = (level / -percent_per_hour * 60.0).floor();
        (LevelTrend::Falling, Some(minutes as u64))
    } else if delta > 0.0 {
        let minutes = ((100.0 - level) / percent_per_hour * 60.0).floor();
        (LevelTrend::Rising, Some(minutes as u64))
    } else {
        (LevelTrend::Steady, None)
    };

    Some(LevelProjection {
        percent_per_hour,
        trend,
        projected_minutes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn sample(minute: i64, level: u8) -> Sample {
        Sample {
            timestamp: Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap() + Duration::minutes(minute),
            level_percent: level,
            temperature_c: 28.0,
            voltage_v: 3.9,
            is_charging: false,
            since_last_sample_minutes: 0,
        }
    }

    #[test]
    fn two_amp_hours_at_half_an_amp_is_four_hours() {
        let est = estimate_discharge(2_000_000, 500_000);
        assert_eq!(est.rate_milliamps, 500);
        assert_eq!(est.projected_minutes_remaining, Some(240));
        assert_eq!(est.remaining_label(), "4h 0m");
    }

    #[test]
    fn negative_current_uses_magnitude() {
        let est = estimate_discharge(3_000_000, -450_999);
        assert_eq!(est.rate_milliamps, 450);
        // 3000 mAh / 450 mA = 6.67h = 400 minutes
        assert_eq!(est.projected_minutes_remaining, Some(400));
        assert_eq!(est.remaining_label(), "6h 40m");
    }

    #[test]
    fn zero_current_is_undetermined_not_zero() {
        let est = estimate_discharge(2_000_000, 0);
        assert_eq!(est.rate_milliamps, 0);
        assert_eq!(est.projected_minutes_remaining, None);
        assert!(est.is_undetermined());
        assert_eq!(est.remaining_label(), UNDETERMINED_LABEL);

        // Sub-milliamp readings truncate to zero as well.
        assert!(estimate_discharge(2_000_000, 999).is_undetermined());
    }

    #[test]
    fn empty_charge_projects_zero_minutes() {
        let est = estimate_discharge(0, 300_000);
        assert_eq!(est.projected_minutes_remaining, Some(0));
        let est = estimate_discharge(-5_000, 300_000);
        assert_eq!(est.projected_minutes_remaining, Some(0));
    }

    #[test]
    fn extreme_current_does_not_overflow() {
        let est = estimate_discharge(i64::MAX, i64::MIN);
        assert_eq!(est.rate_milliamps, i64::MIN.unsigned_abs() / 1000);
        assert!(est.projected_minutes_remaining.is_some());
    }

    #[test]
    fn falling_level_projects_time_to_empty() {
        let proj = project_from_samples(&sample(0, 80), &sample(30, 75)).unwrap();
        assert_eq!(proj.trend, LevelTrend::Falling);
        assert!((proj.percent_per_hour + 10.0).abs() < 1e-9);
        // 75% at 10%/h = 7.5h
        assert_eq!(proj.projected_minutes, Some(450));
    }

    #[test]
    fn rising_level_projects_time_to_full() {
        let proj = project_from_samples(&sample(0, 40), &sample(60, 60)).unwrap();
        assert_eq!(proj.trend, LevelTrend::Rising);
        assert_eq!(proj.projected_minutes, Some(120));
    }

    #[test]
    fn steady_or_simultaneous_samples_are_undetermined() {
        let proj = project_from_samples(&sample(0, 50), &sample(15, 50)).unwrap();
        assert_eq!(proj.trend, LevelTrend::Steady);
        assert_eq!(proj.projected_minutes, None);

        assert!(project_from_samples(&sample(5, 50), &sample(5, 49)).is_none());
        assert!(project_from_samples(&sample(10, 50), &sample(5, 49)).is_none());
    }
}

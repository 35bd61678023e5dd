mod session;
mod worker;


pub use session::IngestionSession;
pub use worker::{spawn_ingest_worker, IngestHandle, IngestStats, IngestStatsSnapshot};

use crate::clock::Clock;
use crate::error::{TelemetryError, TelemetryResult};
use crate::store::SampleStore;
use crate::types::{ChargeStatus, RawSnapshot, Sample};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Normalizes one raw snapshot into a `Sample` and appends it.
///
/// Holds no per-device state: the previous sample is supplied by the caller
/// (see `IngestionSession`).
#[derive(Clone)]
pub struct TelemetryIngestor {
    store: Arc<dyn SampleStore>,
    clock: Arc<dyn Clock>,
}

impl TelemetryIngestor {
    pub fn new(store: Arc<dyn SampleStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn ingest(
        &self,
        snapshot: &RawSnapshot,
        previous: Option<&Sample>,
    ) -> TelemetryResult<Sample> {
        let timestamp = self.clock.now();
        let sample = match normalize(snapshot, timestamp, previous) {
            Ok(sample) => sample,
            Err(err) => {
                tracing::warn!(
                    level = snapshot.level_raw,
                    scale = snapshot.scale_raw,
                    error = %err,
                    "rejected battery snapshot"
                );
                return Err(err);
            }
        };

        if let Err(err) = self.store.append(&sample) {
            tracing::warn!(error = %err, "failed to append sample");
            return Err(err.into());
        }

        tracing::debug!(
            level = sample.level_percent,
            charging = sample.is_charging,
            since_last_minutes = sample.since_last_sample_minutes,
            "appended sample"
        );
        Ok(sample)
    }
}

pub fn normalize(
    snapshot: &RawSnapshot,
    timestamp: DateTime<Utc>,
    previous: Option<&Sample>,
) -> TelemetryResult<Sample> {
    let level_percent = level_percent(snapshot.level_raw, snapshot.scale_raw)?;
    let since_last_sample_minutes = previous
        .map(|prev| whole_minutes_between(prev.timestamp, timestamp))
        .unwrap_or(0);

    Ok(Sample {
        timestamp,
        level_percent,
        temperature_c: snapshot.temperature_c(),
        voltage_v: snapshot.voltage_v(),
        is_charging: snapshot.charge_status() == ChargeStatus::Charging,
        since_last_sample_minutes,
    })
}

/// `round(level * 100 / scale)`. Out-of-range readings are rejected rather
/// than clamped so a faulty gauge shows up as errors, not as 0% or 100%.
pub fn level_percent(level: i32, scale: i32) -> TelemetryResult<u8> {
    if scale <= 0 {
        return Err(TelemetryError::malformed(format!("scale {scale} is not positive")));
    }
    if level < 0 || level > scale {
        return Err(TelemetryError::malformed(format!(
            "level {level} outside 0..={scale}"
        )));
    }
    let percent = (f64::from(level) * 100.0 / f64::from(scale)).round();
    Ok(percent as u8)
}

fn whole_minutes_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> u32 {
    let minutes = (later - earlier).num_minutes();
    u32::try_from(minutes.max(0)).unwrap_or(u32::MAX)
}

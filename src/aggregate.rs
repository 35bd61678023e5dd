//! Hour/day rollups of the sample log for the history charts.
//!
//! Buckets are keyed by their wall-clock label in the store's zone (`"HH:00"`
//! or `"YYYY-MM-DD"`). Samples are grouped by that label, so a 24h window that
//! covers the same clock hour on two days folds both into one bucket. Keys are
//! unique and come back in descending order; empty buckets are never emitted.

use crate::clock::Clock;
use crate::error::TelemetryError;
use crate::store::{window_start, SampleStore};
use crate::types::{AggregateBucket, Granularity, HistoryWindow, Sample};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
struct BucketAccumulator {
    level_sum: f64,
    temperature_sum: f64,
    count: usize,
    max_level: u8,
    min_level: u8,
}

impl BucketAccumulator {
    fn new(first: &Sample) -> Self {
        Self {
            level_sum: 0.0,
            temperature_sum: 0.0,
            count: 0,
            max_level: first.level_percent,
            min_level: first.level_percent,
        }
    }

    fn add(&mut self, sample: &Sample) {
        self.level_sum += f64::from(sample.level_percent);
        self.temperature_sum += sample.temperature_c;
        self.count += 1;
        self.max_level = self.max_level.max(sample.level_percent);
        self.min_level = self.min_level.min(sample.level_percent);
    }

    fn finish(self, bucket_key: String) -> AggregateBucket {
        let n = self.count as f64;
        AggregateBucket {
            bucket_key,
            avg_level: self.level_sum / n,
            avg_temperature: self.temperature_sum / n,
            max_level: self.max_level,
            min_level: self.min_level,
            sample_count: self.count,
        }
    }
}

pub fn bucket_key(timestamp: DateTime<Utc>, granularity: Granularity, zone: &Tz) -> String {
    timestamp
        .with_timezone(zone)
        .format(granularity.key_format())
        .to_string()
}

/// Groups `samples` by bucket label. Input order does not matter.
pub fn bucketize(samples: &[Sample], granularity: Granularity, zone: &Tz) -> Vec<AggregateBucket> {
    let mut groups: BTreeMap<String, BucketAccumulator> = BTreeMap::new();
    for sample in samples {
        let key = bucket_key(sample.timestamp, granularity, zone);
        groups
            .entry(key)
            .or_insert_with(|| BucketAccumulator::new(sample))
            .add(sample);
    }

    groups
        .into_iter()
        .rev()
        .map(|(key, acc)| acc.finish(key))
        .collect()
}

#[derive(Clone)]
pub struct AggregationEngine {
    store: Arc<dyn SampleStore>,
    clock: Arc<dyn Clock>,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn SampleStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Rollups over `[now - window, now]`. An empty window is an empty result.
    pub fn aggregate(
        &self,
        window: ChronoDuration,
        granularity: Granularity,
    ) -> Result<Vec<AggregateBucket>, TelemetryError> {
        let now = self.clock.now();
        let buckets = self.store.query_bucketed(window, granularity, now)?;
        tracing::debug!(
            window_minutes = window.num_minutes(),
            ?granularity,
            buckets = buckets.len(),
            "aggregated sample window"
        );
        Ok(buckets)
    }

    pub fn aggregate_window(
        &self,
        window: HistoryWindow,
    ) -> Result<Vec<AggregateBucket>, TelemetryError> {
        self.aggregate(window.length(), window.granularity())
    }

    /// Raw samples for the window, newest first.
    pub fn samples(&self, window: ChronoDuration) -> Result<Vec<Sample>, TelemetryError> {
        let now = self.clock.now();
        let samples = self
            .store
            .query_range(window_start(now, window))?
            .into_iter()
            .filter(|sample| sample.timestamp <= now)
            .collect();
        Ok(samples)
    }
}

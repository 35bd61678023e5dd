mod memory;
mod sqlite;

pub use memory::MemorySampleStore;
pub use sqlite::SqliteSampleStore;

use crate::aggregate::bucketize;
use crate::error::StorageError;
use crate::types::{AggregateBucket, Granularity, Sample};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

/// Append-only sample log.
///
/// `append` calls are serialized by the implementation. Queries observe every
/// append that completed before they started and never see a partial write.
pub trait SampleStore: Send + Sync {
    fn append(&self, sample: &Sample) -> Result<(), StorageError>;

    /// Samples with `timestamp >= since`, newest first.
    fn query_range(&self, since: DateTime<Utc>) -> Result<Vec<Sample>, StorageError>;

    fn latest(&self) -> Result<Option<Sample>, StorageError>;

    /// Zone used to cut hour/day buckets. Fixed for the life of the store so
    /// every reader draws the same boundaries.
    fn bucket_zone(&self) -> Tz;

    /// Buckets for `[now - window, now]`, keys descending.
    fn query_bucketed(
        &self,
        window: ChronoDuration,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<Vec<AggregateBucket>, StorageError> {
        let samples: Vec<Sample> = self
            .query_range(window_start(now, window))?
            .into_iter()
            .filter(|sample| sample.timestamp <= now)
            .collect();
        Ok(bucketize(&samples, granularity, &self.bucket_zone()))
    }
}

/// `now - window`, saturated to chrono's representable range so an
/// arbitrarily long window reads the whole log instead of overflowing.
pub(crate) fn window_start(now: DateTime<Utc>, window: ChronoDuration) -> DateTime<Utc> {
    match now.checked_sub_signed(window) {
        Some(start) => start,
        None if window > ChronoDuration::zero() => DateTime::<Utc>::MIN_UTC,
        None => DateTime::<Utc>::MAX_UTC,
    }
}

impl<S: SampleStore + ?Sized> SampleStore for Arc<S> {
    fn append(&self, sample: &Sample) -> Result<(), StorageError> {
        (**self).append(sample)
    }

    fn query_range(&self, since: DateTime<Utc>) -> Result<Vec<Sample>, StorageError> {
        (**self).query_range(since)
    }

    fn latest(&self) -> Result<Option<Sample>, StorageError> {
        (**self).latest()
    }

    fn bucket_zone(&self) -> Tz {
        (**self).bucket_zone()
    }

    fn query_bucketed(
        &self,
        window: ChronoDuration,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<Vec<AggregateBucket>, StorageError> {
        (**self).query_bucketed(window, granularity, now)
    }
}

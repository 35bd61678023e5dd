use super::SampleStore;
use crate::error::StorageError;
use crate::types::Sample;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::RwLock;

/// Process-local store. Nothing survives a restart.
#[derive(Debug)]
pub struct MemorySampleStore {
    samples: RwLock<Vec<Sample>>,
    zone: Tz,
}

impl MemorySampleStore {
    pub fn new(zone: Tz) -> Self {
        Self {
            samples: RwLock::new(Vec::new()),
            zone,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SampleStore for MemorySampleStore {
    fn append(&self, sample: &Sample) -> Result<(), StorageError> {
        let mut guard = self.samples.write().map_err(|_| StorageError::Poisoned)?;
        guard.push(sample.clone());
        Ok(())
    }

    fn query_range(&self, since: DateTime<Utc>) -> Result<Vec<Sample>, StorageError> {
        let guard = self.samples.read().map_err(|_| StorageError::Poisoned)?;
        // Newest insert first among equal timestamps, matching the sqlite order.
        let mut out: Vec<Sample> = guard
            .iter()
            .rev()
            .filter(|sample| sample.timestamp >= since)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(out)
    }

    fn latest(&self) -> Result<Option<Sample>, StorageError> {
        let guard = self.samples.read().map_err(|_| StorageError::Poisoned)?;
        let mut latest: Option<&Sample> = None;
        for sample in guard.iter() {
            if latest.map_or(true, |cur| sample.timestamp >= cur.timestamp) {
                latest = Some(sample);
            }
        }
        Ok(latest.cloned())
    }

    fn bucket_zone(&self) -> Tz {
        self.zone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_at(ts: DateTime<Utc>, level: u8) -> Sample {
        Sample {
            timestamp: ts,
            level_percent: level,
            temperature_c: 25.0,
            voltage_v: 4.0,
            is_charging: false,
            since_last_sample_minutes: 0,
        }
    }

    #[test]
    fn query_range_is_descending_and_inclusive() {
        let store = MemorySampleStore::new(Tz::UTC);
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        for i in 0..5 {
            store
                .append(&sample_at(base + Duration::minutes(i * 10), 90 - i as u8))
                .unwrap();
        }

        let got = store.query_range(base + Duration::minutes(20)).unwrap();
        let levels: Vec<u8> = got.iter().map(|s| s.level_percent).collect();
        assert_eq!(levels, vec![86, 87, 88]);
    }

    #[test]
    fn equal_timestamps_return_latest_insert_first() {
        let store = MemorySampleStore::new(Tz::UTC);
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        store.append(&sample_at(ts, 50)).unwrap();
        store.append(&sample_at(ts, 49)).unwrap();

        let got = store.query_range(ts).unwrap();
        assert_eq!(got[0].level_percent, 49);
        assert_eq!(store.latest().unwrap().unwrap().level_percent, 49);
    }

    #[test]
    fn empty_store_has_no_latest() {
        let store = MemorySampleStore::new(Tz::UTC);
        assert!(store.is_empty());
        assert!(store.latest().unwrap().is_none());
    }
}

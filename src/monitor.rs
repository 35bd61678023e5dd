//! Single entry point for the presentation layer.
//!
//! `BatteryMonitor` owns the store, the clock and the ingestion session and
//! exposes the five core operations plus the report views built on them.

use crate::aggregate::AggregationEngine;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, DEFAULT_INGEST_QUEUE};
use crate::error::{TelemetryError, TelemetryResult};
use crate::estimate::{estimate_discharge, DischargeEstimate};
use crate::health::{score, HealthAssessment};
use crate::ingest::{spawn_ingest_worker, IngestHandle, IngestionSession, TelemetryIngestor};
use crate::store::{SampleStore, SqliteSampleStore};
use crate::types::{
    AggregateBucket, Granularity, HealthState, HistoryWindow, RawSnapshot, Sample,
};
use crate::usage::{attribute, UsageBreakdown};
use chrono::Duration as ChronoDuration;
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryReport {
    pub window: HistoryWindow,
    /// Newest first.
    pub samples: Vec<Sample>,
    pub buckets: Vec<AggregateBucket>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DischargeReport {
    pub current_capacity_mah: i64,
    pub estimate: DischargeEstimate,
    pub usage: UsageBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub current_capacity_mah: i64,
    /// Design capacity actually scored against, after the fallback.
    pub design_capacity_mah: i64,
    pub cycle_count: i64,
    pub temperature_c: f64,
    pub assessment: HealthAssessment,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiveStatus {
    /// `level * 100 / scale`, not rounded.
    pub percentage: f64,
    pub plugged: bool,
    pub temperature_c: f64,
    pub voltage_v: f64,
}

pub struct BatteryMonitor {
    store: Arc<dyn SampleStore>,
    clock: Arc<dyn Clock>,
    ingestor: TelemetryIngestor,
    engine: AggregationEngine,
    session: Mutex<IngestionSession>,
    fallback_design_capacity_mah: Option<i64>,
    ingest_queue: usize,
}

impl BatteryMonitor {
    /// Opens the on-disk store named by `config` with the system clock.
    pub fn open(config: &Config) -> TelemetryResult<Self> {
        let store = SqliteSampleStore::open(&config.database_path, config.bucket_timezone)?;
        let monitor = Self::with_store(
            Arc::new(store),
            Arc::new(SystemClock),
            config.fallback_design_capacity_mah,
        )?;
        Ok(monitor.with_ingest_queue(config.ingest_queue))
    }

    /// The in-process session resumes from the newest stored sample.
    pub fn with_store(
        store: Arc<dyn SampleStore>,
        clock: Arc<dyn Clock>,
        fallback_design_capacity_mah: Option<i64>,
    ) -> TelemetryResult<Self> {
        let previous = store.latest()?;
        Ok(Self {
            ingestor: TelemetryIngestor::new(store.clone(), clock.clone()),
            engine: AggregationEngine::new(store.clone(), clock.clone()),
            session: Mutex::new(IngestionSession::resume(previous)),
            store,
            clock,
            fallback_design_capacity_mah,
            ingest_queue: DEFAULT_INGEST_QUEUE,
        })
    }

    /// Bound for the worker queue opened by `start_ingest`. Zero is raised to one.
    pub fn with_ingest_queue(mut self, queue: usize) -> Self {
        self.ingest_queue = queue.max(1);
        self
    }

    pub fn ingest_queue(&self) -> usize {
        self.ingest_queue
    }

    pub fn ingestor(&self) -> &TelemetryIngestor {
        &self.ingestor
    }

    pub fn store(&self) -> &Arc<dyn SampleStore> {
        &self.store
    }

    /// Synchronous ingestion through the monitor's own session.
    pub fn ingest(&self, snapshot: &RawSnapshot) -> TelemetryResult<Sample> {
        let mut session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        session.ingest(&self.ingestor, snapshot)
    }

    /// Starts the event-driven writer. Its session is seeded from the store,
    /// not from the monitor's own session, so use one path or the other.
    pub fn start_ingest(&self) -> TelemetryResult<IngestHandle> {
        let session = IngestionSession::resume(self.store.latest()?);
        spawn_ingest_worker(self.ingestor.clone(), session, self.ingest_queue)
            .map_err(TelemetryError::WorkerSpawn)
    }

    pub fn aggregate(
        &self,
        window: ChronoDuration,
        granularity: Granularity,
    ) -> TelemetryResult<Vec<AggregateBucket>> {
        self.engine.aggregate(window, granularity)
    }

    pub fn history(&self, window: HistoryWindow) -> TelemetryResult<HistoryReport> {
        Ok(HistoryReport {
            window,
            samples: self.engine.samples(window.length())?,
            buckets: self.engine.aggregate_window(window)?,
        })
    }

    pub fn estimate(&self, charge_micro_ah: i64, current_micro_amps: i64) -> DischargeEstimate {
        estimate_discharge(charge_micro_ah, current_micro_amps)
    }

    pub fn score(
        &self,
        state: HealthState,
        current_capacity_mah: i64,
        design_capacity_mah: i64,
        cycle_count: i64,
        temperature_c: f64,
    ) -> HealthAssessment {
        score(
            state,
            current_capacity_mah,
            design_capacity_mah,
            cycle_count,
            temperature_c,
        )
    }

    pub fn attribute(&self, total_rate_milliamps: u64) -> UsageBreakdown {
        attribute(total_rate_milliamps)
    }

    pub fn discharge_report(&self, snapshot: &RawSnapshot) -> DischargeReport {
        let estimate = self.estimate(
            snapshot.charge_counter_micro_ah,
            snapshot.current_now_micro_amps,
        );
        DischargeReport {
            current_capacity_mah: snapshot.charge_mah(),
            estimate,
            usage: self.attribute(estimate.rate_milliamps),
        }
    }

    pub fn health_report(&self, snapshot: &RawSnapshot) -> HealthReport {
        let reported = i64::from(snapshot.design_capacity_mah);
        let design_capacity_mah = match self.fallback_design_capacity_mah {
            Some(fallback) if reported <= 0 => fallback,
            _ => reported,
        };
        let state = snapshot.health_state();
        let current_capacity_mah = snapshot.charge_mah();
        let cycle_count = i64::from(snapshot.cycle_count);
        let temperature_c = snapshot.temperature_c();

        HealthReport {
            state,
            current_capacity_mah,
            design_capacity_mah,
            cycle_count,
            temperature_c,
            assessment: self.score(
                state,
                current_capacity_mah,
                design_capacity_mah,
                cycle_count,
                temperature_c,
            ),
        }
    }

    pub fn live_status(&self, snapshot: &RawSnapshot) -> TelemetryResult<LiveStatus> {
        if snapshot.scale_raw <= 0 {
            return Err(TelemetryError::malformed(format!(
                "scale {} is not positive",
                snapshot.scale_raw
            )));
        }
        Ok(LiveStatus {
            percentage: f64::from(snapshot.level_raw) * 100.0 / f64::from(snapshot.scale_raw),
            plugged: snapshot.charge_status().is_plugged(),
            temperature_c: snapshot.temperature_c(),
            voltage_v: snapshot.voltage_v(),
        })
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

use super::TelemetryIngestor;
use crate::error::TelemetryResult;
use crate::types::{RawSnapshot, Sample};

/// The "last sample" for one device, owned by whoever drives ingestion.
#[derive(Debug, Clone, Default)]
pub struct IngestionSession {
    previous: Option<Sample>,
}

impl IngestionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue from a sample already in the store, e.g. after a restart.
    pub fn resume(previous: Option<Sample>) -> Self {
        Self { previous }
    }

    pub fn previous(&self) -> Option<&Sample> {
        self.previous.as_ref()
    }

    /// Only a successfully stored sample becomes the new previous sample.
    pub fn ingest(
        &mut self,
        ingestor: &TelemetryIngestor,
        snapshot: &RawSnapshot,
    ) -> TelemetryResult<Sample> {
        let sample = ingestor.ingest(snapshot, self.previous.as_ref())?;
        self.previous = Some(sample.clone());
        Ok(sample)
    }
}

use super::{IngestionSession, TelemetryIngestor};
use crate::error::{TelemetryError, TelemetryResult};
use crate::types::{RawSnapshot, Sample};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
enum IngestCommand {
    Snapshot {
        snapshot: RawSnapshot,
        respond_to: Option<oneshot::Sender<TelemetryResult<Sample>>>,
    },
    LastSample {
        respond_to: oneshot::Sender<Option<Sample>>,
    },
}

#[derive(Debug, Default)]
pub struct IngestStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    queue_depth: AtomicU64,
    last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestStatsSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub failed: u64,
    pub queue_depth: u64,
    pub last_error: Option<String>,
}

impl IngestStats {
    fn record(&self, result: &TelemetryResult<Sample>) {
        match result {
            Ok(_) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                self.set_error(None);
            }
            Err(err @ TelemetryError::MalformedSnapshot { .. }) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                self.set_error(Some(err.to_string()));
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.set_error(Some(err.to_string()));
            }
        }
    }

    fn set_error(&self, err: Option<String>) {
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = err;
        }
    }

    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            last_error: self.last_error.lock().ok().and_then(|guard| guard.clone()),
        }
    }
}

/// Sending side of the single ingest consumer. Cheap to clone; the worker
/// thread exits once every handle is dropped.
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<IngestCommand>,
    stats: Arc<IngestStats>,
}

impl IngestHandle {
    /// Queues a snapshot and waits for the stored sample.
    pub async fn ingest(&self, snapshot: RawSnapshot) -> TelemetryResult<Sample> {
        let (tx, rx) = oneshot::channel();
        self.stats.queue_depth.fetch_add(1, Ordering::Relaxed);
        let cmd = IngestCommand::Snapshot {
            snapshot,
            respond_to: Some(tx),
        };
        if self.tx.send(cmd).await.is_err() {
            self.stats.queue_depth.fetch_sub(1, Ordering::Relaxed);
            return Err(TelemetryError::WorkerStopped);
        }
        rx.await.map_err(|_| TelemetryError::WorkerStopped)?
    }

    /// Non-blocking enqueue for event callbacks. The outcome only shows up in
    /// the stats and the log.
    pub fn submit(&self, snapshot: RawSnapshot) -> TelemetryResult<()> {
        self.stats.queue_depth.fetch_add(1, Ordering::Relaxed);
        let cmd = IngestCommand::Snapshot {
            snapshot,
            respond_to: None,
        };
        match self.tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.stats.queue_depth.fetch_sub(1, Ordering::Relaxed);
                match err {
                    mpsc::error::TrySendError::Full(_) => {
                        tracing::warn!("ingest queue full; dropping snapshot");
                        Err(TelemetryError::QueueFull)
                    }
                    mpsc::error::TrySendError::Closed(_) => Err(TelemetryError::WorkerStopped),
                }
            }
        }
    }

    /// Last sample the worker stored, in queue order after anything already
    /// submitted through this handle.
    pub async fn last_sample(&self) -> TelemetryResult<Option<Sample>> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(IngestCommand::LastSample { respond_to: tx })
            .await
            .map_err(|_| TelemetryError::WorkerStopped)?;
        rx.await.map_err(|_| TelemetryError::WorkerStopped)
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        self.stats.snapshot()
    }

    /// Bound of the command queue this handle feeds.
    pub fn queue_capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

pub fn spawn_ingest_worker(
    ingestor: TelemetryIngestor,
    session: IngestionSession,
    queue: usize,
) -> std::io::Result<IngestHandle> {
    let (tx, mut rx) = mpsc::channel::<IngestCommand>(queue.max(1));
    let stats = Arc::new(IngestStats::default());
    let worker_stats = stats.clone();

    std::thread::Builder::new()
        .name("sample-writer".to_string())
        .spawn(move || run_worker(ingestor, session, worker_stats, &mut rx))?;

    tracing::info!(queue, "ingest worker started");
    Ok(IngestHandle { tx, stats })
}

fn run_worker(
    ingestor: TelemetryIngestor,
    mut session: IngestionSession,
    stats: Arc<IngestStats>,
    rx: &mut mpsc::Receiver<IngestCommand>,
) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            IngestCommand::Snapshot {
                snapshot,
                respond_to,
            } => {
                stats.queue_depth.fetch_sub(1, Ordering::Relaxed);
                let result = session.ingest(&ingestor, &snapshot);
                stats.record(&result);
                if let Some(respond_to) = respond_to {
                    let _ = respond_to.send(result);
                }
            }
            IngestCommand::LastSample { respond_to } => {
                let _ = respond_to.send(session.previous().cloned());
            }
        }
    }
    tracing::info!("ingest worker stopped");
}

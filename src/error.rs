use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sample store lock poisoned")]
    Poisoned,
    #[error("corrupt sample row {row_id}: {reason}")]
    Corrupt { row_id: i64, reason: String },
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("sample store unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("malformed snapshot: {reason}")]
    MalformedSnapshot { reason: String },
    #[error("capacity ratio undefined for design capacity {design_capacity_mah} mAh")]
    DivisionUndefined { design_capacity_mah: i64 },
    #[error("ingest worker stopped")]
    WorkerStopped,
    #[error("ingest queue full")]
    QueueFull,
    #[error("failed to start ingest worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

impl TelemetryError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedSnapshot {
            reason: reason.into(),
        }
    }
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;

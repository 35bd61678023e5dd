pub mod aggregate;
pub mod clock;
pub mod config;
pub mod error;
pub mod estimate;
pub mod health;
pub mod ingest;
pub mod logging;
pub mod monitor;
pub mod store;
pub mod types;
pub mod usage;

pub use config::Config;
pub use error::{StorageError, TelemetryError, TelemetryResult};
pub use monitor::BatteryMonitor;
pub use types::{AggregateBucket, Granularity, HealthState, HistoryWindow, RawSnapshot, Sample};

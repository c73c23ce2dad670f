// cloudmon-api: Async Rust client for device-cloud push monitors, alerts, files, and stream history

pub mod alerts;
pub mod auth;
pub mod client;
pub mod error;
pub mod files;
pub mod monitor;
pub mod push;
pub mod streams;
pub mod transport;
pub mod xml;

pub use alerts::AlertSummary;
pub use auth::Credentials;
pub use client::{DEFAULT_BASE_URL, DeviceCloudClient};
pub use error::Error;
pub use files::{FileEntry, FileKind};
pub use monitor::{
    Compression, FormatType, InvalidMonitorId, MonitorId, MonitorMetadata, MonitorQuery,
    MonitorRequest, MonitorStatus,
};
pub use push::{PushBatch, PushConnection, PushFeed, push_channel};
pub use streams::{DataPoint, HistorySpan, Rollup, RollupInterval, RollupMethod};
pub use transport::{TlsMode, TransportConfig};
pub use xml::DeviceCloudError;

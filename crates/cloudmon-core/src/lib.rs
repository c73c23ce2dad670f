//! Per-session device-cloud monitor management between `cloudmon-api` and
//! the notification consumers (browser sockets, the CLI).
//!
//! - **[`MonitorRegistry`]** owns at most one [`Multiplexer`] per browser
//!   session, creating it lazily from a [`SessionConnector`] and evicting it
//!   once its last subscription is gone.
//!
//! - **[`Multiplexer`]** owns a session's push connection and the set of
//!   monitors registered over it. A single dispatch task routes every
//!   incoming batch to the callback of its monitor.
//!
//! - **Bridges** ([`Bridge`], [`BridgeCallback`]) decode typed push records
//!   and emit [`Notification`]s into a [`NotificationSink`].
//!
//! - **[`MonitorConsumer`]** is the socket side: it retries registration
//!   while the session is not ready and reports failures as error frames.
//!
//! - **Transfers** ([`TransferTracker`], [`CancelableReader`],
//!   [`ProgressHub`]) let uploads be canceled out-of-band between chunks.

pub mod bridge;
pub mod config;
pub mod consumer;
pub mod error;
pub mod multiplexer;
pub mod notification;
pub mod registry;
pub mod schema;
pub mod service;
pub mod session;
pub mod sink;
pub mod sweep;
pub mod transfer;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{
    AlertBridge, BatchCallback, BatchContext, Bridge, BridgeCallback, CliBridge, DataPointBridge,
    DeviceBridge, Translation, ValveBridge,
};
pub use config::{CloudConfig, MonitorSettings, TlsVerification};
pub use consumer::{ConsumerState, MonitorConsumer, RetryPolicy};
pub use error::CoreError;
pub use multiplexer::{Multiplexer, Subscription};
pub use notification::{CliNotification, ErrorFrame, Notification};
pub use registry::{MonitorRegistry, Registration};
pub use schema::{SubscriptionSpec, Sweep};
pub use service::MonitorService;
pub use session::{ClientDirectory, PushRouter, SessionConnection, SessionConnector, SessionKey};
pub use sink::{NotificationQueue, NotificationSink, OverflowPolicy};
pub use sweep::sweep_inactive;
pub use transfer::{CancelableReader, ProgressHub, TransferTracker};

// ── Subscription bridges ──
//
// A bridge turns the records of one push batch into notifications for a
// sink. Each subscription kind has its own `Bridge` with a typed record;
// `BridgeCallback` does the shared work of decoding records, dropping the
// ones that do not decode, and folding the keep-listening answers.

mod alert;
mod cli;
mod datapoint;
mod device;
mod valve;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use cloudmon_api::MonitorId;

use crate::notification::Notification;
use crate::service::MonitorService;
use crate::sink::NotificationSink;

pub use alert::{AlarmStatusRecord, AlertBridge};
pub use cli::{CliBridge, CliEvent};
pub use datapoint::{DataPointBridge, DataPointRecord};
pub use device::{DeviceBridge, DeviceEvent};
pub use valve::{ValveBridge, ValveRecord};

/// What a callback gets besides the records themselves.
#[derive(Clone)]
pub struct BatchContext {
    pub monitor_id: MonitorId,
    pub service: Arc<dyn MonitorService>,
}

impl std::fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchContext")
            .field("monitor_id", &self.monitor_id)
            .finish_non_exhaustive()
    }
}

/// Invoked once per push batch addressed to a subscription.
///
/// Resolves to `true` to keep listening; `false` ends the subscription.
pub trait BatchCallback: Send + Sync {
    fn on_batch(&self, cx: BatchContext, records: Vec<Value>) -> BoxFuture<'_, bool>;
}

/// Outcome of translating one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub notification: Option<Notification>,
    pub keep_listening: bool,
}

impl Translation {
    pub fn emit(notification: Notification) -> Self {
        Self {
            notification: Some(notification),
            keep_listening: true,
        }
    }

    pub fn skip() -> Self {
        Self {
            notification: None,
            keep_listening: true,
        }
    }

    /// Emit a last notification and end the subscription.
    pub fn finish(notification: Notification) -> Self {
        Self {
            notification: Some(notification),
            keep_listening: false,
        }
    }
}

/// Per-kind translation strategy.
pub trait Bridge: Send + Sync + 'static {
    type Record: DeserializeOwned + Send;

    /// Name used in error frames ("could not register {KIND} monitor").
    const KIND: &'static str;

    fn translate<'a>(
        &'a self,
        cx: &'a BatchContext,
        record: Self::Record,
    ) -> BoxFuture<'a, Translation>;
}

/// Adapts a `Bridge` and a sink into a `BatchCallback`.
pub struct BridgeCallback<B> {
    bridge: B,
    sink: Arc<dyn NotificationSink>,
}

impl<B: Bridge> BridgeCallback<B> {
    pub fn new(bridge: B, sink: Arc<dyn NotificationSink>) -> Self {
        Self { bridge, sink }
    }
}

impl<B: Bridge> BatchCallback for BridgeCallback<B> {
    fn on_batch(&self, cx: BatchContext, records: Vec<Value>) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let mut keep_listening = true;
            for raw in records {
                let record = match serde_json::from_value::<B::Record>(raw) {
                    Ok(record) => record,
                    Err(e) => {
                        debug!(kind = B::KIND, monitor_id = %cx.monitor_id, error = %e, "dropping undecodable record");
                        continue;
                    }
                };
                let translation = self.bridge.translate(&cx, record).await;
                if let Some(notification) = translation.notification {
                    self.sink.send(notification);
                }
                keep_listening &= translation.keep_listening;
            }
            keep_listening
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing {
    use super::*;
    use crate::service::fake::FakeService;
    use crate::sink::{NotificationQueue, OverflowPolicy};

    pub(crate) fn context(service: Arc<FakeService>) -> BatchContext {
        BatchContext {
            monitor_id: MonitorId::new(77).unwrap(),
            service,
        }
    }

    /// Run `bridge` over `records` and collect what reached the sink.
    pub(crate) async fn run<B: Bridge>(
        bridge: B,
        service: Arc<FakeService>,
        records: Vec<Value>,
    ) -> (bool, Vec<Notification>) {
        let queue = Arc::new(NotificationQueue::new(64, OverflowPolicy::DropOldest));
        let callback = BridgeCallback::new(bridge, queue.clone());
        let keep = callback.on_batch(context(service), records).await;
        (keep, queue.drain())
    }
}

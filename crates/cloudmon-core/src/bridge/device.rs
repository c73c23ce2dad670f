use futures_util::future::{self, BoxFuture, FutureExt};
use serde::Deserialize;

use super::{BatchContext, Bridge, Translation};
use crate::notification::Notification;

/// One record rendered by the device connectivity schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceEvent {
    pub device_id: String,
    pub status: String,
}

/// Device connect/disconnect events.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceBridge;

impl Bridge for DeviceBridge {
    type Record = DeviceEvent;
    const KIND: &'static str = "device";

    fn translate<'a>(
        &'a self,
        _cx: &'a BatchContext,
        record: DeviceEvent,
    ) -> BoxFuture<'a, Translation> {
        future::ready(Translation::emit(Notification::Device {
            device_id: record.device_id,
            status: record.status,
        }))
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::bridge::testing::run;
    use crate::service::fake::FakeService;

    #[tokio::test]
    async fn every_event_is_forwarded() {
        let (keep, sent) = run(
            DeviceBridge,
            Arc::new(FakeService::new()),
            vec![
                json!({"device_id": "00000000-00000000-0004F3FF-FF000001", "status": "1"}),
                json!({"device_id": "00000000-00000000-0004F3FF-FF000001", "status": "0"}),
            ],
        )
        .await;

        assert!(keep);
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[1],
            Notification::Device {
                device_id: "00000000-00000000-0004F3FF-FF000001".into(),
                status: "0".into(),
            }
        );
    }
}

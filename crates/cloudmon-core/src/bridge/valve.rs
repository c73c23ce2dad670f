use futures_util::future::{self, BoxFuture, FutureExt};
use serde::Deserialize;
use serde_json::Value;

use super::{BatchContext, Bridge, Translation};
use crate::notification::Notification;

const VALVE_SUFFIX: &str = "valve";
/// Device name reported for the farm's main tank valve.
const TANK_DEVICE: &str = "tank";

/// A raw `DataPoint` push document.
#[derive(Debug, Clone, Deserialize)]
pub struct ValveRecord {
    #[serde(rename = "Document")]
    document: Document,
}

#[derive(Debug, Clone, Deserialize)]
struct Document {
    #[serde(rename = "Msg")]
    msg: Msg,
}

#[derive(Debug, Clone, Deserialize)]
struct Msg {
    #[serde(rename = "DataPoint")]
    data_point: DataPoint,
}

#[derive(Debug, Clone, Deserialize)]
struct DataPoint {
    #[serde(rename = "streamId")]
    stream_id: String,
    data: Value,
}

/// Valve state changes across a farm's devices.
///
/// Streams look like `{farm}/{station}/valve` for station valves and
/// `{farm}/valve` for the tank.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValveBridge;

impl ValveBridge {
    fn device_for(stream_id: &str) -> &str {
        let parts: Vec<&str> = stream_id.split('/').collect();
        match parts.as_slice() {
            [_, device, _] => *device,
            _ => TANK_DEVICE,
        }
    }
}

impl Bridge for ValveBridge {
    type Record = ValveRecord;
    const KIND: &'static str = "valve";

    fn translate<'a>(
        &'a self,
        _cx: &'a BatchContext,
        record: ValveRecord,
    ) -> BoxFuture<'a, Translation> {
        let DataPoint { stream_id, data } = record.document.msg.data_point;
        let translation = if stream_id.ends_with(VALVE_SUFFIX) {
            Translation::emit(Notification::Valve {
                device: Self::device_for(&stream_id).to_owned(),
                value: data,
            })
        } else {
            Translation::skip()
        };
        future::ready(translation).boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::bridge::testing::run;
    use crate::service::fake::FakeService;

    fn document(stream: &str, data: Value) -> Value {
        json!({"Document": {"Msg": {"DataPoint": {"streamId": stream, "data": data}}}})
    }

    #[tokio::test]
    async fn station_and_tank_valves() {
        let (keep, sent) = run(
            ValveBridge,
            Arc::new(FakeService::new()),
            vec![
                document("farm_north/station3/valve", json!(1)),
                document("farm_north/valve", json!(0)),
                document("farm_north/station3/moisture", json!(41)),
            ],
        )
        .await;

        assert!(keep);
        assert_eq!(
            sent,
            vec![
                Notification::Valve {
                    device: "station3".into(),
                    value: json!(1)
                },
                Notification::Valve {
                    device: "tank".into(),
                    value: json!(0)
                },
            ]
        );
    }
}

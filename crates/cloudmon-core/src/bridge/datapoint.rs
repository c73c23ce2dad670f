use futures_util::future::{self, BoxFuture, FutureExt};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{BatchContext, Bridge, Translation};
use crate::notification::Notification;

/// One record rendered by the data-point filter schema.
///
/// The schema ends with a dummy `{"a": 0}` object so its JSON array is
/// always well formed; that record has neither field and is dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct DataPointRecord {
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl DataPointRecord {
    fn is_complete(&self) -> bool {
        self.fields.contains_key("stream") && self.fields.contains_key("value")
    }
}

/// Forwards complete data-point records unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataPointBridge;

impl Bridge for DataPointBridge {
    type Record = DataPointRecord;
    const KIND: &'static str = "data point";

    fn translate<'a>(
        &'a self,
        _cx: &'a BatchContext,
        record: DataPointRecord,
    ) -> BoxFuture<'a, Translation> {
        let translation = if record.is_complete() {
            Translation::emit(Notification::DataPoint(Value::Object(record.fields)))
        } else {
            Translation::skip()
        };
        future::ready(translation).boxed()
    }
}

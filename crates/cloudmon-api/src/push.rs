// Push connection channel
//
// The device cloud delivers monitor batches over a TCP push transport
// whose framing is handled by an external adapter. This module is the
// seam between that adapter and the dispatch side: the adapter holds a
// `PushFeed` and delivers decoded batches, the consumer reads them from
// the matching `PushConnection` in arrival order.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::Error;
use crate::monitor::MonitorId;

/// One push delivery: the records a monitor batched together.
#[derive(Debug, Clone, PartialEq)]
pub struct PushBatch {
    pub monitor_id: MonitorId,
    pub records: Vec<Value>,
}

impl PushBatch {
    pub fn new(monitor_id: MonitorId, records: Vec<Value>) -> Self {
        Self {
            monitor_id,
            records,
        }
    }

    /// Decode a (decompressed) JSON push payload.
    ///
    /// Batched monitors push an array of records; single-record monitors
    /// push the bare object.
    pub fn from_json(monitor_id: MonitorId, payload: &[u8]) -> Result<Self, Error> {
        let value: Value = serde_json::from_slice(payload).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::from_utf8_lossy(payload).into_owned(),
        })?;
        let records = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        Ok(Self::new(monitor_id, records))
    }
}

/// Create a connected feed/connection pair with room for `capacity`
/// undelivered batches.
pub fn push_channel(capacity: usize) -> (PushFeed, PushConnection) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let cancel = CancellationToken::new();
    (
        PushFeed {
            tx,
            cancel: cancel.clone(),
        },
        PushConnection { rx, cancel },
    )
}

/// Producing side, held by the push transport adapter.
#[derive(Debug, Clone)]
pub struct PushFeed {
    tx: mpsc::Sender<PushBatch>,
    cancel: CancellationToken,
}

impl PushFeed {
    /// Hand a batch to the connection, waiting for queue space.
    pub async fn deliver(&self, batch: PushBatch) -> Result<(), Error> {
        trace!(monitor_id = %batch.monitor_id, records = batch.records.len(), "delivering push batch");
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::PushClosed),
            sent = self.tx.send(batch) => sent.map_err(|_| Error::PushClosed),
        }
    }

    /// `true` once the consuming side closed the connection.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves when the connection is closed, so the adapter can drop its
    /// socket.
    pub async fn closed(&self) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = self.tx.closed() => {}
        }
    }
}

/// Consuming side: one per multiplexer.
#[derive(Debug)]
pub struct PushConnection {
    rx: mpsc::Receiver<PushBatch>,
    cancel: CancellationToken,
}

impl PushConnection {
    /// Next batch in arrival order, or `None` once closed.
    pub async fn next_batch(&mut self) -> Option<PushBatch> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            batch = self.rx.recv() => batch,
        }
    }

    /// Token that closes this connection when cancelled.
    pub fn close_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn id(raw: u64) -> MonitorId {
        MonitorId::new(raw).unwrap()
    }

    #[test]
    fn payload_array_becomes_records() {
        let batch = PushBatch::from_json(id(3), br#"[{"a":1},{"b":2}]"#).unwrap();
        assert_eq!(batch.records, vec![json!({"a":1}), json!({"b":2})]);
    }

    #[test]
    fn payload_object_becomes_single_record() {
        let batch = PushBatch::from_json(id(3), br#"{"a":1}"#).unwrap();
        assert_eq!(batch.records, vec![json!({"a":1})]);
    }

    #[test]
    fn payload_garbage_is_rejected() {
        let err = PushBatch::from_json(id(3), b"{nope").unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
    }

    #[tokio::test]
    async fn batches_arrive_in_order() {
        let (feed, mut conn) = push_channel(4);
        feed.deliver(PushBatch::new(id(1), vec![json!(1)])).await.unwrap();
        feed.deliver(PushBatch::new(id(2), vec![json!(2)])).await.unwrap();

        assert_eq!(conn.next_batch().await.unwrap().monitor_id, id(1));
        assert_eq!(conn.next_batch().await.unwrap().monitor_id, id(2));
    }

    #[tokio::test]
    async fn close_stops_both_sides() {
        let (feed, mut conn) = push_channel(1);
        conn.close();

        assert!(conn.next_batch().await.is_none());
        assert!(feed.is_closed());
        let err = feed.deliver(PushBatch::new(id(1), vec![])).await.unwrap_err();
        assert!(matches!(err, Error::PushClosed));
        feed.closed().await;
    }
}

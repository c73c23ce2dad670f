// ── Cancelable transfers ──
//
// Chunked uploads register a cancel hook under their transfer id so an
// out-of-band request (another socket, Ctrl-C) can stop them between
// chunks. Progress is fanned out per transfer through `ProgressHub`.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::Stream;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::notification::Notification;

type CancelHook = Arc<dyn Fn() + Send + Sync>;

static GLOBAL_TRACKER: LazyLock<TransferTracker> = LazyLock::new(TransferTracker::new);

// ── TransferTracker ──────────────────────────────────────────────

/// Transfer id → cancel hook.
#[derive(Clone, Default)]
pub struct TransferTracker {
    hooks: Arc<DashMap<String, CancelHook>>,
}

impl std::fmt::Debug for TransferTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferTracker")
            .field("transfers", &self.hooks.len())
            .finish()
    }
}

impl TransferTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide tracker.
    pub fn global() -> &'static Self {
        &GLOBAL_TRACKER
    }

    /// Register `on_cancel` for `transfer_id`, replacing any previous hook.
    pub fn register(&self, transfer_id: impl Into<String>, on_cancel: impl Fn() + Send + Sync + 'static) {
        self.insert(transfer_id.into(), Arc::new(on_cancel));
    }

    fn insert(&self, transfer_id: String, hook: CancelHook) {
        if self.hooks.insert(transfer_id.clone(), hook).is_some() {
            debug!(%transfer_id, "cancel hook replaced by a newer transfer");
        }
    }

    /// Remove `hook` only while it is still the one stored for
    /// `transfer_id`; a newer transfer under the same id keeps its hook.
    fn release(&self, transfer_id: &str, hook: &CancelHook) -> bool {
        self.hooks
            .remove_if(transfer_id, |_, stored| Arc::ptr_eq(stored, hook))
            .is_some()
    }

    /// Invoke the hook of `transfer_id`. Returns `false` if nothing is
    /// registered under that id.
    pub fn cancel(&self, transfer_id: &str) -> bool {
        // Clone out so the hook never runs under the shard lock.
        let Some(hook) = self.hooks.get(transfer_id).map(|h| Arc::clone(h.value())) else {
            debug!(transfer_id, "cancel for unknown transfer ignored");
            return false;
        };
        info!(transfer_id, "canceling transfer");
        hook();
        true
    }

    pub fn unregister(&self, transfer_id: &str) -> bool {
        self.hooks.remove(transfer_id).is_some()
    }

    pub fn contains(&self, transfer_id: &str) -> bool {
        self.hooks.contains_key(transfer_id)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

// ── ProgressHub ──────────────────────────────────────────────────

const PROGRESS_CAPACITY: usize = 16;

/// Per-transfer broadcast groups for `{"progress": n}` frames.
#[derive(Debug, Clone, Default)]
pub struct ProgressHub {
    groups: Arc<DashMap<String, broadcast::Sender<Notification>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, transfer_id: &str) -> broadcast::Receiver<Notification> {
        self.groups
            .entry(transfer_id.to_owned())
            .or_insert_with(|| broadcast::channel(PROGRESS_CAPACITY).0)
            .subscribe()
    }

    /// Send to every subscriber of `transfer_id`; returns how many got it.
    pub fn publish(&self, transfer_id: &str, notification: Notification) -> usize {
        self.groups
            .get(transfer_id)
            .and_then(|group| group.send(notification).ok())
            .unwrap_or(0)
    }

    pub fn discard(&self, transfer_id: &str) {
        self.groups.remove(transfer_id);
    }
}

// ── CancelableReader ─────────────────────────────────────────────

/// A reader over an upload source that stops as soon as its transfer is
/// canceled.
pub struct CancelableReader<R> {
    transfer_id: String,
    source: R,
    length: u64,
    total_read: u64,
    last_percent: u8,
    canceled: Arc<AtomicBool>,
    hook: CancelHook,
    interrupted: bool,
    finished: bool,
    tracker: TransferTracker,
    hub: ProgressHub,
}

impl<R> std::fmt::Debug for CancelableReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelableReader")
            .field("transfer_id", &self.transfer_id)
            .field("length", &self.length)
            .field("total_read", &self.total_read)
            .field("interrupted", &self.interrupted)
            .finish_non_exhaustive()
    }
}

impl<R: Read> CancelableReader<R> {
    /// Wrap `source` (of `length` bytes) and register it with `tracker`.
    pub fn new(
        transfer_id: impl Into<String>,
        source: R,
        length: u64,
        tracker: TransferTracker,
        hub: ProgressHub,
    ) -> Self {
        let transfer_id = transfer_id.into();
        let canceled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&canceled);
        let hook: CancelHook = Arc::new(move || flag.store(true, Ordering::SeqCst));
        tracker.insert(transfer_id.clone(), Arc::clone(&hook));

        Self {
            transfer_id,
            source,
            length,
            total_read: 0,
            last_percent: 0,
            canceled,
            hook,
            interrupted: false,
            finished: false,
            tracker,
            hub,
        }
    }

    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    pub fn bytes_read(&self) -> u64 {
        self.total_read
    }

    /// Whether reading stopped because of a cancel rather than end of input.
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Next chunk of up to `size` bytes. Empty once the source is
    /// exhausted or the transfer was canceled.
    ///
    /// `size` must be positive; an empty chunk always means the end.
    pub fn read(&mut self, size: usize) -> io::Result<Bytes> {
        if size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "chunk size must be positive"));
        }
        if self.finished {
            return Ok(Bytes::new());
        }
        if self.canceled.load(Ordering::SeqCst) {
            info!(transfer_id = %self.transfer_id, bytes = self.total_read, "transfer canceled");
            self.interrupted = true;
            self.finish();
            return Ok(Bytes::new());
        }

        let mut buf = vec![0; size];
        let n = loop {
            match self.source.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.finish();
                    return Err(e);
                }
            }
        };
        if n == 0 {
            self.finish();
            return Ok(Bytes::new());
        }

        buf.truncate(n);
        self.total_read += u64::try_from(n).unwrap_or(u64::MAX);
        self.report_progress();
        Ok(Bytes::from(buf))
    }

    fn report_progress(&mut self) {
        if self.length == 0 {
            return;
        }
        let percent = (self.total_read.saturating_mul(100) / self.length).min(100);
        let percent = u8::try_from(percent).unwrap_or(100);
        if percent != self.last_percent {
            self.last_percent = percent;
            self.hub
                .publish(&self.transfer_id, Notification::Progress { progress: percent });
        }
    }
}

impl<R: Read + Send + 'static> CancelableReader<R> {
    /// Adapt into a request body stream of `chunk_size` chunks. A cancel
    /// ends the stream with an `Interrupted` error instead of a clean EOF.
    ///
    /// Source reads run on the blocking pool.
    pub fn into_stream(self, chunk_size: usize) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        async_stream::try_stream! {
            let mut reader = self;
            loop {
                let (returned, chunk) = tokio::task::spawn_blocking(move || {
                    let chunk = reader.read(chunk_size);
                    (reader, chunk)
                })
                .await
                .map_err(io::Error::other)?;
                reader = returned;
                let chunk = chunk?;
                if chunk.is_empty() {
                    if reader.was_interrupted() {
                        Err::<(), _>(io::Error::new(
                            io::ErrorKind::Interrupted,
                            format!("transfer {} canceled", reader.transfer_id),
                        ))?;
                    }
                    break;
                }
                yield chunk;
            }
        }
    }
}

impl<R> CancelableReader<R> {
    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.tracker.release(&self.transfer_id, &self.hook);
        }
    }
}

impl<R> Drop for CancelableReader<R> {
    fn drop(&mut self) {
        self.finish();
    }
}

// ── Monitor multiplexer ──
//
// One per session: owns the push connection and the set of live
// subscriptions created through it. A single dispatch task reads batches
// in arrival order and awaits each callback before reading the next.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cloudmon_api::{MonitorId, MonitorRequest, PushBatch, PushConnection};

use crate::bridge::{BatchCallback, BatchContext};
use crate::error::CoreError;
use crate::service::MonitorService;
use crate::session::{SessionConnection, SessionKey};
use crate::sweep::sweep_inactive;

/// Called with the multiplexer when a self-terminating subscription leaves
/// it empty.
pub type IdleHook = Box<dyn Fn(&Multiplexer) + Send + Sync>;

/// One remote push monitor owned by a multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: MonitorId,
    pub request: MonitorRequest,
}

struct SubscriptionEntry {
    subscription: Subscription,
    callback: Option<Arc<dyn BatchCallback>>,
}

pub struct Multiplexer {
    session: SessionKey,
    service: Arc<dyn MonitorService>,
    subscriptions: DashMap<MonitorId, SubscriptionEntry>,
    /// Creations in flight; a multiplexer with pending creations is not idle.
    pending: AtomicUsize,
    close: CancellationToken,
    stopped: AtomicBool,
    on_idle: Option<IdleHook>,
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("session", &self.session)
            .field("subscriptions", &self.subscriptions.len())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Multiplexer {
    /// Start a multiplexer over `connection` and spawn its dispatch task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        session: SessionKey,
        connection: SessionConnection,
        on_idle: Option<IdleHook>,
    ) -> Arc<Self> {
        let SessionConnection { service, push } = connection;
        let mux = Arc::new(Self {
            session,
            service,
            subscriptions: DashMap::new(),
            pending: AtomicUsize::new(0),
            close: push.close_handle(),
            stopped: AtomicBool::new(false),
            on_idle,
        });
        tokio::spawn(dispatch(Arc::downgrade(&mux), push));
        debug!(session = %mux.session, "multiplexer started");
        mux
    }

    pub fn session(&self) -> &SessionKey {
        &self.session
    }

    pub fn service(&self) -> &Arc<dyn MonitorService> {
        &self.service
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn subscription_ids(&self) -> Vec<MonitorId> {
        let mut ids: Vec<MonitorId> = self.subscriptions.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn subscription(&self, id: MonitorId) -> Option<Subscription> {
        self.subscriptions.get(&id).map(|e| e.subscription.clone())
    }

    /// No live subscriptions and none being created.
    pub fn is_idle(&self) -> bool {
        self.subscriptions.is_empty() && self.pending.load(Ordering::SeqCst) == 0
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    // ── Subscription lifecycle ───────────────────────────────────

    /// Create a remote TCP monitor and track it.
    pub async fn create_subscription(
        &self,
        request: MonitorRequest,
    ) -> Result<Subscription, CoreError> {
        if self.is_stopped() {
            return Err(CoreError::PushClosed);
        }

        // Held for the whole creation, so the multiplexer never looks
        // idle while a creation is in flight.
        let _pending = PendingGuard::enter(&self.pending);
        let id = self.service.create_monitor(&request).await?;

        let subscription = Subscription { id, request };
        if !self.is_stopped() {
            self.subscriptions.insert(
                id,
                SubscriptionEntry {
                    subscription: subscription.clone(),
                    callback: None,
                },
            );
        }
        // A stop may land before or right after the insert; either way
        // nothing would ever deliver this monitor's batches.
        if self.is_stopped() {
            self.subscriptions.remove(&id);
            warn!(session = %self.session, monitor_id = %id, "multiplexer stopped during creation, deleting monitor");
            if let Err(e) = self.service.delete_monitor(id).await {
                warn!(monitor_id = %id, error = %e, "failed to delete orphaned monitor");
            }
            return Err(CoreError::PushClosed);
        }

        info!(session = %self.session, monitor_id = %id, "subscription created");
        Ok(subscription)
    }

    /// Register the callback for a tracked subscription. Returns `false`
    /// when `id` is not tracked.
    pub fn attach_callback(&self, id: MonitorId, callback: Arc<dyn BatchCallback>) -> bool {
        match self.subscriptions.get_mut(&id) {
            Some(mut entry) => {
                entry.callback = Some(callback);
                true
            }
            None => false,
        }
    }

    /// Stop tracking `id` and delete the remote monitor.
    ///
    /// Untracked ids are a no-op. Delete failures are logged, never returned.
    pub async fn delete_subscription(&self, id: MonitorId) {
        if self.subscriptions.remove(&id).is_none() {
            debug!(session = %self.session, monitor_id = %id, "delete of untracked subscription ignored");
            return;
        }
        match self.service.delete_monitor(id).await {
            Ok(()) => info!(session = %self.session, monitor_id = %id, "subscription deleted"),
            Err(e) => warn!(session = %self.session, monitor_id = %id, error = %e, "failed to delete monitor"),
        }
    }

    /// Close the push connection and drop every listener. Idempotent.
    ///
    /// Remote monitors are left in place; the device cloud marks them
    /// inactive and a later sweep removes them.
    pub fn stop_all(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.close.cancel();
        self.subscriptions.clear();
        debug!(session = %self.session, "multiplexer stopped");
    }

    /// Delete this account's inactive TCP monitors whose topic contains
    /// `topic_hint` (and `device_id`, when given). Returns how many were
    /// deleted; failures are logged and skipped.
    pub async fn scan_and_remove_inactive(&self, topic_hint: &str, device_id: Option<&str>) -> usize {
        let tracked = |id: MonitorId| self.subscriptions.contains_key(&id);
        match sweep_inactive(self.service.as_ref(), topic_hint, device_id, tracked).await {
            Ok(removed) => removed.len(),
            Err(e) => {
                warn!(session = %self.session, error = %e, "could not list monitors for sweep");
                0
            }
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────

    async fn deliver(&self, batch: PushBatch) {
        let PushBatch { monitor_id, records } = batch;
        let callback = self
            .subscriptions
            .get(&monitor_id)
            .and_then(|entry| entry.callback.clone());
        let Some(callback) = callback else {
            debug!(session = %self.session, %monitor_id, "no listener for batch, dropping");
            return;
        };

        let cx = BatchContext {
            monitor_id,
            service: Arc::clone(&self.service),
        };
        if callback.on_batch(cx, records).await {
            return;
        }

        debug!(session = %self.session, %monitor_id, "callback ended subscription");
        self.delete_subscription(monitor_id).await;
        if self.is_idle() {
            if let Some(on_idle) = &self.on_idle {
                on_idle(self);
            }
        }
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.close.cancel();
    }
}

async fn dispatch(mux: Weak<Multiplexer>, mut push: PushConnection) {
    while let Some(batch) = push.next_batch().await {
        let Some(mux) = mux.upgrade() else {
            break;
        };
        mux.deliver(batch).await;
    }
    debug!("dispatch loop finished");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use futures_util::future::{BoxFuture, FutureExt};
    use serde_json::{Value, json};

    use cloudmon_api::{MonitorMetadata, PushFeed, push_channel};

    use super::*;
    use crate::service::fake::FakeService;

    fn start(service: &Arc<FakeService>) -> (Arc<Multiplexer>, PushFeed) {
        start_with_hook(service, None)
    }

    fn start_with_hook(
        service: &Arc<FakeService>,
        on_idle: Option<IdleHook>,
    ) -> (Arc<Multiplexer>, PushFeed) {
        let (feed, push) = push_channel(8);
        let connection = SessionConnection {
            service: service.clone(),
            push,
        };
        (Multiplexer::start("s".into(), connection, on_idle), feed)
    }

    /// Records each batch and answers with a fixed keep-listening flag.
    struct Recorder {
        seen: Arc<std::sync::Mutex<Vec<(MonitorId, Vec<Value>)>>>,
        keep: bool,
    }

    impl BatchCallback for Recorder {
        fn on_batch(&self, cx: BatchContext, records: Vec<Value>) -> BoxFuture<'_, bool> {
            self.seen.lock().unwrap().push((cx.monitor_id, records));
            futures_util::future::ready(self.keep).boxed()
        }
    }

    fn inactive(id: u64, topic: &str) -> MonitorMetadata {
        MonitorMetadata {
            id,
            topic: topic.into(),
            transport_type: Some("tcp".into()),
            status: Some("INACTIVE".into()),
            batch_size: None,
            batch_duration: None,
            format_type: None,
            compression: None,
            last_connect: None,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn create_subscription_tracks_positive_id() {
        let service = Arc::new(FakeService::new());
        let (mux, _feed) = start(&service);

        let sub = mux
            .create_subscription(MonitorRequest::new(["devices/dev-1"]))
            .await
            .unwrap();

        assert!(sub.id.get() > 0);
        assert_eq!(mux.subscription_ids(), vec![sub.id]);
        assert!(!mux.is_idle());
    }

    #[tokio::test]
    async fn create_failure_propagates_and_leaves_idle() {
        let service = Arc::new(FakeService::new());
        service.fail_next_create("Monitor limit reached");
        let (mux, _feed) = start(&service);

        let err = mux
            .create_subscription(MonitorRequest::new(["devices/dev-1"]))
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "Monitor limit reached");
        assert!(mux.is_idle());
    }

    #[tokio::test]
    async fn stop_all_twice_is_harmless() {
        let service = Arc::new(FakeService::new());
        let (mux, feed) = start(&service);
        mux.create_subscription(MonitorRequest::new(["a"])).await.unwrap();

        mux.stop_all();
        mux.stop_all();

        assert!(mux.is_stopped());
        assert_eq!(mux.subscription_count(), 0);
        assert!(feed.is_closed());
        let err = mux
            .create_subscription(MonitorRequest::new(["b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PushClosed));
    }

    #[tokio::test]
    async fn stop_during_creation_deletes_the_new_monitor() {
        let service = Arc::new(FakeService::new());
        let gate = service.gate_creation();
        let (mux, _feed) = start(&service);

        let creating = tokio::spawn({
            let mux = Arc::clone(&mux);
            async move { mux.create_subscription(MonitorRequest::new(["a"])).await }
        });
        settle().await;
        assert_eq!(service.created().len(), 1);
        assert!(!mux.is_idle());

        mux.stop_all();
        gate.notify_one();

        let err = creating.await.unwrap().unwrap_err();
        assert!(matches!(err, CoreError::PushClosed));
        assert_eq!(service.deleted(), vec![MonitorId::new(100).unwrap()]);
        assert_eq!(mux.subscription_count(), 0);
        assert!(mux.is_idle());
    }

    #[tokio::test]
    async fn delete_untracked_is_noop_and_failures_are_swallowed() {
        let service = Arc::new(FakeService::new());
        let (mux, _feed) = start(&service);

        mux.delete_subscription(MonitorId::new(999).unwrap()).await;
        assert!(service.deleted().is_empty());

        let sub = mux.create_subscription(MonitorRequest::new(["a"])).await.unwrap();
        *service.delete_error.lock().unwrap() = Some("gone".into());
        mux.delete_subscription(sub.id).await;
        mux.delete_subscription(sub.id).await;

        assert_eq!(service.deleted(), vec![sub.id]);
        assert!(mux.is_idle());
    }

    #[tokio::test]
    async fn batches_reach_their_callback_in_order() {
        let service = Arc::new(FakeService::new());
        let (mux, feed) = start(&service);
        let a = mux.create_subscription(MonitorRequest::new(["a"])).await.unwrap();
        let b = mux.create_subscription(MonitorRequest::new(["b"])).await.unwrap();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        for id in [a.id, b.id] {
            mux.attach_callback(
                id,
                Arc::new(Recorder {
                    seen: seen.clone(),
                    keep: true,
                }),
            );
        }

        feed.deliver(PushBatch::new(a.id, vec![json!(1)])).await.unwrap();
        feed.deliver(PushBatch::new(b.id, vec![json!(2)])).await.unwrap();
        feed.deliver(PushBatch::new(a.id, vec![json!(3)])).await.unwrap();
        settle().await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (a.id, vec![json!(1)]),
                (b.id, vec![json!(2)]),
                (a.id, vec![json!(3)]),
            ]
        );
    }

    #[tokio::test]
    async fn callback_returning_false_deletes_once_and_reports_idle() {
        let service = Arc::new(FakeService::new());
        let idle_calls = Arc::new(AtomicUsize::new(0));
        let hook: IdleHook = {
            let idle_calls = idle_calls.clone();
            Box::new(move |_: &Multiplexer| {
                idle_calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        let (mux, feed) = start_with_hook(&service, Some(hook));
        let sub = mux.create_subscription(MonitorRequest::new(["CLIEvent/d/s"])).await.unwrap();
        mux.attach_callback(
            sub.id,
            Arc::new(Recorder {
                seen: Arc::default(),
                keep: false,
            }),
        );

        feed.deliver(PushBatch::new(sub.id, vec![json!({})])).await.unwrap();
        feed.deliver(PushBatch::new(sub.id, vec![json!({})])).await.unwrap();
        settle().await;

        assert_eq!(service.deleted(), vec![sub.id]);
        assert_eq!(idle_calls.load(Ordering::SeqCst), 1);
        assert!(mux.is_idle());
    }

    #[tokio::test]
    async fn sweep_deletes_matching_inactive_monitors() {
        let service = Arc::new(FakeService::new());
        *service.listed.lock().unwrap() = vec![
            inactive(1, "DataPoint/dev-1"),
            inactive(2, "DataPoint/dev-2"),
            inactive(3, "devices/dev-1"),
            MonitorMetadata {
                status: Some("ACTIVE".into()),
                ..inactive(4, "DataPoint/dev-1")
            },
        ];
        let (mux, _feed) = start(&service);

        let removed = mux.scan_and_remove_inactive("DataPoint", Some("dev-1")).await;

        assert_eq!(removed, 1);
        assert_eq!(service.deleted(), vec![MonitorId::new(1).unwrap()]);

        let removed = mux.scan_and_remove_inactive("DataPoint", None).await;
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn sweep_listing_failure_removes_nothing() {
        let service = Arc::new(FakeService::new());
        *service.list_error.lock().unwrap() = Some("boom".into());
        let (mux, _feed) = start(&service);

        assert_eq!(mux.scan_and_remove_inactive("DataPoint", None).await, 0);
    }

    #[tokio::test]
    async fn dropping_multiplexer_closes_connection() {
        let service = Arc::new(FakeService::new());
        let (mux, feed) = start(&service);
        drop(mux);
        tokio::time::timeout(Duration::from_secs(1), feed.closed())
            .await
            .unwrap();
    }
}

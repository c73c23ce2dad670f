// ── Monitor registry ──
//
// Process-wide table of session key → multiplexer. Multiplexers are
// created lazily by the first subscription of a session and evicted (and
// stopped) once their last subscription is gone.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, warn};

use cloudmon_api::MonitorId;

use crate::bridge::{BatchCallback, Bridge, BridgeCallback};
use crate::error::CoreError;
use crate::multiplexer::{IdleHook, Multiplexer};
use crate::schema::SubscriptionSpec;
use crate::session::{SessionConnection, SessionConnector, SessionKey};
use crate::sink::NotificationSink;

/// Outcome of a subscription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The session has no device-cloud credentials yet.
    NotReady,
    Active(MonitorId),
    /// Creation failed; carries the text for an error frame.
    Failed(String),
}

/// Cheaply cloneable handle to the session → multiplexer table.
#[derive(Clone)]
pub struct MonitorRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    entries: DashMap<SessionKey, Arc<Multiplexer>>,
    connector: Arc<dyn SessionConnector>,
}

impl RegistryInner {
    /// Evict `mux` if it is still the entry for `session` and has nothing
    /// left to serve.
    fn evict_if_idle(&self, session: &SessionKey, mux: &Multiplexer) {
        let evicted = self.entries.remove_if(session, |_, entry| {
            std::ptr::eq(Arc::as_ptr(entry), mux) && entry.is_idle()
        });
        if let Some((_, mux)) = evicted {
            mux.stop_all();
            info!(%session, "multiplexer evicted");
        }
    }
}

impl std::fmt::Debug for MonitorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorRegistry")
            .field("sessions", &self.inner.entries.len())
            .finish_non_exhaustive()
    }
}

impl MonitorRegistry {
    pub fn new(connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: DashMap::new(),
                connector,
            }),
        }
    }

    fn idle_hook(&self, session: &SessionKey) -> IdleHook {
        let registry = Arc::downgrade(&self.inner);
        let session = session.clone();
        Box::new(move |mux: &Multiplexer| {
            if let Some(registry) = registry.upgrade() {
                registry.evict_if_idle(&session, mux);
            }
        })
    }

    /// The session's multiplexer, built from `factory` when absent.
    ///
    /// Returns `None` without inserting anything when the factory reports
    /// the session is not ready.
    pub fn get_or_create<F>(&self, session: &SessionKey, factory: F) -> Option<Arc<Multiplexer>>
    where
        F: FnOnce() -> Option<SessionConnection>,
    {
        match self.inner.entries.entry(session.clone()) {
            Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let connection = factory()?;
                let mux = Multiplexer::start(
                    session.clone(),
                    connection,
                    Some(self.idle_hook(session)),
                );
                entry.insert(Arc::clone(&mux));
                Some(mux)
            }
        }
    }

    pub fn get(&self, session: &SessionKey) -> Option<Arc<Multiplexer>> {
        self.inner.entries.get(session).map(|e| Arc::clone(e.value()))
    }

    /// Pop the session's multiplexer. The caller stops it.
    pub fn remove(&self, session: &SessionKey) -> Option<Arc<Multiplexer>> {
        self.inner.entries.remove(session).map(|(_, mux)| mux)
    }

    pub fn contains(&self, session: &SessionKey) -> bool {
        self.inner.entries.contains_key(session)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    // ── Subscribe / unsubscribe ──────────────────────────────────

    /// Register a subscription for `session` and wire its records through
    /// `bridge` into `sink`.
    pub async fn subscribe<B: Bridge>(
        &self,
        session: &SessionKey,
        spec: &SubscriptionSpec,
        bridge: B,
        sink: Arc<dyn NotificationSink>,
    ) -> Registration {
        let mut evicted_underneath = false;
        loop {
            let connector = &self.inner.connector;
            let Some(mux) = self.get_or_create(session, || connector.connect(session)) else {
                debug!(%session, kind = B::KIND, "session not ready for subscription");
                return Registration::NotReady;
            };

            if let Some(sweep) = &spec.sweep {
                let removed = mux
                    .scan_and_remove_inactive(&sweep.topic_hint, sweep.device_id.as_deref())
                    .await;
                if removed > 0 {
                    debug!(%session, removed, hint = %sweep.topic_hint, "swept inactive monitors");
                }
            }

            match mux.create_subscription(spec.request.clone()).await {
                Ok(subscription) => {
                    let callback = Arc::new(BridgeCallback::new(bridge, sink));
                    return self.attach_or_discard(session, &mux, subscription.id, callback).await;
                }
                // The multiplexer was evicted between lookup and creation;
                // a fresh one is built on the next pass.
                Err(CoreError::PushClosed) if !evicted_underneath => {
                    evicted_underneath = true;
                }
                Err(e) => {
                    warn!(%session, kind = B::KIND, error = %e, "subscription failed");
                    self.inner.evict_if_idle(session, &mux);
                    return Registration::Failed(e.reason());
                }
            }
        }
    }

    /// Attach `callback` to the freshly created `id`. When the multiplexer
    /// stopped in between, the remote monitor is deleted instead of being
    /// left behind with no listener.
    async fn attach_or_discard(
        &self,
        session: &SessionKey,
        mux: &Arc<Multiplexer>,
        id: MonitorId,
        callback: Arc<dyn BatchCallback>,
    ) -> Registration {
        if mux.attach_callback(id, callback) {
            return Registration::Active(id);
        }
        warn!(%session, monitor_id = %id, "multiplexer stopped before callback attached, deleting monitor");
        if let Err(e) = mux.service().delete_monitor(id).await {
            warn!(%session, monitor_id = %id, error = %e, "failed to delete orphaned monitor");
        }
        self.inner.evict_if_idle(session, mux);
        Registration::Failed(CoreError::PushClosed.reason())
    }

    /// Tear down subscription `id` of `session`; evict the multiplexer when
    /// it was the last one. Idempotent.
    pub async fn unsubscribe(&self, session: &SessionKey, id: MonitorId) {
        let Some(mux) = self.get(session) else {
            debug!(%session, monitor_id = %id, "unsubscribe for unknown session ignored");
            return;
        };
        mux.delete_subscription(id).await;
        self.inner.evict_if_idle(session, &mux);
    }

    /// Stop every multiplexer and empty the table.
    pub fn shutdown(&self) {
        let sessions: Vec<SessionKey> = self.inner.entries.iter().map(|e| e.key().clone()).collect();
        for session in sessions {
            if let Some(mux) = self.remove(&session) {
                mux.stop_all();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use cloudmon_api::PushBatch;

    use super::*;
    use crate::bridge::{CliBridge, DataPointBridge};
    use crate::notification::{CliNotification, Notification};
    use crate::service::MonitorService;
    use crate::service::fake::FakeService;
    use crate::session::ClientDirectory;
    use crate::sink::{NotificationQueue, OverflowPolicy};

    struct Fixture {
        directory: Arc<ClientDirectory>,
        registry: MonitorRegistry,
        service: Arc<FakeService>,
        queue: Arc<NotificationQueue>,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(ClientDirectory::new(8));
        let registry = MonitorRegistry::new(directory.clone());
        let service = Arc::new(FakeService::new());
        let queue = Arc::new(NotificationQueue::new(16, OverflowPolicy::DropOldest));
        Fixture {
            directory,
            registry,
            service,
            queue,
        }
    }

    impl Fixture {
        fn bind(&self, session: &SessionKey) {
            let service: Arc<dyn MonitorService> = self.service.clone();
            self.directory.bind(session.clone(), service);
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn get_or_create_without_credentials_inserts_nothing() {
        let fx = fixture();
        let session = SessionKey::from("anon");

        assert!(fx.registry.get_or_create(&session, || None).is_none());
        assert!(fx.registry.is_empty());
    }

    #[tokio::test]
    async fn get_or_create_reuses_entry() {
        let fx = fixture();
        let session = SessionKey::from("s1");
        fx.bind(&session);

        let connector = fx.directory.clone();
        let first = fx.registry.get_or_create(&session, || connector.connect(&session)).unwrap();
        let second = fx
            .registry
            .get_or_create(&session, || panic!("factory must not run for an existing entry"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let removed = fx.registry.remove(&session).unwrap();
        assert!(Arc::ptr_eq(&first, &removed));
        assert!(fx.registry.is_empty());
    }

    #[tokio::test]
    async fn subscribe_unbound_session_is_not_ready() {
        let fx = fixture();
        let registration = fx
            .registry
            .subscribe(
                &"nobody".into(),
                &SubscriptionSpec::device("dev-1"),
                DataPointBridge,
                fx.queue.clone(),
            )
            .await;

        assert_eq!(registration, Registration::NotReady);
        assert!(fx.registry.is_empty());
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_evicts_session() {
        let fx = fixture();
        let session = SessionKey::from("s1");
        fx.bind(&session);

        let Registration::Active(a) = fx
            .registry
            .subscribe(&session, &SubscriptionSpec::device("dev-1"), DataPointBridge, fx.queue.clone())
            .await
        else {
            panic!("expected an active registration");
        };
        let Registration::Active(b) = fx
            .registry
            .subscribe(&session, &SubscriptionSpec::data_points("dev-1", &Default::default()), DataPointBridge, fx.queue.clone())
            .await
        else {
            panic!("expected an active registration");
        };
        assert_eq!(fx.registry.len(), 1);
        assert_eq!(fx.registry.get(&session).unwrap().subscription_count(), 2);

        fx.registry.unsubscribe(&session, a).await;
        assert!(fx.registry.contains(&session));

        let mux = fx.registry.get(&session).unwrap();
        fx.registry.unsubscribe(&session, b).await;
        fx.registry.unsubscribe(&session, b).await;

        assert!(!fx.registry.contains(&session));
        assert!(mux.is_stopped());
        assert_eq!(fx.service.deleted(), vec![a, b]);
    }

    #[tokio::test]
    async fn failed_creation_reports_embedded_error_and_evicts() {
        let fx = fixture();
        let session = SessionKey::from("s1");
        fx.bind(&session);
        fx.service.fail_next_create("Invalid topic");

        let registration = fx
            .registry
            .subscribe(&session, &SubscriptionSpec::device("dev-1"), DataPointBridge, fx.queue.clone())
            .await;

        assert_eq!(registration, Registration::Failed("Invalid topic".into()));
        assert!(fx.registry.is_empty());
    }

    #[tokio::test]
    async fn cli_terminate_unsubscribes_exactly_once() {
        let fx = fixture();
        let session = SessionKey::from("s1");
        fx.bind(&session);

        let Registration::Active(id) = fx
            .registry
            .subscribe(&session, &SubscriptionSpec::cli("dev-1", "abc"), CliBridge, fx.queue.clone())
            .await
        else {
            panic!("expected an active registration");
        };

        let router = fx.directory.router();
        router
            .route(&session, PushBatch::new(id, vec![json!({"type": "data", "data": "hi"})]))
            .await
            .unwrap();
        router
            .route(&session, PushBatch::new(id, vec![json!({"session_id": "abc", "type": "terminate"})]))
            .await
            .unwrap();
        settle().await;

        assert_eq!(fx.service.deleted(), vec![id]);
        assert!(!fx.registry.contains(&session));
        assert_eq!(
            fx.queue.drain(),
            vec![
                Notification::Cli(CliNotification::Data { data: "hi".into() }),
                Notification::Cli(CliNotification::Terminate {
                    session_id: "abc".into(),
                    error: None,
                }),
            ]
        );

        // The consumer closing afterwards must not delete again.
        fx.registry.unsubscribe(&session, id).await;
        assert_eq!(fx.service.deleted(), vec![id]);
    }

    #[tokio::test]
    async fn subscribe_sweeps_before_creating() {
        let fx = fixture();
        let session = SessionKey::from("s1");
        fx.bind(&session);
        *fx.service.listed.lock().unwrap() = vec![cloudmon_api::MonitorMetadata {
            id: 3,
            topic: "devices/dev-1".into(),
            transport_type: Some("tcp".into()),
            status: Some("INACTIVE".into()),
            batch_size: None,
            batch_duration: None,
            format_type: None,
            compression: None,
            last_connect: None,
        }];

        let registration = fx
            .registry
            .subscribe(&session, &SubscriptionSpec::device("dev-1"), DataPointBridge, fx.queue.clone())
            .await;

        assert!(matches!(registration, Registration::Active(_)));
        assert_eq!(fx.service.deleted(), vec![MonitorId::new(3).unwrap()]);
    }

    #[tokio::test]
    async fn shutdown_stops_everything() {
        let fx = fixture();
        for key in ["a", "b"] {
            let session = SessionKey::from(key);
            fx.bind(&session);
            fx.registry
                .subscribe(&session, &SubscriptionSpec::alerts(), DataPointBridge, fx.queue.clone())
                .await;
        }
        let mux = fx.registry.get(&"a".into()).unwrap();

        fx.registry.shutdown();

        assert!(fx.registry.is_empty());
        assert!(mux.is_stopped());
    }

    #[tokio::test]
    async fn creation_in_flight_keeps_multiplexer_registered() {
        let fx = fixture();
        let session = SessionKey::from("s1");
        fx.bind(&session);
        let gate = fx.service.gate_creation();

        let subscribing = tokio::spawn({
            let registry = fx.registry.clone();
            let session = session.clone();
            let sink: Arc<dyn NotificationSink> = fx.queue.clone();
            async move {
                registry
                    .subscribe(&session, &SubscriptionSpec::device("dev-1"), DataPointBridge, sink)
                    .await
            }
        });
        settle().await;
        assert_eq!(fx.service.created().len(), 1);

        // Another socket on the same session closes while creation is pending.
        fx.registry.unsubscribe(&session, MonitorId::new(999).unwrap()).await;
        assert!(fx.registry.contains(&session));

        gate.notify_one();
        let Registration::Active(id) = subscribing.await.unwrap() else {
            panic!("expected an active registration");
        };
        let mux = fx.registry.get(&session).unwrap();
        assert!(!mux.is_stopped());
        assert_eq!(mux.subscription_ids(), vec![id]);
    }

    #[tokio::test]
    async fn attach_after_stop_deletes_remote_monitor() {
        let fx = fixture();
        let session = SessionKey::from("s1");
        fx.bind(&session);
        let connector = fx.directory.clone();
        let mux = fx.registry.get_or_create(&session, || connector.connect(&session)).unwrap();
        let sub = mux
            .create_subscription(cloudmon_api::MonitorRequest::new(["devices/dev-1"]))
            .await
            .unwrap();

        mux.stop_all();
        let callback = Arc::new(BridgeCallback::new(DataPointBridge, fx.queue.clone()));
        let registration = fx.registry.attach_or_discard(&session, &mux, sub.id, callback).await;

        assert_eq!(registration, Registration::Failed(CoreError::PushClosed.reason()));
        assert_eq!(fx.service.deleted(), vec![sub.id]);
        assert!(!fx.registry.contains(&session));
    }
}

// ── Socket-side consumer ──
//
// One `MonitorConsumer` per browser socket. It registers a single
// subscription through the registry, retrying while the session is still
// being authenticated, and tears it down when the socket closes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use cloudmon_api::MonitorId;

use crate::bridge::Bridge;
use crate::config::MonitorSettings;
use crate::notification::Notification;
use crate::registry::{MonitorRegistry, Registration};
use crate::schema::SubscriptionSpec;
use crate::session::SessionKey;
use crate::sink::NotificationSink;

const NOT_READY_REASON: &str = "device cloud session not ready";

/// How often and how patiently to retry a "not ready" registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first.
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&MonitorSettings::default())
    }
}

impl From<&MonitorSettings> for RetryPolicy {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            retries: settings.registration_retries,
            delay: settings.registration_delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Active(MonitorId),
    Failed(String),
}

pub struct MonitorConsumer {
    registry: MonitorRegistry,
    session: SessionKey,
    sink: Arc<dyn NotificationSink>,
    retry: RetryPolicy,
    state: ConsumerState,
}

impl std::fmt::Debug for MonitorConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorConsumer")
            .field("session", &self.session)
            .field("retry", &self.retry)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl MonitorConsumer {
    pub fn new(
        registry: MonitorRegistry,
        session: SessionKey,
        sink: Arc<dyn NotificationSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            session,
            sink,
            retry,
            state: ConsumerState::Idle,
        }
    }

    pub fn state(&self) -> &ConsumerState {
        &self.state
    }

    pub fn monitor_id(&self) -> Option<MonitorId> {
        match self.state {
            ConsumerState::Active(id) => Some(id),
            _ => None,
        }
    }

    /// Register `spec`, retrying while the session is not ready.
    ///
    /// A no-op when already active. On failure an error frame goes to the
    /// sink and the consumer ends up `Failed`.
    pub async fn activate<B>(&mut self, spec: &SubscriptionSpec, bridge: B) -> &ConsumerState
    where
        B: Bridge + Clone,
    {
        if matches!(self.state, ConsumerState::Active(_)) {
            return &self.state;
        }

        let mut attempt: u32 = 0;
        self.state = loop {
            attempt += 1;
            let registration = self
                .registry
                .subscribe(&self.session, spec, bridge.clone(), Arc::clone(&self.sink))
                .await;

            match registration {
                Registration::Active(id) => {
                    info!(session = %self.session, kind = B::KIND, monitor_id = %id, attempt, "monitor registered");
                    break ConsumerState::Active(id);
                }
                Registration::Failed(reason) => {
                    warn!(session = %self.session, kind = B::KIND, %reason, "monitor registration failed");
                    self.sink.send(Notification::registration_error(B::KIND, &reason));
                    break ConsumerState::Failed(reason);
                }
                Registration::NotReady if attempt <= self.retry.retries => {
                    debug!(session = %self.session, kind = B::KIND, attempt, "session not ready, retrying");
                    tokio::time::sleep(self.retry.delay).await;
                }
                Registration::NotReady => {
                    warn!(session = %self.session, kind = B::KIND, attempts = attempt, "giving up on monitor registration");
                    self.sink
                        .send(Notification::registration_error(B::KIND, NOT_READY_REASON));
                    break ConsumerState::Failed(NOT_READY_REASON.to_owned());
                }
            }
        };
        &self.state
    }

    /// Unsubscribe the active monitor, if any. Safe to call more than once.
    pub async fn close(&mut self) {
        if let ConsumerState::Active(id) = std::mem::replace(&mut self.state, ConsumerState::Idle) {
            self.registry.unsubscribe(&self.session, id).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::bridge::DeviceBridge;
    use crate::notification::ErrorFrame;
    use crate::service::fake::FakeService;
    use crate::session::{ClientDirectory, SessionConnection, SessionConnector};
    use crate::sink::{NotificationQueue, OverflowPolicy};

    /// Reports "not ready" for the first `not_ready` connects.
    struct WarmingUp {
        directory: ClientDirectory,
        not_ready: u32,
        attempts: AtomicU32,
    }

    impl SessionConnector for WarmingUp {
        fn connect(&self, session: &SessionKey) -> Option<SessionConnection> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.not_ready {
                return None;
            }
            self.directory.connect(session)
        }
    }

    struct Fixture {
        connector: Arc<WarmingUp>,
        service: Arc<FakeService>,
        queue: Arc<NotificationQueue>,
        consumer: MonitorConsumer,
    }

    fn fixture(not_ready: u32) -> Fixture {
        let session = SessionKey::from("browser");
        let service = Arc::new(FakeService::new());
        let directory = ClientDirectory::new(8);
        directory.bind(session.clone(), service.clone());
        let connector = Arc::new(WarmingUp {
            directory,
            not_ready,
            attempts: AtomicU32::new(0),
        });
        let registry = MonitorRegistry::new(connector.clone());
        let queue = Arc::new(NotificationQueue::new(8, OverflowPolicy::DropOldest));
        let consumer = MonitorConsumer::new(registry, session, queue.clone(), RetryPolicy::default());
        Fixture {
            connector,
            service,
            queue,
            consumer,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_fifth_attempt() {
        let mut fx = fixture(4);
        let started = tokio::time::Instant::now();

        let state = fx
            .consumer
            .activate(&SubscriptionSpec::device("dev-1"), DeviceBridge)
            .await
            .clone();

        assert!(matches!(state, ConsumerState::Active(_)));
        assert_eq!(fx.connector.attempts.load(Ordering::SeqCst), 5);
        assert_eq!(started.elapsed(), Duration::from_millis(800));
        assert!(fx.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn six_not_ready_answers_send_error_frame() {
        let mut fx = fixture(u32::MAX);

        let state = fx
            .consumer
            .activate(&SubscriptionSpec::cli("dev-1", "s"), crate::bridge::CliBridge)
            .await
            .clone();

        assert_eq!(state, ConsumerState::Failed(NOT_READY_REASON.into()));
        assert_eq!(fx.connector.attempts.load(Ordering::SeqCst), 6);
        assert_eq!(
            fx.queue.drain(),
            vec![Notification::Error(ErrorFrame {
                error: "ERROR: could not register CLI monitor - device cloud session not ready"
                    .into(),
            })]
        );
    }

    #[tokio::test]
    async fn creation_failure_sends_reason() {
        let mut fx = fixture(0);
        fx.service.fail_next_create("Invalid topic");

        let state = fx
            .consumer
            .activate(&SubscriptionSpec::device("dev-1"), DeviceBridge)
            .await
            .clone();

        assert_eq!(state, ConsumerState::Failed("Invalid topic".into()));
        assert_eq!(
            fx.queue.drain(),
            vec![Notification::registration_error("device", "Invalid topic")]
        );
    }

    #[tokio::test]
    async fn data_point_failure_names_the_monitor_kind() {
        let mut fx = fixture(0);
        fx.service.fail_next_create("Invalid topic");
        let spec = SubscriptionSpec::data_points("dev-1", &MonitorSettings::default());

        fx.consumer.activate(&spec, crate::bridge::DataPointBridge).await;

        assert_eq!(
            fx.queue.drain(),
            vec![Notification::Error(ErrorFrame {
                error: "ERROR: could not register data point monitor - Invalid topic".into(),
            })]
        );
    }

    #[tokio::test]
    async fn activate_twice_and_close_twice() {
        let mut fx = fixture(0);
        let spec = SubscriptionSpec::device("dev-1");

        fx.consumer.activate(&spec, DeviceBridge).await;
        let id = fx.consumer.monitor_id().unwrap();
        fx.consumer.activate(&spec, DeviceBridge).await;
        assert_eq!(fx.service.created().len(), 1);

        fx.consumer.close().await;
        fx.consumer.close().await;

        assert_eq!(fx.service.deleted(), vec![id]);
        assert_eq!(fx.consumer.state(), &ConsumerState::Idle);
    }
}

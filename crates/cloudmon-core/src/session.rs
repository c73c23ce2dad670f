// ── Sessions and their device-cloud connections ──
//
// A browser session is identified by an opaque key. The hosting
// application binds each authenticated session to a device-cloud client;
// the registry asks a `SessionConnector` for that client plus a fresh push
// connection when it first needs a multiplexer for the session.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use cloudmon_api::{PushBatch, PushConnection, PushFeed, push_channel};

use crate::error::CoreError;
use crate::service::MonitorService;

/// Opaque browser-session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for SessionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Everything a multiplexer needs to run: the service handle and the
/// push connection it dispatches from.
pub struct SessionConnection {
    pub service: Arc<dyn MonitorService>,
    pub push: PushConnection,
}

impl fmt::Debug for SessionConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConnection")
            .field("push", &self.push)
            .finish_non_exhaustive()
    }
}

/// Source of per-session connections.
pub trait SessionConnector: Send + Sync {
    /// Open a connection for `session`, or `None` when the session has no
    /// device-cloud credentials yet.
    fn connect(&self, session: &SessionKey) -> Option<SessionConnection>;
}

// ── PushRouter ───────────────────────────────────────────────────

/// Keeps the producing side of every open push connection reachable by
/// session, for the push transport adapter.
#[derive(Debug, Clone, Default)]
pub struct PushRouter {
    feeds: Arc<DashMap<SessionKey, PushFeed>>,
}

impl PushRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh connection for `session`, replacing any previous feed.
    /// Feeds whose connection has since closed are dropped on the way.
    pub fn open(&self, session: &SessionKey, capacity: usize) -> PushConnection {
        self.prune();
        let (feed, connection) = push_channel(capacity);
        self.feeds.insert(session.clone(), feed);
        connection
    }

    /// The session's feed while its connection is open. A closed feed is
    /// forgotten.
    pub fn feed(&self, session: &SessionKey) -> Option<PushFeed> {
        let feed = self.feeds.get(session).map(|feed| feed.clone())?;
        if feed.is_closed() {
            if self.feeds.remove_if(session, |_, stored| stored.is_closed()).is_some() {
                debug!(%session, "dropped closed push feed");
            }
            return None;
        }
        Some(feed)
    }

    /// Drop every feed whose connection is closed. Returns how many went.
    pub fn prune(&self) -> usize {
        let before = self.feeds.len();
        self.feeds.retain(|_, feed| !feed.is_closed());
        before.saturating_sub(self.feeds.len())
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Deliver a batch to the session's open connection.
    pub async fn route(&self, session: &SessionKey, batch: PushBatch) -> Result<(), CoreError> {
        let feed = self.feed(session).ok_or(CoreError::PushClosed)?;
        Ok(feed.deliver(batch).await?)
    }

    pub fn discard(&self, session: &SessionKey) {
        self.feeds.remove(session);
    }
}

// ── ClientDirectory ──────────────────────────────────────────────

/// Built-in `SessionConnector`: an explicit session → service table.
pub struct ClientDirectory {
    services: DashMap<SessionKey, Arc<dyn MonitorService>>,
    router: PushRouter,
    push_capacity: usize,
}

impl ClientDirectory {
    pub fn new(push_capacity: usize) -> Self {
        Self {
            services: DashMap::new(),
            router: PushRouter::new(),
            push_capacity,
        }
    }

    /// Associate an authenticated session with its device-cloud service.
    pub fn bind(&self, session: SessionKey, service: Arc<dyn MonitorService>) {
        debug!(%session, "session bound to device cloud");
        self.services.insert(session, service);
    }

    /// Forget a session (logout). Returns whether it was bound.
    pub fn unbind(&self, session: &SessionKey) -> bool {
        self.router.discard(session);
        self.services.remove(session).is_some()
    }

    pub fn is_bound(&self, session: &SessionKey) -> bool {
        self.services.contains_key(session)
    }

    pub fn router(&self) -> &PushRouter {
        &self.router
    }
}

impl SessionConnector for ClientDirectory {
    fn connect(&self, session: &SessionKey) -> Option<SessionConnection> {
        let service = self.services.get(session).map(|s| Arc::clone(s.value()))?;
        let push = self.router.open(session, self.push_capacity);
        Some(SessionConnection { service, push })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use cloudmon_api::MonitorId;

    use super::*;
    use crate::service::fake::FakeService;

    #[test]
    fn unbound_session_is_not_ready() {
        let directory = ClientDirectory::new(4);
        assert!(directory.connect(&"nobody".into()).is_none());
    }

    #[tokio::test]
    async fn router_reaches_connected_session() {
        let directory = ClientDirectory::new(4);
        let session = SessionKey::from("browser-1");
        directory.bind(session.clone(), Arc::new(FakeService::new()));

        let mut connection = directory.connect(&session).unwrap();
        let id = MonitorId::new(5).unwrap();
        directory
            .router()
            .route(&session, PushBatch::new(id, vec![json!({"x": 1})]))
            .await
            .unwrap();

        let batch = connection.push.next_batch().await.unwrap();
        assert_eq!(batch.monitor_id, id);
    }

    #[tokio::test]
    async fn closed_connection_is_not_routable() {
        let directory = ClientDirectory::new(4);
        let session = SessionKey::from("browser-2");
        directory.bind(session.clone(), Arc::new(FakeService::new()));

        let connection = directory.connect(&session).unwrap();
        connection.push.close();

        let id = MonitorId::new(5).unwrap();
        let err = directory
            .router()
            .route(&session, PushBatch::new(id, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PushClosed));
        assert!(directory.router().is_empty());

        assert!(directory.unbind(&session));
        assert!(!directory.is_bound(&session));
    }

    #[tokio::test]
    async fn opening_a_connection_drops_closed_feeds() {
        let directory = ClientDirectory::new(4);
        for key in ["gone", "live"] {
            directory.bind(key.into(), Arc::new(FakeService::new()));
        }

        let gone = directory.connect(&"gone".into()).unwrap();
        assert_eq!(directory.router().len(), 1);
        drop(gone);

        let _live = directory.connect(&"live".into()).unwrap();
        assert_eq!(directory.router().len(), 1);
        assert!(directory.router().feed(&"gone".into()).is_none());
        assert!(directory.router().feed(&"live".into()).is_some());
    }
}

use futures_util::future::{self, BoxFuture, FutureExt};
use serde::Deserialize;

use super::{BatchContext, Bridge, Translation};
use crate::notification::{CliNotification, Notification};

/// One record rendered by the CLI event schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CliEvent {
    Start,
    Data {
        data: String,
    },
    Terminate {
        #[serde(default)]
        session_id: String,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Remote CLI session output. A `terminate` event ends the subscription.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliBridge;

impl Bridge for CliBridge {
    type Record = CliEvent;
    const KIND: &'static str = "CLI";

    fn translate<'a>(&'a self, _cx: &'a BatchContext, record: CliEvent) -> BoxFuture<'a, Translation> {
        let translation = match record {
            CliEvent::Start => Translation::emit(Notification::Cli(CliNotification::Start)),
            CliEvent::Data { data } => {
                Translation::emit(Notification::Cli(CliNotification::Data { data }))
            }
            CliEvent::Terminate { session_id, error } => {
                Translation::finish(Notification::Cli(CliNotification::Terminate {
                    session_id,
                    error,
                }))
            }
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

    #[tokio::test]
    async fn session_output_keeps_listening() {
        let (keep, sent) = run(
            CliBridge,
            Arc::new(FakeService::new()),
            vec![
                json!({"type": "start"}),
                json!({"data": "root@ccmp25:~# ", "type": "data"}),
                json!({"type": "unknown"}),
            ],
        )
        .await;

        assert!(keep);
        assert_eq!(
            sent,
            vec![
                Notification::Cli(CliNotification::Start),
                Notification::Cli(CliNotification::Data {
                    data: "root@ccmp25:~# ".into()
                }),
            ]
        );
    }

    #[tokio::test]
    async fn terminate_ends_subscription_with_or_without_error() {
        let (keep, sent) = run(
            CliBridge,
            Arc::new(FakeService::new()),
            vec![json!({"session_id": "abc", "type": "terminate"})],
        )
        .await;
        assert!(!keep);
        assert_eq!(
            sent,
            vec![Notification::Cli(CliNotification::Terminate {
                session_id: "abc".into(),
                error: None,
            })]
        );

        let (keep, sent) = run(
            CliBridge,
            Arc::new(FakeService::new()),
            vec![json!({
                "session_id": "abc",
                "error": "Idle Timeout Exceeded",
                "type": "terminate"
            })],
        )
        .await;
        assert!(!keep);
        assert_eq!(sent.len(), 1);
    }
}

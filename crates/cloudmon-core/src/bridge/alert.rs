use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{BatchContext, Bridge, Translation};
use crate::notification::Notification;

const STATUS_FIRED: i64 = 1;
const STATUS_CLEARED: i64 = 0;

/// A raw `AlarmStatus` push document.
#[derive(Debug, Clone, Deserialize)]
pub struct AlarmStatusRecord {
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
    #[serde(rename = "AlarmStatus")]
    alarm_status: AlarmStatus,
}

#[derive(Debug, Clone, Deserialize)]
struct AlarmStatus {
    id: AlarmStatusId,
    #[serde(rename = "almsStatus")]
    status: i64,
    #[serde(rename = "almsUpdateTime", default)]
    update_time: Value,
    #[serde(rename = "devConnectwareId", default)]
    device_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlarmStatusId {
    #[serde(rename = "almId")]
    alarm_id: u64,
    #[serde(rename = "almsSourceEntityId")]
    source_entity_id: String,
}

/// Tank level alerts for one installation.
///
/// Only alarms raised on a tank's `level` stream are considered. A fired
/// alarm is confirmed against the alert summary before it is forwarded; an
/// alarm whose definition is gone is forwarded as cleared so the dashboard
/// drops it.
#[derive(Debug, Clone)]
pub struct AlertBridge {
    alert_name: String,
}

impl AlertBridge {
    pub fn new(installation: &str) -> Self {
        Self {
            alert_name: format!("tank_level_{installation}"),
        }
    }
}

impl Bridge for AlertBridge {
    type Record = AlarmStatusRecord;
    const KIND: &'static str = "alert";

    fn translate<'a>(
        &'a self,
        cx: &'a BatchContext,
        record: AlarmStatusRecord,
    ) -> BoxFuture<'a, Translation> {
        Box::pin(async move {
            let alarm = record.document.msg.alarm_status;
            let Some(tank_id) = alarm.device_id else {
                return Translation::skip();
            };
            if alarm.id.source_entity_id != format!("{tank_id}/level") {
                return Translation::skip();
            }

            let alarm_id = alarm.id.alarm_id;
            let notification = |status| Notification::Alert {
                id: alarm_id,
                tank_id: tank_id.clone(),
                status,
                last_update: alarm.update_time.clone(),
            };

            if alarm.status != STATUS_FIRED {
                return Translation::emit(notification(alarm.status));
            }

            match cx.service.alert_details(alarm_id, &tank_id).await {
                Err(e) => {
                    warn!(alarm_id, %tank_id, error = %e, "alert lookup failed, skipping alarm");
                    Translation::skip()
                }
                Ok(None) => Translation::emit(notification(STATUS_CLEARED)),
                Ok(Some(alert))
                    if alert.device_id.as_deref() == Some(tank_id.as_str())
                        && alert.name == self.alert_name =>
                {
                    Translation::emit(notification(STATUS_FIRED))
                }
                Ok(Some(_)) => Translation::skip(),
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use cloudmon_api::AlertSummary;

    use super::*;
    use crate::bridge::testing::run;
    use crate::service::fake::FakeService;

    fn alarm(id: u64, source: &str, status: i64, device: Option<&str>) -> Value {
        let mut status_doc = json!({
            "id": {"almId": id, "almsSourceEntityId": source},
            "almsStatus": status,
            "almsUpdateTime": "2024-05-01T10:00:00.000Z",
        });
        if let Some(device) = device {
            status_doc["devConnectwareId"] = json!(device);
        }
        json!({"Document": {"Msg": {"AlarmStatus": status_doc}}})
    }

    fn summary(id: u64, device: &str, name: &str) -> AlertSummary {
        AlertSummary {
            id,
            device_id: Some(device.into()),
            name: name.into(),
            status: "fired".into(),
            description: String::new(),
            last_update: None,
        }
    }

    fn expected(id: u64, status: i64) -> Notification {
        Notification::Alert {
            id,
            tank_id: "tank-1".into(),
            status,
            last_update: json!("2024-05-01T10:00:00.000Z"),
        }
    }

    #[tokio::test]
    async fn fired_alert_without_definition_is_cleared() {
        let service = Arc::new(FakeService::new());
        let (keep, sent) = run(
            AlertBridge::new("north"),
            service,
            vec![alarm(5, "tank-1/level", 1, Some("tank-1"))],
        )
        .await;

        assert!(keep);
        assert_eq!(sent, vec![expected(5, 0)]);
    }

    #[tokio::test]
    async fn fired_alert_of_this_installation_is_forwarded() {
        let service = Arc::new(FakeService::new());
        service
            .alerts
            .lock()
            .unwrap()
            .insert(5, Ok(Some(summary(5, "tank-1", "tank_level_north"))));
        service
            .alerts
            .lock()
            .unwrap()
            .insert(6, Ok(Some(summary(6, "tank-1", "tank_level_south"))));

        let (_, sent) = run(
            AlertBridge::new("north"),
            service,
            vec![
                alarm(5, "tank-1/level", 1, Some("tank-1")),
                alarm(6, "tank-1/level", 1, Some("tank-1")),
            ],
        )
        .await;

        assert_eq!(sent, vec![expected(5, 1)]);
    }

    #[tokio::test]
    async fn lookup_failure_skips_alarm() {
        let service = Arc::new(FakeService::new());
        service
            .alerts
            .lock()
            .unwrap()
            .insert(5, Err("service unavailable".into()));

        let (keep, sent) = run(
            AlertBridge::new("north"),
            service,
            vec![alarm(5, "tank-1/level", 1, Some("tank-1"))],
        )
        .await;

        assert!(keep);
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn cleared_alert_is_forwarded_and_foreign_sources_ignored() {
        let (_, sent) = run(
            AlertBridge::new("north"),
            Arc::new(FakeService::new()),
            vec![
                alarm(5, "tank-1/level", 0, Some("tank-1")),
                alarm(7, "tank-1/temperature", 0, Some("tank-1")),
                alarm(8, "tank-1/level", 0, None),
            ],
        )
        .await;

        assert_eq!(sent, vec![expected(5, 0)]);
    }
}

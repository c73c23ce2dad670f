// ── Outbound notification shapes ──
//
// Everything a browser socket can receive. Each variant serializes to the
// exact JSON object the dashboards expect.

use serde::Serialize;
use serde_json::Value;

/// A message bound for a notification sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Notification {
    /// `{"stream": …, "value": …}`, forwarded as pushed.
    DataPoint(Value),
    /// `{"device": …, "value": …}`
    Valve { device: String, value: Value },
    /// `{"type": "start" | "data" | "terminate", …}`
    Cli(CliNotification),
    /// `{"device_id": …, "status": …}`
    Device { device_id: String, status: String },
    /// `{"id": …, "tank_id": …, "status": …, "last_update": …}`
    Alert {
        id: u64,
        tank_id: String,
        status: i64,
        last_update: Value,
    },
    /// `{"progress": n}`
    Progress { progress: u8 },
    /// `{"type": "error", "error": …}`
    Error(ErrorFrame),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CliNotification {
    Start,
    Data {
        data: String,
    },
    Terminate {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "error")]
pub struct ErrorFrame {
    pub error: String,
}

impl Notification {
    /// Error frame for a subscription that could not be registered.
    pub fn registration_error(kind: &str, reason: &str) -> Self {
        Self::Error(ErrorFrame {
            error: format!("ERROR: could not register {kind} monitor - {reason}"),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn as_value(n: &Notification) -> Value {
        serde_json::to_value(n).unwrap()
    }

    #[test]
    fn cli_frames() {
        assert_eq!(
            as_value(&Notification::Cli(CliNotification::Start)),
            json!({"type": "start"})
        );
        assert_eq!(
            as_value(&Notification::Cli(CliNotification::Data { data: "ls\n".into() })),
            json!({"type": "data", "data": "ls\n"})
        );
        assert_eq!(
            as_value(&Notification::Cli(CliNotification::Terminate {
                session_id: "s1".into(),
                error: None,
            })),
            json!({"type": "terminate", "session_id": "s1"})
        );
    }

    #[test]
    fn error_frame_shape() {
        let frame = Notification::registration_error("CLI", "device cloud session not ready");
        assert_eq!(
            as_value(&frame),
            json!({
                "type": "error",
                "error": "ERROR: could not register CLI monitor - device cloud session not ready"
            })
        );
    }

    #[test]
    fn alert_and_progress_shapes() {
        let alert = Notification::Alert {
            id: 9,
            tank_id: "tank-1".into(),
            status: 0,
            last_update: json!("2024-05-01T10:00:00Z"),
        };
        assert_eq!(
            as_value(&alert),
            json!({"id": 9, "tank_id": "tank-1", "status": 0, "last_update": "2024-05-01T10:00:00Z"})
        );
        assert_eq!(
            Notification::Progress { progress: 42 }.to_json().unwrap(),
            r#"{"progress":42}"#
        );
    }
}

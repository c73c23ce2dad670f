// Monitor endpoints
//
// Push monitors are created, listed, and deleted through `/ws/Monitor`.
// Every monitor this crate creates uses the TCP push transport; the
// transport framing itself lives outside this crate (see `push`).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use tracing::debug;

use crate::client::DeviceCloudClient;
use crate::error::Error;
use crate::xml::{self, MonitorDocument};

const MONITOR_PATH: &str = "/ws/Monitor";
const TRANSPORT_TCP: &str = "tcp";
const SCHEMA_TYPE_HANDLEBARS: &str = "handlebars";

// ── Identifiers ─────────────────────────────────────────────────────

/// Device-cloud monitor id. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(u64);

impl MonitorId {
    /// Wrap a raw id. Returns `None` for zero, which the device cloud never assigns.
    pub fn new(raw: u64) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A string that is not a positive integer monitor id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid monitor id: {0:?}")]
pub struct InvalidMonitorId(pub String);

impl FromStr for MonitorId {
    type Err = InvalidMonitorId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| InvalidMonitorId(s.to_owned()))
    }
}

// ── Request ─────────────────────────────────────────────────────────

/// Push payload compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Compression {
    #[default]
    Gzip,
    #[strum(serialize = "none")]
    Uncompressed,
}

/// Push payload encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FormatType {
    #[default]
    Json,
    Xml,
}

/// Parameters for a new TCP push monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorRequest {
    pub topics: Vec<String>,
    /// Handlebars template applied to each pushed record.
    pub schema: Option<String>,
    pub batch_size: u32,
    pub batch_duration: Duration,
    pub compression: Compression,
    pub format: FormatType,
}

impl MonitorRequest {
    /// A request with one-record batches, no batching delay, gzip, and JSON.
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            schema: None,
            batch_size: 1,
            batch_duration: Duration::ZERO,
            compression: Compression::default(),
            format: FormatType::default(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_batch(mut self, size: u32, duration: Duration) -> Self {
        self.batch_size = size;
        self.batch_duration = duration;
        self
    }

    /// Comma-joined topic string, as stored in `monTopic`.
    pub fn topic_string(&self) -> String {
        self.topics.join(",")
    }

    pub(crate) fn to_xml(&self) -> Result<String, Error> {
        let topic = self.topic_string();
        MonitorDocument {
            topic: &topic,
            batch_size: self.batch_size,
            batch_duration: self.batch_duration.as_secs(),
            format_type: self.format.as_ref(),
            transport_type: TRANSPORT_TCP,
            compression: self.compression.as_ref(),
            schema_type: self.schema.as_ref().map(|_| SCHEMA_TYPE_HANDLEBARS),
            schema_data: self.schema.as_deref(),
        }
        .to_xml()
    }
}

// ── Metadata ────────────────────────────────────────────────────────

/// Monitor state as reported by the device cloud.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum MonitorStatus {
    Active,
    Inactive,
    Connecting,
    Disabled,
    Suspended,
    #[strum(default)]
    Other(String),
}

/// One entry of `GET /ws/Monitor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorMetadata {
    #[serde(rename = "monId")]
    pub id: u64,
    #[serde(rename = "monTopic", default)]
    pub topic: String,
    #[serde(rename = "monTransportType", default)]
    pub transport_type: Option<String>,
    #[serde(rename = "monStatus", default)]
    pub status: Option<String>,
    #[serde(rename = "monBatchSize", default)]
    pub batch_size: Option<u32>,
    #[serde(rename = "monBatchDuration", default)]
    pub batch_duration: Option<u64>,
    #[serde(rename = "monFormatType", default)]
    pub format_type: Option<String>,
    #[serde(rename = "monCompression", default)]
    pub compression: Option<String>,
    #[serde(rename = "monLastConnect", default)]
    pub last_connect: Option<String>,
}

impl MonitorMetadata {
    pub fn monitor_id(&self) -> Option<MonitorId> {
        MonitorId::new(self.id)
    }

    pub fn status(&self) -> MonitorStatus {
        self.status
            .as_deref()
            .map_or(MonitorStatus::Other(String::new()), |raw| {
                raw.parse().unwrap_or_else(|_| MonitorStatus::Other(raw.to_owned()))
            })
    }

    pub fn is_tcp(&self) -> bool {
        self.transport_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(TRANSPORT_TCP))
    }

    /// Whether the topic string names `hint` and, when given, `device_id`.
    pub fn topic_matches(&self, hint: &str, device_id: Option<&str>) -> bool {
        self.topic.contains(hint) && device_id.is_none_or(|device| self.topic.contains(device))
    }
}

// ── Query ───────────────────────────────────────────────────────────

/// Filter for `GET /ws/Monitor`, rendered into the `condition` parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorQuery {
    pub transport_type: Option<String>,
    pub status: Option<String>,
}

impl MonitorQuery {
    /// TCP monitors the device cloud marks as `INACTIVE`.
    pub fn inactive_tcp() -> Self {
        Self {
            transport_type: Some(TRANSPORT_TCP.into()),
            status: Some("INACTIVE".into()),
        }
    }

    /// The `condition` expression, or `None` when the query is unfiltered.
    pub fn condition(&self) -> Option<String> {
        let clauses: Vec<String> = [
            self.transport_type
                .as_ref()
                .map(|t| format!("monTransportType='{t}'")),
            self.status.as_ref().map(|s| format!("monStatus='{s}'")),
        ]
        .into_iter()
        .flatten()
        .collect();
        (!clauses.is_empty()).then(|| clauses.join(" and "))
    }

    /// Client-side check, applied on top of the server-side condition.
    pub fn matches(&self, monitor: &MonitorMetadata) -> bool {
        let field_matches = |want: Option<&String>, have: Option<&String>| {
            want.is_none_or(|w| have.is_some_and(|h| h.eq_ignore_ascii_case(w)))
        };
        field_matches(self.transport_type.as_ref(), monitor.transport_type.as_ref())
            && field_matches(self.status.as_ref(), monitor.status.as_ref())
    }
}

// ── Endpoints ───────────────────────────────────────────────────────

impl DeviceCloudClient {
    /// Create a TCP push monitor.
    ///
    /// `POST /ws/Monitor` with a `<Monitor>` document. The new id is taken
    /// from the `<location>Monitor/{id}</location>` element of the answer.
    pub async fn create_monitor(&self, request: &MonitorRequest) -> Result<MonitorId, Error> {
        let url = self.ws_url(MONITOR_PATH)?;
        let body = request.to_xml()?;
        debug!(topics = %request.topic_string(), "creating monitor");

        let answer = self
            .send_checked(
                self.request(Method::POST, url)
                    .header(reqwest::header::CONTENT_TYPE, "application/xml")
                    .body(body),
            )
            .await?;

        let raw = xml::parse_created_monitor_id(&answer)?;
        MonitorId::new(raw).ok_or_else(|| Error::MalformedResponse {
            message: "device cloud assigned monitor id 0".into(),
            body: answer,
        })
    }

    /// Delete a monitor.
    ///
    /// `DELETE /ws/Monitor/{id}`
    pub async fn delete_monitor(&self, id: MonitorId) -> Result<(), Error> {
        let url = self.ws_url(&format!("{MONITOR_PATH}/{id}"))?;
        debug!(monitor_id = %id, "deleting monitor");
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    /// List monitors matching `query`.
    ///
    /// `GET /ws/Monitor?condition=…`
    pub async fn list_monitors(&self, query: &MonitorQuery) -> Result<Vec<MonitorMetadata>, Error> {
        let mut url = self.ws_url(MONITOR_PATH)?;
        if let Some(condition) = query.condition() {
            url.query_pairs_mut().append_pair("condition", &condition);
        }
        debug!(?query, "listing monitors");

        let body = self.send(self.request(Method::GET, url)).await?;
        let monitors = xml::parse_monitor_list(&body)?;
        Ok(monitors.into_iter().filter(|m| query.matches(m)).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn metadata(topic: &str, transport: &str, status: &str) -> MonitorMetadata {
        MonitorMetadata {
            id: 7,
            topic: topic.into(),
            transport_type: Some(transport.into()),
            status: Some(status.into()),
            batch_size: None,
            batch_duration: None,
            format_type: None,
            compression: None,
            last_connect: None,
        }
    }

    #[test]
    fn monitor_id_rejects_zero() {
        assert!(MonitorId::new(0).is_none());
        assert_eq!(MonitorId::new(42).unwrap().get(), 42);
        assert!("0".parse::<MonitorId>().is_err());
        assert_eq!("17".parse::<MonitorId>().unwrap().get(), 17);
    }

    #[test]
    fn request_joins_topics_and_tags_schema() {
        let request = MonitorRequest::new(["DataPoint/dev1", "devices/dev1"])
            .with_schema("{{this}}")
            .with_batch(130, Duration::from_secs(5));
        let xml = request.to_xml().unwrap();
        assert!(xml.contains("<monTopic>DataPoint/dev1,devices/dev1</monTopic>"));
        assert!(xml.contains("<monBatchSize>130</monBatchSize>"));
        assert!(xml.contains("<monBatchDuration>5</monBatchDuration>"));
        assert!(xml.contains("<monFormatType>json</monFormatType>"));
        assert!(xml.contains("<monCompression>gzip</monCompression>"));
        assert!(xml.contains("<monSchemaType>handlebars</monSchemaType>"));
    }

    #[test]
    fn status_parses_known_and_unknown_values() {
        assert_eq!(metadata("t", "tcp", "INACTIVE").status(), MonitorStatus::Inactive);
        assert_eq!(
            metadata("t", "tcp", "WEIRD").status(),
            MonitorStatus::Other("WEIRD".into())
        );
    }

    #[test]
    fn inactive_query_condition_and_filter() {
        let query = MonitorQuery::inactive_tcp();
        assert_eq!(
            query.condition().as_deref(),
            Some("monTransportType='tcp' and monStatus='INACTIVE'")
        );
        assert!(query.matches(&metadata("t", "tcp", "INACTIVE")));
        assert!(!query.matches(&metadata("t", "tcp", "ACTIVE")));
        assert!(!query.matches(&metadata("t", "http", "INACTIVE")));
        assert_eq!(MonitorQuery::default().condition(), None);
    }

    #[test]
    fn topic_match_requires_device_when_given() {
        let m = metadata("CLIEvent/dev-1/abc", "tcp", "INACTIVE");
        assert!(m.topic_matches("CLIEvent", None));
        assert!(m.topic_matches("CLIEvent", Some("dev-1")));
        assert!(!m.topic_matches("CLIEvent", Some("dev-2")));
        assert!(!m.topic_matches("DataPoint", None));
    }
}

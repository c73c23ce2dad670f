// Data stream history endpoints
//
// `GET /ws/v1/streams/history/{stream_id}` pages data points oldest first.
// Long spans are rolled up server-side so a month of samples comes back
// as one averaged point per day.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::client::DeviceCloudClient;
use crate::error::Error;

const STREAMS_HISTORY_PATH: &str = "/ws/v1/streams/history";

/// Bucket width of a server-side rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RollupInterval {
    /// Thirty minutes.
    Half,
    Hour,
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RollupMethod {
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rollup {
    pub interval: RollupInterval,
    pub method: RollupMethod,
}

impl Rollup {
    pub fn average(interval: RollupInterval) -> Self {
        Self {
            interval,
            method: RollupMethod::Average,
        }
    }
}

/// How far back a history request reaches.
///
/// Each span picks the rollup that keeps the answer to a few dozen points:
/// an hour comes back raw, a day as half-hour averages, a week hourly, and
/// a month daily.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySpan {
    Hour,
    Day,
    Week,
    Month,
}

impl HistorySpan {
    /// The span for a length in hours, if it is one of 1, 24, 168 or 720.
    pub fn from_hours(hours: u32) -> Option<Self> {
        match hours {
            1 => Some(Self::Hour),
            24 => Some(Self::Day),
            168 => Some(Self::Week),
            720 => Some(Self::Month),
            _ => None,
        }
    }

    pub fn hours(self) -> u32 {
        match self {
            Self::Hour => 1,
            Self::Day => 24,
            Self::Week => 168,
            Self::Month => 720,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::from_secs(u64::from(self.hours()) * 3600)
    }

    pub fn rollup(self) -> Option<Rollup> {
        match self {
            Self::Hour => None,
            Self::Day => Some(Rollup::average(RollupInterval::Half)),
            Self::Week => Some(Rollup::average(RollupInterval::Hour)),
            Self::Month => Some(Rollup::average(RollupInterval::Day)),
        }
    }

    /// Start of the window ending at `now`.
    pub fn start_from(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::hours(i64::from(self.hours()))
    }
}

/// One sample of a data stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub stream_id: Option<String>,
    /// Milliseconds since the epoch, as reported by the device.
    pub timestamp: i64,
    /// Numbers arrive as strings for raw points and as numbers for rollups.
    pub value: serde_json::Value,
    #[serde(default)]
    pub quality: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl DataPoint {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// The value as text, without the quotes a JSON string would carry.
    pub fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryPage {
    #[serde(default)]
    list: Vec<DataPoint>,
    #[serde(default)]
    next_uri: Option<String>,
}

impl DeviceCloudClient {
    /// Data points of `stream_id` since `start`, oldest first.
    ///
    /// `GET /ws/v1/streams/history/{stream_id}?start_time=…&order=asc`
    /// plus `rollup_interval`/`rollup_method` when `rollup` is set. Follows
    /// `next_uri` until the last page.
    pub async fn stream_history(
        &self,
        stream_id: &str,
        start: DateTime<Utc>,
        rollup: Option<Rollup>,
    ) -> Result<Vec<DataPoint>, Error> {
        let stream_id = stream_id.trim_matches('/');
        let mut url = self.ws_url(&format!("{STREAMS_HISTORY_PATH}/{stream_id}"))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair(
                    "start_time",
                    &start.to_rfc3339_opts(SecondsFormat::Millis, true),
                )
                .append_pair("order", "asc");
            if let Some(rollup) = rollup {
                query
                    .append_pair("rollup_interval", &rollup.interval.to_string())
                    .append_pair("rollup_method", &rollup.method.to_string());
            }
        }
        debug!(stream_id, %start, ?rollup, "reading stream history");

        let mut points = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next.take() {
            let body = self.send(self.request(Method::GET, url)).await?;
            let page: HistoryPage =
                serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                    message: e.to_string(),
                    body: body.clone(),
                })?;
            let empty = page.list.is_empty();
            points.extend(page.list);
            if let Some(uri) = page.next_uri.filter(|_| !empty) {
                next = Some(self.ws_url(&uri)?);
            }
        }
        Ok(points)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn span_selects_rollup() {
        assert_eq!(HistorySpan::Hour.rollup(), None);
        assert_eq!(
            HistorySpan::Day.rollup(),
            Some(Rollup::average(RollupInterval::Half))
        );
        assert_eq!(
            HistorySpan::Week.rollup().map(|r| r.interval),
            Some(RollupInterval::Hour)
        );
        assert_eq!(
            HistorySpan::Month.rollup().map(|r| r.interval),
            Some(RollupInterval::Day)
        );
    }

    #[test]
    fn only_known_spans_are_accepted() {
        assert_eq!(HistorySpan::from_hours(168), Some(HistorySpan::Week));
        assert_eq!(HistorySpan::from_hours(48), None);
        assert_eq!(HistorySpan::from_hours(0), None);
    }

    #[test]
    fn start_is_span_before_now() {
        let now = DateTime::parse_from_rfc3339("2024-03-02T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            HistorySpan::Day.start_from(now).to_rfc3339(),
            "2024-03-01T12:00:00+00:00"
        );
    }

    #[test]
    fn raw_value_text_drops_quotes() {
        let point: DataPoint =
            serde_json::from_str(r#"{"timestamp": 1000, "value": "12.5"}"#).unwrap();
        assert_eq!(point.value_text(), "12.5");
        assert_eq!(point.time().unwrap().timestamp(), 1);
    }
}

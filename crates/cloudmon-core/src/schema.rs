// ── Subscription specs and payload schemas ──
//
// Each dashboard subscription kind is a topic, an optional handlebars
// schema the device cloud applies before pushing, a batch policy, and the
// sweep that clears stale monitors of the same kind first.

use std::time::Duration;

use cloudmon_api::MonitorRequest;

use crate::config::MonitorSettings;

/// Renders CLI session events as `{"type": …, "data"?, "session_id"?, "error"?}`.
pub const CLI_SCHEMA: &str = concat!(
    "[",
    "{{#each this}}",
    "{{#if @index}}, {{/if}}",
    "{ ",
    "{{#if CLIEvent.type}}",
    "{{#endsWith CLIEvent.type \"data\"}}",
    "\"data\": \"{{{CLIEvent.data}}}\",",
    "{{/endsWith}}",
    "{{#endsWith CLIEvent.type \"terminate\"}}",
    "\"session_id\": \"{{CLIEvent.sessionId}}\",",
    "{{#endsWith CLIEvent.hint \"Idle Timeout Exceeded\"}}",
    "\"error\": \"{{CLIEvent.hint}}\",",
    "{{/endsWith}}",
    "{{/endsWith}}",
    "{{/if}}",
    "\"type\": \"{{CLIEvent.type}}\"",
    "}",
    "{{/each}}",
    "]",
);

/// Renders connectivity changes as `{"device_id": …, "status": …}`.
pub const DEVICE_SCHEMA: &str = concat!(
    "[",
    "{{#each this}}",
    "{{#if @index}}, {{/if}}",
    "{ ",
    "\"device_id\": \"{{device.id}}\",",
    "\"status\": \"{{device.connection_status}}\"",
    "}",
    "{{/each}}",
    "]",
);

/// Closes the data-point array after the trailing comma of the last filter.
const DATA_POINT_TERMINATOR: &str = r#"{"a": 0}"#;

/// Streams reported by ConnectCore devices.
pub const DEFAULT_STREAMS: &[&str] = &[
    "wlan0/state",
    "wlan0/rx_bytes",
    "wlan0/tx_bytes",
    "hci0/state",
    "hci0/rx_bytes",
    "hci0/tx_bytes",
    "eth0/state",
    "eth0/rx_bytes",
    "eth0/tx_bytes",
    "eth1/state",
    "eth1/rx_bytes",
    "eth1/tx_bytes",
    "lo/state",
    "lo/rx_bytes",
    "lo/tx_bytes",
    "uptime",
    "frequency",
    "cpu_temperature",
    "cpu_load",
    "used_memory",
    "free_memory",
];

/// Schema that keeps only the first value of each stream in a batch and
/// renders it as `{"stream": …, "value": …}`.
pub fn data_point_schema(streams: &[&str]) -> String {
    let mut schema = String::from("[");
    for stream in streams {
        schema.push_str("{{#eachFiltered this}}");
        schema.push_str(&format!("{{{{#endsWith DataPoint.streamId \"{stream}\"}}}}"));
        schema.push_str("{{#if @first}}");
        schema.push('{');
        schema.push_str(
            "\"stream\": \"{{remainingPathComponents (remainingPathComponents DataPoint.streamId)}}\",",
        );
        schema.push_str("\"value\": {{DataPoint.data}} ");
        schema.push_str("},");
        schema.push_str("{{/if}}");
        schema.push_str("{{/endsWith}}");
        schema.push_str("{{/eachFiltered}}");
    }
    schema.push_str(DATA_POINT_TERMINATOR);
    schema.push(']');
    schema
}

/// Which inactive monitors to clear before subscribing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sweep {
    pub topic_hint: String,
    pub device_id: Option<String>,
}

/// Everything needed to register one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    pub request: MonitorRequest,
    pub sweep: Option<Sweep>,
}

impl SubscriptionSpec {
    pub fn new(request: MonitorRequest) -> Self {
        Self {
            request,
            sweep: None,
        }
    }

    pub fn with_sweep(mut self, topic_hint: impl Into<String>, device_id: Option<&str>) -> Self {
        self.sweep = Some(Sweep {
            topic_hint: topic_hint.into(),
            device_id: device_id.map(str::to_owned),
        });
        self
    }

    /// Data points of `device_id` over the default stream list.
    pub fn data_points(device_id: &str, settings: &MonitorSettings) -> Self {
        Self::data_points_for(
            device_id,
            DEFAULT_STREAMS,
            settings.records_per_stream,
            settings.batch_duration,
        )
    }

    /// Data points of `device_id` over `streams`, batching
    /// `records_per_stream` records per stream for up to `batch_duration`.
    pub fn data_points_for(
        device_id: &str,
        streams: &[&str],
        records_per_stream: u32,
        batch_duration: Duration,
    ) -> Self {
        let stream_count = u32::try_from(streams.len()).unwrap_or(u32::MAX);
        let request = MonitorRequest::new([format!("DataPoint/{device_id}")])
            .with_schema(data_point_schema(streams))
            .with_batch(stream_count.saturating_mul(records_per_stream), batch_duration);
        Self::new(request).with_sweep("DataPoint", Some(device_id))
    }

    /// Output of remote CLI session `session_id` on `device_id`.
    pub fn cli(device_id: &str, session_id: &str) -> Self {
        let request =
            MonitorRequest::new([format!("CLIEvent/{device_id}/{session_id}")]).with_schema(CLI_SCHEMA);
        Self::new(request).with_sweep("CLIEvent", Some(device_id))
    }

    /// Connect/disconnect events of `device_id`.
    pub fn device(device_id: &str) -> Self {
        let request = MonitorRequest::new([format!("devices/{device_id}")]).with_schema(DEVICE_SCHEMA);
        Self::new(request).with_sweep("devices", Some(device_id))
    }

    /// Alarm status changes across the account.
    pub fn alerts() -> Self {
        Self::new(MonitorRequest::new(["AlarmStatus"])).with_sweep("AlarmStatus", None)
    }

    /// Data points of every device in device-cloud group `group`.
    pub fn valves(group: &str) -> Self {
        let topic = format!("[group={group}]DataPoint");
        Self::new(MonitorRequest::new([topic.clone()])).with_sweep(topic, None)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn data_point_schema_filters_each_stream_and_terminates() {
        let schema = data_point_schema(&["uptime", "cpu_load"]);
        assert!(schema.starts_with("[{{#eachFiltered this}}{{#endsWith DataPoint.streamId \"uptime\"}}"));
        assert!(schema.contains("{{#endsWith DataPoint.streamId \"cpu_load\"}}"));
        assert!(schema.ends_with(r#"{{/eachFiltered}}{"a": 0}]"#));
        assert_eq!(schema.matches("{{#eachFiltered this}}").count(), 2);
    }

    #[test]
    fn data_point_batch_scales_with_streams() {
        let spec = SubscriptionSpec::data_points("dev-1", &MonitorSettings::default());
        assert_eq!(spec.request.topics, vec!["DataPoint/dev-1".to_owned()]);
        assert_eq!(spec.request.batch_size, 210);
        assert_eq!(spec.request.batch_duration, Duration::from_secs(5));
        assert_eq!(
            spec.sweep,
            Some(Sweep {
                topic_hint: "DataPoint".into(),
                device_id: Some("dev-1".into()),
            })
        );
    }

    #[test]
    fn cli_and_device_topics() {
        let cli = SubscriptionSpec::cli("dev-1", "sess-9");
        assert_eq!(cli.request.topics, vec!["CLIEvent/dev-1/sess-9".to_owned()]);
        assert_eq!(cli.request.schema.as_deref(), Some(CLI_SCHEMA));
        assert_eq!(cli.request.batch_size, 1);

        let device = SubscriptionSpec::device("dev-1");
        assert_eq!(device.request.topics, vec!["devices/dev-1".to_owned()]);
    }

    #[test]
    fn alerts_have_no_schema() {
        let spec = SubscriptionSpec::alerts();
        assert_eq!(spec.request.topic_string(), "AlarmStatus");
        assert!(spec.request.schema.is_none());
    }

    #[test]
    fn valves_use_group_topic() {
        let spec = SubscriptionSpec::valves("smart_farm_north");
        assert_eq!(spec.request.topic_string(), "[group=smart_farm_north]DataPoint");
    }
}

//! Data stream command handlers.

use chrono::{SecondsFormat, Utc};
use tabled::Tabled;
use tracing::debug;

use cloudmon_api::{DataPoint, DeviceCloudClient};

use crate::cli::{GlobalOpts, StreamsArgs, StreamsCommand};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct PointRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl PointRow {
    fn new(p: &DataPoint) -> Self {
        Self {
            time: p.time().map_or_else(
                || p.timestamp.to_string(),
                |t| t.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            value: p.value_text(),
        }
    }
}

pub async fn handle(
    client: &DeviceCloudClient,
    args: StreamsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        StreamsCommand::History { stream_id, span } => {
            let start = span.start_from(Utc::now());
            debug!(%stream_id, hours = span.hours(), "reading stream history");
            let points = client
                .stream_history(&stream_id, start, span.rollup())
                .await?;

            let out = output::render_list(&global.output, &points, PointRow::new, |p| {
                format!("{}\t{}", p.timestamp, p.value_text())
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

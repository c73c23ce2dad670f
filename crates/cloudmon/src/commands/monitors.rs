//! Monitor command handlers.

use std::time::Duration;

use tabled::Tabled;

use cloudmon_api::{DeviceCloudClient, MonitorId, MonitorMetadata, MonitorQuery, MonitorRequest};

use crate::cli::{GlobalOpts, MonitorsArgs, MonitorsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct MonitorRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Topic")]
    topic: String,
    #[tabled(rename = "Transport")]
    transport: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Batch")]
    batch: String,
    #[tabled(rename = "Last connect")]
    last_connect: String,
}

impl MonitorRow {
    fn new(m: &MonitorMetadata, color: bool) -> Self {
        let batch = match (m.batch_size, m.batch_duration) {
            (Some(size), Some(secs)) => format!("{size} / {secs}s"),
            (Some(size), None) => size.to_string(),
            _ => "-".into(),
        };
        Self {
            id: m.id,
            topic: m.topic.clone(),
            transport: m.transport_type.clone().unwrap_or_else(|| "-".into()),
            status: output::paint_status(m.status.as_deref().unwrap_or("-"), color),
            batch,
            last_connect: m.last_connect.clone().unwrap_or_default(),
        }
    }
}

fn not_found(id: MonitorId) -> CliError {
    CliError::NotFound {
        resource_type: "monitor".into(),
        identifier: id.to_string(),
        list_command: "monitors list".into(),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    client: &DeviceCloudClient,
    args: MonitorsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        MonitorsCommand::List { inactive, topic } => {
            let query = if inactive {
                MonitorQuery::inactive_tcp()
            } else {
                MonitorQuery::default()
            };
            let mut monitors = client.list_monitors(&query).await?;
            if let Some(ref topic) = topic {
                monitors.retain(|m| m.topic.contains(topic.as_str()));
            }

            let color = output::should_color(&global.color);
            let out = output::render_list(
                &global.output,
                &monitors,
                |m| MonitorRow::new(m, color),
                |m| m.id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        MonitorsCommand::Create {
            topics,
            schema_file,
            batch_size,
            batch_duration,
        } => {
            let mut request = MonitorRequest::new(topics)
                .with_batch(batch_size, Duration::from_secs(batch_duration));
            if let Some(path) = schema_file {
                let schema = std::fs::read_to_string(&path).map_err(|e| CliError::Validation {
                    field: "schema-file".into(),
                    reason: format!("cannot read {}: {e}", path.display()),
                })?;
                request = request.with_schema(schema);
            }

            let id = client.create_monitor(&request).await?;
            if !global.quiet {
                eprintln!("Monitor {id} created for {}", request.topic_string());
            }
            output::print_output(&id.to_string(), global.quiet);
            Ok(())
        }

        MonitorsCommand::Delete { id } => {
            if !util::confirm(&format!("Delete monitor {id}?"), global.yes)? {
                return Ok(());
            }
            match client.delete_monitor(id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => return Err(not_found(id)),
                Err(e) => return Err(e.into()),
            }
            if !global.quiet {
                eprintln!("Monitor {id} deleted");
            }
            Ok(())
        }

        MonitorsCommand::Sweep { topic, device } => {
            let scope = device
                .as_deref()
                .map_or_else(|| topic.clone(), |d| format!("{topic} on {d}"));
            if !util::confirm(
                &format!("Delete inactive monitors for {scope}?"),
                global.yes,
            )? {
                return Ok(());
            }

            let removed =
                cloudmon_core::sweep_inactive(client, &topic, device.as_deref(), |_| false).await?;
            if !global.quiet {
                eprintln!("Deleted {} inactive monitor(s)", removed.len());
            }
            let ids: Vec<String> = removed.iter().map(ToString::to_string).collect();
            output::print_output(&ids.join("\n"), global.quiet);
            Ok(())
        }
    }
}

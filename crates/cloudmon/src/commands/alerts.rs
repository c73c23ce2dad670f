//! Alert command handlers.

use std::fmt::Write as _;

use tabled::Tabled;

use cloudmon_api::{AlertSummary, DeviceCloudClient};

use crate::cli::{AlertsArgs, AlertsCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last update")]
    last_update: String,
}

impl AlertRow {
    fn new(a: &AlertSummary, color: bool) -> Self {
        Self {
            id: a.id,
            name: a.name.clone(),
            device: a.device_id.clone().unwrap_or_else(|| "-".into()),
            status: output::paint_status(&a.status, color),
            last_update: a.last_update.clone().unwrap_or_default(),
        }
    }
}

fn detail(a: &AlertSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ID:          {}", a.id);
    let _ = writeln!(out, "Name:        {}", a.name);
    let _ = writeln!(out, "Device:      {}", a.device_id.as_deref().unwrap_or("-"));
    let _ = writeln!(out, "Status:      {}", a.status);
    let _ = writeln!(out, "Last update: {}", a.last_update.as_deref().unwrap_or("-"));
    let _ = write!(out, "Description: {}", a.description);
    out
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    client: &DeviceCloudClient,
    args: AlertsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        AlertsCommand::List { query, fired } => {
            let mut alerts = client.alert_summaries(query.as_deref()).await?;
            if fired {
                alerts.retain(AlertSummary::is_fired);
            }

            let color = output::should_color(&global.color);
            let out = output::render_list(
                &global.output,
                &alerts,
                |a| AlertRow::new(a, color),
                |a| a.id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        AlertsCommand::Show { id, device } => {
            let alert = client
                .alert_details(id, &device)
                .await?
                .ok_or_else(|| CliError::NotFound {
                    resource_type: "alert".into(),
                    identifier: format!("{id} on {device}"),
                    list_command: "alerts list".into(),
                })?;

            let out = output::render_single(&global.output, &alert, detail, |a| a.id.to_string());
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

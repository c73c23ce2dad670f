//! Command dispatch: bridges CLI args -> device-cloud calls -> output formatting.

pub mod alerts;
pub mod config_cmd;
pub mod files;
pub mod monitors;
pub mod streams;
pub mod upload;
pub mod util;

use cloudmon_api::DeviceCloudClient;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a device-cloud-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    client: &DeviceCloudClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Monitors(args) => monitors::handle(client, args, global).await,
        Command::Alerts(args) => alerts::handle(client, args, global).await,
        Command::Upload(args) => upload::handle(client, args, global).await,
        Command::Files(args) => files::handle(client, args, global).await,
        Command::Streams(args) => streams::handle(client, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}

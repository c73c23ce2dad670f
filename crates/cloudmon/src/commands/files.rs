//! File inventory command handlers.

use std::io::Write as _;

use tabled::Tabled;
use tracing::info;

use cloudmon_api::{DeviceCloudClient, FileEntry};

use crate::cli::{FilesArgs, FilesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct FileRow {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Last modified")]
    last_modified: String,
}

impl FileRow {
    fn new(f: &FileEntry) -> Self {
        Self {
            kind: f.kind.to_string(),
            name: f.name.clone(),
            size: f.size.map_or_else(|| "-".into(), |s| s.to_string()),
            last_modified: f.last_modified.clone().unwrap_or_default(),
        }
    }
}

pub async fn handle(
    client: &DeviceCloudClient,
    args: FilesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        FilesCommand::List { path } => {
            let entries = client.list_files(&path).await?;
            let out = output::render_list(&global.output, &entries, FileRow::new, |f| {
                f.name.clone()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        FilesCommand::Get { path, dest } => {
            let contents = client.get_file(&path).await?;
            match dest {
                Some(dest) => {
                    std::fs::write(&dest, &contents)?;
                    info!(path, dest = %dest.display(), bytes = contents.len(), "file downloaded");
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&contents)?;
                    stdout.flush()?;
                }
            }
            Ok(())
        }
    }
}

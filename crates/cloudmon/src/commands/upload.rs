//! Upload command handler.
//!
//! Streams the file through a `CancelableReader` registered with the
//! process-wide transfer tracker. Ctrl-C cancels the transfer, which ends
//! the request body with an error so the partial file is never committed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use cloudmon_api::DeviceCloudClient;
use cloudmon_core::{CancelableReader, Notification, ProgressHub, TransferTracker};

use crate::cli::{GlobalOpts, UploadArgs};
use crate::error::CliError;

fn progress_bar(quiet: bool, remote_path: &str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos:>3}%") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(remote_path.to_owned());
    bar
}

pub async fn handle(
    client: &DeviceCloudClient,
    args: UploadArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let remote_path = match args.remote_path {
        Some(path) => path,
        None => args
            .file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| CliError::Validation {
                field: "file".into(),
                reason: format!("{} has no file name", args.file.display()),
            })?,
    };
    if args.chunk_kib == 0 {
        return Err(CliError::Validation {
            field: "chunk-kib".into(),
            reason: "must be at least 1".into(),
        });
    }

    let file = std::fs::File::open(&args.file)?;
    let length = file.metadata()?.len();

    if args.replace && client.file_exists(&remote_path).await? {
        info!(%remote_path, "replacing existing file");
        client.delete_file(&remote_path).await?;
    }

    // ── Progress ────────────────────────────────────────────────────
    let hub = ProgressHub::new();
    let mut updates = hub.subscribe(&remote_path);
    let bar = progress_bar(global.quiet, &remote_path);
    let bar_task = {
        let bar = bar.clone();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(Notification::Progress { progress }) => bar.set_position(progress.into()),
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    // ── Cancellation ────────────────────────────────────────────────
    let tracker = TransferTracker::global().clone();
    let canceled = Arc::new(AtomicBool::new(false));
    let cancel_task = {
        let tracker = tracker.clone();
        let canceled = Arc::clone(&canceled);
        let transfer_id = remote_path.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() && tracker.cancel(&transfer_id) {
                canceled.store(true, Ordering::SeqCst);
            }
        })
    };

    let reader = CancelableReader::new(remote_path.clone(), file, length, tracker, hub.clone());
    debug!(%remote_path, length, chunk_kib = args.chunk_kib, "starting upload");
    let result = client
        .upload_stream(&remote_path, reader.into_stream(args.chunk_kib * 1024))
        .await;

    cancel_task.abort();
    hub.discard(&remote_path);
    let _ = bar_task.await;

    if canceled.load(Ordering::SeqCst) {
        bar.abandon_with_message(format!("{remote_path} canceled"));
        return Err(CliError::Canceled {
            transfer: remote_path,
        });
    }
    result?;

    bar.finish_and_clear();
    if !global.quiet {
        eprintln!("Uploaded {remote_path} ({length} bytes)");
    }
    Ok(())
}

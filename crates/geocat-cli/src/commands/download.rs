//! Download command implementation.

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use geocat::storage::{DEFAULT_MAX_WORKERS, DownloadOptions};

use super::{asset_selection, timeout};
use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Collection the item belongs to
    pub collection: String,

    /// Item id
    pub id: String,

    /// Target directory (defaults to ./<item id>)
    #[arg(short, long)]
    pub target: Option<PathBuf>,

    /// Download only this asset (repeatable)
    #[arg(short, long = "asset")]
    pub assets: Vec<String>,

    /// Keep files that already exist instead of replacing them
    #[arg(long)]
    pub no_overwrite: bool,

    /// Parallel downloads
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    pub workers: usize,

    /// Deadline for all downloads, in seconds
    #[arg(long, default_value_t = 3600)]
    pub timeout_secs: u64,
}

pub async fn run(ctx: &Context, args: DownloadArgs) -> Result<()> {
    let target = args
        .target
        .clone()
        .unwrap_or_else(|| PathBuf::from(&args.id));

    let storage = ctx.storage().await?;
    let options = DownloadOptions {
        assets: asset_selection(args.assets),
        overwrite: !args.no_overwrite,
        max_workers: args.workers,
        timeout: timeout(args.timeout_secs),
    };

    let result = storage
        .download_item(&args.collection, &args.id, &target, options)
        .await
        .with_context(|| format!("Failed to download item {}/{}", args.collection, args.id))?;

    output::field("Item", &result.item_path.display().to_string());
    for (key, path) in result.paths() {
        output::success(&format!("{key} -> {}", path.display()));
    }
    for failure in &result.batch.failed {
        output::error(&format!(
            "Failed to download {}: {}",
            failure.job.asset_key, failure.error
        ));
    }
    for job in &result.batch.cancelled {
        output::error(&format!("Timed out downloading {}", job.asset_key));
    }

    if !result.batch.is_complete() {
        bail!("Some assets of {} could not be downloaded", args.id);
    }
    Ok(())
}

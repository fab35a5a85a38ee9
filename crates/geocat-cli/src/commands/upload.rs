//! Upload command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use clap::Args;
use geocat::Item;
use geocat::storage::{DEFAULT_MAX_WORKERS, UploadOptions};

use super::{asset_selection, timeout};
use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Item document (JSON) whose asset hrefs name local files
    pub item: PathBuf,

    /// Directory the asset files live in (defaults to the item's directory)
    #[arg(long)]
    pub assets_dir: Option<PathBuf>,

    /// Upload only this asset (repeatable)
    #[arg(short, long = "asset")]
    pub assets: Vec<String>,

    /// Parallel uploads
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    pub workers: usize,

    /// Deadline for all uploads, in seconds
    #[arg(long, default_value_t = 3600)]
    pub timeout_secs: u64,
}

pub async fn run(ctx: &Context, args: UploadArgs) -> Result<()> {
    let content = tokio::fs::read_to_string(&args.item)
        .await
        .with_context(|| format!("Failed to read {}", args.item.display()))?;
    let item: Item = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a valid item", args.item.display()))?;

    let assets_dir = args
        .assets_dir
        .clone()
        .unwrap_or_else(|| parent_dir(&args.item));

    let storage = ctx.storage().await?;
    let options = UploadOptions {
        assets: asset_selection(args.assets),
        max_workers: args.workers,
        timeout: timeout(args.timeout_secs),
    };

    let item_id = item.id.clone();
    let result = storage
        .upload_item(item, &assets_dir, options)
        .await
        .with_context(|| format!("Failed to upload item {item_id}"))?;

    for (key, href) in &result.batch.successful {
        output::success(&format!("Uploaded {key} to {href}"));
    }
    for failure in result.failed_assets() {
        output::error(&format!(
            "Failed to upload {}: {}",
            failure.job.asset_key, failure.error
        ));
    }
    for job in result.cancelled_assets() {
        output::error(&format!("Timed out uploading {}", job.asset_key));
    }

    if !result.registered {
        bail!("Item {item_id} was not registered because some assets did not upload");
    }
    output::success(&format!("Registered item {item_id}"));
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

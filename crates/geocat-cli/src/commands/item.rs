//! Item subcommand implementations.

use anyhow::{Context as _, Result, bail};
use clap::{Args, Subcommand};
use geocat::storage::{DEFAULT_MAX_WORKERS, DeleteOptions};

use super::timeout;
use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct ItemCommand {
    #[command(subcommand)]
    pub command: ItemSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ItemSubcommand {
    /// Print an item as JSON
    Get(GetArgs),

    /// Delete an item and, unless told otherwise, its stored assets
    Delete(DeleteArgs),
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Collection the item belongs to
    pub collection: String,

    /// Item id
    pub id: String,

    /// Pretty-print the item
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Collection the item belongs to
    pub collection: String,

    /// Item id
    pub id: String,

    /// Leave the stored asset files in place
    #[arg(long)]
    pub keep_assets: bool,

    /// Parallel deletions
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    pub workers: usize,

    /// Deadline for all asset deletions, in seconds
    #[arg(long, default_value_t = 3600)]
    pub timeout_secs: u64,
}

pub async fn handle(ctx: &Context, cmd: ItemCommand) -> Result<()> {
    match cmd.command {
        ItemSubcommand::Get(args) => get(ctx, args).await,
        ItemSubcommand::Delete(args) => delete(ctx, args).await,
    }
}

async fn get(ctx: &Context, args: GetArgs) -> Result<()> {
    let catalog = ctx.catalog().await?;
    let item = catalog
        .fetch_item(&args.collection, &args.id)
        .await
        .with_context(|| format!("Failed to fetch item {}/{}", args.collection, args.id))?;

    if args.pretty {
        output::json_pretty(&item)
    } else {
        output::json(&item)
    }
}

async fn delete(ctx: &Context, args: DeleteArgs) -> Result<()> {
    let storage = ctx.storage().await?;
    let options = DeleteOptions {
        delete_assets: !args.keep_assets,
        max_workers: args.workers,
        timeout: timeout(args.timeout_secs),
    };

    let result = storage
        .delete_item_with_assets(&args.collection, &args.id, options)
        .await
        .with_context(|| format!("Failed to delete item {}/{}", args.collection, args.id))?;

    for key in &result.successful_assets {
        output::success(&format!("Deleted asset {key}"));
    }
    for failure in &result.failed_assets {
        output::error(&format!(
            "Failed to delete asset {}: {}",
            failure.job.asset_key, failure.error
        ));
    }
    for job in &result.cancelled_assets {
        output::error(&format!("Timed out deleting asset {}", job.asset_key));
    }

    match &result.item_error {
        None if result.item_deleted => output::success(&format!("Deleted item {}", args.id)),
        Some(e) => output::error(&format!("Failed to delete item {}: {e}", args.id)),
        None => output::error(&format!("Item {} was not deleted", args.id)),
    }

    if !result.fully_deleted() {
        bail!("Item {}/{} was only partially deleted", args.collection, args.id);
    }
    Ok(())
}

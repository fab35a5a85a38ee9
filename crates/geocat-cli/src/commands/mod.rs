//! Subcommand implementations.

pub mod download;
pub mod item;
pub mod login;
pub mod logout;
pub mod search;
pub mod upload;
pub mod whoami;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use geocat::storage::AssetSelection;

use crate::cli::Commands;
use crate::context::Context;

pub async fn handle(command: Commands, config: Option<&Path>) -> Result<()> {
    let ctx = Context::load(config)?;

    match command {
        Commands::Login(args) => login::run(&ctx, args).await,
        Commands::Whoami(args) => whoami::run(&ctx, args).await,
        Commands::Logout(args) => logout::run(&ctx, args).await,
        Commands::Search(args) => search::run(&ctx, args).await,
        Commands::Item(cmd) => item::handle(&ctx, cmd).await,
        Commands::Upload(args) => upload::run(&ctx, args).await,
        Commands::Download(args) => download::run(&ctx, args).await,
    }
}

/// `--asset` values as a selection; none given means every asset.
fn asset_selection(keys: Vec<String>) -> AssetSelection {
    if keys.is_empty() {
        AssetSelection::All
    } else {
        AssetSelection::Only(keys)
    }
}

fn timeout(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

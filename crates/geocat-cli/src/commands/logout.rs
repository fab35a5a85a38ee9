//! Logout command implementation.

use anyhow::{Context as _, Result};
use clap::Args;
use geocat::TokenCache;

use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct LogoutArgs {}

pub async fn run(ctx: &Context, _args: LogoutArgs) -> Result<()> {
    let cache = TokenCache::new(ctx.config.cache_file()?);
    cache
        .clear()
        .await
        .context("Failed to remove token cache")?;

    output::success("Logged out");
    output::field("Cache", &cache.path().display().to_string());
    Ok(())
}

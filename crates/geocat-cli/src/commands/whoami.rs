//! Whoami command implementation.
//!
//! Reports the configured identity without touching the network.

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::Args;
use geocat::TokenCache;
use geocat::config::AuthKind;

use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct WhoamiArgs {}

pub async fn run(ctx: &Context, _args: WhoamiArgs) -> Result<()> {
    let config = &ctx.config;
    let kind = config.auth_kind()?;

    if let Some(path) = &ctx.config_path {
        output::field("Config", &path.display().to_string());
    }
    output::field("Flow", kind.as_str());
    output::field(
        "Client ID",
        config.authentication.client_id.as_deref().unwrap_or("(not set)"),
    );
    output::field("Catalog", &config.catalog.url);
    output::field("Storage", &config.storage.url);

    if kind != AuthKind::Interactive {
        return Ok(());
    }

    let cache = TokenCache::new(config.cache_file()?);
    let token = cache
        .load()
        .await
        .context("Failed to read token cache")?
        .context("No cached token. Run 'geocat login' first.")?;

    let status = if token.is_expired(Utc::now(), config.skew()) {
        "expired"
    } else {
        "valid"
    };
    output::field("Token", status);
    output::field("Expires", &token.expires_at().to_rfc3339());
    output::field(
        "Refreshable",
        if token.refresh_token().is_some() { "yes" } else { "no" },
    );

    Ok(())
}

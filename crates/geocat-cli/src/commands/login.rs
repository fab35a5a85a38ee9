//! Login command implementation.

use anyhow::Result;
use clap::Args;

use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct LoginArgs {}

pub async fn run(ctx: &Context, _args: LoginArgs) -> Result<()> {
    let client = ctx.client().await?;

    output::success("Authenticated");
    output::field("Flow", ctx.config.auth_kind()?.as_str());
    if let Some(expires_at) = client.expires_at().await {
        output::field("Expires", &expires_at.to_rfc3339());
    }

    Ok(())
}

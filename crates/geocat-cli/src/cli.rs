//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::{download, item, login, logout, search, upload, whoami};

/// Client for a geospatial catalog and its asset storage.
#[derive(Parser, Debug)]
#[command(name = "geocat")]
#[command(author, version = env!("GEOCAT_VERSION"), about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Config file (defaults to the platform config dir)
    #[arg(short, long, global = true, env = "GEOCAT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate and cache the token
    Login(login::LoginArgs),

    /// Show the configured identity and cached token
    Whoami(whoami::WhoamiArgs),

    /// Clear the cached token
    Logout(logout::LogoutArgs),

    /// Search the catalog, printing one feature per line
    Search(search::SearchArgs),

    /// Catalog item operations
    Item(item::ItemCommand),

    /// Upload an item's assets and register it
    Upload(upload::UploadArgs),

    /// Download an item and its assets
    Download(download::DownloadArgs),
}

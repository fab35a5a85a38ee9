//! Options and outcomes of item-level storage operations.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::Item;
use crate::error::Error;
use crate::transfer::{BatchResult, JobFailure, TransferJob};

/// Parallel transfers per item unless configured otherwise.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Deadline for all transfers of one item.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Which assets of an item an operation touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AssetSelection {
    /// Every asset of the item.
    #[default]
    All,
    /// Only the listed asset keys.
    Only(Vec<String>),
    /// No assets; only the item record is handled.
    None,
}

impl AssetSelection {
    pub(crate) fn keys<'a>(&'a self, item: &'a Item) -> Vec<&'a str> {
        match self {
            AssetSelection::All => item.assets.keys().map(String::as_str).collect(),
            AssetSelection::Only(keys) => keys.iter().map(String::as_str).collect(),
            AssetSelection::None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub assets: AssetSelection,
    pub max_workers: usize,
    pub timeout: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            assets: AssetSelection::All,
            max_workers: DEFAULT_MAX_WORKERS,
            timeout: DEFAULT_TRANSFER_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub assets: AssetSelection,
    /// Replace files that already exist. When false, existing files are
    /// left alone and reported as downloaded.
    pub overwrite: bool,
    pub max_workers: usize,
    pub timeout: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            assets: AssetSelection::All,
            overwrite: true,
            max_workers: DEFAULT_MAX_WORKERS,
            timeout: DEFAULT_TRANSFER_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeleteOptions {
    /// Also delete the stored objects behind the asset hrefs.
    pub delete_assets: bool,
    pub max_workers: usize,
    pub timeout: Duration,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            delete_assets: true,
            max_workers: DEFAULT_MAX_WORKERS,
            timeout: DEFAULT_TRANSFER_TIMEOUT,
        }
    }
}

/// Outcome of [`upload_item`](super::StorageClient::upload_item).
#[derive(Debug)]
pub struct UploadResult {
    /// The item with the hrefs of uploaded assets pointing at public storage.
    pub item: Item,
    /// Whether the item was registered in the catalog.
    pub registered: bool,
    /// Per-asset outcome; successful entries map to the new public href.
    pub batch: BatchResult<TransferJob, String>,
}

impl UploadResult {
    pub fn successful_assets(&self) -> impl Iterator<Item = &str> {
        self.batch.successful.keys().map(String::as_str)
    }

    pub fn failed_assets(&self) -> &[JobFailure<TransferJob>] {
        &self.batch.failed
    }

    pub fn cancelled_assets(&self) -> &[TransferJob] {
        &self.batch.cancelled
    }
}

/// Outcome of [`download_item`](super::StorageClient::download_item).
#[derive(Debug)]
pub struct DownloadResult {
    pub item: Item,
    /// Where the item document was written.
    pub item_path: PathBuf,
    /// Per-asset outcome; successful entries map to the local file.
    pub batch: BatchResult<TransferJob, PathBuf>,
}

impl DownloadResult {
    /// Asset key to local path for every asset now on disk.
    pub fn paths(&self) -> &BTreeMap<String, PathBuf> {
        &self.batch.successful
    }
}

/// Outcome of [`delete_item_with_assets`](super::StorageClient::delete_item_with_assets).
#[derive(Debug)]
pub struct DeleteResult {
    /// The item as it was before deletion.
    pub item: Item,
    pub item_deleted: bool,
    /// Why the catalog record could not be deleted.
    pub item_error: Option<Error>,
    pub successful_assets: Vec<String>,
    pub failed_assets: Vec<JobFailure<TransferJob>>,
    pub cancelled_assets: Vec<TransferJob>,
}

impl DeleteResult {
    pub fn all_assets_deleted(&self) -> bool {
        self.failed_assets.is_empty() && self.cancelled_assets.is_empty()
    }

    pub fn fully_deleted(&self) -> bool {
        self.item_deleted && self.all_assets_deleted()
    }
}

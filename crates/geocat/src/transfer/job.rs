//! Asset transfer jobs.

use std::path::PathBuf;

use super::engine::BatchJob;

/// Which way an asset moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferDirection {
    /// Local file to a storage key.
    Upload {
        source: PathBuf,
        destination_key: String,
    },
    /// Remote href to a local file.
    Download { href: String, destination: PathBuf },
    /// Remove the stored object behind an href.
    Delete { href: String },
}

/// One asset to move. Identified by its asset key within the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub asset_key: String,
    pub direction: TransferDirection,
    /// Media type sent with uploads.
    pub content_type: Option<String>,
}

impl TransferJob {
    pub fn upload(
        asset_key: impl Into<String>,
        source: impl Into<PathBuf>,
        destination_key: impl Into<String>,
        content_type: Option<String>,
    ) -> Self {
        Self {
            asset_key: asset_key.into(),
            direction: TransferDirection::Upload {
                source: source.into(),
                destination_key: destination_key.into(),
            },
            content_type,
        }
    }

    pub fn download(
        asset_key: impl Into<String>,
        href: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            asset_key: asset_key.into(),
            direction: TransferDirection::Download {
                href: href.into(),
                destination: destination.into(),
            },
            content_type: None,
        }
    }

    pub fn delete(asset_key: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            asset_key: asset_key.into(),
            direction: TransferDirection::Delete { href: href.into() },
            content_type: None,
        }
    }
}

impl BatchJob for TransferJob {
    fn id(&self) -> &str {
        &self.asset_key
    }
}

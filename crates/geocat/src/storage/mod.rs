//! Asset storage: uploads, downloads and deletions of item files.

mod client;
mod mime;
mod options;

pub use client::StorageClient;
pub use mime::guess_content_type;
pub use options::{
    AssetSelection, DEFAULT_MAX_WORKERS, DEFAULT_TRANSFER_TIMEOUT, DeleteOptions, DeleteResult,
    DownloadOptions, DownloadResult, UploadOptions, UploadResult,
};

//! Uploading, downloading and deleting item assets.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::catalog::{CatalogClient, Item};
use crate::client::{RequestOptions, ResilientClient};
use crate::error::{Error, InvalidInputError, TransferError, TransportError};
use crate::transfer::{BatchEngine, TransferDirection, TransferJob};
use crate::types::ServiceUrl;

use super::mime::guess_content_type;
use super::options::{
    DeleteOptions, DeleteResult, DownloadOptions, DownloadResult, UploadOptions, UploadResult,
};

/// Client for the object storage that holds item assets.
///
/// Objects are written under the private storage URL and read back through
/// the public URL; after an upload the asset href points at the public one.
#[derive(Debug, Clone)]
pub struct StorageClient {
    client: ResilientClient,
    storage: ServiceUrl,
    public: ServiceUrl,
    project_id: Option<String>,
    catalog: CatalogClient,
}

impl StorageClient {
    pub fn new(
        client: ResilientClient,
        storage: ServiceUrl,
        public: ServiceUrl,
        catalog: CatalogClient,
    ) -> Self {
        Self {
            client,
            storage,
            public,
            project_id: None,
            catalog,
        }
    }

    /// Project that uploaded objects are stored under.
    ///
    /// Without one, the item's collection is used.
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn catalog(&self) -> &CatalogClient {
        &self.catalog
    }

    /// Storage key for an asset file of `item`:
    /// `project/<project id>/<item id>/<file name>`.
    pub fn upload_key(&self, item: &Item, file_name: &str) -> Result<String, Error> {
        let project = self
            .project_id
            .as_deref()
            .or(item.collection.as_deref())
            .ok_or_else(|| InvalidInputError::Other {
                message: format!(
                    "item '{}' has no collection and no project id is configured",
                    item.id
                ),
            })?;
        Ok(format!("project/{project}/{}/{file_name}", item.id))
    }

    /// Public URL an object stored under `key` is served from.
    pub fn public_url(&self, key: &str) -> Url {
        self.public.with_suffix(key)
    }

    /// Upload one local file to `key` and return its public URL.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn upload_file(
        &self,
        path: &Path,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<Url, Error> {
        let content = fs::read(path).await.map_err(|source| TransferError::LocalFile {
            asset_key: key.to_string(),
            path: path.to_path_buf(),
            source,
        })?;
        let content_type = content_type.unwrap_or_else(|| guess_content_type(path));
        debug!(bytes = content.len(), content_type, "Uploading file");

        self.client
            .put(
                self.storage.with_suffix(key),
                RequestOptions::new().bytes(content, content_type),
            )
            .await?;
        Ok(self.public_url(key))
    }

    /// Upload the selected assets of `item` from `assets_dir`, then register
    /// the item in the catalog if every asset made it.
    ///
    /// An asset's file is looked up at its href below `assets_dir` first,
    /// then by the href's file name directly in `assets_dir`.
    #[instrument(skip(self, item, options), fields(item_id = %item.id))]
    pub async fn upload_item(
        &self,
        mut item: Item,
        assets_dir: &Path,
        options: UploadOptions,
    ) -> Result<UploadResult, Error> {
        let engine = BatchEngine::new(options.max_workers, options.timeout)?;

        let mut jobs = Vec::new();
        let mut destinations = HashMap::new();
        for key in options.assets.keys(&item) {
            let asset = item
                .assets
                .get(key)
                .ok_or_else(|| TransferError::UnknownAsset {
                    asset_key: key.to_string(),
                })?;
            let file_name = asset.file_name().ok_or_else(|| InvalidInputError::Other {
                message: format!("asset '{key}' has no file name in href '{}'", asset.href),
            })?;
            let destination = self.upload_key(&item, file_name)?;
            claim_destination(&mut destinations, key, destination.clone())?;
            let source = resolve_local_file(assets_dir, &asset.href, file_name).await;
            jobs.push(TransferJob::upload(
                key,
                source,
                destination,
                asset.media_type.clone(),
            ));
        }

        let storage = self.clone();
        let batch = engine
            .run_with(
                jobs,
                move |job| {
                    let storage = storage.clone();
                    async move { storage.upload_job(job).await }
                },
                |job, error| warn!(asset = %job.asset_key, error = %error, "Asset upload failed"),
            )
            .await?;

        for (key, href) in &batch.successful {
            if let Some(asset) = item.assets.get_mut(key) {
                asset.href = href.clone();
            }
        }

        let registered = batch.is_complete();
        if registered {
            self.catalog.add_item(&item).await?;
        } else {
            warn!(
                failed = batch.failed.len(),
                cancelled = batch.cancelled.len(),
                "Not registering item, some assets did not upload"
            );
        }

        Ok(UploadResult {
            item,
            registered,
            batch,
        })
    }

    /// Fetch an item and download the selected assets into `target_dir`.
    ///
    /// The item document is written as `<item id>.json` next to the assets.
    #[instrument(skip(self, target_dir, options), fields(target_dir = %target_dir.display()))]
    pub async fn download_item(
        &self,
        collection_id: &str,
        item_id: &str,
        target_dir: &Path,
        options: DownloadOptions,
    ) -> Result<DownloadResult, Error> {
        let engine = BatchEngine::new(options.max_workers, options.timeout)?;
        let item = self.catalog.fetch_item(collection_id, item_id).await?;

        fs::create_dir_all(target_dir)
            .await
            .map_err(|source| local_error(&item.id, target_dir, source))?;

        let mut jobs = Vec::new();
        let mut destinations = HashMap::new();
        for key in options.assets.keys(&item) {
            let asset = item
                .assets
                .get(key)
                .ok_or_else(|| TransferError::UnknownAsset {
                    asset_key: key.to_string(),
                })?;
            let file_name = asset.file_name().ok_or_else(|| InvalidInputError::Other {
                message: format!("asset '{key}' has no file name in href '{}'", asset.href),
            })?;
            let destination = target_dir.join(file_name);
            claim_destination(&mut destinations, key, destination.display().to_string())?;
            jobs.push(TransferJob::download(key, asset.href.clone(), destination));
        }

        let item_path = target_dir.join(format!("{}.json", item.id));
        if options.overwrite || !exists(&item_path).await {
            let document = serde_json::to_vec_pretty(&item).map_err(|e| InvalidInputError::Body {
                reason: e.to_string(),
            })?;
            fs::write(&item_path, document)
                .await
                .map_err(|source| local_error(&item.id, &item_path, source))?;
        }

        let storage = self.clone();
        let overwrite = options.overwrite;
        let batch = engine
            .run_with(
                jobs,
                move |job| {
                    let storage = storage.clone();
                    async move { storage.download_job(job, overwrite).await }
                },
                |job, error| warn!(asset = %job.asset_key, error = %error, "Asset download failed"),
            )
            .await?;

        info!(downloaded = batch.successful.len(), "Item downloaded");
        Ok(DownloadResult {
            item,
            item_path,
            batch,
        })
    }

    /// Delete an item from the catalog, and optionally the stored objects
    /// behind its assets.
    ///
    /// Asset deletion runs first; the catalog record is deleted regardless
    /// of how many assets could be removed.
    #[instrument(skip(self, options))]
    pub async fn delete_item_with_assets(
        &self,
        collection_id: &str,
        item_id: &str,
        options: DeleteOptions,
    ) -> Result<DeleteResult, Error> {
        let engine = BatchEngine::new(options.max_workers, options.timeout)?;
        let item = match self.catalog.fetch_item(collection_id, item_id).await {
            Ok(item) => item,
            Err(e) if e.status() == Some(404) => {
                return Err(TransferError::ItemNotFound {
                    item_id: item_id.to_string(),
                    collection_id: collection_id.to_string(),
                }
                .into());
            }
            Err(e) => return Err(e),
        };

        let jobs = if options.delete_assets {
            item.assets
                .iter()
                .map(|(key, asset)| TransferJob::delete(key, asset.href.clone()))
                .collect()
        } else {
            Vec::new()
        };

        let storage = self.clone();
        let batch = engine
            .run_with(
                jobs,
                move |job| {
                    let storage = storage.clone();
                    async move { storage.delete_job(job).await }
                },
                |job, error| warn!(asset = %job.asset_key, error = %error, "Asset deletion failed"),
            )
            .await?;

        let (item_deleted, item_error) =
            match self.catalog.delete_item(collection_id, item_id).await {
                Ok(()) => (true, None),
                Err(e) => {
                    warn!(error = %e, "Could not delete item record");
                    (false, Some(e))
                }
            };

        Ok(DeleteResult {
            item,
            item_deleted,
            item_error,
            successful_assets: batch.successful.into_keys().collect(),
            failed_assets: batch.failed,
            cancelled_assets: batch.cancelled,
        })
    }

    async fn upload_job(&self, job: TransferJob) -> Result<String, Error> {
        let TransferDirection::Upload {
            source,
            destination_key,
        } = &job.direction
        else {
            return Err(wrong_direction(&job));
        };

        self.upload_file(source, destination_key, job.content_type.as_deref())
            .await
            .map(String::from)
            .map_err(|e| asset_error(&job, e))
    }

    async fn download_job(&self, job: TransferJob, overwrite: bool) -> Result<PathBuf, Error> {
        let TransferDirection::Download { href, destination } = &job.direction else {
            return Err(wrong_direction(&job));
        };

        if !overwrite && exists(destination).await {
            debug!(asset = %job.asset_key, path = %destination.display(), "Already present, skipping");
            return Ok(destination.clone());
        }

        let url = self.asset_url(href).map_err(|e| asset_error(&job, e))?;
        self.download_file(&job.asset_key, url, destination)
            .await
            .map_err(|e| asset_error(&job, e))?;
        Ok(destination.clone())
    }

    async fn delete_job(&self, job: TransferJob) -> Result<(), Error> {
        let TransferDirection::Delete { href } = &job.direction else {
            return Err(wrong_direction(&job));
        };

        let key = self.public.strip_prefix(href).ok_or_else(|| {
            asset_error(
                &job,
                InvalidInputError::Other {
                    message: format!("href '{href}' is not served from {}", self.public),
                }
                .into(),
            )
        })?;

        self.client
            .delete(self.storage.with_suffix(key), RequestOptions::new())
            .await
            .map_err(|e| asset_error(&job, e))?;
        Ok(())
    }

    /// Stream `url` into `<destination>.part`, then move it into place.
    async fn download_file(&self, asset_key: &str, url: Url, destination: &Path) -> Result<(), Error> {
        let partial = partial_path(destination);
        let mut response = self.client.get(url, RequestOptions::new()).await?;

        let mut file = fs::File::create(&partial)
            .await
            .map_err(|source| local_error(asset_key, &partial, source))?;

        let written = async {
            let mut bytes = 0usize;
            while let Some(chunk) = response.chunk().await.map_err(TransportError::from)? {
                file.write_all(&chunk)
                    .await
                    .map_err(|source| local_error(asset_key, &partial, source))?;
                bytes += chunk.len();
            }
            file.flush()
                .await
                .map_err(|source| local_error(asset_key, &partial, source))?;
            Ok::<_, Error>(bytes)
        }
        .await;

        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        drop(file);

        fs::rename(&partial, destination)
            .await
            .map_err(|source| local_error(asset_key, destination, source))?;
        debug!(bytes, path = %destination.display(), "Asset written");
        Ok(())
    }

    /// Absolute hrefs are used as-is; relative ones are served from public storage.
    fn asset_url(&self, href: &str) -> Result<Url, Error> {
        match Url::parse(href) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(self.public.with_suffix(href)),
            Err(e) => Err(InvalidInputError::Other {
                message: format!("invalid asset href '{href}': {e}"),
            }
            .into()),
        }
    }
}

async fn resolve_local_file(assets_dir: &Path, href: &str, file_name: &str) -> PathBuf {
    let direct = assets_dir.join(href);
    if exists(&direct).await {
        direct
    } else {
        assets_dir.join(file_name)
    }
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn local_error(asset_key: &str, path: &Path, source: std::io::Error) -> Error {
    TransferError::LocalFile {
        asset_key: asset_key.to_string(),
        path: path.to_path_buf(),
        source,
    }
    .into()
}

/// Attach the asset key to errors that don't carry it yet.
fn asset_error(job: &TransferJob, error: Error) -> Error {
    match error {
        Error::Transfer(_) => error,
        other => TransferError::Asset {
            asset_key: job.asset_key.clone(),
            source: Box::new(other),
        }
        .into(),
    }
}

fn wrong_direction(job: &TransferJob) -> Error {
    InvalidInputError::Other {
        message: format!("asset '{}' was queued for a different operation", job.asset_key),
    }
    .into()
}

/// Record that `key` writes to `destination`, failing if another asset
/// already does.
fn claim_destination(
    claimed: &mut HashMap<String, String>,
    key: &str,
    destination: String,
) -> Result<(), Error> {
    if let Some(first) = claimed.get(&destination) {
        return Err(TransferError::DuplicateDestination {
            first: first.clone(),
            second: key.to_string(),
            destination,
        }
        .into());
    }
    claimed.insert(destination, key.to_string());
    Ok(())
}

//! Content types for uploaded files.

use std::path::Path;

const FALLBACK: &str = "application/octet-stream";

/// Guess a content type from the file extension.
pub fn guess_content_type(path: &Path) -> &'static str {
    let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
        return FALLBACK;
    };

    match extension.to_ascii_lowercase().as_str() {
        "tif" | "tiff" => "image/tiff",
        "jp2" => "image/jp2",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "json" => "application/json",
        "geojson" => "application/geo+json",
        "xml" => "application/xml",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "html" => "text/html",
        "nc" => "application/x-netcdf",
        "h5" | "hdf5" => "application/x-hdf5",
        "zarr" => "application/vnd+zarr",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "parquet" => "application/vnd.apache.parquet",
        _ => FALLBACK,
    }
}

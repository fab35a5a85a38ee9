//! Search command implementation.

use anyhow::{Context as _, Result};
use clap::Args;
use futures_util::StreamExt;
use geocat::SearchRequest;
use geocat::search::DEFAULT_PAGE_SIZE;

use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Restrict to a collection (repeatable)
    #[arg(long = "collection")]
    pub collections: Vec<String>,

    /// Restrict to an item id (repeatable)
    #[arg(long = "id")]
    pub ids: Vec<String>,

    /// Bounding box as west,south,east,north
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub bbox: Option<[f64; 4]>,

    /// Single datetime or interval, e.g. 2024-01-01T00:00:00Z/..
    #[arg(long)]
    pub datetime: Option<String>,

    /// Restrict to a project
    #[arg(long)]
    pub project: Option<String>,

    /// Stop after this many features
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Features requested per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Pretty-print each feature
    #[arg(long)]
    pub pretty: bool,
}

pub async fn run(ctx: &Context, args: SearchArgs) -> Result<()> {
    let catalog = ctx.catalog().await?;

    let mut request = SearchRequest::new();
    for collection in args.collections {
        request = request.collection(collection);
    }
    for id in args.ids {
        request = request.id(id);
    }
    if let Some(bbox) = args.bbox {
        request = request.bbox(bbox);
    }
    if let Some(datetime) = args.datetime {
        request = request.datetime(datetime);
    }
    if let Some(project) = args.project {
        request = request.project(project);
    }

    let mut search = catalog.search(&request)?.page_size(args.page_size);
    if let Some(limit) = args.limit {
        search = search.max_items(limit);
    }

    let mut features = search.stream();
    while let Some(feature) = features.next().await {
        let feature = feature.context("Search failed")?;
        if args.pretty {
            output::json_pretty(&feature)?;
        } else {
            output::json(&feature)?;
        }
    }

    Ok(())
}

fn parse_bbox(value: &str) -> Result<[f64; 4], String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid coordinate: {e}"))?;

    <[f64; 4]>::try_from(parts)
        .map_err(|parts| format!("expected 4 coordinates, got {}", parts.len()))
}

//! Pagination links and cursor extraction.

use serde::Deserialize;
use tracing::debug;
use url::Url;

/// A `{rel, href}` link object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub rel: String,
    #[serde(default)]
    pub href: String,
}

/// Returns the href of the `next` link, if any.
pub(crate) fn next_href(links: &[Link]) -> Option<&str> {
    links
        .iter()
        .find(|link| link.rel == "next")
        .map(|link| link.href.as_str())
}

/// Pull the `cursor` query parameter out of a next-link href.
///
/// Relative hrefs are resolved against `base`; percent-encoded values are
/// decoded. A link that cannot be parsed or has no usable cursor yields
/// `None`, which callers treat as the last page.
pub(crate) fn extract_cursor(base: &Url, href: &str) -> Option<String> {
    let url = match base.join(href) {
        Ok(url) => url,
        Err(e) => {
            debug!(href, error = %e, "Unparsable next link, treating as last page");
            return None;
        }
    };

    let cursor = url
        .query_pairs()
        .find(|(key, _)| key == "cursor")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty());

    if cursor.is_none() {
        debug!(href, "Next link carries no cursor, treating as last page");
    }
    cursor
}

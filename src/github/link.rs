//! `Link` header parsing.
//!
//! GitHub paginates list endpoints and announces the page range in a header like
//!
//! ```text
//! Link: <https://api.github.com/repositories/2325298/pulls?page=2>; rel="next", <https://api.github.com/repositories/2325298/pulls?page=11>; rel="last"
//! ```
//!
//! Only the `last` relation matters here: it tells how many pages exist.

use regex::Regex;
use std::sync::LazyLock;

static LINK_ENTRY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^<?(?P<url>[^>]*)>;\s*rel="(?P<rel>[^"]*)"$"#).ok());

/// Return the URL of the `last` relation in a `Link` header value.
///
/// `None` for a missing or blank header, a header without a `last` entry, or
/// an entry that does not follow `<url>; rel="name"`.
pub fn last_rel(link_header: Option<&str>) -> Option<String> {
    let header = link_header.filter(|h| !h.trim().is_empty())?;
    let pattern = LINK_ENTRY.as_ref()?;

    for entry in header.split(',') {
        if let Some(caps) = pattern.captures(entry.trim()) {
            if caps["rel"].contains("last") {
                return Some(caps["url"].to_string());
            }
        }
    }

    tracing::debug!(link = header, "no 'last' rel in Link header value");
    None
}

/// Return the `page` query parameter of the `last` relation.
///
/// Relative URLs are accepted; only the query string is inspected.
pub fn last_page(link_header: Option<&str>) -> Option<u32> {
    let url = last_rel(link_header)?;
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();

    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse::<u32>().ok())
}

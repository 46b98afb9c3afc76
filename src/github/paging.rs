//! Paged list results.

use super::link;

/// One page of a paginated list plus the page range it belongs to
///
/// `page <= max_pages` always holds. A resource that does not exist is
/// reported as [`PagedResult::empty`] (`page = max_pages = 1`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PagedResult<T> {
    /// Items on this page, in provider order
    pub items: Vec<T>,
    /// The page these items belong to (1-based)
    pub page: u32,
    /// Total number of pages
    pub max_pages: u32,
}

impl<T> PagedResult<T> {
    /// Build a page from the response items and the response's `Link` header.
    ///
    /// Without a usable `last` relation the current page is assumed to be the
    /// last one, so a result fetched at page 3 without a hint reports 3 pages.
    pub fn from_link_header(items: Vec<T>, page: u32, link_header: Option<&str>) -> Self {
        let page = page.max(1);
        let max_pages = link::last_page(link_header).unwrap_or(page).max(page);
        Self {
            items,
            page,
            max_pages,
        }
    }

    /// Empty single-page result
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            page: 1,
            max_pages: 1,
        }
    }

    /// Whether another page follows this one
    pub fn has_next(&self) -> bool {
        self.page < self.max_pages
    }
}

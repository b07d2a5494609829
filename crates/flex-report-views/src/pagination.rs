//! Pagination of report rows.
//!
//! A [`Paginator`] splits a row count into pages; the report view asks it for
//! the offset and limit of one page so that only that slice of the composed
//! queryset is fetched. Page numbers and sizes come from the query string via
//! [`PageRequest`], which never fails: a size outside the allowed list falls
//! back to the first allowed size and a missing or malformed page number to
//! page 1.
//!
//! # Examples
//!
//! ```
//! use flex_report_views::pagination::Paginator;
//!
//! let paginator = Paginator::new(230, 100);
//! assert_eq!(paginator.num_pages(), 3);
//! assert_eq!(paginator.bounds(3).unwrap(), (200, 100));
//! assert!(paginator.bounds(4).is_err());
//! ```

use std::fmt;
use std::ops::RangeInclusive;

use flex_report_http::QueryDict;
use serde::Serialize;

/// Errors that can occur during pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationError {
    /// The requested page is past the last page.
    EmptyPage,
    /// The page number is invalid (zero).
    InvalidPage(String),
}

impl fmt::Display for PaginationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPage => write!(f, "That page contains no results"),
            Self::InvalidPage(msg) => write!(f, "Invalid page: {msg}"),
        }
    }
}

impl std::error::Error for PaginationError {}

/// Splits a number of rows into pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    count: usize,
    per_page: usize,
    allow_empty_first_page: bool,
}

impl Paginator {
    /// Creates a paginator over `count` rows; `per_page` is at least 1.
    pub fn new(count: usize, per_page: usize) -> Self {
        Self {
            count,
            per_page: per_page.max(1),
            allow_empty_first_page: true,
        }
    }

    /// Sets whether an empty result still has a first page.
    #[must_use]
    pub const fn allow_empty_first_page(mut self, allow: bool) -> Self {
        self.allow_empty_first_page = allow;
        self
    }

    pub const fn count(&self) -> usize {
        self.count
    }

    pub const fn per_page(&self) -> usize {
        self.per_page
    }

    /// Returns the total number of pages.
    pub fn num_pages(&self) -> usize {
        if self.count == 0 {
            return usize::from(self.allow_empty_first_page);
        }
        self.count.div_ceil(self.per_page)
    }

    /// Returns the range of valid page numbers (1-indexed, inclusive).
    pub fn page_range(&self) -> RangeInclusive<usize> {
        1..=self.num_pages()
    }

    /// Checks that `number` names an existing page.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPage` for page 0 and `EmptyPage` past the last page.
    pub fn validate_number(&self, number: usize) -> Result<usize, PaginationError> {
        if number == 0 {
            return Err(PaginationError::InvalidPage("Page number must be >= 1".to_string()));
        }
        if number > self.num_pages() {
            return Err(PaginationError::EmptyPage);
        }
        Ok(number)
    }

    /// Returns the `(offset, limit)` of the rows on page `number`.
    ///
    /// # Errors
    ///
    /// Fails like [`validate_number`](Self::validate_number).
    pub fn bounds(&self, number: usize) -> Result<(usize, usize), PaginationError> {
        let number = self.validate_number(number)?;
        Ok(((number - 1) * self.per_page, self.per_page))
    }

    /// Returns the bounds of page `number`, or of page 1 when it does not exist.
    pub fn bounds_or_first(&self, number: usize) -> (usize, (usize, usize)) {
        match self.bounds(number) {
            Ok(bounds) => (number, bounds),
            Err(e) => {
                tracing::debug!(number, error = %e, "page out of range; showing page 1");
                (1, (0, self.per_page))
            }
        }
    }

    /// Wraps the fetched rows of page `number`.
    pub fn page<T>(&self, number: usize, object_list: Vec<T>) -> Page<T> {
        Page {
            object_list,
            number,
            num_pages: self.num_pages(),
            per_page: self.per_page,
        }
    }
}

/// A single page of rows.
#[derive(Debug, Clone)]
#[allow(clippy::struct_field_names)]
pub struct Page<T> {
    object_list: Vec<T>,
    number: usize,
    num_pages: usize,
    per_page: usize,
}

impl<T> Page<T> {
    /// Returns the rows on this page.
    pub fn object_list(&self) -> &[T] {
        &self.object_list
    }

    pub fn into_object_list(self) -> Vec<T> {
        self.object_list
    }

    /// Returns the 1-based page number.
    pub const fn number(&self) -> usize {
        self.number
    }

    pub const fn num_pages(&self) -> usize {
        self.num_pages
    }

    pub const fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub const fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn next_page_number(&self) -> Option<usize> {
        self.has_next().then_some(self.number + 1)
    }

    pub fn previous_page_number(&self) -> Option<usize> {
        self.has_previous().then(|| self.number - 1)
    }

    /// Returns the 1-based index of the first row on this page, 0 when empty.
    pub fn start_index(&self) -> usize {
        if self.object_list.is_empty() {
            return 0;
        }
        (self.number - 1) * self.per_page + 1
    }

    /// Returns the 1-based index of the last row on this page, 0 when empty.
    pub fn end_index(&self) -> usize {
        if self.object_list.is_empty() {
            return 0;
        }
        self.start_index() + self.object_list.len() - 1
    }
}

/// The query parameter names of a paginated view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageKeywords {
    pub page: &'static str,
    pub per_page: &'static str,
}

impl PageKeywords {
    /// `report_page` and `report_per_page`, used by report pages.
    pub const REPORT: Self = Self {
        page: "report_page",
        per_page: "report_per_page",
    };
}

impl Default for PageKeywords {
    fn default() -> Self {
        Self {
            page: "page",
            per_page: "per_page",
        }
    }
}

/// The page a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: usize,
    pub per_page: usize,
}

impl PageRequest {
    /// Reads the page number and size from `query`.
    ///
    /// ```
    /// use flex_report_http::QueryDict;
    /// use flex_report_views::pagination::{PageKeywords, PageRequest};
    ///
    /// let sizes = [25, 75, 100, 200];
    /// let query = QueryDict::parse("page=3&per_page=999");
    /// let request = PageRequest::from_query(&query, PageKeywords::default(), &sizes);
    /// assert_eq!(request, PageRequest { number: 3, per_page: 25 });
    /// ```
    pub fn from_query(query: &QueryDict, keywords: PageKeywords, page_sizes: &[usize]) -> Self {
        let default_size = page_sizes.first().copied().unwrap_or(25);
        let per_page = query
            .get(keywords.per_page)
            .and_then(|p| p.trim().parse::<usize>().ok())
            .filter(|p| page_sizes.contains(p))
            .unwrap_or(default_size);
        let number = query
            .get(keywords.page)
            .and_then(|p| p.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1);
        Self { number, per_page }
    }
}

/// Page numbers to show around `current`, at most five.
///
/// ```
/// use flex_report_views::pagination::get_centered_range;
///
/// assert_eq!(get_centered_range(1, 10), 1..=5);
/// assert_eq!(get_centered_range(6, 10), 4..=8);
/// assert_eq!(get_centered_range(9, 10), 6..=10);
/// assert_eq!(get_centered_range(2, 3), 1..=3);
/// ```
pub fn get_centered_range(current: usize, num_pages: usize) -> RangeInclusive<usize> {
    const MAX_SHOWN: usize = 5;
    let half = MAX_SHOWN / 2;
    let half_ceil = MAX_SHOWN.div_ceil(2);
    let current = current.clamp(1, num_pages.max(1));

    if current < half_ceil && half_ceil < num_pages {
        1..=num_pages.min(MAX_SHOWN)
    } else if current.abs_diff(num_pages) >= half_ceil {
        current.saturating_sub(half).max(1)..=current + half
    } else if num_pages > MAX_SHOWN {
        num_pages - MAX_SHOWN + 1..=num_pages
    } else {
        1..=num_pages
    }
}

/// Re-encodes `query` with `overrides` replacing their keys.
///
/// ```
/// use flex_report_http::QueryDict;
/// use flex_report_views::pagination::query_transform;
///
/// let query = QueryDict::parse("status=s&report_page=2");
/// assert_eq!(query_transform(&query, [("report_page", "3".to_string())]), "status=s&report_page=3");
/// ```
pub fn query_transform<'k>(query: &QueryDict, overrides: impl IntoIterator<Item = (&'k str, String)>) -> String {
    let mut updated = query.copy();
    for (key, value) in overrides {
        // copies are always mutable
        let _ = updated.set(key, &value);
    }
    updated.urlencode()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Paginator ───────────────────────────────────────────────────

    #[test]
    fn test_paginator_num_pages() {
        assert_eq!(Paginator::new(100, 10).num_pages(), 10);
        assert_eq!(Paginator::new(23, 10).num_pages(), 3);
        assert_eq!(Paginator::new(5, 100).num_pages(), 1);
        assert_eq!(Paginator::new(30, 10).page_range(), 1..=3);
    }

    #[test]
    fn test_paginator_empty() {
        let paginator = Paginator::new(0, 25);
        assert_eq!(paginator.num_pages(), 1);
        assert_eq!(paginator.bounds(1), Ok((0, 25)));

        let strict = Paginator::new(0, 25).allow_empty_first_page(false);
        assert_eq!(strict.num_pages(), 0);
        assert_eq!(strict.bounds(1), Err(PaginationError::EmptyPage));
    }

    #[test]
    fn test_paginator_bounds() {
        let paginator = Paginator::new(25, 10);
        assert_eq!(paginator.bounds(1), Ok((0, 10)));
        assert_eq!(paginator.bounds(3), Ok((20, 10)));
        assert!(matches!(paginator.bounds(0), Err(PaginationError::InvalidPage(_))));
        assert_eq!(paginator.bounds(4), Err(PaginationError::EmptyPage));
    }

    #[test]
    fn test_out_of_range_page_falls_back_to_first() {
        let paginator = Paginator::new(60, 25);
        assert_eq!(paginator.num_pages(), 3);
        assert_eq!(paginator.bounds_or_first(9999), (1, (0, 25)));
        assert_eq!(paginator.bounds_or_first(2), (2, (25, 25)));
    }

    #[test]
    fn test_per_page_zero_clamped() {
        let paginator = Paginator::new(5, 0);
        assert_eq!(paginator.per_page(), 1);
        assert_eq!(paginator.num_pages(), 5);
    }

    // ── Page ────────────────────────────────────────────────────────

    #[test]
    fn test_page_navigation() {
        let paginator = Paginator::new(30, 10);
        let first = paginator.page(1, (1..=10).collect::<Vec<_>>());
        assert!(first.has_next());
        assert!(!first.has_previous());
        assert_eq!(first.next_page_number(), Some(2));
        assert_eq!(first.previous_page_number(), None);

        let last = paginator.page(3, (21..=30).collect::<Vec<_>>());
        assert!(!last.has_next());
        assert_eq!(last.previous_page_number(), Some(2));
    }

    #[test]
    fn test_page_indexes() {
        let paginator = Paginator::new(25, 10);
        let page = paginator.page(3, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.start_index(), 21);
        assert_eq!(page.end_index(), 25);
        let empty = Paginator::new(0, 10).page(1, Vec::<i32>::new());
        assert_eq!(empty.start_index(), 0);
        assert_eq!(empty.end_index(), 0);
    }

    // ── PageRequest ─────────────────────────────────────────────────

    #[test]
    fn test_page_request_sizes() {
        let sizes = [25, 75, 100, 200];
        let read = |qs: &str| PageRequest::from_query(&QueryDict::parse(qs), PageKeywords::REPORT, &sizes);
        assert_eq!(read(""), PageRequest { number: 1, per_page: 25 });
        assert_eq!(read("report_per_page=75&report_page=2").per_page, 75);
        assert_eq!(read("report_per_page=999").per_page, 25);
        assert_eq!(read("report_per_page=abc").per_page, 25);
        assert_eq!(read("report_page=2").number, 2);
        assert_eq!(read("report_page=0").number, 1);
        assert_eq!(read("report_page=two").number, 1);
        assert_eq!(read("page=5").number, 1);
    }

    // ── Helpers ─────────────────────────────────────────────────────

    #[test]
    fn test_centered_range() {
        assert_eq!(get_centered_range(1, 1), 1..=1);
        assert_eq!(get_centered_range(1, 4), 1..=4);
        assert_eq!(get_centered_range(2, 10), 1..=5);
        assert_eq!(get_centered_range(3, 10), 1..=5);
        assert_eq!(get_centered_range(4, 10), 2..=6);
        assert_eq!(get_centered_range(8, 10), 6..=10);
        assert_eq!(get_centered_range(10, 10), 6..=10);
        assert_eq!(get_centered_range(3, 5), 1..=5);
        assert_eq!(get_centered_range(50, 3), 1..=3);
        for (current, pages) in [(1, 1), (5, 7), (7, 7), (12, 40)] {
            assert!(get_centered_range(current, pages).count() <= 5);
        }
    }

    #[test]
    fn test_query_transform_replaces_and_appends() {
        let query = QueryDict::parse("tags__in=1&tags__in=2&report_page=2");
        assert_eq!(
            query_transform(
                &query,
                [("report_page", "1".to_string()), ("report_per_page", "75".to_string())]
            ),
            "tags__in=1&tags__in=2&report_page=1&report_per_page=75"
        );
        assert_eq!(query_transform(&QueryDict::new(), []), "");
    }

    #[test]
    fn test_pagination_error_display() {
        assert_eq!(PaginationError::EmptyPage.to_string(), "That page contains no results");
        assert_eq!(PaginationError::InvalidPage("bad".into()).to_string(), "Invalid page: bad");
    }
}

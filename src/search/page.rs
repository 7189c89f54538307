//! Cursor based pagination.
//!
//! A cursor is the decimal offset of the first item of the next page. Pages are cut from a
//! deterministically ordered result list, so walking the cursors of consecutive pages yields
//! exactly the items of one unlimited pass.

use serde::{Deserialize, Serialize};

use crate::{
    config::{AnalyzerConfig, PAGE_SIZE_CEILING},
    Error::InvalidArgument,
    Result,
};

/// Paging parameters of a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    /// Maximum number of items, the configured default when unset
    pub limit: Option<u32>,
    /// Continuation cursor of a previous page, the first page when unset
    pub cursor: Option<String>,
}

impl PageRequest {
    /// The first page of at most `limit` items
    #[must_use]
    pub fn first(limit: u32) -> Self {
        PageRequest {
            limit: Some(limit),
            cursor: None,
        }
    }

    /// The page following `cursor`
    #[must_use]
    pub fn after(limit: u32, cursor: impl Into<String>) -> Self {
        PageRequest {
            limit: Some(limit),
            cursor: Some(cursor.into()),
        }
    }
}

/// A validated request: offset and effective limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub offset: usize,
    pub limit: usize,
}

impl Window {
    /// Validates `request` against the page size limits of `config`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] for a zero limit or a cursor that is not a
    /// decimal offset.
    pub fn new(request: &PageRequest, config: &AnalyzerConfig) -> Result<Window> {
        let limit = request.limit.unwrap_or(config.default_page_size);
        if limit == 0 {
            return Err(InvalidArgument("page limit must be at least 1".to_string()));
        }

        let offset = match request.cursor.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| InvalidArgument(format!("invalid cursor '{cursor}'")))?,
        };

        Ok(Window {
            offset,
            limit: limit.min(config.max_page_size.clamp(1, PAGE_SIZE_CEILING)) as usize,
        })
    }

    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.limit)
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// The items of this page
    pub items: Vec<T>,
    /// Cursor of the next page, `None` exactly when `has_more` is false
    pub next_cursor: Option<String>,
    /// Whether another page may follow
    pub has_more: bool,
    /// Number of matching items known so far
    pub total_count: usize,
    /// Whether `total_count` is final
    pub total_is_exact: bool,
    /// Whether the underlying scan finished; only incremental scans report `false`
    pub scan_complete: bool,
}

impl<T> Page<T> {
    fn cut(items: Vec<T>, total_count: usize, window: Window, complete: bool) -> Page<T> {
        if !complete {
            // the cursor points right after the returned items, so a caller that keeps
            // following it resumes the scan until the result is complete
            return Page {
                next_cursor: Some((window.offset + items.len()).to_string()),
                items,
                has_more: true,
                total_count,
                total_is_exact: false,
                scan_complete: false,
            };
        }

        let has_more = items.len() == window.limit && window.end() < total_count;
        Page {
            next_cursor: has_more.then(|| window.end().to_string()),
            items,
            has_more,
            total_count,
            total_is_exact: true,
            scan_complete: true,
        }
    }

    /// Cuts a page out of a complete, ordered result list
    pub(crate) fn complete(items: Vec<T>, window: Window) -> Page<T> {
        let total_count = items.len();
        let items = items
            .into_iter()
            .skip(window.offset)
            .take(window.limit)
            .collect();
        Self::cut(items, total_count, window, true)
    }

    /// Cuts a page out of the results an incremental scan has produced so far
    pub(crate) fn scanned(found: &[T], window: Window, complete: bool) -> Page<T>
    where
        T: Clone,
    {
        let items = found
            .iter()
            .skip(window.offset)
            .take(window.limit)
            .cloned()
            .collect();
        Self::cut(items, found.len(), window, complete)
    }

    /// Converts the items, keeping the paging state
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
            has_more: self.has_more,
            total_count: self.total_count,
            total_is_exact: self.total_is_exact,
            scan_complete: self.scan_complete,
        }
    }

    /// Number of items on this page
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the page holds no items
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

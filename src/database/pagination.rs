use serde::{Deserialize, Serialize};

use crate::constants::MAX_PAGE_SIZE;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    /// `total_rows` comes from a `COUNT(*) OVER()` column, or from a separate
    /// count when the requested page is past the end.
    pub fn from_rows(rows: Vec<T>, total_rows: i64, page_size: i64, current_offset: i64) -> Self {
        if total_rows <= 0 {
            return Self::no_rows();
        }
        let current_page = current_offset / page_size + 1;
        let last_page = (total_rows - 1) / page_size + 1;

        Self {
            results: rows,
            count: total_rows,
            next: (current_offset.saturating_add(page_size) < total_rows)
                .then_some(current_page + 1),
            previous: (current_page > 1).then_some((current_page - 1).min(last_page)),
        }
    }

    pub fn no_rows() -> Self {
        Self {
            results: vec![],
            count: 0,
            next: None,
            previous: None,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageContext<U> {
        PageContext {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, Default)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn page_size(&self, default: i64) -> i64 {
        self.limit
            .filter(|limit| *limit > 0)
            .unwrap_or(default)
            .min(MAX_PAGE_SIZE)
    }

    /// Saturates, so an absurd `page` reads past the end instead of wrapping.
    pub fn offset(&self, page_size: i64) -> i64 {
        (self.page.unwrap_or(1).max(1) - 1).saturating_mul(page_size)
    }
}

/// Window totals vanish with the rows, so an empty page past the start needs
/// its own count to report the real total.
pub fn needs_recount<R>(rows: &[R], offset: i64) -> bool {
    rows.is_empty() && offset > 0
}

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, PAGE_QUERY_PARAM, PAGE_SIZE_QUERY_PARAM,
};

/// Page-number pagination; `limit` overrides the page size.
#[derive(Deserialize, Debug, Clone, Copy, Default)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.page_size())
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn from_rows(rows: Vec<T>, total_rows: i64, params: &PageParams, path: &str) -> Self {
        let page = params.page();
        let page_size = params.page_size();

        let link = |n: i64| {
            format!("{path}?{PAGE_QUERY_PARAM}={n}&{PAGE_SIZE_QUERY_PARAM}={page_size}")
        };

        let next = if page.saturating_mul(page_size) < total_rows {
            Some(link(page + 1))
        } else {
            None
        };
        let previous = if page > 1 { Some(link(page - 1)) } else { None };

        Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

use serde::Serialize;

/// Page size of the public article listing.
pub const ARTICLES_PER_PAGE: u32 = 10;
/// Default page size of the personalized feed.
pub const FEED_PER_PAGE: u32 = 15;
pub const MAX_PER_PAGE: u32 = 100;

/// A 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    /// Build a request from raw query values. Missing, zero or
    /// non-numeric values fall back to page 1 and `default_per_page`.
    pub fn parse(page: Option<&str>, per_page: Option<&str>, default_per_page: u32) -> Self {
        let page = page.and_then(|p| p.trim().parse().ok()).unwrap_or(1);
        let per_page = per_page
            .and_then(|p| p.trim().parse().ok())
            .filter(|p| *p > 0)
            .unwrap_or(default_per_page);
        Self::new(page, per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

/// Everything a client needs to render pager controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub per_page: u32,
    pub current_page: u32,
    pub last_page: i64,
    pub from: Option<i64>,
    pub to: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        let per_page = i64::from(request.per_page);
        let last_page = ((total + per_page - 1) / per_page).max(1);
        let (from, to) = if items.is_empty() {
            (None, None)
        } else {
            let first = request.offset() + 1;
            (Some(first), Some(first + items.len() as i64 - 1))
        };

        Self {
            items,
            meta: PageMeta {
                total,
                per_page: request.per_page,
                current_page: request.page,
                last_page,
                from,
                to,
            },
        }
    }
}

use chrono::NaiveDate;

use crate::db_types::ExceptionStep;

/// The result of inserting an order. Order numbers are unique, so inserting an order that already exists never
/// overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOrderResult {
    Inserted(i64),
    AlreadyExists(i64),
}

/// A page request for paged queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Pagination {
    /// Page numbers are 1-based. A page number of zero is treated as the first page.
    pub fn page(page: usize, size: usize) -> Self {
        let size = size.max(1);
        Self { offset: page.saturating_sub(1) * size, limit: size }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { offset: 0, limit: 100 }
    }
}

/// One page of a paged query, along with the total number of records that match the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: Pagination) -> Self {
        Self { items, total, offset: page.offset, limit: page.limit }
    }

    /// True if there are matching records beyond this page.
    pub fn has_more(&self) -> bool {
        ((self.offset + self.items.len()) as u64) < self.total
    }
}

/// Criteria for listing exceptions. Empty criteria match every exception. The date range is inclusive and applies to
/// the date the exception was raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionQueryFilter {
    pub merchant_id: Option<String>,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub step: Option<ExceptionStep>,
}

impl ExceptionQueryFilter {
    pub fn with_merchant_id<S: Into<String>>(mut self, merchant_id: S) -> Self {
        self.merchant_id = Some(merchant_id.into());
        self
    }

    pub fn with_date_range(mut self, since: NaiveDate, until: NaiveDate) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn with_step(mut self, step: ExceptionStep) -> Self {
        self.step = Some(step);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.merchant_id.is_none() && self.since.is_none() && self.until.is_none() && self.step.is_none()
    }

    /// Checks a single exception against the criteria.
    pub fn matches(&self, merchant_id: &str, raised_on: NaiveDate, step: ExceptionStep) -> bool {
        self.merchant_id.as_deref().map_or(true, |m| m == merchant_id)
            && self.since.map_or(true, |d| raised_on >= d)
            && self.until.map_or(true, |d| raised_on <= d)
            && self.step.map_or(true, |s| s == step)
    }
}

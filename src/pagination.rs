//! Page limits and page results.

use crate::config::{EngineConfig, DEFAULT_PAGE_LIMIT};
use crate::sort::{Cursor, Sorts};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaginationLimit(u32);

impl Default for PaginationLimit {
    fn default() -> Self {
        PaginationLimit(DEFAULT_PAGE_LIMIT)
    }
}

impl PaginationLimit {
    pub fn new(limit: u32) -> Self {
        PaginationLimit(limit)
    }

    /// Requested limit, or the configured default, capped at the configured maximum.
    pub fn from_query(requested: Option<u32>, config: &EngineConfig) -> Self {
        PaginationLimit(requested.unwrap_or(config.default_limit).min(config.max_limit))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaginationMeta {
    pub total: u64,
    pub next: Option<Cursor>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Paginated<E> {
    pub items: Vec<E>,
    pub meta: PaginationMeta,
}

/// Trim `rows` (fetched with `limit + 1`) to the page and take the next cursor from the
/// overflow row, which is the first row of the following page.
pub fn paginate<E: crate::entity::Entity>(
    mut rows: Vec<E>,
    limit: PaginationLimit,
    sorts: &Sorts<E>,
) -> (Vec<E>, Option<Cursor>) {
    let limit = limit.get() as usize;
    if limit == 0 {
        return (Vec::new(), None);
    }
    if rows.len() <= limit {
        return (rows, None);
    }
    // Without sort keys there is nothing to resume from.
    let next = (!sorts.is_empty()).then(|| sorts.next_cursor(&rows[limit]));
    rows.truncate(limit);
    (rows, next)
}

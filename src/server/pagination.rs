//! Limit/offset paging for list endpoints.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: usize,
}

fn parse_param(q: &HashMap<String, String>, key: &str) -> AppResult<Option<usize>> {
    match q.get(key) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| AppError::user("invalid_pagination".to_string(), format!("{key} must be a non-negative integer"))),
    }
}

impl PageParams {
    pub fn from_query(q: &HashMap<String, String>) -> AppResult<Self> {
        let limit = parse_param(q, "limit")?;
        if limit == Some(0) {
            return Err(AppError::user("invalid_pagination", "limit must be positive"));
        }
        Ok(Self { limit, offset: parse_param(q, "offset")?.unwrap_or(0) })
    }
}

/// Slice an already-filtered, ordered listing.
pub fn paginate<T>(items: Vec<T>, params: PageParams) -> Page<T> {
    let count = items.len();
    let Some(limit) = params.limit else {
        return Page { count, next: None, previous: None, results: items.into_iter().skip(params.offset).collect() };
    };
    let offset = params.offset.min(count);
    let end = offset.saturating_add(limit);
    let next = (end < count).then(|| format!("?limit={limit}&offset={end}"));
    let previous = (offset > 0).then(|| format!("?limit={limit}&offset={}", offset.saturating_sub(limit)));
    let results = items.into_iter().skip(offset).take(limit.min(count)).collect();
    Page { count, next, previous, results }
}

use std::collections::HashMap;

use serde::Serialize;

use super::ApiError;
use crate::config::PaginationConfig;

/// `meta` block of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub limit: u64,
    pub offset: u64,
    pub total_count: u64,
    pub previous: Option<String>,
    pub next: Option<String>,
}

/// Limit/offset pagination read from the query string.
#[derive(Debug, Clone)]
pub struct Paginator {
    resource_uri: String,
    limit: u64,
    offset: u64,
}

impl Paginator {
    /// `limit=0` means the configured maximum; larger limits are capped to it.
    pub fn from_query(
        query: &HashMap<String, String>,
        resource_uri: impl Into<String>,
        config: &PaginationConfig,
    ) -> Result<Self, ApiError> {
        let limit = match query.get("limit") {
            Some(value) => parse_non_negative("limit", value)?,
            None => config.default_limit,
        };
        let limit = if limit == 0 {
            config.max_limit
        } else {
            limit.min(config.max_limit)
        };

        let offset = match query.get("offset") {
            Some(value) => parse_non_negative("offset", value)?,
            None => 0,
        };

        Ok(Self {
            resource_uri: resource_uri.into(),
            limit,
            offset,
        })
    }

    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn meta(&self, total_count: u64) -> PageMeta {
        let previous = (self.offset > 0)
            .then(|| self.page_uri(self.offset.saturating_sub(self.limit)));

        let next_offset = self.offset.saturating_add(self.limit);
        let next = (next_offset < total_count).then(|| self.page_uri(next_offset));

        PageMeta {
            limit: self.limit,
            offset: self.offset,
            total_count,
            previous,
            next,
        }
    }

    fn page_uri(&self, offset: u64) -> String {
        format!("{}?limit={}&offset={}", self.resource_uri, self.limit, offset)
    }
}

/// Values must also fit in an `i64`; SQLite binds limit and offset as signed integers.
fn parse_non_negative(name: &str, value: &str) -> Result<u64, ApiError> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "Invalid {name} '{value}' provided. Please provide a positive integer."
            ))
        })
}

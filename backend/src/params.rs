use serde::Deserialize;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;

// Query values arrive as strings so that `flatten` keeps working with
// `serde_urlencoded`; unparsable values fall back to the defaults.
#[derive(Deserialize, Debug, Default)]
pub struct PaginationParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl PaginationParams {
    pub fn limit(&self) -> i64 {
        self.limit
            .as_ref()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT)
    }
    pub fn offset(&self) -> i64 {
        self.offset
            .as_ref()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0)
            .max(0)
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct SearchParams {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    pub search: Option<String>,
}

impl SearchParams {
    pub fn limit(&self) -> i64 {
        self.pagination.limit()
    }
    pub fn offset(&self) -> i64 {
        self.pagination.offset()
    }
    /// ILIKE pattern for a non-empty search term.
    pub fn pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s))
    }
}

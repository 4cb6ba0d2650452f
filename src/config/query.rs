use std::collections::BTreeMap;

use crate::error::{AppError, Result};

pub const LIMIT_PARAM: &str = "limit";
pub const START_PARAM: &str = "start";
pub const UNLIMITED: &str = "unlimited";

/// Page size selection understood by the ISS API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Limit {
    /// Server default page size, paginated with `start`.
    #[default]
    Paged,
    /// Explicit page size, still paginated with `start`.
    PageSize(u32),
    /// Whole result set in a single response.
    Unlimited,
}

impl Limit {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case(UNLIMITED) {
            return Ok(Limit::Unlimited);
        }
        value.parse::<u32>().map(Limit::PageSize).map_err(|_| {
            AppError::configuration(format!(
                "`limit` must be `unlimited` or a page size, got `{value}`"
            ))
        })
    }

    fn as_param(&self) -> Option<String> {
        match self {
            Limit::Paged => None,
            Limit::PageSize(size) => Some(size.to_string()),
            Limit::Unlimited => Some(UNLIMITED.to_string()),
        }
    }
}

/// Query string for one logical request: the reserved `limit` plus passthrough pairs.
///
/// `start` is owned by the paginated fetcher and can never be set here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub limit: Limit,
    extra: BTreeMap<String, String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unlimited() -> Self {
        Self {
            limit: Limit::Unlimited,
            ..Self::default()
        }
    }

    /// Build from arbitrary pairs, routing `limit` into its typed slot.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.insert(key, value)?;
        }
        Ok(params)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        match key.as_str() {
            LIMIT_PARAM => self.limit = Limit::parse(&value)?,
            START_PARAM => {
                return Err(AppError::configuration(
                    "`start` is managed by the paginated fetcher and cannot be passed through",
                ))
            }
            _ => {
                self.extra.insert(key, value);
            }
        }
        Ok(())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn with_limit(mut self, limit: Limit) -> Self {
        self.limit = limit;
        self
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self.limit, Limit::Unlimited)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    /// Render the query pairs for one page request.
    pub fn to_pairs(&self, start: Option<usize>) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .extra
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if let Some(limit) = self.limit.as_param() {
            pairs.push((LIMIT_PARAM.to_string(), limit));
        }
        if let Some(start) = start {
            pairs.push((START_PARAM.to_string(), start.to_string()));
        }
        pairs
    }
}

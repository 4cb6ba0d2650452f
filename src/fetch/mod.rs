use crate::error::Result;

pub mod block;
pub mod client;
pub mod endpoint;

pub use block::{normalize, parse_response, Block};
pub use client::IssClient;
pub use endpoint::{resolve, IssMethod, PathParams};

/// Board group queried when the caller names none (T+ bonds).
pub const DEFAULT_BOARDGROUP: u32 = 58;

pub type FetchResult<T> = Result<T>;

#[inline]
pub fn ensure_concurrency_limit(limit: usize) -> usize {
    limit.max(1)
}

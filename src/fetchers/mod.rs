// =============================================================================
// fetchers/mod.rs — THE CONTRACT WITH WHOEVER READS THE DOCUMENTS
// =============================================================================
//
// The engine never parses a filing. Something else (an extraction service, a
// test closure) turns "ticker ACME since 2023-01-01" into rows, and this is
// the shape of that conversation.
//
// A fetcher is called from a blocking worker thread. It may block. It must
// take a limiter token before every outbound request it makes, and it should
// skip documents whose dedup key is already in `known_keys`.
// =============================================================================

pub mod http;

use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::FetchError;
use crate::models::Entity;
use crate::rate_limiter::RateLimiter;

pub use http::HttpFetcher;

/// Everything a fetcher needs to fetch one entity.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub entity: Entity,
    /// Earliest filing date of interest.
    pub since: NaiveDate,
    pub limiter: Arc<RateLimiter>,
    /// Dedup keys already stored. Empty on a forced refresh.
    pub known_keys: HashSet<String>,
}

/// Source of candidate filing rows for one family.
pub trait FilingFetcher<F>: Send + Sync {
    /// Rows for one entity. An empty list means "nothing filed", not failure.
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<F>, FetchError>;
}

impl<F, C> FilingFetcher<F> for C
where
    C: Fn(&FetchRequest) -> Result<Vec<F>, FetchError> + Send + Sync,
{
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<F>, FetchError> {
        self(request)
    }
}

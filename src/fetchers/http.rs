// =============================================================================
// fetchers/http.rs — ASKING THE EXTRACTION SERVICE NICELY
// =============================================================================
//
// The production collaborator. Document parsing lives in a separate service;
// we POST it one entity at a time and get back rows in our own record shape:
//
//   POST <base>/<family>/filings
//   {"entity_id": "ACME", "source_id": "0000012345",
//    "since": "2023-01-01", "known_keys": ["0000950170-24-001234", ...]}
//
//   200 → JSON array of records
//   404 → the service has never heard of this entity: no filings
//   429 → slow down
//
// Workers are blocking threads, the HTTP client is async. Each fetcher keeps a
// handle to the runtime that built it and blocks on the request from the
// worker thread. That is fine inside spawn_blocking and would deadlock inside
// an async task, which is why only the orchestrator's workers call it.
// =============================================================================

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use url::Url;

use super::{FetchRequest, FilingFetcher};
use crate::circuit_breaker::CircuitBreaker;
use crate::config::Config;
use crate::error::{FetchError, IngestError, Result};
use crate::store::Filing;

#[derive(Serialize)]
struct FetchBody<'a> {
    entity_id: &'a str,
    source_id: &'a str,
    since: NaiveDate,
    known_keys: Vec<&'a str>,
}

/// Longest error body we carry into a FetchError.
const MAX_ERROR_BODY: usize = 512;

pub struct HttpFetcher<F> {
    client: reqwest::Client,
    endpoint: Url,
    runtime: Handle,
    breaker: CircuitBreaker,
    _family: PhantomData<fn() -> F>,
}

impl<F: Filing + DeserializeOwned> HttpFetcher<F> {
    /// Build a fetcher for `F`'s family. `runtime` must outlive every call.
    pub fn new(config: &Config, runtime: Handle) -> Result<Self> {
        let family = F::SCHEMA.family;
        let base = Url::parse(&config.fetch_base_url).map_err(|e| {
            IngestError::Config(format!("invalid fetch base URL '{}': {e}", config.fetch_base_url))
        })?;
        let endpoint = base
            .join(&format!("{}/filings", family.slug()))
            .map_err(|e| IngestError::Config(format!("cannot build fetch endpoint: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| IngestError::Config(format!("cannot build HTTP client: {e}")))?;

        let breaker = CircuitBreaker::new(format!("extraction:{family}"), config.breaker_policy());

        Ok(Self {
            client,
            endpoint,
            runtime,
            breaker,
            _family: PhantomData,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn post(&self, request: &FetchRequest) -> std::result::Result<Vec<F>, FetchError> {
        let mut known_keys: Vec<&str> = request.known_keys.iter().map(String::as_str).collect();
        known_keys.sort_unstable();
        let body = FetchBody {
            entity_id: &request.entity.entity_id,
            source_id: &request.entity.source_id,
            since: request.since,
            known_keys,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => {
                debug!(entity = %request.entity.entity_id, "Extraction service knows no filings for entity");
                Ok(Vec::new())
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(entity = %request.entity.entity_id, "Extraction service is rate limiting us (HTTP 429)");
                Err(FetchError::RateLimited)
            }
            s if s.is_success() => Ok(response.json::<Vec<F>>().await?),
            s => {
                let mut text = response.text().await.unwrap_or_default();
                if text.len() > MAX_ERROR_BODY {
                    let mut cut = MAX_ERROR_BODY;
                    while !text.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    text.truncate(cut);
                }
                Err(FetchError::Status {
                    status: s.as_u16(),
                    body: text,
                })
            }
        }
    }
}

impl<F: Filing + DeserializeOwned> FilingFetcher<F> for HttpFetcher<F> {
    fn fetch(&self, request: &FetchRequest) -> std::result::Result<Vec<F>, FetchError> {
        let rows = self.breaker.call(|| {
            request.limiter.acquire();
            self.runtime.block_on(self.post(request))
        })?;

        let offered = rows.len();
        let fresh: Vec<F> = rows
            .into_iter()
            .filter(|row| !request.known_keys.contains(&row.known_key()))
            .collect();
        debug!(
            entity = %request.entity.entity_id,
            offered = offered,
            fresh = fresh.len(),
            "Extraction service responded"
        );
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivistStake, InstitutionalHolding};

    fn config(base: &str) -> Config {
        let base = base.to_string();
        Config::from_lookup(move |key| (key == "FILING_ENGINE_FETCH_BASE_URL").then(|| base.clone()))
    }

    #[tokio::test]
    async fn test_endpoint_is_family_scoped() {
        let fetcher =
            HttpFetcher::<ActivistStake>::new(&config("http://extract.local:8088/v1/"), Handle::current())
                .unwrap();
        assert_eq!(fetcher.endpoint().as_str(), "http://extract.local:8088/v1/activist/filings");

        let fetcher =
            HttpFetcher::<InstitutionalHolding>::new(&config("http://extract.local:8088/"), Handle::current())
                .unwrap();
        assert_eq!(fetcher.endpoint().path(), "/holdings/filings");
    }

    #[tokio::test]
    async fn test_invalid_base_url_is_a_config_error() {
        let err = HttpFetcher::<ActivistStake>::new(&config("not a url"), Handle::current())
            .err()
            .unwrap();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_request_body_shape() {
        let body = FetchBody {
            entity_id: "ACME",
            source_id: "0000012345",
            since: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            known_keys: vec!["A1", "A2"],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["since"], "2023-01-01");
        assert_eq!(json["known_keys"], serde_json::json!(["A1", "A2"]));
    }
}

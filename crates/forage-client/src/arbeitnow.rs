//! Arbeitnow job-board API client.
//!
//! Free and unauthenticated: the API returns its whole current board, so
//! term and location filtering happens client-side. No quota metering.

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use url::Url;

use forage_core::{AppError, JobSource, Query, RawListing};

use crate::http::{build_client, check_status, map_transport_error};

const BACKEND: &str = "arbeitnow";
const API_URL: &str = "https://www.arbeitnow.com/api/job-board-api";

/// Job source backed by the free Arbeitnow board API.
#[derive(Clone)]
pub struct ArbeitnowSource {
    client: reqwest::Client,
}

impl ArbeitnowSource {
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            client: build_client()?,
        })
    }

    fn parse_response(
        payload: serde_json::Value,
        query: &Query,
    ) -> Result<Vec<RawListing>, AppError> {
        let response: ArbeitnowResponse =
            serde_json::from_value(payload).map_err(|e| AppError::ContractViolation {
                backend: BACKEND.to_string(),
                detail: format!("unexpected response shape: {e}"),
            })?;

        Ok(response
            .data
            .into_iter()
            .filter(|job| job.matches(query))
            .take(query.max_results)
            .filter_map(|job| job.into_listing())
            .collect())
    }
}

impl JobSource for ArbeitnowSource {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<RawListing>, AppError> {
        let endpoint = Url::parse(API_URL)
            .map_err(|e| AppError::Generic(format!("Invalid Arbeitnow endpoint: {e}")))?;

        tracing::debug!(terms = %query.normalized_terms(), "Querying Arbeitnow");

        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(map_transport_error)?;
        check_status(BACKEND, response.status())?;

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::ContractViolation {
                backend: BACKEND.to_string(),
                detail: format!("response is not JSON: {e}"),
            })?;

        Self::parse_response(payload, query)
    }
}

// -- Response shapes --

#[derive(Deserialize)]
struct ArbeitnowResponse {
    data: Vec<ArbeitnowJob>,
}

#[derive(Deserialize)]
struct ArbeitnowJob {
    slug: Option<String>,
    title: Option<String>,
    company_name: Option<String>,
    location: Option<String>,
    #[serde(default)]
    remote: bool,
    #[serde(default)]
    tags: Vec<String>,
    url: Option<String>,
    description: Option<String>,
    /// Emitted as a unix timestamp by the live API; older payloads used
    /// an ISO string. Both are accepted.
    created_at: Option<serde_json::Value>,
}

impl ArbeitnowJob {
    /// Client-side filter: every query token must appear somewhere in the
    /// title or tags; an empty query matches everything.
    fn matches(&self, query: &Query) -> bool {
        if query.remote_only && !self.remote {
            return false;
        }
        if let Some(location) = &query.location {
            let have = self.location.as_deref().unwrap_or_default().to_lowercase();
            if !have.contains(&location.to_lowercase()) {
                return false;
            }
        }

        let haystack = format!(
            "{} {}",
            self.title.as_deref().unwrap_or_default(),
            self.tags.join(" ")
        )
        .to_lowercase();
        query
            .normalized_terms()
            .split_whitespace()
            .all(|token| haystack.contains(token))
    }

    fn into_listing(self) -> Option<RawListing> {
        let title = self.title.filter(|t| !t.is_empty())?;
        let url = self.url.filter(|u| !u.is_empty())?;

        let posted = self.created_at.as_ref().and_then(parse_created_at);

        Some(RawListing {
            source_id: self.slug.filter(|s| !s.is_empty()),
            title,
            company: self.company_name.unwrap_or_default(),
            location: self.location.filter(|l| !l.is_empty()),
            // Arbeitnow doesn't publish salary data.
            salary: None,
            url,
            tags: self.tags,
            posted,
            description: self.description.filter(|d| !d.is_empty()),
            remote: self.remote,
        })
    }
}

fn parse_created_at(value: &serde_json::Value) -> Option<NaiveDate> {
    match value {
        serde_json::Value::Number(n) => {
            DateTime::from_timestamp(n.as_i64()?, 0).map(|dt| dt.date_naive())
        }
        serde_json::Value::String(s) => NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok(),
        _ => None,
    }
}

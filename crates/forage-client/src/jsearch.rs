//! JSearch (RapidAPI) client.
//!
//! JSearch aggregates LinkedIn, Glassdoor, and Indeed postings. Its free
//! tier is strictly metered, so it sits behind Adzuna in the fallback
//! chain and the orchestrator spends its quota only where the registry
//! and priority gating allow.

use chrono::DateTime;
use serde::Deserialize;
use url::Url;

use forage_core::{AppError, Credentials, JobSource, Query, RawListing};

use crate::http::{build_client, check_status, map_transport_error, value_to_string};

const BACKEND: &str = "jsearch";
const API_HOST: &str = "jsearch.p.rapidapi.com";

/// Credential name looked up in the configuration.
pub const RAPIDAPI_KEY: &str = "RAPIDAPI_KEY";

/// Job source backed by the JSearch API on RapidAPI.
#[derive(Debug, Clone)]
pub struct JSearchSource {
    client: reqwest::Client,
    api_key: String,
}

impl JSearchSource {
    pub fn new(credentials: &Credentials) -> Result<Self, AppError> {
        let Some(api_key) = credentials.get(RAPIDAPI_KEY) else {
            return Err(AppError::MissingCredentials {
                backend: BACKEND.to_string(),
                missing: vec![RAPIDAPI_KEY.to_string()],
            });
        };

        Ok(Self {
            client: build_client()?,
            api_key: api_key.to_string(),
        })
    }

    fn parse_response(
        payload: serde_json::Value,
        max_results: usize,
    ) -> Result<Vec<RawListing>, AppError> {
        let response: JSearchResponse =
            serde_json::from_value(payload).map_err(|e| AppError::ContractViolation {
                backend: BACKEND.to_string(),
                detail: format!("unexpected response shape: {e}"),
            })?;

        if response.status.as_deref() != Some("OK") {
            return Err(AppError::ContractViolation {
                backend: BACKEND.to_string(),
                detail: format!("status '{}'", response.status.unwrap_or_default()),
            });
        }

        Ok(response
            .data
            .into_iter()
            .take(max_results)
            .filter_map(|job| job.into_listing())
            .collect())
    }
}

impl JobSource for JSearchSource {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<RawListing>, AppError> {
        let endpoint = Url::parse(&format!("https://{API_HOST}/search"))
            .map_err(|e| AppError::Generic(format!("Invalid JSearch endpoint: {e}")))?;

        let terms = query.normalized_terms();
        let mut params: Vec<(&str, &str)> = vec![
            ("query", &terms),
            ("page", "1"),
            ("num_pages", "1"),
            ("date_posted", "all"),
            ("employment_types", "FULLTIME"),
        ];
        if let Some(location) = &query.location {
            params.push(("location", location));
        }
        if query.remote_only {
            params.push(("remote_jobs_only", "true"));
        }

        tracing::debug!(terms = %terms, "Querying JSearch");

        let response = self
            .client
            .get(endpoint)
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", API_HOST)
            .query(&params)
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

        Self::parse_response(payload, query.max_results)
    }
}

// -- Response shapes --

#[derive(Deserialize)]
struct JSearchResponse {
    status: Option<String>,
    #[serde(default)]
    data: Vec<JSearchJob>,
}

#[derive(Deserialize)]
struct JSearchJob {
    job_id: Option<serde_json::Value>,
    job_title: Option<String>,
    employer_name: Option<String>,
    job_city: Option<String>,
    job_state: Option<String>,
    #[serde(default)]
    job_is_remote: bool,
    job_min_salary: Option<f64>,
    job_max_salary: Option<f64>,
    job_salary_currency: Option<String>,
    job_posted_at_datetime_utc: Option<String>,
    job_apply_link: Option<String>,
    #[serde(default)]
    job_required_skills: Option<Vec<String>>,
    job_description: Option<String>,
}

impl JSearchJob {
    fn into_listing(self) -> Option<RawListing> {
        let title = self.job_title.filter(|t| !t.is_empty())?;
        let url = self.job_apply_link.filter(|u| !u.is_empty())?;

        let currency = self.job_salary_currency.unwrap_or_else(|| "USD".to_string());
        let salary = match (self.job_min_salary, self.job_max_salary) {
            (Some(min), Some(max)) if max > min => {
                Some(format!("{currency} {min:.0} - {max:.0}"))
            }
            (Some(min), _) => Some(format!("{currency} {min:.0}+")),
            _ => None,
        };

        let city = self.job_city.filter(|c| !c.is_empty());
        let state = self.job_state.filter(|s| !s.is_empty());
        let location = match (self.job_is_remote, city, state) {
            (true, Some(city), _) => Some(format!("Remote ({city})")),
            (true, None, _) => Some("Remote".to_string()),
            (false, Some(city), Some(state)) => Some(format!("{city}, {state}")),
            (false, Some(city), None) => Some(city),
            (false, None, Some(state)) => Some(state),
            (false, None, None) => None,
        };

        let posted = self
            .job_posted_at_datetime_utc
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.date_naive());

        Some(RawListing {
            source_id: self.job_id.as_ref().and_then(value_to_string),
            title,
            company: self.employer_name.unwrap_or_default(),
            location,
            salary,
            url,
            tags: self.job_required_skills.unwrap_or_default(),
            posted,
            description: self.job_description.filter(|d| !d.is_empty()),
            remote: self.job_is_remote,
        })
    }
}

//! Adzuna search API client.
//!
//! One Adzuna call answers for several aggregated boards (Indeed, Monster,
//! Dice, Jobsite, CVLibrary), which is why it sits first in the default
//! fallback chain despite being metered.

use chrono::NaiveDate;
use serde::Deserialize;
use url::Url;

use forage_core::{AppError, Credentials, JobSource, Query, RawListing};

use crate::http::{build_client, check_status, map_transport_error, value_to_string};

const BACKEND: &str = "adzuna";

/// Credential names looked up in the configuration.
pub const ADZUNA_APP_ID: &str = "ADZUNA_APP_ID";
pub const ADZUNA_APP_KEY: &str = "ADZUNA_APP_KEY";

/// Job source backed by the Adzuna search API.
#[derive(Debug, Clone)]
pub struct AdzunaSource {
    client: reqwest::Client,
    app_id: String,
    app_key: String,
    country: String,
}

impl AdzunaSource {
    /// Build from configured credentials; fails if either secret is absent.
    pub fn new(credentials: &Credentials) -> Result<Self, AppError> {
        let app_id = credentials.get(ADZUNA_APP_ID);
        let app_key = credentials.get(ADZUNA_APP_KEY);
        let (Some(app_id), Some(app_key)) = (app_id, app_key) else {
            return Err(AppError::MissingCredentials {
                backend: BACKEND.to_string(),
                missing: [ADZUNA_APP_ID, ADZUNA_APP_KEY]
                    .iter()
                    .filter(|name| credentials.get(name).is_none())
                    .map(|name| name.to_string())
                    .collect(),
            });
        };

        Ok(Self {
            client: build_client()?,
            app_id: app_id.to_string(),
            app_key: app_key.to_string(),
            country: "us".to_string(),
        })
    }

    /// Use a different country endpoint (`us`, `gb`, `ca`, ...).
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    fn endpoint(&self) -> Result<Url, AppError> {
        Url::parse(&format!(
            "https://api.adzuna.com/v1/api/jobs/{}/search/1",
            self.country
        ))
        .map_err(|e| AppError::Generic(format!("Invalid Adzuna endpoint: {e}")))
    }

    fn parse_response(payload: serde_json::Value) -> Result<Vec<RawListing>, AppError> {
        let response: AdzunaResponse =
            serde_json::from_value(payload).map_err(|e| AppError::ContractViolation {
                backend: BACKEND.to_string(),
                detail: format!("unexpected response shape: {e}"),
            })?;

        Ok(response
            .results
            .into_iter()
            .filter_map(|job| job.into_listing())
            .collect())
    }
}

impl JobSource for AdzunaSource {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<RawListing>, AppError> {
        // Adzuna has no dedicated remote filter; folding "remote" into the
        // search terms is what its own docs recommend.
        let mut what = query.normalized_terms();
        if query.remote_only {
            what.push_str(" remote");
        }

        let per_page = query.max_results.min(50).to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("app_id", &self.app_id),
            ("app_key", &self.app_key),
            ("what", &what),
            ("results_per_page", &per_page),
            ("salary_include_unknown", "0"),
            ("content-type", "application/json"),
        ];
        if let Some(location) = &query.location {
            params.push(("where", location));
        }

        tracing::debug!(terms = %what, country = %self.country, "Querying Adzuna");

        let response = self
            .client
            .get(self.endpoint()?)
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

        Self::parse_response(payload)
    }
}

// -- Response shapes --

#[derive(Deserialize)]
struct AdzunaResponse {
    results: Vec<AdzunaJob>,
}

#[derive(Deserialize)]
struct AdzunaJob {
    id: Option<serde_json::Value>,
    title: Option<String>,
    company: Option<AdzunaCompany>,
    location: Option<AdzunaLocation>,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    created: Option<String>,
    redirect_url: Option<String>,
    description: Option<String>,
    category: Option<AdzunaCategory>,
}

#[derive(Deserialize)]
struct AdzunaCompany {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct AdzunaLocation {
    display_name: Option<String>,
    area: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct AdzunaCategory {
    tag: Option<String>,
}

impl AdzunaJob {
    fn into_listing(self) -> Option<RawListing> {
        let title = self.title.filter(|t| !t.is_empty())?;
        let url = self.redirect_url.filter(|u| !u.is_empty())?;

        let salary = match (self.salary_min, self.salary_max) {
            (Some(min), Some(max)) if max > min => Some(format!("${min:.0} - ${max:.0}")),
            (Some(min), _) => Some(format!("${min:.0}+")),
            _ => None,
        };

        let location = self.location.and_then(|l| {
            l.display_name
                .filter(|d| !d.is_empty())
                .or_else(|| l.area.filter(|a| !a.is_empty()).map(|a| a.join(", ")))
        });

        let posted = self
            .created
            .as_deref()
            .and_then(|c| NaiveDate::parse_from_str(c.get(..10)?, "%Y-%m-%d").ok());

        let remote = location
            .as_deref()
            .is_some_and(|l| l.to_lowercase().contains("remote"));

        Some(RawListing {
            source_id: self.id.as_ref().and_then(value_to_string),
            title,
            company: self
                .company
                .and_then(|c| c.display_name)
                .unwrap_or_default(),
            location,
            salary,
            url,
            tags: self
                .category
                .and_then(|c| c.tag)
                .into_iter()
                .collect(),
            posted,
            description: self.description.filter(|d| !d.is_empty()),
            remote,
        })
    }
}

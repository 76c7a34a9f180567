//! Search queries and priority classification.
//!
//! [`classify`] is a pure function: no I/O, no clock, no randomness.
//! The same [`Query`] always maps to the same [`Priority`], which keeps
//! cache keys stable and tests reproducible.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which platform(s) a query targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformSelector {
    /// Query every covering backend and merge the results.
    All,
    /// Query the fallback chain for a single named platform.
    One(String),
}

impl PlatformSelector {
    /// Parse a CLI-style platform argument. `None` / `"all"` → [`PlatformSelector::All`].
    pub fn parse(platform: Option<&str>) -> Self {
        match platform {
            None => PlatformSelector::All,
            Some(p) if p.eq_ignore_ascii_case("all") => PlatformSelector::All,
            Some(p) => PlatformSelector::One(p.to_lowercase()),
        }
    }
}

/// A job search request. Immutable once issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Free-text search terms.
    pub terms: String,
    /// Optional location filter.
    pub location: Option<String>,
    /// Platform selector.
    pub platforms: PlatformSelector,
    /// Filter for remote positions only.
    pub remote_only: bool,
    /// Result-count hint passed through to backends.
    pub max_results: usize,
}

impl Query {
    pub fn new(terms: impl Into<String>) -> Self {
        Self {
            terms: terms.into(),
            location: None,
            platforms: PlatformSelector::All,
            remote_only: true,
            max_results: 50,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_platforms(mut self, platforms: PlatformSelector) -> Self {
        self.platforms = platforms;
        self
    }

    pub fn with_remote_only(mut self, remote_only: bool) -> Self {
        self.remote_only = remote_only;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Lowercased, whitespace-collapsed terms — the canonical form used for
    /// classification and cache keys.
    pub fn normalized_terms(&self) -> String {
        self.terms
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Priority tier of a query, used to decide whether scarce metered quota
/// is worth spending on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Seniority markers that make a query worth premium quota.
const SENIORITY_MARKERS: &[&str] = &["senior", "staff", "principal", "lead", "architect"];

/// Salary/compensation research terms.
const SALARY_MARKERS: &[&str] = &["salary", "compensation", "pay band", "glassdoor"];

/// Company-scoped searches target a specific employer.
const COMPANY_NAMES: &[&str] = &[
    "google",
    "facebook",
    "amazon",
    "microsoft",
    "apple",
    "netflix",
];

/// Concrete technology terms; two or more of these mark a Medium query.
const TECH_TERMS: &[&str] = &[
    "react",
    "nodejs",
    "node",
    "python",
    "rust",
    "go",
    "java",
    "typescript",
    "javascript",
    "flask",
    "django",
    "vue",
    "angular",
    "nextjs",
    "kubernetes",
    "aws",
    "solidity",
    "frontend",
    "backend",
    "fullstack",
];

/// Classify a query into a priority tier.
///
/// Rules are evaluated in fixed precedence order, first match wins:
/// 1. High — seniority markers, salary research, or a single-company scope.
/// 2. Medium — two or more concrete technology terms.
/// 3. Low — everything else.
pub fn classify(query: &Query) -> Priority {
    let terms = query.normalized_terms();

    let high = SENIORITY_MARKERS
        .iter()
        .chain(SALARY_MARKERS)
        .chain(COMPANY_NAMES)
        .any(|marker| terms.contains(*marker));
    if high {
        return Priority::High;
    }

    let tech_count = TECH_TERMS
        .iter()
        .filter(|term| {
            terms
                .split(|c: char| !c.is_alphanumeric())
                .any(|token| token == **term)
        })
        .count();
    if tech_count >= 2 {
        return Priority::Medium;
    }

    Priority::Low
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seniority_and_salary_queries_are_high() {
        assert_eq!(
            classify(&Query::new("senior staff engineer, salary")),
            Priority::High
        );
        assert_eq!(classify(&Query::new("principal engineer")), Priority::High);
        assert_eq!(
            classify(&Query::new("compensation data analyst")),
            Priority::High
        );
    }

    #[test]
    fn company_scoped_queries_are_high() {
        assert_eq!(
            classify(&Query::new("google frontend engineer")),
            Priority::High
        );
    }

    #[test]
    fn multi_tech_queries_are_medium() {
        assert_eq!(
            classify(&Query::new("python flask react developer")),
            Priority::Medium
        );
        assert_eq!(classify(&Query::new("rust tokio aws")), Priority::Medium);
    }

    #[test]
    fn broad_queries_are_low() {
        assert_eq!(classify(&Query::new("developer")), Priority::Low);
        assert_eq!(classify(&Query::new("jobs in berlin")), Priority::Low);
        // A single tech term is not enough for Medium.
        assert_eq!(classify(&Query::new("react developer")), Priority::Low);
    }

    #[test]
    fn classification_is_deterministic() {
        let query = Query::new("Senior  Rust   Engineer").with_location("Berlin");
        let first = classify(&query);
        for _ in 0..10 {
            assert_eq!(classify(&query), first);
        }
    }

    #[test]
    fn normalized_terms_collapse_case_and_whitespace() {
        let query = Query::new("  Senior   RUST  Engineer ");
        assert_eq!(query.normalized_terms(), "senior rust engineer");
    }

    #[test]
    fn platform_selector_parses_all_and_named() {
        assert_eq!(PlatformSelector::parse(None), PlatformSelector::All);
        assert_eq!(PlatformSelector::parse(Some("ALL")), PlatformSelector::All);
        assert_eq!(
            PlatformSelector::parse(Some("Indeed")),
            PlatformSelector::One("indeed".into())
        );
    }
}

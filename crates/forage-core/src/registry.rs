//! Static mapping from platforms to ordered candidate backends.
//!
//! The registry is explicit configuration populated at startup — there is
//! no runtime discovery. Ordering encodes business priority: the generous
//! metered API first, the strict low-quota API second, free APIs next,
//! and browser scrapers last as the most expensive fallback.

use std::collections::HashMap;

/// What kind of data source a backend is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Paid API with a monthly call quota.
    MeteredApi { monthly_limit: u32 },
    /// Free API, no quota tracking.
    FreeApi,
    /// Browser-driven scraper.
    Scraper,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::MeteredApi { .. } => "metered-api",
            BackendKind::FreeApi => "free-api",
            BackendKind::Scraper => "scraper",
        }
    }
}

/// Static description of one backend: identity, kind, coverage, secrets.
#[derive(Debug, Clone)]
pub struct BackendDescriptor {
    pub name: String,
    pub kind: BackendKind,
    /// Lowercase platform identifiers this backend can answer for.
    pub platforms: Vec<String>,
    /// Named secrets that must be configured before this backend is usable.
    pub required_credentials: Vec<String>,
}

impl BackendDescriptor {
    pub fn new(name: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            name: name.into(),
            kind,
            platforms: Vec::new(),
            required_credentials: Vec::new(),
        }
    }

    pub fn covering(mut self, platforms: &[&str]) -> Self {
        self.platforms = platforms.iter().map(|p| p.to_lowercase()).collect();
        self
    }

    pub fn requiring(mut self, credentials: &[&str]) -> Self {
        self.required_credentials = credentials.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn covers(&self, platform: &str) -> bool {
        self.platforms.iter().any(|p| p == platform)
    }

    pub fn is_metered(&self) -> bool {
        matches!(self.kind, BackendKind::MeteredApi { .. })
    }

    pub fn monthly_limit(&self) -> Option<u32> {
        match self.kind {
            BackendKind::MeteredApi { monthly_limit } => Some(monthly_limit),
            _ => None,
        }
    }
}

/// Restriction on which backend kinds a request may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKindFilter {
    #[default]
    Any,
    ApisOnly,
    ScrapersOnly,
}

impl SourceKindFilter {
    pub fn admits(&self, kind: BackendKind) -> bool {
        match self {
            SourceKindFilter::Any => true,
            SourceKindFilter::ApisOnly => !matches!(kind, BackendKind::Scraper),
            SourceKindFilter::ScrapersOnly => matches!(kind, BackendKind::Scraper),
        }
    }
}

/// Ordered set of backend descriptors. Each backend appears exactly once,
/// so a multi-platform request naturally gets the deduplicated union of
/// the per-platform chains.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    backends: Vec<BackendDescriptor>,
}

impl SourceRegistry {
    pub fn new(backends: Vec<BackendDescriptor>) -> Self {
        Self { backends }
    }

    /// The production backend set, in fallback order.
    pub fn with_defaults() -> Self {
        Self::new(vec![
            BackendDescriptor::new("adzuna", BackendKind::MeteredApi { monthly_limit: 1000 })
                .covering(&["indeed", "monster", "dice", "jobsite", "cvlibrary"])
                .requiring(&["ADZUNA_APP_ID", "ADZUNA_APP_KEY"]),
            BackendDescriptor::new("jsearch", BackendKind::MeteredApi { monthly_limit: 200 })
                .covering(&["linkedin", "glassdoor", "indeed"])
                .requiring(&["RAPIDAPI_KEY"]),
            BackendDescriptor::new("arbeitnow", BackendKind::FreeApi).covering(&["arbeitnow"]),
            BackendDescriptor::new("web3career", BackendKind::Scraper).covering(&["web3career"]),
        ])
    }

    pub fn all(&self) -> &[BackendDescriptor] {
        &self.backends
    }

    /// Ordered candidate list, restricted to the admitted backend kinds.
    /// Platform-coverage checks happen per candidate during the
    /// orchestrator walk, where skips are recorded for the report.
    pub fn candidates(&self, kinds: SourceKindFilter) -> Vec<&BackendDescriptor> {
        self.backends
            .iter()
            .filter(|b| kinds.admits(b.kind))
            .collect()
    }

    /// Whether any admitted backend covers `platform` — the pre-check
    /// behind the configuration-fatal "nothing can serve this platform".
    pub fn any_covering(&self, platform: &str, kinds: SourceKindFilter) -> bool {
        self.candidates(kinds).iter().any(|b| b.covers(platform))
    }

    /// Monthly limits for all metered backends, with overrides applied.
    pub fn metered_limits(&self, overrides: &HashMap<String, u32>) -> HashMap<String, u32> {
        self.backends
            .iter()
            .filter_map(|b| {
                b.monthly_limit().map(|limit| {
                    let limit = overrides.get(&b.name).copied().unwrap_or(limit);
                    (b.name.clone(), limit)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_ordered_by_business_priority() {
        let registry = SourceRegistry::with_defaults();
        let names: Vec<&str> = registry.all().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["adzuna", "jsearch", "arbeitnow", "web3career"]);
    }

    #[test]
    fn each_backend_appears_once_in_the_union() {
        let registry = SourceRegistry::with_defaults();
        // adzuna and jsearch both cover indeed, but the candidate list
        // carries each exactly once.
        let candidates = registry.candidates(SourceKindFilter::Any);
        let indeed: Vec<_> = candidates.iter().filter(|b| b.covers("indeed")).collect();
        assert_eq!(indeed.len(), 2);
        let mut names: Vec<&str> = candidates.iter().map(|b| b.name.as_str()).collect();
        names.dedup();
        assert_eq!(names.len(), candidates.len());
    }

    #[test]
    fn kind_filter_restricts_candidates() {
        let registry = SourceRegistry::with_defaults();
        assert!(
            registry
                .candidates(SourceKindFilter::ApisOnly)
                .iter()
                .all(|b| !matches!(b.kind, BackendKind::Scraper))
        );
        let scrapers = registry.candidates(SourceKindFilter::ScrapersOnly);
        assert_eq!(scrapers.len(), 1);
        assert_eq!(scrapers[0].name, "web3career");
    }

    #[test]
    fn coverage_precheck() {
        let registry = SourceRegistry::with_defaults();
        assert!(registry.any_covering("indeed", SourceKindFilter::Any));
        assert!(!registry.any_covering("indeed", SourceKindFilter::ScrapersOnly));
        assert!(!registry.any_covering("myspace", SourceKindFilter::Any));
    }

    #[test]
    fn metered_limits_honor_overrides() {
        let registry = SourceRegistry::with_defaults();
        let overrides = HashMap::from([("jsearch".to_string(), 500u32)]);
        let limits = registry.metered_limits(&overrides);
        assert_eq!(limits.get("adzuna"), Some(&1000));
        assert_eq!(limits.get("jsearch"), Some(&500));
        assert!(!limits.contains_key("arbeitnow"));
    }
}

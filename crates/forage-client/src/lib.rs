pub mod adzuna;
pub mod arbeitnow;
#[cfg(feature = "browser")]
pub mod browser;
mod http;
pub mod jsearch;

pub use adzuna::AdzunaSource;
pub use arbeitnow::ArbeitnowSource;
#[cfg(feature = "browser")]
pub use browser::Web3CareerSource;
pub use jsearch::JSearchSource;

use forage_core::{AppError, JobSource, Query, RawListing};

/// Enum dispatch over the concrete sources.
///
/// [`JobSource`] is not object-safe (its `fetch` returns an opaque
/// future), so the orchestrator's backend map holds this enum instead of
/// trait objects.
#[derive(Clone)]
pub enum AnySource {
    Adzuna(AdzunaSource),
    JSearch(JSearchSource),
    Arbeitnow(ArbeitnowSource),
    #[cfg(feature = "browser")]
    Web3Career(Web3CareerSource),
}

impl JobSource for AnySource {
    fn name(&self) -> &str {
        match self {
            AnySource::Adzuna(s) => s.name(),
            AnySource::JSearch(s) => s.name(),
            AnySource::Arbeitnow(s) => s.name(),
            #[cfg(feature = "browser")]
            AnySource::Web3Career(s) => s.name(),
        }
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<RawListing>, AppError> {
        match self {
            AnySource::Adzuna(s) => s.fetch(query).await,
            AnySource::JSearch(s) => s.fetch(query).await,
            AnySource::Arbeitnow(s) => s.fetch(query).await,
            #[cfg(feature = "browser")]
            AnySource::Web3Career(s) => s.fetch(query).await,
        }
    }
}

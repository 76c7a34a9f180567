use std::future::Future;

use crate::error::AppError;
use crate::query::Query;
use crate::record::{JobRecord, RawListing};

/// A single job-data backend: metered API, free API, or scraper.
///
/// Implementations are opaque collaborators — the orchestrator only sees
/// `fetch(query) -> raw listings or error`. Coverage, credentials, and
/// quota metering live on the backend's descriptor in the registry.
pub trait JobSource: Send + Sync + Clone {
    /// Backend identity; must match the registry descriptor name.
    fn name(&self) -> &str;

    fn fetch(
        &self,
        query: &Query,
    ) -> impl Future<Output = Result<Vec<RawListing>, AppError>> + Send;
}

/// Result of an insert-if-absent upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Persists normalized job records, keyed by the record identity key.
pub trait JobStore: Send + Sync + Clone {
    fn upsert(
        &self,
        record: &JobRecord,
    ) -> impl Future<Output = Result<UpsertOutcome, AppError>> + Send;
}

/// A no-op JobStore for use when persistence is not needed.
#[derive(Debug, Clone)]
pub struct NullStore;

impl JobStore for NullStore {
    async fn upsert(&self, _record: &JobRecord) -> Result<UpsertOutcome, AppError> {
        Ok(UpsertOutcome::Inserted)
    }
}

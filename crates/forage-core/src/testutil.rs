//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. Mocks use
//! `Arc<Mutex<_>>` interior mutability so tests can assert on recorded
//! calls through clones.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::query::Query;
use crate::record::{JobRecord, RawListing};
use crate::traits::{JobSource, JobStore, UpsertOutcome};

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// Mock backend with a queue of configurable responses.
///
/// Each call pops the first queued response; an empty queue yields an
/// empty listing batch. [`MockSource::hanging`] builds a source whose
/// fetch never completes, for cancellation tests.
#[derive(Clone)]
pub struct MockSource {
    name: String,
    responses: Arc<Mutex<Vec<Result<Vec<RawListing>, AppError>>>>,
    calls: Arc<AtomicU32>,
    hang: bool,
}

impl MockSource {
    pub fn new(name: &str, listings: Vec<RawListing>) -> Self {
        Self::with_responses(name, vec![Ok(listings)])
    }

    pub fn with_error(name: &str, error: AppError) -> Self {
        Self::with_responses(name, vec![Err(error)])
    }

    pub fn with_responses(name: &str, responses: Vec<Result<Vec<RawListing>, AppError>>) -> Self {
        Self {
            name: name.to_string(),
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(AtomicU32::new(0)),
            hang: false,
        }
    }

    /// A source whose fetch never resolves.
    pub fn hanging(name: &str) -> Self {
        Self {
            name: name.to_string(),
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicU32::new(0)),
            hang: true,
        }
    }

    /// How many times `fetch` has been invoked across all clones.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl JobSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _query: &Query) -> Result<Vec<RawListing>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(vec![])
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// Mock store that records upserts and deduplicates on the identity key.
#[derive(Clone, Default)]
pub struct MockStore {
    pub upserted: Arc<Mutex<Vec<JobRecord>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored_count(&self) -> usize {
        self.upserted.lock().unwrap().len()
    }
}

impl JobStore for MockStore {
    async fn upsert(&self, record: &JobRecord) -> Result<UpsertOutcome, AppError> {
        let mut upserted = self.upserted.lock().unwrap();
        let key = record.identity_key();
        if upserted.iter().any(|r| r.identity_key() == key) {
            return Ok(UpsertOutcome::AlreadyPresent);
        }
        upserted.push(record.clone());
        Ok(UpsertOutcome::Inserted)
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create a raw listing with a native id and title.
pub fn make_listing(id: &str, title: &str) -> RawListing {
    RawListing {
        source_id: Some(id.to_string()),
        title: title.to_string(),
        company: "Acme Corp".to_string(),
        location: Some("Remote".to_string()),
        salary: None,
        url: format!("https://jobs.example.com/{id}"),
        tags: vec!["rust".to_string()],
        posted: None,
        description: None,
        remote: true,
    }
}

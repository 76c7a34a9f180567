pub mod cache;
pub mod config;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod query;
pub mod record;
pub mod registry;
pub mod report;
pub mod testutil;
pub mod traits;

pub use cache::ResponseCache;
pub use config::{Credentials, OrchestratorConfig, RetryConfig};
pub use error::AppError;
pub use ledger::{QuotaLedger, QuotaStatus, Reservation};
pub use orchestrator::{FetchOutcome, Orchestrator};
pub use query::{PlatformSelector, Priority, Query, classify};
pub use record::{JobRecord, RawListing, compute_hash, merge_records};
pub use registry::{BackendDescriptor, BackendKind, SourceKindFilter, SourceRegistry};
pub use report::{BackendOutcome, ReportEntry, SelectionReport, SkipReason};
pub use traits::{JobSource, JobStore, NullStore, UpsertOutcome};

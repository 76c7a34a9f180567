//! Per-request audit trail of backend selection.

use std::fmt;

use crate::query::Priority;

/// Why a candidate backend was skipped without being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    QuotaExceeded,
    MissingCredentials,
    NotCoveringPlatform,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::QuotaExceeded => write!(f, "quota-exceeded"),
            SkipReason::MissingCredentials => write!(f, "missing-credentials"),
            SkipReason::NotCoveringPlatform => write!(f, "not-covering-platform"),
        }
    }
}

/// Outcome of one candidate backend in the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOutcome {
    /// Payload served from the response cache; no quota spent.
    ServedFromCache { records: usize },
    /// Fresh backend call succeeded.
    Fetched { records: usize },
    Skipped { reason: SkipReason },
    Failed { error: String },
    /// The caller's deadline/cancellation fired before this backend ran to
    /// completion; results accumulated so far were still returned.
    Cancelled,
}

impl fmt::Display for BackendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendOutcome::ServedFromCache { records } => {
                write!(f, "served-from-cache ({records} records)")
            }
            BackendOutcome::Fetched { records } => write!(f, "fetched ({records} records)"),
            BackendOutcome::Skipped { reason } => write!(f, "skipped, {reason}"),
            BackendOutcome::Failed { error } => write!(f, "failed: {error}"),
            BackendOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One `(backend, outcome)` pair, in attempt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub backend: String,
    pub outcome: BackendOutcome,
}

/// Ordered record of which backends were attempted, skipped, or failed —
/// and why — for one orchestrated request.
#[derive(Debug, Clone)]
pub struct SelectionReport {
    pub priority: Priority,
    pub entries: Vec<ReportEntry>,
    /// Quota warnings surfaced during this request (80% threshold crossings).
    pub warnings: Vec<String>,
}

impl SelectionReport {
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            entries: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn record(&mut self, backend: &str, outcome: BackendOutcome) {
        self.entries.push(ReportEntry {
            backend: backend.to_string(),
            outcome,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn outcome_for(&self, backend: &str) -> Option<&BackendOutcome> {
        self.entries
            .iter()
            .find(|e| e.backend == backend)
            .map(|e| &e.outcome)
    }

    /// Number of backends that produced records (fresh or cached).
    pub fn successes(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| {
                matches!(
                    e.outcome,
                    BackendOutcome::Fetched { .. } | BackendOutcome::ServedFromCache { .. }
                )
            })
            .count()
    }
}

impl fmt::Display for SelectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "priority: {}", self.priority)?;
        for entry in &self.entries {
            writeln!(f, "  {}: {}", entry.backend, entry.outcome)?;
        }
        for warning in &self.warnings {
            writeln!(f, "  warning: {warning}")?;
        }
        Ok(())
    }
}

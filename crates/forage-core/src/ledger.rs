//! Persisted monthly usage counters for metered backends.
//!
//! The ledger enforces `used <= limit` at reservation time:
//! [`QuotaLedger::try_reserve`] is the single mutating entry point and
//! performs its check-and-increment under one lock, so there is no window
//! between "can I call" and "record the call". Counters roll over lazily
//! when the wall-clock UTC month advances.
//!
//! State survives process restarts via a JSON file. A corrupt or
//! unreadable file degrades to "no usage recorded yet" instead of
//! blocking the run; only a path that can never hold the ledger at all
//! (an existing directory) is a configuration error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Persisted layout: one record per metered backend per period.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerEntry {
    period: String,
    used: u32,
    limit: u32,
    /// Whether the 80% warning has already fired this period.
    #[serde(default)]
    warned: bool,
}

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Quota granted. `warning` is true exactly once per period, when this
    /// reservation crossed the 80% utilization threshold.
    Granted { warning: bool },
    /// Quota exhausted; state unchanged.
    Exhausted,
}

impl Reservation {
    pub fn is_granted(&self) -> bool {
        matches!(self, Reservation::Granted { .. })
    }
}

/// Read-only snapshot of one backend's quota state.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub backend: String,
    pub used: u32,
    pub limit: u32,
    pub percent: f32,
    pub period: String,
}

impl QuotaStatus {
    /// Utilization level, for status output: healthy / moderate / warning / critical.
    pub fn level(&self) -> &'static str {
        if self.percent >= 90.0 {
            "critical"
        } else if self.percent >= 75.0 {
            "warning"
        } else if self.percent >= 50.0 {
            "moderate"
        } else {
            "healthy"
        }
    }
}

/// Thread-safe, file-persisted quota ledger.
#[derive(Debug, Clone)]
pub struct QuotaLedger {
    path: Option<PathBuf>,
    limits: HashMap<String, u32>,
    entries: Arc<Mutex<HashMap<String, LedgerEntry>>>,
}

impl QuotaLedger {
    /// Open a ledger for the given metered backends.
    ///
    /// `limits` maps backend name → monthly limit. With `path = None` the
    /// ledger is purely in-memory (tests, dry runs).
    pub fn open(
        path: Option<PathBuf>,
        limits: HashMap<String, u32>,
    ) -> Result<Self, AppError> {
        let entries = match &path {
            None => HashMap::new(),
            Some(p) if p.is_dir() => {
                return Err(AppError::ConfigError(format!(
                    "ledger path '{}' is a directory; point it at a writable file",
                    p.display()
                )));
            }
            Some(p) => match std::fs::read_to_string(p) {
                Ok(raw) => match serde_json::from_str::<HashMap<String, LedgerEntry>>(&raw) {
                    Ok(entries) => entries,
                    Err(e) => {
                        tracing::warn!(
                            path = %p.display(),
                            error = %e,
                            "Ledger file is corrupt; starting with empty usage"
                        );
                        HashMap::new()
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
                Err(e) => {
                    tracing::warn!(
                        path = %p.display(),
                        error = %e,
                        "Ledger file is unreadable; starting with empty usage"
                    );
                    HashMap::new()
                }
            },
        };

        Ok(Self {
            path,
            limits,
            entries: Arc::new(Mutex::new(entries)),
        })
    }

    /// An in-memory ledger — convenience for tests and unmetered setups.
    pub fn in_memory(limits: HashMap<String, u32>) -> Self {
        Self {
            path: None,
            limits,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Metered backend names this ledger tracks.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.limits.keys().cloned().collect();
        names.sort();
        names
    }

    /// Calls remaining for `backend` in the current period.
    /// Unknown (unmetered) backends report 0.
    pub fn remaining(&self, backend: &str) -> u32 {
        self.remaining_in_period(backend, &current_period())
    }

    /// Atomically reserve `n` calls against `backend`'s monthly quota.
    ///
    /// Grants iff `used + n <= limit`, incrementing `used` in the same
    /// critical section. Exhaustion leaves state unchanged.
    pub fn try_reserve(&self, backend: &str, n: u32) -> Reservation {
        self.reserve_in_period(backend, n, &current_period())
    }

    /// Snapshot for one backend, or `None` if it is not metered.
    pub fn status(&self, backend: &str) -> Option<QuotaStatus> {
        let limit = *self.limits.get(backend)?;
        let period = current_period();
        let mut entries = self.lock_entries();
        let entry = Self::entry_for(&mut entries, backend, limit, &period);
        Some(QuotaStatus {
            backend: backend.to_string(),
            used: entry.used,
            limit: entry.limit,
            percent: if entry.limit == 0 {
                100.0
            } else {
                entry.used as f32 * 100.0 / entry.limit as f32
            },
            period: entry.period.clone(),
        })
    }

    /// Snapshots for every metered backend, sorted by name.
    pub fn status_all(&self) -> Vec<QuotaStatus> {
        self.backends()
            .iter()
            .filter_map(|name| self.status(name))
            .collect()
    }

    fn remaining_in_period(&self, backend: &str, period: &str) -> u32 {
        let Some(&limit) = self.limits.get(backend) else {
            return 0;
        };
        let mut entries = self.lock_entries();
        let entry = Self::entry_for(&mut entries, backend, limit, period);
        entry.limit.saturating_sub(entry.used)
    }

    fn reserve_in_period(&self, backend: &str, n: u32, period: &str) -> Reservation {
        let Some(&limit) = self.limits.get(backend) else {
            return Reservation::Exhausted;
        };

        let result;
        {
            let mut entries = self.lock_entries();
            let entry = Self::entry_for(&mut entries, backend, limit, period);

            if entry.used + n > entry.limit {
                return Reservation::Exhausted;
            }

            entry.used += n;
            let crossed = !entry.warned && entry.used * 100 >= entry.limit * 80;
            if crossed {
                entry.warned = true;
                tracing::warn!(
                    backend,
                    used = entry.used,
                    limit = entry.limit,
                    period = %entry.period,
                    "Backend crossed 80% of its monthly quota"
                );
            }
            result = Reservation::Granted { warning: crossed };

            self.persist(&entries);
        }
        result
    }

    /// Find or create the entry for `backend`, rolling the period over if
    /// the month has advanced. Limit overrides take effect on rollover or
    /// first sight of the backend.
    fn entry_for<'a>(
        entries: &'a mut HashMap<String, LedgerEntry>,
        backend: &str,
        limit: u32,
        period: &str,
    ) -> &'a mut LedgerEntry {
        let entry = entries
            .entry(backend.to_string())
            .or_insert_with(|| LedgerEntry {
                period: period.to_string(),
                used: 0,
                limit,
                warned: false,
            });
        if entry.period != period {
            tracing::info!(
                backend,
                old_period = %entry.period,
                new_period = %period,
                "Quota period rolled over; usage reset"
            );
            entry.period = period.to_string();
            entry.used = 0;
            entry.limit = limit;
            entry.warned = false;
        }
        entry
    }

    /// Acquires the entry lock, recovering from poison if necessary.
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, LedgerEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned ledger mutex");
            poisoned.into_inner()
        })
    }

    /// Best-effort write-through; a failed write must not fail the request.
    fn persist(&self, entries: &HashMap<String, LedgerEntry>) {
        let Some(path) = &self.path else { return };
        let serialized = match serde_json::to_string_pretty(entries) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Could not serialize ledger");
                return;
            }
        };
        if let Err(e) = std::fs::write(path, serialized) {
            tracing::warn!(path = %path.display(), error = %e, "Could not persist ledger");
        }
    }
}

/// Current quota period: the UTC calendar month, `YYYY-MM`.
fn current_period() -> String {
    Utc::now().format("%Y-%m").to_string()
}

//! Raw listings, normalized job records, and deduplicating merge.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A raw listing as returned by a backend, before normalization.
///
/// This is the narrow shape of the backend collaborator contract: each
/// source maps its native response into this, and the orchestrator owns
/// everything downstream of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    /// Source-native job id, when the backend provides one.
    pub source_id: Option<String>,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    /// Free-text salary, e.g. `"$120,000 - $150,000"`.
    pub salary: Option<String>,
    pub url: String,
    pub tags: Vec<String>,
    pub posted: Option<NaiveDate>,
    pub description: Option<String>,
    pub remote: bool,
}

/// The canonical normalized job record handed to the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(rename = "job_source_id")]
    pub source_id: Option<String>,
    /// Identity of the backend that produced this record.
    pub source: String,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub url: String,
    pub tags: Vec<String>,
    pub date_posted: Option<NaiveDate>,
    /// Stamped by the orchestrator at normalization time.
    pub date_found: NaiveDate,
    pub description: Option<String>,
    pub is_remote: bool,
}

impl JobRecord {
    /// Normalize a raw listing from `source`, stamping the discovery date.
    pub fn from_raw(raw: RawListing, source: &str, date_found: NaiveDate) -> Self {
        Self {
            source_id: raw.source_id,
            source: source.to_string(),
            title: raw.title,
            company: raw.company,
            location: raw.location,
            salary: raw.salary,
            url: raw.url,
            tags: raw.tags,
            date_posted: raw.posted,
            date_found,
            description: raw.description,
            is_remote: raw.remote,
        }
    }

    /// Deduplication key: `source:native-id` when the backend supplied an
    /// id, else a content hash of (title, company, url).
    pub fn identity_key(&self) -> String {
        match &self.source_id {
            Some(id) => format!("{}:{}", self.source, id),
            None => compute_hash(&format!("{}|{}|{}", self.title, self.company, self.url)),
        }
    }

    /// How many optional fields carry data — used to pick the richer
    /// variant when two backends surface the same posting.
    pub fn populated_fields(&self) -> usize {
        usize::from(self.location.is_some())
            + usize::from(self.salary.is_some())
            + usize::from(self.description.is_some())
            + usize::from(self.date_posted.is_some())
            + usize::from(!self.tags.is_empty())
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Merge records from multiple backends into one deduplicated set.
///
/// Input pairs are `(backend_order, record)` where `backend_order` is the
/// position of the record's backend in the successful-fetch order. On an
/// identity-key collision the record with more populated optional fields
/// wins; on a tie the earlier backend wins, keeping the merge
/// deterministic across runs with identical inputs. Output preserves
/// first-seen order.
pub fn merge_records(records: Vec<(usize, JobRecord)>) -> Vec<JobRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: std::collections::HashMap<String, (usize, JobRecord)> =
        std::collections::HashMap::new();

    for (backend_order, record) in records {
        let key = record.identity_key();
        let replace = match by_key.get(&key) {
            None => {
                order.push(key.clone());
                true
            }
            Some((held_order, held)) => {
                let richer = record.populated_fields() > held.populated_fields();
                let earlier_tie = record.populated_fields() == held.populated_fields()
                    && backend_order < *held_order;
                richer || earlier_tie
            }
        };
        if replace {
            by_key.insert(key, (backend_order, record));
        }
    }

    order
        .into_iter()
        .filter_map(|key| by_key.remove(&key).map(|(_, record)| record))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: Option<&str>, title: &str) -> RawListing {
        RawListing {
            source_id: id.map(String::from),
            title: title.to_string(),
            company: "Acme".to_string(),
            location: None,
            salary: None,
            url: format!("https://example.com/{title}"),
            tags: vec![],
            posted: None,
            description: None,
            remote: true,
        }
    }

    fn found() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn compute_hash_is_stable() {
        let h1 = compute_hash("hello world");
        let h2 = compute_hash("hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(compute_hash("hello"), compute_hash("world"));
    }

    #[test]
    fn identity_key_prefers_native_id() {
        let with_id = JobRecord::from_raw(listing(Some("j-1"), "Engineer"), "adzuna", found());
        assert_eq!(with_id.identity_key(), "adzuna:j-1");

        let without_id = JobRecord::from_raw(listing(None, "Engineer"), "adzuna", found());
        assert_eq!(without_id.identity_key().len(), 64);
    }

    #[test]
    fn same_content_without_id_collides_across_sources() {
        // Content-hash identity intentionally ignores the source, so the
        // same posting surfaced by two id-less backends deduplicates.
        let a = JobRecord::from_raw(listing(None, "Engineer"), "adzuna", found());
        let b = JobRecord::from_raw(listing(None, "Engineer"), "arbeitnow", found());
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn merge_is_idempotent() {
        let a = JobRecord::from_raw(listing(Some("1"), "Engineer"), "adzuna", found());
        let b = JobRecord::from_raw(listing(Some("2"), "Designer"), "adzuna", found());

        let once = merge_records(vec![(0, a.clone()), (0, b.clone())]);
        let twice = merge_records(
            once.iter()
                .cloned()
                .map(|r| (0, r))
                .chain(once.iter().cloned().map(|r| (0, r)))
                .collect(),
        );
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_prefers_more_populated_record() {
        let sparse = JobRecord::from_raw(listing(Some("1"), "Engineer"), "jsearch", found());
        let mut rich_raw = listing(Some("1"), "Engineer");
        rich_raw.salary = Some("$150k".to_string());
        rich_raw.description = Some("Build things".to_string());
        let rich = JobRecord::from_raw(rich_raw, "jsearch", found());

        let merged = merge_records(vec![(0, sparse), (1, rich.clone())]);
        assert_eq!(merged, vec![rich]);
    }

    #[test]
    fn merge_tie_break_keeps_earlier_backend() {
        let mut first_raw = listing(Some("1"), "Engineer");
        first_raw.salary = Some("$100k".to_string());
        let mut second_raw = listing(Some("1"), "Engineer");
        second_raw.salary = Some("$999k".to_string());

        let first = JobRecord::from_raw(first_raw, "adzuna", found());
        let second = JobRecord::from_raw(second_raw, "adzuna", found());

        let merged = merge_records(vec![(0, first.clone()), (1, second)]);
        assert_eq!(merged, vec![first]);
    }

    #[test]
    fn merge_preserves_first_seen_order() {
        let a = JobRecord::from_raw(listing(Some("1"), "Engineer"), "adzuna", found());
        let b = JobRecord::from_raw(listing(Some("2"), "Designer"), "adzuna", found());
        let c = JobRecord::from_raw(listing(Some("3"), "Manager"), "adzuna", found());

        let merged = merge_records(vec![(0, a.clone()), (0, b.clone()), (1, c.clone())]);
        assert_eq!(merged, vec![a, b, c]);
    }
}

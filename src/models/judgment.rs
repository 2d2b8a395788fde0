// src/models/judgment.rs

//! Judgment data structures.
//!
//! A judgment is the canonical, deduplicated record of one document returned
//! by the search backend. Deduplication is keyed on the backend's stable
//! document id when present, falling back to (case number, date) for
//! documents sourced without one.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A judgment row as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    pub id: String,

    /// The backend's stable document id (the primary dedup key)
    pub external_id: Option<i64>,

    pub title: Option<String>,

    /// Court / jurisdiction label
    pub court: Option<String>,

    pub judgment_date: Option<NaiveDate>,

    /// Source-specific case number (secondary dedup key with the date)
    pub case_number: Option<String>,

    /// Document length metric reported by the backend
    pub doc_size: Option<u64>,

    pub num_cites: Option<u32>,

    /// Snippet with the backend's highlight markup preserved
    pub headline: Option<String>,

    /// Canonical public URL for the document
    pub url: String,

    /// Opaque extension bag, enrichable after creation
    #[serde(default)]
    pub metadata: serde_json::Value,

    pub first_seen_at: DateTime<Utc>,
}

/// Fields for a judgment about to be inserted. The store assigns the row id
/// and first-seen timestamp; everything else is fixed at ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgmentDraft {
    pub external_id: Option<i64>,
    pub title: Option<String>,
    pub court: Option<String>,
    pub judgment_date: Option<NaiveDate>,
    pub case_number: Option<String>,
    pub doc_size: Option<u64>,
    pub num_cites: Option<u32>,
    pub headline: Option<String>,
    pub url: String,
}

impl JudgmentDraft {
    /// Dedup identity for this draft, if it has one. Drafts with neither a
    /// stable external id nor a (case number, date) pair are always-new.
    pub fn dedup_key(&self) -> Option<DedupKey> {
        if let Some(id) = self.external_id {
            return Some(DedupKey::External(id));
        }
        match (&self.case_number, self.judgment_date) {
            (Some(case), Some(date)) => Some(DedupKey::Composite(case.clone(), date)),
            _ => None,
        }
    }
}

/// Storage-level uniqueness key for a judgment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    External(i64),
    Composite(String, NaiveDate),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> JudgmentDraft {
        JudgmentDraft {
            external_id: None,
            title: Some("A vs B".to_string()),
            court: None,
            judgment_date: None,
            case_number: None,
            doc_size: None,
            num_cites: None,
            headline: None,
            url: "https://example.org/doc/1/".to_string(),
        }
    }

    #[test]
    fn test_dedup_key_external_wins() {
        let mut d = draft();
        d.external_id = Some(42);
        d.case_number = Some("C-1".to_string());
        d.judgment_date = NaiveDate::from_ymd_opt(2026, 1, 5);
        assert_eq!(d.dedup_key(), Some(DedupKey::External(42)));
    }

    #[test]
    fn test_dedup_key_composite() {
        let mut d = draft();
        d.case_number = Some("C-1".to_string());
        d.judgment_date = NaiveDate::from_ymd_opt(2026, 1, 5);
        assert_eq!(
            d.dedup_key(),
            Some(DedupKey::Composite(
                "C-1".to_string(),
                NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
            ))
        );
    }

    #[test]
    fn test_dedup_key_none_when_partial() {
        let mut d = draft();
        d.case_number = Some("C-1".to_string());
        assert_eq!(d.dedup_key(), None);
    }
}

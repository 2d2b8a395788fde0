// src/pipeline/matcher.rs

//! Match recording.
//!
//! Turns one watch's raw search results into judgment and match rows,
//! returning only the (watch, judgment) pairs created by this call. The
//! search backend re-surfaces the same judgment on every poll until the date
//! floor moves past it, so this is the stage that keeps alerts exactly-once:
//! the pair constraint absorbs every re-sighting, and the return value is
//! what the notifier will ever alert on.
//!
//! Both inserts are single conditional operations at the storage layer, so
//! two watches surfacing the same new judgment in one cycle cannot race into
//! duplicate rows.

use chrono::Utc;

use crate::models::{JudgmentDraft, NewMatch, WatchMatch};
use crate::services::SearchDoc;
use crate::storage::Store;
use crate::utils::text::{parse_judgment_date, strip_tags};
use crate::utils::document_url;

/// A match created by `record_matches`, with the external document id kept
/// alongside so callers can fetch extended metadata without re-querying.
#[derive(Debug, Clone)]
pub struct CreatedMatch {
    pub record: WatchMatch,
    pub external_id: Option<i64>,
}

/// Map one raw result to an insertable judgment.
///
/// Returns None when the document carries no stable id: those results cannot
/// be deduplicated against later polls and are skipped rather than alerted
/// on repeatedly. Title and court are sanitized; the headline keeps the
/// backend's highlight markup.
pub fn draft_from_doc(doc: &SearchDoc, public_base: &str) -> Option<JudgmentDraft> {
    let tid = doc.tid?;
    let today = Utc::now().date_naive();
    Some(JudgmentDraft {
        external_id: Some(tid),
        title: doc.title.as_deref().map(strip_tags),
        court: doc.docsource.as_deref().map(strip_tags),
        judgment_date: doc
            .publishdate
            .as_deref()
            .and_then(|raw| parse_judgment_date(raw, today)),
        case_number: doc.case_number.clone(),
        doc_size: doc.docsize,
        num_cites: doc.numcites,
        headline: doc.headline.clone(),
        url: document_url(public_base, tid),
    })
}

/// Process search results for one watch.
///
/// Per document: conditionally insert the judgment, resolve its row, then
/// conditionally insert the (watch, judgment) pair. A malformed document or
/// a per-document storage failure is logged and skipped; it never aborts the
/// rest of the batch.
pub async fn record_matches(
    store: &dyn Store,
    watch_id: &str,
    docs: &[SearchDoc],
    public_base: &str,
) -> Vec<CreatedMatch> {
    let mut created = Vec::new();

    for doc in docs {
        let Some(draft) = draft_from_doc(doc, public_base) else {
            log::warn!("Result for watch {watch_id} missing stable document id, skipping");
            continue;
        };

        let judgment = match store.upsert_judgment(&draft).await {
            Ok(judgment) => judgment,
            Err(e) => {
                log::error!(
                    "Failed to upsert judgment {:?} for watch {watch_id}: {e}",
                    draft.external_id
                );
                continue;
            }
        };

        let new_match = NewMatch {
            watch_id: watch_id.to_string(),
            judgment_id: judgment.id.clone(),
            snippet: doc.headline.clone(),
        };
        match store.insert_match(&new_match).await {
            // Some = this watch had never matched this judgment before
            Ok(Some(record)) => created.push(CreatedMatch {
                record,
                external_id: draft.external_id,
            }),
            Ok(None) => {}
            Err(e) => {
                log::error!(
                    "Failed to insert match for watch {watch_id}, judgment {}: {e}",
                    judgment.id
                );
            }
        }
    }

    created
}

use std::collections::HashMap;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::model::{Transaction, validate};
use crate::normalize::parse_records;
use crate::source::FileSource;
use crate::tracker::IngestionTracker;

/// Result of one batch run: the deduplicated records ready for loading plus
/// the counters that end up in the ingest summary.
#[derive(Debug, Default, Serialize)]
pub struct BatchOutcome {
    #[serde(skip)]
    pub records: Vec<Transaction>,
    pub files_scanned: usize,
    pub files_skipped_consumed: usize,
    pub files_ingested: usize,
    pub files_failed: usize,
    pub files_without_records: usize,
    pub rows_rejected: usize,
    pub duplicates_dropped: usize,
}

/// Merges normalized records from the given files into one deduplicated,
/// cleaned batch.
///
/// With `incremental` set, files already in the tracker are subtracted up
/// front; an empty remainder is a normal no-op. Each surviving file goes
/// through fetch → normalize → validate; a file that is unreadable or
/// unparsable is skipped with a warning and never aborts the batch. Files
/// contributing at least one valid record are registered as consumed (and
/// acked on the source) even when some of their rows were rejected; files
/// yielding zero valid rows stay unregistered so a corrected re-delivery is
/// picked up later. Tracker persistence is best-effort: a save failure is
/// logged and the run continues on in-memory state.
pub fn load_batch(
    source: &dyn FileSource,
    tracker: &mut IngestionTracker,
    file_ids: &[String],
    incremental: bool,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    let candidates: Vec<&String> = if incremental {
        let fresh: Vec<&String> = file_ids
            .iter()
            .filter(|id| !tracker.is_consumed(id))
            .collect();
        outcome.files_skipped_consumed = file_ids.len() - fresh.len();
        if fresh.is_empty() {
            info!("no new files to process, all {} already consumed", file_ids.len());
            return outcome;
        }
        info!("{} new files out of {} total", fresh.len(), file_ids.len());
        fresh
    } else {
        file_ids.iter().collect()
    };

    // Dedup across files by transaction_id, last-seen wins. This is the
    // in-process fast path; the store's primary key remains authoritative.
    let mut merged: Vec<Transaction> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut registered_any = false;

    for id in candidates {
        outcome.files_scanned += 1;

        let bytes = match source.fetch(id) {
            Ok(bytes) => bytes,
            Err(err) => {
                outcome.files_failed += 1;
                warn!("skipping unreadable file {id}: {err}");
                continue;
            }
        };

        let normalized = match parse_records(id, &bytes) {
            Ok(normalized) => normalized,
            Err(err) => {
                outcome.files_failed += 1;
                warn!("skipping malformed file {id}: {err}");
                continue;
            }
        };
        outcome.rows_rejected += normalized.malformed_rows;

        let mut survivors = 0usize;
        for raw in &normalized.records {
            match validate(raw) {
                Ok(record) => {
                    survivors += 1;
                    match positions.get(&record.transaction_id) {
                        Some(&idx) => {
                            outcome.duplicates_dropped += 1;
                            merged[idx] = record;
                        }
                        None => {
                            positions.insert(record.transaction_id.clone(), merged.len());
                            merged.push(record);
                        }
                    }
                }
                Err(err) => {
                    outcome.rows_rejected += 1;
                    warn!("dropping invalid row in {id}: {err}");
                }
            }
        }

        if survivors == 0 {
            // Unprocessed on purpose: a later re-run with corrected content
            // must be able to retry this file.
            outcome.files_without_records += 1;
            warn!("file {id} yielded no valid records, leaving it unregistered");
            continue;
        }

        outcome.files_ingested += 1;
        tracker.register(id, sha256_hex(&bytes));
        registered_any = true;
        if let Err(err) = source.ack(id) {
            warn!("failed to ack {id} on source: {err}");
        }
    }

    if registered_any {
        if let Err(err) = tracker.save() {
            error!("failed to persist ingestion tracker: {err}");
        }
    }

    info!(
        "processed {} files into {} unique records ({} rows rejected, {} duplicates dropped)",
        outcome.files_ingested,
        merged.len(),
        outcome.rows_rejected,
        outcome.duplicates_dropped
    );
    outcome.records = merged;
    outcome
}

fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

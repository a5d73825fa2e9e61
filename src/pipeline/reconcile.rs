//! Snapshot reconciliation.
//!
//! Compares a freshly parsed report against the last durable snapshot
//! to classify every booking id as newly seen, still present, or
//! departed, then persists the outcome: history entries are appended
//! first, the snapshot is replaced second, and the most-inmates record
//! is only advanced on a strict increase.
//!
//! A departure only means the id left the report between two fetches;
//! release, transfer, and bonding out are indistinguishable here.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{HistoryEntry, InmateRecord, MostInmateRecord, Report, SightingEvent};
use crate::storage::HistoryStore;

/// Classification of one report against the previous snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Listed now, absent from the previous snapshot; report order
    pub seen_new: Vec<InmateRecord>,

    /// Listed in both; report order
    pub still_present: Vec<InmateRecord>,

    /// Listed previously, absent now; previous snapshot order
    pub departed: Vec<InmateRecord>,

    /// History entries for the full classification, one per distinct
    /// booking id, stamped with the current report's fetch time
    pub entries: Vec<HistoryEntry>,
}

/// Classify a report against the previous snapshot.
///
/// Pure with respect to its inputs: the same snapshot pair always
/// yields the same classification. Duplicate booking ids within one
/// report are collapsed to their first occurrence with a warning.
pub fn classify(previous: Option<&Report>, current: &Report) -> Classification {
    let previous_ids: HashSet<&str> = previous
        .map(|report| {
            report
                .records
                .iter()
                .map(|record| record.booking_id.as_str())
                .collect()
        })
        .unwrap_or_default();

    let mut seen_new = Vec::new();
    let mut still_present = Vec::new();
    let mut departed = Vec::new();
    let mut entries = Vec::new();

    let mut current_ids: HashSet<&str> = HashSet::new();
    for record in &current.records {
        if !current_ids.insert(record.booking_id.as_str()) {
            log::warn!(
                "Duplicate booking id {} in report; keeping first occurrence",
                record.booking_id
            );
            continue;
        }
        let event = if previous_ids.contains(record.booking_id.as_str()) {
            SightingEvent::StillPresent
        } else {
            SightingEvent::SeenNew
        };
        entries.push(HistoryEntry {
            observed_at: current.fetched_at,
            booking_id: record.booking_id.clone(),
            event,
        });
        match event {
            SightingEvent::SeenNew => seen_new.push(record.clone()),
            _ => still_present.push(record.clone()),
        }
    }

    if let Some(previous) = previous {
        let mut emitted: HashSet<&str> = HashSet::new();
        for record in &previous.records {
            if current_ids.contains(record.booking_id.as_str()) {
                continue;
            }
            if !emitted.insert(record.booking_id.as_str()) {
                continue;
            }
            entries.push(HistoryEntry {
                observed_at: current.fetched_at,
                booking_id: record.booking_id.clone(),
                event: SightingEvent::Departed,
            });
            departed.push(record.clone());
        }
    }

    Classification {
        seen_new,
        still_present,
        departed,
        entries,
    }
}

/// A strict increase over the durable maximum.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMaximum {
    /// The record-setting count
    pub count: usize,

    /// Fetch time of the report that set it
    pub achieved_at: DateTime<Utc>,

    /// The record being beaten, when one was ever set
    pub previous: Option<MostInmateRecord>,
}

/// Decide whether a report strictly beats the durable maximum.
///
/// Ties and decreases never fire; restarts therefore cannot
/// re-announce an already recorded maximum.
pub fn new_maximum(current: &Report, most: &MostInmateRecord) -> Option<NewMaximum> {
    let count = current.inmate_count();
    if count <= most.max_count {
        return None;
    }
    Some(NewMaximum {
        count,
        achieved_at: current.fetched_at,
        previous: (most.max_count > 0).then(|| most.clone()),
    })
}

/// Everything one cycle needs after reconciliation.
#[derive(Debug)]
pub struct ReconcileResult {
    pub classification: Classification,
    pub inmate_count: usize,
    pub new_maximum: Option<NewMaximum>,
}

/// Classifies reports against durable state and persists the outcome.
pub struct Reconciler<'a> {
    store: &'a HistoryStore,
    log_still_present: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a HistoryStore, log_still_present: bool) -> Self {
        Self {
            store,
            log_still_present,
        }
    }

    /// Reconcile one report: classify, append history, replace the
    /// snapshot, and advance the most-inmates record when beaten.
    pub async fn run(&self, current: &Report) -> Result<ReconcileResult> {
        let previous = self.store.load_recent().await?;
        let most = self.store.load_most().await?;

        let classification = classify(previous.as_ref(), current);
        log::info!(
            "Reconciled report: {} new, {} still present, {} departed",
            classification.seen_new.len(),
            classification.still_present.len(),
            classification.departed.len()
        );
        for record in &classification.seen_new {
            log::debug!(
                "New inmate {} ({}): {}",
                record.booking_id,
                record.name,
                record
                    .charges
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            );
        }

        let entries: Vec<HistoryEntry> = classification
            .entries
            .iter()
            .filter(|entry| self.log_still_present || entry.event != SightingEvent::StillPresent)
            .cloned()
            .collect();
        self.store.append_history(&entries).await?;
        self.store.save_recent(current).await?;

        let new_maximum = new_maximum(current, &most);
        if let Some(new_max) = &new_maximum {
            self.store
                .save_most(&MostInmateRecord {
                    max_count: new_max.count,
                    achieved_at: new_max.achieved_at,
                })
                .await?;
            match &new_max.previous {
                Some(previous) => log::info!(
                    "New record: {} inmates, beating {} from {}",
                    new_max.count,
                    previous.max_count,
                    previous.achieved_at
                ),
                None => log::info!("First record: {} inmates", new_max.count),
            }
        }

        Ok(ReconcileResult {
            inmate_count: current.inmate_count(),
            classification,
            new_maximum,
        })
    }
}

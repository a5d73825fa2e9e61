//! Report snapshots and durable history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::inmate::InmateRecord;

/// One parsed snapshot of the custody report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,

    /// Inmate records in page order
    pub records: Vec<InmateRecord>,
}

impl Report {
    pub fn new(fetched_at: DateTime<Utc>, records: Vec<InmateRecord>) -> Self {
        Self {
            fetched_at,
            records,
        }
    }

    /// Number of inmates listed on the report.
    pub fn inmate_count(&self) -> usize {
        self.records.len()
    }
}

/// How one booking id relates to the previous snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SightingEvent {
    /// Listed now, absent from the previous snapshot
    SeenNew,
    /// Listed now and previously
    StillPresent,
    /// Listed previously, absent now
    Departed,
}

/// One line of the append-only sighting history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Fetch time of the report that produced this entry
    pub observed_at: DateTime<Utc>,

    /// Booking id the event applies to
    pub booking_id: String,

    /// Event classification
    pub event: SightingEvent,
}

/// Durable record of the highest inmate count ever observed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MostInmateRecord {
    /// Highest count seen so far
    pub max_count: usize,

    /// Fetch time of the report that set the record
    pub achieved_at: DateTime<Utc>,
}

impl Default for MostInmateRecord {
    fn default() -> Self {
        Self {
            max_count: 0,
            achieved_at: DateTime::UNIX_EPOCH,
        }
    }
}

//! Inmate record data structures.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Arrest timestamps on the report are local time without a zone.
const ARREST_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// A single charge listed against an inmate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Charge {
    /// Charge description as listed on the report
    pub description: String,

    /// Bond disposition, e.g. "BOND", "FINE" or "NO BOND"
    #[serde(rename = "type", default)]
    pub disposition: String,

    /// Dollar amount as listed, e.g. "$569.00"
    #[serde(default)]
    pub amount: String,
}

impl fmt::Display for Charge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.disposition.is_empty(), self.amount.is_empty()) {
            (false, false) => {
                write!(f, "{} ({} {})", self.description, self.disposition, self.amount)
            }
            (false, true) => write!(f, "{} ({})", self.description, self.disposition),
            _ => f.write_str(&self.description),
        }
    }
}

/// One inmate row parsed from the custody report.
///
/// `booking_id` is the key every other part of the watcher reconciles
/// on; the remaining fields are carried as displayed on the page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InmateRecord {
    /// Stable identifier taken from the mug shot thumbnail URL
    pub booking_id: String,

    /// Inmate name, "Last, First" as listed
    pub name: String,

    /// Date of birth as listed, e.g. "11/26/1988"
    #[serde(default)]
    pub dob: Option<String>,

    /// Arrest timestamp as listed, e.g. "09/07/2012 15:30:57"
    #[serde(default)]
    pub arrested_at: Option<String>,

    /// Charges in page order
    #[serde(default)]
    pub charges: Vec<Charge>,

    /// Absolute URL of the full-size mug shot
    #[serde(default)]
    pub mug_shot_url: Option<String>,

    /// Labeled fields on the row the parser has no dedicated slot for
    #[serde(default)]
    pub raw_fields: BTreeMap<String, String>,
}

impl InmateRecord {
    /// Arrest timestamp parsed for ordering, when present and well formed.
    pub fn arrest_time(&self) -> Option<NaiveDateTime> {
        self.arrested_at
            .as_deref()
            .and_then(|s| NaiveDateTime::parse_from_str(s, ARREST_TIME_FORMAT).ok())
    }
}

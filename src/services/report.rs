// src/services/report.rs

//! Custody report parsing.
//!
//! The report is an ASP.NET page with one generated block per inmate.
//! Field spans carry ids ending in `dlInmates_<field>_<row>`, charges
//! nest one level deeper as `dlInmates_Charges_<row>_<field>_<n>`, and
//! the mug shot thumbnail URL carries the booking id:
//! `ImageHandler.ashx?imageId=318937&type=thumb`. Rows are grouped by
//! the trailing row index rather than by document position so a field
//! can never be attributed to a neighboring inmate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Charge, InmateRecord, Report};

/// Fields with a dedicated slot on [`InmateRecord`].
const NAME_FIELD: &str = "lblName";
const DOB_FIELD: &str = "lblDOB";
const ARREST_FIELD: &str = "Label2";

/// Parse a fetched report page into a [`Report`].
///
/// Returns an error only when the inmate container is missing
/// entirely, which means the page layout changed. A present but empty
/// container is a valid report with zero inmates. Individual rows
/// missing a booking id are dropped with a warning.
pub fn parse_report(html: &str, fetched_at: DateTime<Utc>, base_url: &Url) -> Result<Report> {
    let patterns = Patterns::new()?;
    let document = Html::parse_document(html);

    if document.select(&patterns.container).next().is_none() {
        return Err(AppError::parse(
            "inmate container 'dlInmates' not found; the page layout may have changed",
        ));
    }

    let mut rows: BTreeMap<u32, RowBuilder> = BTreeMap::new();
    for span in document.select(&patterns.spans) {
        let Some(id) = span.value().attr("id") else {
            continue;
        };
        let text = clean_text(span);
        if let Some(caps) = patterns.charge.captures(id) {
            let (Some(row_index), Some(charge_index)) =
                (parse_index(&caps[1]), parse_index(&caps[3]))
            else {
                continue;
            };
            let row = rows.entry(row_index).or_default();
            row.note_anchor(span);
            let charge = row.charges.entry(charge_index).or_default();
            match &caps[2] {
                "lblCharge" => charge.description = text,
                "lblBondOrFine" => charge.disposition = text,
                "lblAmount" => charge.amount = text,
                _ => {}
            }
        } else if let Some(caps) = patterns.field.captures(id) {
            let Some(row_index) = parse_index(&caps[2]) else {
                continue;
            };
            let row = rows.entry(row_index).or_default();
            row.note_anchor(span);
            match &caps[1] {
                NAME_FIELD => row.name = text,
                DOB_FIELD => row.dob = Some(text),
                ARREST_FIELD => row.arrested_at = Some(text),
                other => {
                    let label = other.strip_prefix("lbl").unwrap_or(other);
                    row.raw_fields.insert(label.to_string(), text);
                }
            }
        }
    }

    let mut records = Vec::new();
    for (row_index, row) in rows {
        match row.into_record(row_index, base_url, &patterns) {
            Some(record) => records.push(record),
            None => log::warn!("Skipping inmate row {row_index}: no booking id found"),
        }
    }
    log::debug!("Parsed {} inmates from report", records.len());
    Ok(Report::new(fetched_at, records))
}

/// Compiled selectors and id patterns for one parse.
struct Patterns {
    container: Selector,
    spans: Selector,
    images: Selector,
    field: Regex,
    charge: Regex,
}

impl Patterns {
    fn new() -> Result<Self> {
        Ok(Self {
            container: parse_selector("[id*='dlInmates']")?,
            spans: parse_selector("span[id*='dlInmates_']")?,
            images: parse_selector("img[src]")?,
            field: parse_pattern(r"dlInmates_([A-Za-z][A-Za-z0-9]*)_(\d+)$")?,
            charge: parse_pattern(
                r"dlInmates_Charges_(\d+)_(lblCharge|lblBondOrFine|lblAmount)_(\d+)$",
            )?,
        })
    }

    /// Row index a span's id belongs to, if any.
    fn row_index_of(&self, id: &str) -> Option<u32> {
        if let Some(caps) = self.charge.captures(id) {
            return parse_index(&caps[1]);
        }
        self.field.captures(id).and_then(|caps| parse_index(&caps[2]))
    }
}

/// Accumulates one inmate row as spans are swept in document order.
#[derive(Default)]
struct RowBuilder<'a> {
    anchor: Option<ElementRef<'a>>,
    name: String,
    dob: Option<String>,
    arrested_at: Option<String>,
    charges: BTreeMap<u32, ChargeBuilder>,
    raw_fields: BTreeMap<String, String>,
}

#[derive(Default)]
struct ChargeBuilder {
    description: String,
    disposition: String,
    amount: String,
}

impl<'a> RowBuilder<'a> {
    /// Remember the first span seen for this row; the mug shot lookup
    /// walks outward from it.
    fn note_anchor(&mut self, span: ElementRef<'a>) {
        self.anchor.get_or_insert(span);
    }

    fn into_record(
        self,
        row_index: u32,
        base_url: &Url,
        patterns: &Patterns,
    ) -> Option<InmateRecord> {
        let anchor = self.anchor?;
        let booking_id = find_booking_id(anchor, row_index, patterns)?;
        let mug_shot_url = base_url
            .join(&format!("ImageHandler.ashx?type=image&imageID={booking_id}"))
            .ok()
            .map(String::from);
        let charges = self
            .charges
            .into_values()
            .filter(|charge| !charge.description.is_empty())
            .map(|charge| Charge {
                description: charge.description,
                disposition: charge.disposition,
                amount: charge.amount,
            })
            .collect();
        Some(InmateRecord {
            booking_id,
            name: self.name,
            dob: self.dob,
            arrested_at: self.arrested_at,
            charges,
            mug_shot_url,
            raw_fields: self.raw_fields,
        })
    }
}

/// Find the booking id for a row by locating its mug shot thumbnail.
///
/// Walks outward from the row's first span until an enclosing element
/// contains exactly one thumbnail. The walk stops as soon as an
/// enclosing element also holds spans of another row, so a row without
/// its own thumbnail can never borrow a neighbor's.
fn find_booking_id(anchor: ElementRef<'_>, row_index: u32, patterns: &Patterns) -> Option<String> {
    for ancestor in anchor.ancestors().filter_map(ElementRef::wrap) {
        let foreign_row = ancestor
            .select(&patterns.spans)
            .filter_map(|span| span.value().attr("id"))
            .any(|id| patterns.row_index_of(id).is_some_and(|index| index != row_index));
        if foreign_row {
            return None;
        }
        let mut thumbs = ancestor
            .select(&patterns.images)
            .filter_map(|img| img.value().attr("src"))
            .filter_map(thumb_booking_id);
        if let Some(booking_id) = thumbs.next() {
            if thumbs.next().is_some() {
                return None;
            }
            return Some(booking_id);
        }
    }
    None
}

/// Extract the booking id from a mug shot thumbnail `src`.
fn thumb_booking_id(src: &str) -> Option<String> {
    let (path, query) = src.split_once('?')?;
    if !path.to_ascii_lowercase().ends_with("imagehandler.ashx") {
        return None;
    }
    let mut booking_id = None;
    let mut is_thumb = false;
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key.eq_ignore_ascii_case("imageid") {
            booking_id = Some(value);
        } else if key.eq_ignore_ascii_case("type") && value.eq_ignore_ascii_case("thumb") {
            is_thumb = true;
        }
    }
    let booking_id = booking_id?;
    if !is_thumb || booking_id.is_empty() || !booking_id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(booking_id.to_string())
}

/// Collapse an element's text to single-space separated words.
fn clean_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_index(digits: &str) -> Option<u32> {
    digits.parse().ok()
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::parse(format!("invalid selector '{s}': {e:?}")))
}

fn parse_pattern(s: &str) -> Result<Regex> {
    Regex::new(s).map_err(|e| AppError::parse(format!("invalid id pattern '{s}': {e}")))
}

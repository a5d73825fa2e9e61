//! Durable state for the watcher.
//!
//! Four files plus the mug shot cache directory:
//!
//! ```text
//! jailwatch_history.jsonl   # Append-only sighting history (one JSON object per line)
//! jailwatch_recent.json     # Snapshot of the last reconciled report
//! jailwatch_recent.html     # Raw copy of the last fetched report page
//! jailwatch_most.json       # Highest inmate count ever observed
//! mugs/                     # Cached mug shot images
//! ```
//!
//! Snapshot files are written to a temp file and renamed into place so
//! a crash mid-write never leaves a partial snapshot visible. The
//! history log is append-only and synced after each batch.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{HistoryEntry, MostInmateRecord, PathConfig, Report};

/// Owns every read and write of the watcher's durable files.
pub struct HistoryStore {
    history_log: PathBuf,
    recent_report: PathBuf,
    recent_report_html: PathBuf,
    most_inmates: PathBuf,
}

impl HistoryStore {
    /// Create a store over the configured file locations.
    pub fn new(paths: &PathConfig) -> Self {
        Self {
            history_log: PathBuf::from(&paths.history_log),
            recent_report: PathBuf::from(&paths.recent_report),
            recent_report_html: PathBuf::from(&paths.recent_report_html),
            most_inmates: PathBuf::from(&paths.most_inmates),
        }
    }

    /// Load the last reconciled report, or None before the first cycle.
    pub async fn load_recent(&self) -> Result<Option<Report>> {
        match fs::read(&self.recent_report).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| AppError::persistence("decoding recent report snapshot", e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::persistence("reading recent report snapshot", e)),
        }
    }

    /// Replace the recent report snapshot.
    pub async fn save_recent(&self, report: &Report) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(report)
            .map_err(|e| AppError::persistence("encoding recent report snapshot", e))?;
        self.write_atomic(&self.recent_report, &bytes, "writing recent report snapshot")
            .await
    }

    /// Append a batch of sighting entries to the history log.
    pub async fn append_history(&self, entries: &[HistoryEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)
                .map_err(|e| AppError::persistence("encoding history entry", e))?;
            buf.push(b'\n');
        }
        ensure_parent(&self.history_log).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_log)
            .await
            .map_err(|e| AppError::persistence("opening history log", e))?;
        file.write_all(&buf)
            .await
            .map_err(|e| AppError::persistence("appending to history log", e))?;
        file.flush()
            .await
            .map_err(|e| AppError::persistence("flushing history log", e))?;
        file.sync_all()
            .await
            .map_err(|e| AppError::persistence("syncing history log", e))?;
        Ok(())
    }

    /// Load the most-inmates record.
    ///
    /// A missing or unreadable record starts over from the default so
    /// one corrupt file cannot wedge the watcher; the next report above
    /// zero simply sets a fresh record.
    pub async fn load_most(&self) -> Result<MostInmateRecord> {
        match fs::read(&self.most_inmates).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(record) => Ok(record),
                Err(e) => {
                    log::warn!("Could not parse most-inmates record, starting over: {e}");
                    Ok(MostInmateRecord::default())
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("No most-inmates record found");
                Ok(MostInmateRecord::default())
            }
            Err(e) => Err(AppError::persistence("reading most-inmates record", e)),
        }
    }

    /// Replace the most-inmates record.
    pub async fn save_most(&self, record: &MostInmateRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| AppError::persistence("encoding most-inmates record", e))?;
        self.write_atomic(&self.most_inmates, &bytes, "writing most-inmates record")
            .await
    }

    /// Keep a raw copy of the last fetched report page.
    pub async fn save_report_html(&self, html: &str) -> Result<()> {
        self.write_atomic(
            &self.recent_report_html,
            html.as_bytes(),
            "writing report page copy",
        )
        .await
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_atomic(&self, path: &Path, bytes: &[u8], context: &str) -> Result<()> {
        ensure_parent(path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| AppError::persistence(context, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| AppError::persistence(context, e))?;
        file.flush()
            .await
            .map_err(|e| AppError::persistence(context, e))?;
        file.sync_all()
            .await
            .map_err(|e| AppError::persistence(context, e))?;
        drop(file);

        fs::rename(&tmp, path)
            .await
            .map_err(|e| AppError::persistence(context, e))
    }
}

/// Ensure the parent directory exists.
async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::persistence("creating state directory", e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InmateRecord, SightingEvent};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> HistoryStore {
        let root = dir.path();
        let paths = PathConfig {
            history_log: root.join("history.jsonl").to_string_lossy().into_owned(),
            recent_report: root.join("recent.json").to_string_lossy().into_owned(),
            recent_report_html: root.join("recent.html").to_string_lossy().into_owned(),
            most_inmates: root.join("most.json").to_string_lossy().into_owned(),
            mug_shot_dir: root.join("mugs").to_string_lossy().into_owned(),
        };
        HistoryStore::new(&paths)
    }

    fn make_record(booking_id: &str) -> InmateRecord {
        InmateRecord {
            booking_id: booking_id.to_string(),
            name: format!("INMATE, {booking_id}"),
            dob: None,
            arrested_at: None,
            charges: Vec::new(),
            mug_shot_url: None,
            raw_fields: BTreeMap::new(),
        }
    }

    fn make_entry(booking_id: &str, event: SightingEvent) -> HistoryEntry {
        HistoryEntry {
            observed_at: Utc::now(),
            booking_id: booking_id.to_string(),
            event,
        }
    }

    #[tokio::test]
    async fn test_load_recent_before_first_cycle() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        assert!(store.load_recent().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_report_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        let report = Report::new(Utc::now(), vec![make_record("1"), make_record("2")]);
        store.save_recent(&report).await.unwrap();

        let loaded = store.load_recent().await.unwrap().unwrap();
        assert_eq!(loaded, report);
        assert!(!tmp.path().join("recent.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_recent_replaces_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        store
            .save_recent(&Report::new(Utc::now(), vec![make_record("1")]))
            .await
            .unwrap();
        let newer = Report::new(Utc::now(), vec![make_record("2"), make_record("3")]);
        store.save_recent(&newer).await.unwrap();

        let loaded = store.load_recent().await.unwrap().unwrap();
        assert_eq!(loaded.inmate_count(), 2);
        assert_eq!(loaded.records[0].booking_id, "2");
    }

    #[tokio::test]
    async fn test_append_history_accumulates_lines() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        store
            .append_history(&[
                make_entry("1", SightingEvent::SeenNew),
                make_entry("2", SightingEvent::SeenNew),
            ])
            .await
            .unwrap();
        store
            .append_history(&[make_entry("1", SightingEvent::Departed)])
            .await
            .unwrap();

        let contents = fs::read_to_string(tmp.path().join("history.jsonl"))
            .await
            .unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in &lines {
            let entry: HistoryEntry = serde_json::from_str(line).unwrap();
            assert!(!entry.booking_id.is_empty());
        }
        let last: HistoryEntry = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last.event, SightingEvent::Departed);
    }

    #[tokio::test]
    async fn test_append_history_empty_batch_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        store.append_history(&[]).await.unwrap();
        assert!(!tmp.path().join("history.jsonl").exists());
    }

    #[tokio::test]
    async fn test_load_most_defaults_when_missing() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let record = store.load_most().await.unwrap();
        assert_eq!(record, MostInmateRecord::default());
    }

    #[tokio::test]
    async fn test_most_record_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        let record = MostInmateRecord {
            max_count: 41,
            achieved_at: Utc::now(),
        };
        store.save_most(&record).await.unwrap();
        assert_eq!(store.load_most().await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_load_most_recovers_from_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        fs::write(tmp.path().join("most.json"), b"not json")
            .await
            .unwrap();
        let record = store.load_most().await.unwrap();
        assert_eq!(record, MostInmateRecord::default());
    }

    #[tokio::test]
    async fn test_save_report_html_keeps_raw_copy() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        store.save_report_html("<html>report</html>").await.unwrap();
        let contents = fs::read_to_string(tmp.path().join("recent.html"))
            .await
            .unwrap();
        assert_eq!(contents, "<html>report</html>");
    }

    #[tokio::test]
    async fn test_state_directory_is_created_on_demand() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("nested").join("state");
        let paths = PathConfig {
            history_log: root.join("history.jsonl").to_string_lossy().into_owned(),
            recent_report: root.join("recent.json").to_string_lossy().into_owned(),
            recent_report_html: root.join("recent.html").to_string_lossy().into_owned(),
            most_inmates: root.join("most.json").to_string_lossy().into_owned(),
            mug_shot_dir: root.join("mugs").to_string_lossy().into_owned(),
        };
        let store = HistoryStore::new(&paths);

        store
            .save_most(&MostInmateRecord {
                max_count: 1,
                achieved_at: Utc::now(),
            })
            .await
            .unwrap();
        assert!(root.join("most.json").exists());
    }
}

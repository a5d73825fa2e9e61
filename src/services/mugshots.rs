// src/services/mugshots.rs

//! Mug shot download and cache.
//!
//! Images are cached under the booking id. A changed image for an
//! already-cached id is kept under a timestamped alternate name so
//! earlier captures survive; byte-identical downloads are not written
//! again.

use std::path::PathBuf;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::error::Result;
use crate::models::InmateRecord;
use crate::services::Transport;

/// Concurrent downloads per cycle.
const MAX_CONCURRENT_DOWNLOADS: usize = 4;

/// A mug shot cached on disk for one booking id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMugShot {
    pub booking_id: String,
    pub path: PathBuf,
}

/// Downloads and caches mug shots for new records.
pub struct MugShotFetcher<'a> {
    transport: &'a Transport,
    dir: PathBuf,
}

impl<'a> MugShotFetcher<'a> {
    pub fn new(transport: &'a Transport, dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            dir: dir.into(),
        }
    }

    /// Download and cache mug shots for the given records.
    ///
    /// Failures stay per record: a download that errors or times out is
    /// logged and skipped so the rest of the cycle proceeds.
    pub async fn fetch_all(&self, records: &[InmateRecord]) -> Vec<CachedMugShot> {
        let jobs: Vec<(&InmateRecord, &str)> = records
            .iter()
            .filter_map(|record| {
                record
                    .mug_shot_url
                    .as_deref()
                    .map(|url| (record, url))
            })
            .collect();

        let mut cached = Vec::new();
        let mut downloads = stream::iter(jobs)
            .map(|(record, url)| async move {
                log::debug!("Opening mug shot URL (ID: {})", record.booking_id);
                (record, self.transport.fetch_image(url).await)
            })
            .buffer_unordered(MAX_CONCURRENT_DOWNLOADS);

        while let Some((record, result)) = downloads.next().await {
            match result {
                Ok(bytes) => match self.save(&record.booking_id, &bytes).await {
                    Ok(path) => cached.push(CachedMugShot {
                        booking_id: record.booking_id.clone(),
                        path,
                    }),
                    Err(error) => log::warn!(
                        "Failed to cache mug shot (ID: {}): {}",
                        record.booking_id,
                        error
                    ),
                },
                Err(error) => log::warn!(
                    "Unable to retrieve mug shot (ID: {}): {}",
                    record.booking_id,
                    error
                ),
            }
        }
        cached
    }

    /// Write image bytes under the booking id, keeping earlier captures.
    pub async fn save(&self, booking_id: &str, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;

        let primary = self.dir.join(format!("{booking_id}.jpg"));
        let existing = match fs::read(&primary).await {
            Ok(existing) => Some(existing),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        match existing {
            None => {
                fs::write(&primary, bytes).await?;
                Ok(primary)
            }
            Some(existing) if digest(&existing) == digest(bytes) => {
                log::debug!("Skipping save of identical mug shot (ID: {booking_id})");
                Ok(primary)
            }
            Some(_) => {
                if let Some(alternate) = self.find_identical_alternate(booking_id, bytes).await? {
                    log::debug!("Skipping save of identical mug shot (ID: {booking_id})");
                    return Ok(alternate);
                }
                let alternate = self.dir.join(format!(
                    "{booking_id}_{}.jpg",
                    Utc::now().format("%y%m%d%H%M%S")
                ));
                fs::write(&alternate, bytes).await?;
                log::debug!("Saved changed mug shot under alternate name (ID: {booking_id})");
                Ok(alternate)
            }
        }
    }

    /// Newest capture on disk for a booking id, if any.
    ///
    /// Timestamped alternate names sort after the plain name, so the
    /// lexicographically greatest match is the latest capture.
    pub async fn most_recent_mug(&self, booking_id: &str) -> Option<PathBuf> {
        let plain = format!("{booking_id}.jpg");
        let prefix = format!("{booking_id}_");
        let mut best: Option<String> = None;
        let mut dir = fs::read_dir(&self.dir).await.ok()?;
        while let Ok(Some(entry)) = dir.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name != plain && !(name.starts_with(&prefix) && name.ends_with(".jpg")) {
                continue;
            }
            if best.as_deref().is_none_or(|b| name > b) {
                best = Some(name.to_string());
            }
        }
        best.map(|name| self.dir.join(name))
    }

    /// Look for an alternate capture with the same content.
    async fn find_identical_alternate(
        &self,
        booking_id: &str,
        bytes: &[u8],
    ) -> Result<Option<PathBuf>> {
        let prefix = format!("{booking_id}_");
        let wanted = digest(bytes);
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.ends_with(".jpg") {
                continue;
            }
            let existing = fs::read(entry.path()).await?;
            if digest(&existing) == wanted {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Config;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn fetcher_in<'a>(transport: &'a Transport, dir: &TempDir) -> MugShotFetcher<'a> {
        MugShotFetcher::new(transport, dir.path())
    }

    fn transport() -> Transport {
        let mut config = Config::default();
        config.timeout.open_one_mug_shot = 1;
        Transport::new(&config).unwrap()
    }

    fn make_record(booking_id: &str, url: Option<&str>) -> InmateRecord {
        InmateRecord {
            booking_id: booking_id.to_string(),
            name: format!("INMATE, {booking_id}"),
            dob: None,
            arrested_at: None,
            charges: Vec::new(),
            mug_shot_url: url.map(str::to_string),
            raw_fields: BTreeMap::new(),
        }
    }

    async fn file_count(dir: &TempDir) -> usize {
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn test_save_new_image_uses_booking_id_name() {
        let transport = transport();
        let tmp = TempDir::new().unwrap();
        let fetcher = fetcher_in(&transport, &tmp);

        let path = fetcher.save("318937", b"image-bytes").await.unwrap();
        assert_eq!(path, tmp.path().join("318937.jpg"));
        assert_eq!(fs::read(&path).await.unwrap(), b"image-bytes");
    }

    #[tokio::test]
    async fn test_save_identical_image_is_skipped() {
        let transport = transport();
        let tmp = TempDir::new().unwrap();
        let fetcher = fetcher_in(&transport, &tmp);

        let first = fetcher.save("318937", b"image-bytes").await.unwrap();
        let second = fetcher.save("318937", b"image-bytes").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(file_count(&tmp).await, 1);
    }

    #[tokio::test]
    async fn test_save_changed_image_keeps_both_captures() {
        let transport = transport();
        let tmp = TempDir::new().unwrap();
        let fetcher = fetcher_in(&transport, &tmp);

        fetcher.save("318937", b"first-capture").await.unwrap();
        let alternate = fetcher.save("318937", b"second-capture").await.unwrap();

        assert_ne!(alternate, tmp.path().join("318937.jpg"));
        let name = alternate.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("318937_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(file_count(&tmp).await, 2);

        // The same changed bytes again should reuse the alternate.
        let again = fetcher.save("318937", b"second-capture").await.unwrap();
        assert_eq!(again, alternate);
        assert_eq!(file_count(&tmp).await, 2);
    }

    #[tokio::test]
    async fn test_most_recent_mug_prefers_latest_capture() {
        let transport = transport();
        let tmp = TempDir::new().unwrap();
        let fetcher = fetcher_in(&transport, &tmp);

        assert!(fetcher.most_recent_mug("318937").await.is_none());

        fetcher.save("318937", b"first-capture").await.unwrap();
        assert_eq!(
            fetcher.most_recent_mug("318937").await,
            Some(tmp.path().join("318937.jpg"))
        );

        let alternate = fetcher.save("318937", b"second-capture").await.unwrap();
        assert_eq!(fetcher.most_recent_mug("318937").await, Some(alternate));

        // A different booking id never matches.
        assert!(fetcher.most_recent_mug("3189").await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_all_skips_failures_and_missing_urls() {
        let transport = transport();
        let tmp = TempDir::new().unwrap();
        let fetcher = fetcher_in(&transport, &tmp);

        let records = vec![
            make_record("1", Some("http://127.0.0.1:9/ImageHandler.ashx?imageID=1")),
            make_record("2", None),
        ];
        let cached = fetcher.fetch_all(&records).await;
        assert!(cached.is_empty());
    }
}

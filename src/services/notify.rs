// src/services/notify.rs

//! Announcing new population records.
//!
//! When a report lists more inmates than any earlier report, the record
//! can be posted to Twitter with a mug shot of one of the new arrivals
//! attached. Posting is off by default; while disabled the record is
//! only logged and no request leaves the process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{AppError, Result};
use crate::models::{Config, MostInmateRecord};
use crate::services::oauth::{self, OauthCredentials};

const MEDIA_UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
const STATUS_UPDATE_URL: &str = "https://api.twitter.com/1.1/statuses/update.json";

/// Visible length limit for one status.
const STATUS_LIMIT: usize = 280;
/// Characters the platform reserves for an attached media link.
const MEDIA_RESERVATION: usize = 24;
/// Timestamp format used inside status text.
const RECORD_TIME_FORMAT: &str = "%m/%d/%y %H:%M:%S";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A new population record to announce.
#[derive(Debug, Clone)]
pub struct RecordAnnouncement {
    /// Inmate count that set the record.
    pub count: usize,
    /// When the report carrying this count was fetched.
    pub achieved_at: DateTime<Utc>,
    /// The record this one beat, if any was on file.
    pub previous: Option<MostInmateRecord>,
    /// Cached mug shot to attach, when one is available.
    pub image: Option<PathBuf>,
}

/// Sink for record announcements.
#[async_trait]
pub trait RecordAnnouncer: Send + Sync {
    /// Publish one announcement.
    async fn announce(&self, announcement: &RecordAnnouncement) -> Result<()>;
}

/// Posts record announcements to Twitter.
///
/// Holds no client when posting is disabled, in which case announcing
/// is a logged no-op.
pub struct TwitterNotifier {
    client: Option<TwitterClient>,
    report_url: String,
}

struct TwitterClient {
    http: reqwest::Client,
    credentials: OauthCredentials,
}

impl TwitterNotifier {
    /// Build a notifier from the watcher configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = if config.twitter.enabled {
            let http = reqwest::Client::builder()
                .user_agent(&config.user_agent)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .map_err(|e| AppError::config(format!("failed to build posting client: {e}")))?;
            Some(TwitterClient {
                http,
                credentials: OauthCredentials {
                    api_key: config.twitter.api_key.clone(),
                    api_secret: config.twitter.api_secret.clone(),
                    access_token: config.twitter.access_token.clone(),
                    access_token_secret: config.twitter.access_token_secret.clone(),
                },
            })
        } else {
            info!("Twitter posting is disabled; records will only be logged.");
            None
        };
        Ok(Self {
            client,
            report_url: config.report_url.clone(),
        })
    }

    /// Compose the status text for a record.
    ///
    /// The report link is appended only when it fits, and room is held
    /// back for the media link when an image will be attached.
    fn compose_status(&self, announcement: &RecordAnnouncement) -> String {
        let mut message = format!(
            "New Record: {} inmates listed in jail as of {}.",
            announcement.count,
            announcement.achieved_at.format(RECORD_TIME_FORMAT),
        );
        if let Some(previous) = &announcement.previous {
            message.push_str(&format!(
                " Last record was {} inmates on {}",
                previous.max_count,
                previous.achieved_at.format(RECORD_TIME_FORMAT),
            ));
        }
        let limit = if announcement.image.is_some() {
            STATUS_LIMIT - MEDIA_RESERVATION
        } else {
            STATUS_LIMIT
        };
        let used = message.graphemes(true).count();
        let link = self.report_url.graphemes(true).count();
        if used + link + 1 <= limit {
            message.push(' ');
            message.push_str(&self.report_url);
        }
        truncate_status(message, limit)
    }
}

#[async_trait]
impl RecordAnnouncer for TwitterNotifier {
    async fn announce(&self, announcement: &RecordAnnouncement) -> Result<()> {
        let Some(client) = &self.client else {
            info!(
                "Not posting record of {} inmates since posting is disabled.",
                announcement.count
            );
            return Ok(());
        };
        info!("Posting new record of {} inmates", announcement.count);
        let status = self.compose_status(announcement);
        debug!("Status: {status:?}");
        let media_id = match &announcement.image {
            Some(path) => match client.upload_media(path).await {
                Ok(id) => Some(id),
                Err(error) => {
                    warn!(
                        "Could not attach {}; posting without an image: {error}",
                        path.display()
                    );
                    None
                }
            },
            None => None,
        };
        client.update_status(&status, media_id.as_deref()).await
    }
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
}

impl TwitterClient {
    /// Upload an image and return its media id.
    async fn upload_media(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            AppError::notification(format!("could not read {}: {e}", path.display()))
        })?;
        let header = self.credentials.authorization_header(
            "POST",
            MEDIA_UPLOAD_URL,
            &[],
            &oauth::nonce(),
            Utc::now().timestamp(),
        );
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mug_shot.jpg".to_string());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")
            .map_err(|e| AppError::notification(format!("invalid media part: {e}")))?;
        let response = self
            .http
            .post(MEDIA_UPLOAD_URL)
            .header(AUTHORIZATION, header)
            .multipart(Form::new().part("media", part))
            .send()
            .await
            .map_err(|e| AppError::notification(format!("media upload failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::notification(format!(
                "media upload returned {status}: {body}"
            )));
        }
        let upload: MediaUploadResponse = response
            .json()
            .await
            .map_err(|e| AppError::notification(format!("bad media upload response: {e}")))?;
        Ok(upload.media_id_string)
    }

    /// Post a status, optionally attaching an uploaded image.
    ///
    /// A duplicate-status rejection is treated as already posted. That
    /// happens when the process restarts after posting a record but
    /// before the new maximum reached durable storage.
    async fn update_status(&self, status: &str, media_id: Option<&str>) -> Result<()> {
        let mut params = vec![("status", status)];
        if let Some(id) = media_id {
            params.push(("media_ids", id));
        }
        let header = self.credentials.authorization_header(
            "POST",
            STATUS_UPDATE_URL,
            &params,
            &oauth::nonce(),
            Utc::now().timestamp(),
        );
        let response = self
            .http
            .post(STATUS_UPDATE_URL)
            .header(AUTHORIZATION, header)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::notification(format!("status update failed: {e}")))?;
        let code = response.status();
        if code.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if body.contains("Status is a duplicate") {
            warn!("Status is a duplicate. Suppressing error");
            return Ok(());
        }
        Err(AppError::notification(format!(
            "status update returned {code}: {body}"
        )))
    }
}

/// Truncate to `limit` without splitting a grapheme cluster.
fn truncate_status(status: String, limit: usize) -> String {
    match status.grapheme_indices(true).nth(limit) {
        Some((cut, _)) => {
            warn!("Status is over {limit} characters and will be truncated");
            status[..cut].to_string()
        }
        None => status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_announcement() -> RecordAnnouncement {
        RecordAnnouncement {
            count: 42,
            achieved_at: Utc.with_ymd_and_hms(2015, 3, 14, 9, 26, 53).unwrap(),
            previous: None,
            image: None,
        }
    }

    fn make_notifier() -> TwitterNotifier {
        TwitterNotifier::from_config(&Config::default()).unwrap()
    }

    #[test]
    fn test_compose_status_first_record() {
        let status = make_notifier().compose_status(&make_announcement());
        assert_eq!(
            status,
            "New Record: 42 inmates listed in jail as of 03/14/15 09:26:53. \
             http://dpdjailview.cityofdenton.com/"
        );
    }

    #[test]
    fn test_compose_status_mentions_previous_record() {
        let mut announcement = make_announcement();
        announcement.previous = Some(MostInmateRecord {
            max_count: 40,
            achieved_at: Utc.with_ymd_and_hms(2014, 6, 1, 18, 0, 0).unwrap(),
        });
        let status = make_notifier().compose_status(&announcement);
        assert!(status.contains("Last record was 40 inmates on 06/01/14 18:00:00"));
    }

    #[test]
    fn test_compose_status_reserves_room_for_media() {
        let mut config = Config::default();
        config.report_url = format!("http://example.com/{}", "a".repeat(181));
        let notifier = TwitterNotifier::from_config(&config).unwrap();

        let mut announcement = make_announcement();
        announcement.image = Some(PathBuf::from("4250_150314092653.jpg"));
        assert!(!notifier.compose_status(&announcement).contains("example.com"));

        announcement.image = None;
        assert!(notifier.compose_status(&announcement).contains("example.com"));
    }

    #[test]
    fn test_truncate_status_keeps_short_status() {
        let status = "short status".to_string();
        assert_eq!(truncate_status(status.clone(), STATUS_LIMIT), status);
    }

    #[test]
    fn test_truncate_status_counts_graphemes() {
        let status = "e\u{301}".repeat(10);
        assert_eq!(truncate_status(status, 4), "e\u{301}".repeat(4));
    }

    #[tokio::test]
    async fn test_announce_is_ok_when_posting_disabled() {
        let result = make_notifier().announce(&make_announcement()).await;
        assert!(result.is_ok());
    }
}

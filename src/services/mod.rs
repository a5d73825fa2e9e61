//! Service layer for the jail watcher.
//!
//! This module contains the outward-facing pieces of a cycle:
//! - HTTP fetching for the report page and images (`Transport`)
//! - Custody report parsing (`parse_report`)
//! - Mug shot download and caching (`MugShotFetcher`)
//! - Record announcements (`TwitterNotifier`)

pub mod mugshots;
pub mod notify;
pub mod oauth;
pub mod report;
pub mod transport;

pub use mugshots::{CachedMugShot, MugShotFetcher};
pub use notify::{RecordAnnouncement, RecordAnnouncer, TwitterNotifier};
pub use report::parse_report;
pub use transport::Transport;

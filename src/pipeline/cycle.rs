//! One watch cycle, fetch through announcement.
//!
//! A cycle moves through explicit phases so a failure can always name
//! where it happened: fetching the page, parsing it, reconciling
//! against durable state, and notifying. Mug shot caching and record
//! announcements degrade with a warning; everything before them
//! abandons the cycle on error.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, InmateRecord};
use crate::pipeline::reconcile::Reconciler;
use crate::services::mugshots::{CachedMugShot, MugShotFetcher};
use crate::services::notify::{RecordAnnouncement, RecordAnnouncer};
use crate::services::report::parse_report;
use crate::services::transport::Transport;
use crate::storage::HistoryStore;

/// Phases of the watch state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Parsing,
    Reconciling,
    Notifying,
    ThrottleWait,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Fetching => "fetching",
            CyclePhase::Parsing => "parsing",
            CyclePhase::Reconciling => "reconciling",
            CyclePhase::Notifying => "notifying",
            CyclePhase::ThrottleWait => "throttle wait",
        };
        f.write_str(name)
    }
}

/// Counts reported by a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub inmate_count: usize,
    pub seen_new: usize,
    pub departed: usize,
    /// Set when this cycle's count beat the durable maximum.
    pub new_maximum: Option<usize>,
}

/// How one cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleSummary),
    Abandoned { phase: CyclePhase, error: AppError },
}

/// Shared handles one cycle runs against.
pub struct CycleContext<'a> {
    pub config: &'a Config,
    pub transport: &'a Transport,
    pub store: &'a HistoryStore,
    pub announcer: &'a dyn RecordAnnouncer,
    base_url: Url,
}

impl<'a> CycleContext<'a> {
    pub fn new(
        config: &'a Config,
        transport: &'a Transport,
        store: &'a HistoryStore,
        announcer: &'a dyn RecordAnnouncer,
    ) -> Result<Self> {
        let base_url = Url::parse(&config.report_url)?;
        Ok(Self {
            config,
            transport,
            store,
            announcer,
            base_url,
        })
    }
}

/// Run one complete cycle against the live report page.
pub async fn run_cycle(ctx: &CycleContext<'_>) -> CycleOutcome {
    let phase = CyclePhase::Fetching;
    debug!("Cycle phase: {phase}");
    let fetched_at = Utc::now();
    let html = match ctx.transport.fetch_report_page().await {
        Ok(html) => html,
        Err(error) => return CycleOutcome::Abandoned { phase, error },
    };
    // Keep the raw page around for diagnosing parse failures.
    if let Err(error) = ctx.store.save_report_html(&html).await {
        warn!("Could not keep a raw copy of the report: {error}");
    }
    process_report(ctx, &html, fetched_at).await
}

/// Parse, reconcile, and announce one already-fetched report page.
async fn process_report(
    ctx: &CycleContext<'_>,
    html: &str,
    fetched_at: DateTime<Utc>,
) -> CycleOutcome {
    let mut phase = CyclePhase::Parsing;
    debug!("Cycle phase: {phase}");
    let report = match parse_report(html, fetched_at, &ctx.base_url) {
        Ok(report) => report,
        Err(error) => return CycleOutcome::Abandoned { phase, error },
    };
    info!("Jail report contains {} inmates.", report.inmate_count());

    phase = CyclePhase::Reconciling;
    debug!("Cycle phase: {phase}");
    let reconciler = Reconciler::new(ctx.store, ctx.config.log_still_present);
    let result = match reconciler.run(&report).await {
        Ok(result) => result,
        Err(error) => return CycleOutcome::Abandoned { phase, error },
    };

    let fetcher = MugShotFetcher::new(ctx.transport, &ctx.config.path.mug_shot_dir);
    let cached = fetcher.fetch_all(&result.classification.seen_new).await;

    phase = CyclePhase::Notifying;
    debug!("Cycle phase: {phase}");
    if let Some(new_max) = &result.new_maximum {
        let announcement = RecordAnnouncement {
            count: new_max.count,
            achieved_at: new_max.achieved_at,
            previous: new_max.previous.clone(),
            image: announcement_image(&fetcher, &result.classification.seen_new, &cached).await,
        };
        if let Err(error) = ctx.announcer.announce(&announcement).await {
            warn!(
                "Could not announce record of {} inmates: {error}",
                new_max.count
            );
        }
    }

    CycleOutcome::Completed(CycleSummary {
        inmate_count: result.inmate_count,
        seen_new: result.classification.seen_new.len(),
        departed: result.classification.departed.len(),
        new_maximum: result.new_maximum.map(|m| m.count),
    })
}

/// Pick the image to attach to a record announcement.
///
/// New inmates are tried in arrest order, earliest first; records
/// without a parseable arrest time rank last. A record whose download
/// failed this cycle can still contribute a capture from an earlier
/// one.
async fn announcement_image(
    fetcher: &MugShotFetcher<'_>,
    seen_new: &[InmateRecord],
    cached: &[CachedMugShot],
) -> Option<PathBuf> {
    let mut records: Vec<&InmateRecord> = seen_new.iter().collect();
    records.sort_by_key(|record| (record.arrest_time().is_none(), record.arrest_time()));
    for record in records {
        if let Some(shot) = cached.iter().find(|s| s.booking_id == record.booking_id) {
            return Some(shot.path.clone());
        }
        if let Some(path) = fetcher.most_recent_mug(&record.booking_id).await {
            return Some(path);
        }
    }
    None
}

//! The long-running watch loop.
//!
//! Drives one cycle after another, enforcing the minimum report age
//! between fetch starts. On startup the throttle clock is primed from
//! the persisted snapshot so a supervisor restart does not hammer the
//! source. Repeated failures double the wait, capped at eight times
//! the floor, and the shutdown signal is only observed between cycles
//! so no write is ever interrupted.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::time::sleep;

use crate::error::AppError;
use crate::pipeline::cycle::{self, CycleContext, CycleOutcome, CyclePhase};

/// Doublings applied to the wait floor under repeated failures.
const MAX_BACKOFF_DOUBLINGS: u32 = 3;
/// Consecutive failed cycles before the health log escalates.
const UNHEALTHY_AFTER_FAILURES: u32 = 3;

/// Schedules cycles against the report page.
pub struct Watcher<'a> {
    ctx: CycleContext<'a>,
    floor: Duration,
    last_fetch_started: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

impl<'a> Watcher<'a> {
    pub fn new(ctx: CycleContext<'a>) -> Self {
        let floor = Duration::from_secs(ctx.config.minimum_report_age_s);
        Self {
            ctx,
            floor,
            last_fetch_started: None,
            consecutive_failures: 0,
        }
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// The signal is only checked while waiting, so a cycle in flight
    /// always completes or abandons on its own.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        self.prime_from_store().await;
        tokio::pin!(shutdown);
        loop {
            let now = Utc::now();
            let wait = self.wait_before_fetch(now);
            if wait.is_zero() {
                debug!("Cycle phase: {}", CyclePhase::Idle);
            } else {
                debug!("Cycle phase: {}", CyclePhase::ThrottleWait);
                self.log_throttle(now);
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutting down");
                    return;
                }
                _ = sleep(wait) => {}
            }
            self.step().await;
        }
    }

    /// Run a single cycle and exit.
    ///
    /// Honors the same startup throttle as the loop: when the persisted
    /// report is still too fresh, nothing runs and `None` is returned.
    pub async fn run_once(mut self) -> Option<CycleOutcome> {
        self.prime_from_store().await;
        let now = Utc::now();
        let wait = self.wait_before_fetch(now);
        if !wait.is_zero() {
            self.log_throttle(now);
            return None;
        }
        Some(self.step().await)
    }

    /// Prime the throttle clock from the persisted snapshot.
    async fn prime_from_store(&mut self) {
        match self.ctx.store.load_recent().await {
            Ok(Some(report)) => {
                debug!(
                    "Throttle clock primed from snapshot fetched at {}",
                    report.fetched_at
                );
                self.last_fetch_started = Some(report.fetched_at);
            }
            Ok(None) => warn!("No recent report, so not throttling."),
            Err(error) => warn!("Could not read the recent snapshot: {error}"),
        }
    }

    /// Wait required before the next fetch may start.
    fn wait_before_fetch(&self, now: DateTime<Utc>) -> Duration {
        match self.last_fetch_started {
            Some(last) => remaining_wait(last, now, self.effective_floor()),
            None => Duration::ZERO,
        }
    }

    /// Wait floor currently in force, failure backoff included.
    fn effective_floor(&self) -> Duration {
        backoff_wait(self.floor, self.consecutive_failures)
    }

    fn log_throttle(&self, now: DateTime<Utc>) {
        let elapsed = self
            .last_fetch_started
            .map(|last| (now - last).num_seconds().max(0))
            .unwrap_or(0);
        info!(
            "Throttling since last report was generated {} s ago, which is less than {} s.",
            elapsed,
            self.effective_floor().as_secs()
        );
    }

    /// Run one cycle and update the failure accounting.
    async fn step(&mut self) -> CycleOutcome {
        self.last_fetch_started = Some(Utc::now());
        let outcome = cycle::run_cycle(&self.ctx).await;
        match &outcome {
            CycleOutcome::Completed(summary) => {
                self.consecutive_failures = 0;
                info!(
                    "Cycle completed: {} inmates, {} new, {} departed",
                    summary.inmate_count, summary.seen_new, summary.departed
                );
            }
            CycleOutcome::Abandoned { phase, error } => {
                self.consecutive_failures += 1;
                // A parse failure means the page layout changed and a
                // human needs to look at it.
                match error {
                    AppError::Parse(_) => error!("Cycle abandoned while {phase}: {error}"),
                    _ => warn!("Cycle abandoned while {phase}: {error}"),
                }
                if self.consecutive_failures >= UNHEALTHY_AFTER_FAILURES {
                    error!("{} consecutive failed cycles", self.consecutive_failures);
                }
            }
        }
        outcome
    }
}

/// Wait floor with the failure backoff applied.
///
/// The first failure keeps the configured floor; each further
/// consecutive failure doubles it, up to eight times the floor.
fn backoff_wait(floor: Duration, consecutive_failures: u32) -> Duration {
    let doublings = consecutive_failures
        .saturating_sub(1)
        .min(MAX_BACKOFF_DOUBLINGS);
    floor.saturating_mul(1u32 << doublings)
}

/// Time left before a fetch started at `last` ages past `floor`.
///
/// Clamped to the floor itself when the clock moved backwards.
fn remaining_wait(last: DateTime<Utc>, now: DateTime<Utc>, floor: Duration) -> Duration {
    let elapsed = now - last;
    if elapsed < chrono::Duration::zero() {
        return floor;
    }
    floor.saturating_sub(elapsed.to_std().unwrap_or(Duration::ZERO))
}

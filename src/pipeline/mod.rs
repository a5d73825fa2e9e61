//! Pipeline entry points for watcher operations.
//!
//! - `reconcile`: classify a report against the last snapshot and persist
//! - `cycle`: one full report cycle, fetch through announcement
//! - `watch`: the scheduler loop around cycles

pub mod cycle;
pub mod reconcile;
pub mod watch;

pub use cycle::{CycleContext, CycleOutcome, CyclePhase, CycleSummary, run_cycle};
pub use watch::Watcher;

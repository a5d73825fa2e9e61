// src/models/mod.rs

//! Domain models for the jail watcher.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod inmate;
mod report;

// Re-export all public types
pub use config::{
    Config, LoggingConfig, PathConfig, ProxyConfig, TimeoutConfig, TwitterConfig,
};
pub use inmate::{Charge, InmateRecord};
pub use report::{HistoryEntry, MostInmateRecord, Report, SightingEvent};

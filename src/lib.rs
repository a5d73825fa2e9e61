// src/lib.rs

//! Jail custody report watcher library

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;

//! # Syncplay Common Library
//!
//! Shared code for the synchronized playback workspace:
//! - Error type for configuration loading
//! - Synchronization tunables (`SyncConfig`) and config file resolution
//! - Human-readable timeline formatting for logs

pub mod config;
pub mod error;
pub mod human_time;

pub use config::SyncConfig;
pub use error::{Error, Result};

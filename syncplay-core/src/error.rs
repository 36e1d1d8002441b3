//! Error types for syncplay-core
//!
//! Construction-time configuration errors are returned synchronously and never
//! raised later. Engine failures observed at runtime travel as events; the
//! `Engine` variant only covers failures surfaced while building a player.

use thiserror::Error;

/// Unrecoverable backend failure reported by a leaf engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{player}: {message}")]
pub struct EngineFailure {
    /// Display name of the player that observed the failure
    pub player: String,
    /// Backend-provided description
    pub message: String,
}

impl EngineFailure {
    pub fn new(player: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            player: player.into(),
            message: message.into(),
        }
    }
}

/// Main error type for syncplay-core
#[derive(Error, Debug)]
pub enum Error {
    /// Interval with `end <= start`
    #[error("Invalid interval [{start}, {end}): end must be greater than start")]
    EmptyInterval { start: u64, end: u64 },

    /// Interval starting before the previous one ends
    #[error("Intervals out of order at index {index}: start {start} precedes previous end {previous_end}")]
    Unordered {
        index: usize,
        start: u64,
        previous_end: u64,
    },

    /// Interval extending past the wrapped player's duration
    #[error("Interval [{start}, {end}) exceeds player duration {duration}")]
    OutOfBounds { start: u64, end: u64, duration: u64 },

    /// Selection options without any selection
    #[error("Selection options must contain at least one selection")]
    EmptySelection,

    /// Cluster without members
    #[error("Cluster requires at least one member")]
    EmptyCluster,

    /// Sequencer without clips
    #[error("Sequencer requires at least one clip")]
    EmptySchedule,

    /// Offset given as a negative number of milliseconds
    #[error("Offset must be non-negative, got {0}ms")]
    NegativeOffset(i64),

    /// Engine could not be created or bound
    #[error("Engine error: {0}")]
    Engine(#[from] EngineFailure),

    /// Shared configuration errors
    #[error(transparent)]
    Common(#[from] syncplay_common::Error),
}

/// Convenience Result type using syncplay-core Error
pub type Result<T> = std::result::Result<T, Error>;

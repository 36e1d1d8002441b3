//! syncplay-core: synchronized playback over heterogeneous media engines
//!
//! A tree of players (leaf engines and the coordinators that combine or
//! remap their timelines) behaves as one logical player with a single
//! play/pause/stop/seek/duration/listener contract.
//!
//! - [`leaf`]: phase machine over one external [`Engine`]
//! - [`coordinator`]: cluster, selection, offset and sequencer composites
//! - [`runtime`]: one actor task per tree; [`PlayerHandle`] is the caller's side
//! - [`facade`]: convenience constructors
//! - [`sim`]: simulated backend for demos and tests

pub mod clock;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod event;
pub mod facade;
pub mod leaf;
pub mod listener;
pub mod phase;
pub mod player;
pub mod runtime;
pub mod sim;
pub mod timeline;

#[cfg(test)]
mod testing;

pub use coordinator::{ClusterCoordinator, OffsetCoordinator, SelectionCoordinator, SequencerCoordinator};
pub use engine::{Engine, EngineFactory, EngineReport, EngineReporter, LeafId, ReportSink, SourceRef, Surface};
pub use error::{EngineFailure, Error, Result};
pub use event::{Ctx, PlayerEvent, Tick};
pub use facade::PlayerBuilder;
pub use leaf::LeafPlayer;
pub use listener::{ChannelListener, ListenerId, ListenerRegistry, Notification, PlayerListener};
pub use phase::Phase;
pub use player::Player;
pub use runtime::{Command, PlayerHandle, Snapshot};
pub use sim::SimulatedEngine;
pub use syncplay_common::SyncConfig;
pub use timeline::{ClipSchedule, ScheduledClip, Selection, SelectionOptions, TimelineMap};

//! Player contract shared by leaves and composites
//!
//! A player tree is a plain owned value: composites hold their children by
//! value, so every child has exactly one owner and release walks each node
//! once. The runtime actor owns the root.

use crate::coordinator::{
    ClusterCoordinator, OffsetCoordinator, SelectionCoordinator, SequencerCoordinator,
};
use crate::engine::{EngineReport, LeafId, ReportSink};
use crate::error::EngineFailure;
use crate::event::{Ctx, Tick};
use crate::leaf::LeafPlayer;
use crate::phase::Phase;
use tracing::warn;

/// Any engine or coordinator honoring the player contract
pub enum Player {
    Leaf(LeafPlayer),
    Cluster(ClusterCoordinator),
    Selection(SelectionCoordinator),
    Offset(OffsetCoordinator),
    Sequencer(SequencerCoordinator),
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            Player::Leaf($inner) => $body,
            Player::Cluster($inner) => $body,
            Player::Selection($inner) => $body,
            Player::Offset($inner) => $body,
            Player::Sequencer($inner) => $body,
        }
    };
}

impl Player {
    pub fn kind(&self) -> &'static str {
        match self {
            Player::Leaf(_) => "leaf",
            Player::Cluster(_) => "cluster",
            Player::Selection(_) => "selection",
            Player::Offset(_) => "offset",
            Player::Sequencer(_) => "sequencer",
        }
    }

    pub fn name(&self) -> &str {
        dispatch!(self, p => p.name())
    }

    /// Directly owned child players. Sequencer clip engines are created and
    /// dropped on the fly and are not listed.
    pub fn children(&self) -> Vec<&Player> {
        match self {
            Player::Leaf(_) | Player::Sequencer(_) => Vec::new(),
            Player::Cluster(cluster) => cluster.members().iter().collect(),
            Player::Selection(selection) => vec![selection.child()],
            Player::Offset(offset) => vec![offset.child()],
        }
    }

    pub fn phase(&self) -> Phase {
        dispatch!(self, p => p.phase())
    }

    /// Position on this player's own timeline (ms)
    pub fn position(&self) -> u64 {
        dispatch!(self, p => p.position())
    }

    /// Duration of this player's own timeline (ms), 0 while unknown
    pub fn duration(&self) -> u64 {
        dispatch!(self, p => p.duration())
    }

    /// Last engine failure observed by this node
    pub fn error(&self) -> Option<&EngineFailure> {
        dispatch!(self, p => p.error())
    }

    pub fn is_released(&self) -> bool {
        dispatch!(self, p => p.is_released())
    }

    /// Connect every leaf below this node to the runtime
    pub fn attach(&mut self, sink: &ReportSink) {
        dispatch!(self, p => p.attach(sink))
    }

    pub fn play(&mut self, cx: &mut Ctx) {
        dispatch!(self, p => p.play(cx))
    }

    pub fn pause(&mut self, cx: &mut Ctx) {
        dispatch!(self, p => p.pause(cx))
    }

    /// Enter `Ready` without moving the position; rewinding is `seek_to(0)`
    pub fn stop(&mut self, cx: &mut Ctx) {
        dispatch!(self, p => p.stop(cx))
    }

    /// Seek, clamped to `[0, duration]`; acknowledged with a `SeekTo` event
    pub fn seek_to(&mut self, target_ms: u64, cx: &mut Ctx) {
        dispatch!(self, p => p.seek_to(target_ms, cx))
    }

    /// Scale playback rate for the whole subtree. Speeds that are not
    /// finite and positive are ignored.
    pub fn set_playback_speed(&mut self, speed: f32, cx: &mut Ctx) {
        if !speed.is_finite() || speed <= 0.0 {
            warn!("[{}] invalid playback speed {} ignored", self.name(), speed);
            return;
        }
        dispatch!(self, p => p.set_playback_speed(speed, cx))
    }

    /// Route an engine report to the leaf it belongs to.
    /// Returns false if no leaf below this node has that id.
    pub fn deliver(&mut self, leaf: LeafId, report: EngineReport, cx: &mut Ctx) -> bool {
        dispatch!(self, p => p.deliver(leaf, report, cx))
    }

    pub fn tick(&mut self, tick: Tick, cx: &mut Ctx) {
        dispatch!(self, p => p.tick(tick, cx))
    }

    /// Tear down this node and everything below it. Idempotent.
    pub fn release(&mut self) {
        dispatch!(self, p => p.release())
    }
}

impl From<LeafPlayer> for Player {
    fn from(player: LeafPlayer) -> Self {
        Player::Leaf(player)
    }
}

impl From<ClusterCoordinator> for Player {
    fn from(player: ClusterCoordinator) -> Self {
        Player::Cluster(player)
    }
}

impl From<SelectionCoordinator> for Player {
    fn from(player: SelectionCoordinator) -> Self {
        Player::Selection(player)
    }
}

impl From<OffsetCoordinator> for Player {
    fn from(player: OffsetCoordinator) -> Self {
        Player::Offset(player)
    }
}

impl From<SequencerCoordinator> for Player {
    fn from(player: SequencerCoordinator) -> Self {
        Player::Sequencer(player)
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("phase", &self.phase())
            .field("position", &self.position())
            .field("duration", &self.duration())
            .finish()
    }
}

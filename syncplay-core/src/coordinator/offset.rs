//! Offset coordinator: dead zone of virtual time before a child starts
//!
//! While the virtual position is below the offset the child is left alone
//! and a [`SelfClock`] drives position updates. Once the clock reaches the
//! offset the child is started and its positions are relayed shifted by the
//! offset.

use syncplay_common::human_time::format_position;
use tracing::{debug, error, info};

use crate::clock::SelfClock;
use crate::engine::{EngineReport, LeafId, ReportSink};
use crate::error::{EngineFailure, Error, Result};
use crate::event::{ChildInbox, Ctx, PlayerEvent, Tick};
use crate::phase::Phase;
use crate::player::Player;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Virtual position in `[0, offset)`, self-clocked
    PreRoll,
    /// Child owns the timeline
    Child,
}

pub struct OffsetCoordinator {
    name: String,
    child: Box<Player>,
    offset_ms: u64,
    stage: Stage,
    clock: SelfClock,
    inbox: ChildInbox,
    phase: Phase,
    target: Phase,
    position: u64,
    /// Child may sit somewhere other than 0 and needs rewinding on entry
    child_dirty: bool,
    internal_seeks: u32,
    error: Option<EngineFailure>,
    released: bool,
}

impl OffsetCoordinator {
    pub fn new(child: impl Into<Player>, offset_ms: u64) -> Self {
        let child = child.into();
        let stage = if offset_ms == 0 { Stage::Child } else { Stage::PreRoll };
        let phase = match stage {
            Stage::PreRoll => Phase::Idle,
            Stage::Child => child.phase(),
        };
        Self {
            name: "offset".to_string(),
            child: Box::new(child),
            offset_ms,
            stage,
            clock: SelfClock::new(),
            inbox: ChildInbox::default(),
            phase,
            target: Phase::Idle,
            position: 0,
            child_dirty: false,
            internal_seeks: 0,
            error: None,
            released: false,
        }
    }

    /// Construct from a signed offset, rejecting negative values
    pub fn try_from_signed(child: impl Into<Player>, offset_ms: i64) -> Result<Self> {
        let offset = u64::try_from(offset_ms).map_err(|_| Error::NegativeOffset(offset_ms))?;
        Ok(Self::new(child, offset))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn offset_ms(&self) -> u64 {
        self.offset_ms
    }

    pub fn child(&self) -> &Player {
        &self.child
    }

    pub fn in_pre_roll(&self) -> bool {
        self.stage == Stage::PreRoll
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn duration(&self) -> u64 {
        self.offset_ms + self.child.duration()
    }

    pub fn error(&self) -> Option<&EngineFailure> {
        self.error.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn attach(&mut self, sink: &ReportSink) {
        self.child.attach(sink);
    }

    pub fn play(&mut self, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.target = Phase::Playing;
        match self.stage {
            Stage::PreRoll => {
                self.clock.start(cx.now());
                self.refresh_phase(cx);
            }
            Stage::Child => self.with_child(cx, |child, c| child.play(c)),
        }
    }

    pub fn pause(&mut self, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.target = Phase::Paused;
        match self.stage {
            Stage::PreRoll => {
                self.clock.pause(cx.now());
                self.position = self.clock.position(cx.now());
                self.refresh_phase(cx);
            }
            Stage::Child => self.with_child(cx, |child, c| child.pause(c)),
        }
    }

    pub fn stop(&mut self, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.target = Phase::Ready;
        match self.stage {
            Stage::PreRoll => {
                self.clock.pause(cx.now());
                self.position = self.clock.position(cx.now());
                self.refresh_phase(cx);
            }
            Stage::Child => self.with_child(cx, |child, c| child.stop(c)),
        }
    }

    pub fn seek_to(&mut self, target_ms: u64, cx: &mut Ctx) {
        if self.released {
            return;
        }
        let duration = self.duration();
        let target = if self.child.duration() > 0 { target_ms.min(duration) } else { target_ms };

        if target < self.offset_ms {
            debug!("[{}] seek_to {} inside pre-roll", self.name, format_position(target));
            if self.stage == Stage::Child {
                self.stage = Stage::PreRoll;
                self.with_child(cx, |child, c| child.pause(c));
            }
            self.clock.set(target, cx.now());
            if self.target == Phase::Playing {
                self.clock.start(cx.now());
            }
            self.position = target;
            cx.emit(PlayerEvent::SeekTo(target));
            cx.emit(PlayerEvent::PositionChanged(target));
            self.refresh_phase(cx);
            return;
        }

        let child_target = target - self.offset_ms;
        debug!(
            "[{}] seek_to {} -> child {}",
            self.name,
            format_position(target),
            format_position(child_target)
        );
        let entering = self.stage == Stage::PreRoll;
        self.stage = Stage::Child;
        self.clock.pause(cx.now());
        self.child_dirty = true;
        self.position = target;
        self.with_child(cx, move |child, c| child.seek_to(child_target, c));
        if entering && self.target == Phase::Playing {
            self.with_child(cx, |child, c| child.play(c));
        }
    }

    pub fn set_playback_speed(&mut self, speed: f32, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.clock.set_speed(speed, cx.now());
        self.with_child(cx, move |child, c| child.set_playback_speed(speed, c));
    }

    pub fn deliver(&mut self, leaf: LeafId, report: EngineReport, cx: &mut Ctx) -> bool {
        let mut child_cx = cx.child();
        if !self.child.deliver(leaf, report, &mut child_cx) {
            return false;
        }
        self.inbox.collect(0, &mut child_cx);
        self.drain(cx);
        true
    }

    /// The received tick is forwarded unchanged; only a cluster demotes it
    pub fn tick(&mut self, tick: Tick, cx: &mut Ctx) {
        if self.released {
            return;
        }
        match self.stage {
            Stage::PreRoll => {
                if !self.clock.is_running() {
                    return;
                }
                let position = self.clock.position(cx.now());
                if position >= self.offset_ms {
                    self.enter_child(cx);
                } else if position != self.position {
                    self.position = position;
                    cx.emit(PlayerEvent::PositionChanged(position));
                }
            }
            Stage::Child => self.with_child(cx, move |child, c| child.tick(tick, c)),
        }
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.child.release();
        self.inbox.clear();
        debug!("[{}] released", self.name);
    }

    /// Pre-roll clock reached the offset: hand the timeline to the child
    fn enter_child(&mut self, cx: &mut Ctx) {
        info!(
            "[{}] pre-roll finished at {}, starting child",
            self.name,
            format_position(self.offset_ms)
        );
        self.stage = Stage::Child;
        self.clock.pause(cx.now());
        self.clock.set(self.offset_ms, cx.now());
        self.position = self.offset_ms;
        cx.emit(PlayerEvent::PositionChanged(self.offset_ms));

        if self.child_dirty {
            self.internal_seeks += 1;
            self.with_child(cx, |child, c| child.seek_to(0, c));
        }
        self.child_dirty = true;
        if self.target == Phase::Playing {
            self.with_child(cx, |child, c| child.play(c));
        }
        self.refresh_phase(cx);
    }

    fn with_child<F>(&mut self, cx: &mut Ctx, f: F)
    where
        F: FnOnce(&mut Player, &mut Ctx),
    {
        let mut child_cx = cx.child();
        f(&mut self.child, &mut child_cx);
        self.inbox.collect(0, &mut child_cx);
        self.drain(cx);
    }

    fn drain(&mut self, cx: &mut Ctx) {
        if !self.inbox.begin_drain() {
            return;
        }
        while let Some((_, event)) = self.inbox.next() {
            self.on_child_event(event, cx);
        }
        self.inbox.end_drain();
        self.refresh_phase(cx);
    }

    fn on_child_event(&mut self, event: PlayerEvent, cx: &mut Ctx) {
        if let PlayerEvent::Error(failure) = event {
            error!("[{}] child failed: {}", self.name, failure);
            self.error = Some(failure.clone());
            cx.emit(PlayerEvent::Error(failure));
            return;
        }
        if self.stage == Stage::PreRoll {
            return;
        }
        match event {
            PlayerEvent::PositionChanged(position) => {
                if self.internal_seeks == 0 {
                    self.position = position + self.offset_ms;
                    cx.emit(PlayerEvent::PositionChanged(self.position));
                }
            }
            PlayerEvent::SeekTo(position) => {
                if self.internal_seeks > 0 {
                    self.internal_seeks -= 1;
                } else {
                    self.position = position + self.offset_ms;
                    cx.emit(PlayerEvent::SeekTo(self.position));
                }
            }
            PlayerEvent::PhaseChanged(_) | PlayerEvent::Error(_) => {}
        }
    }

    fn refresh_phase(&mut self, cx: &mut Ctx) {
        let phase = match self.stage {
            Stage::PreRoll => match self.target {
                Phase::Playing => Phase::Playing,
                Phase::Paused => Phase::Paused,
                Phase::Idle => Phase::Idle,
                _ => Phase::Ready,
            },
            Stage::Child => match self.child.phase() {
                // Child still loading at the boundary
                Phase::Idle | Phase::Ready if self.target == Phase::Playing => Phase::Buffering,
                phase => phase,
            },
        };
        if phase != self.phase {
            debug!("[{}] phase {} -> {}", self.name, self.phase, phase);
            self.phase = phase;
            cx.emit(PlayerEvent::PhaseChanged(phase));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::ClusterCoordinator;
    use crate::testing::{deliver, positions, scripted_leaf, CallLog, EngineCall, TestClock};

    fn offset(child_duration: u64, offset_ms: u64) -> (Player, LeafId, CallLog) {
        let (leaf, id, log) = scripted_leaf("doc", child_duration);
        (OffsetCoordinator::new(leaf, offset_ms).into(), id, log)
    }

    #[test]
    fn test_duration_includes_offset() {
        let (player, _, _) = offset(60_000, 5000);
        assert_eq!(player.duration(), 65_000);
    }

    #[test]
    fn test_negative_offset_rejected() {
        let (leaf, _, _) = scripted_leaf("doc", 60_000);
        assert!(matches!(
            OffsetCoordinator::try_from_signed(leaf, -1),
            Err(Error::NegativeOffset(-1))
        ));
    }

    #[test]
    fn test_pre_roll_is_self_clocked_and_leaves_child_alone() {
        let clock = TestClock::new();
        let (mut player, _, log) = offset(60_000, 5000);
        let mut cx = clock.at(0);
        player.play(&mut cx);
        assert_eq!(player.phase(), Phase::Playing);

        let mut cx = clock.at(2000);
        player.tick(Tick::root(), &mut cx);

        assert_eq!(positions(cx.events()), vec![2000]);
        assert_eq!(player.position(), 2000);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn test_child_starts_when_clock_reaches_offset() {
        let clock = TestClock::new();
        let (mut player, id, log) = offset(60_000, 5000);
        player.play(&mut clock.at(0));

        let mut cx = clock.at(5000);
        player.tick(Tick::root(), &mut cx);
        assert_eq!(log.calls(), vec![EngineCall::Prepare]);
        assert_eq!(player.phase(), Phase::Buffering);
        cx.take_events();

        deliver(&mut player, id, EngineReport::Ready, &mut cx);
        assert_eq!(player.phase(), Phase::Playing);

        let events = deliver(&mut player, id, EngineReport::Position(1000), &mut cx);
        assert_eq!(positions(&events), vec![6000]);
    }

    #[test]
    fn test_seek_into_child_timeline_delegates() {
        let clock = TestClock::new();
        let (mut player, id, log) = offset(60_000, 5000);
        let mut cx = clock.at(0);

        player.seek_to(30_000, &mut cx);
        assert_eq!(log.seeks(), vec![25_000]);
        cx.take_events();

        let events = deliver(&mut player, id, EngineReport::SeekCompleted(25_000), &mut cx);
        assert_eq!(events, vec![PlayerEvent::SeekTo(30_000)]);
    }

    #[test]
    fn test_seek_back_into_pre_roll_pauses_child() {
        let clock = TestClock::new();
        let (mut player, id, log) = offset(60_000, 5000);
        let mut cx = clock.at(0);
        player.play(&mut cx);
        player.seek_to(30_000, &mut cx);
        deliver(&mut player, id, EngineReport::Ready, &mut cx);
        deliver(&mut player, id, EngineReport::SeekCompleted(25_000), &mut cx);
        log.clear();

        player.seek_to(1000, &mut cx);
        assert_eq!(log.calls(), vec![EngineCall::Pause]);
        assert_eq!(
            cx.take_events(),
            vec![
                PlayerEvent::SeekTo(1000),
                PlayerEvent::PositionChanged(1000)
            ]
        );

        // Late child reports during pre-roll are not relayed
        let events = deliver(&mut player, id, EngineReport::Position(25_200), &mut cx);
        assert!(events.is_empty());

        // Re-entering the child timeline rewinds it first
        let mut cx = clock.at(4000);
        player.tick(Tick::root(), &mut cx);
        assert_eq!(log.calls(), vec![EngineCall::Pause, EngineCall::SeekTo(0), EngineCall::Play]);

        let events = deliver(&mut player, id, EngineReport::SeekCompleted(0), &mut cx);
        assert!(!events.iter().any(|e| matches!(e, PlayerEvent::SeekTo(_))));
    }

    #[test]
    fn test_pause_freezes_pre_roll_clock() {
        let clock = TestClock::new();
        let (mut player, _, _) = offset(60_000, 5000);
        player.play(&mut clock.at(0));
        player.pause(&mut clock.at(1500));
        assert_eq!(player.phase(), Phase::Paused);

        let mut cx = clock.at(9000);
        player.tick(Tick::root(), &mut cx);
        assert_eq!(player.position(), 1500);
        assert!(player_in_pre_roll(&player));
    }

    fn player_in_pre_roll(player: &Player) -> bool {
        match player {
            Player::Offset(offset) => offset.in_pre_roll(),
            _ => false,
        }
    }

    #[test]
    fn test_zero_offset_is_transparent() {
        let clock = TestClock::new();
        let (mut player, id, log) = offset(60_000, 0);
        let mut cx = clock.at(0);
        player.play(&mut cx);
        assert_eq!(log.calls(), vec![EngineCall::Prepare]);
        deliver(&mut player, id, EngineReport::Ready, &mut cx);
        let events = deliver(&mut player, id, EngineReport::Position(700), &mut cx);
        assert_eq!(positions(&events), vec![700]);
    }

    #[test]
    fn test_starts_idle_like_every_other_player() {
        let clock = TestClock::new();
        let (mut player, _, _) = offset(60_000, 5000);
        assert_eq!(player.phase(), Phase::Idle);

        player.play(&mut clock.at(0));
        assert_eq!(player.phase(), Phase::Playing);
        player.stop(&mut clock.at(1000));
        assert_eq!(player.phase(), Phase::Ready);
    }

    #[test]
    fn test_root_tick_reaches_cluster_below() {
        let clock = TestClock::new();
        let (a_leaf, a, a_log) = scripted_leaf("a", 60_000);
        let (b_leaf, b, _) = scripted_leaf("b", 90_000);
        let cluster = ClusterCoordinator::new(vec![a_leaf.into(), b_leaf.into()]).unwrap();
        let mut player: Player = OffsetCoordinator::new(cluster, 0).into();

        let mut cx = clock.at(0);
        player.play(&mut cx);
        deliver(&mut player, a, EngineReport::Ready, &mut cx);
        deliver(&mut player, b, EngineReport::Ready, &mut cx);
        assert_eq!(player.phase(), Phase::Playing);

        let mut cx = clock.at(10_000);
        deliver(&mut player, a, EngineReport::Position(2_000), &mut cx);
        deliver(&mut player, b, EngineReport::Position(10_000), &mut cx);
        player.tick(Tick::root(), &mut cx);

        assert_eq!(a_log.seeks(), vec![10_000]);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (mut player, _, log) = offset(60_000, 5000);
        player.release();
        player.release();
        assert_eq!(log.calls(), vec![EngineCall::Release]);
    }
}

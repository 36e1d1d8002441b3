//! Sequencer coordinator: one engine at a time over a clip schedule
//!
//! **Responsibilities:**
//! - Bind at most one engine to the output: the clip containing the
//!   current virtual position
//! - Free-run a self-owned clock between clips
//! - On each boundary: pause and release the old engine, bind the next one,
//!   seek it into place, move the output surface over, resume
//! - Create and prepare the next clip's engine ahead of its start
//!
//! Events from clip engines are tagged with the clip index, so reports from
//! an engine that was switched out mid-drain are dropped as stale.

use syncplay_common::human_time::{format_position, format_window};
use tracing::{debug, error, info, warn};

use crate::clock::SelfClock;
use crate::engine::{EngineFactory, EngineReport, LeafId, ReportSink, Surface};
use crate::error::EngineFailure;
use crate::event::{ChildInbox, Ctx, PlayerEvent, Tick};
use crate::leaf::LeafPlayer;
use crate::phase::Phase;
use crate::timeline::ClipSchedule;

/// Engine created for one scheduled clip
struct BoundClip {
    index: usize,
    player: LeafPlayer,
}

pub struct SequencerCoordinator {
    name: String,
    schedule: ClipSchedule,
    factory: Box<dyn EngineFactory>,
    sink: Option<ReportSink>,
    /// Output surface while no engine holds it
    surface: Option<Surface>,
    active: Option<BoundClip>,
    prefetched: Option<BoundClip>,
    prefetch_failed: Option<usize>,
    /// Drives the timeline between clips
    clock: SelfClock,
    inbox: ChildInbox,
    phase: Phase,
    target: Phase,
    position: u64,
    speed: f32,
    /// Caller seek on the active engine waiting for its ack
    awaiting_seek: bool,
    prefetch_lead_ms: u64,
    lead_overridden: bool,
    error: Option<EngineFailure>,
    released: bool,
}

impl SequencerCoordinator {
    pub fn new(schedule: ClipSchedule, factory: impl EngineFactory + 'static) -> Self {
        Self {
            name: "sequencer".to_string(),
            schedule,
            factory: Box::new(factory),
            sink: None,
            surface: None,
            active: None,
            prefetched: None,
            prefetch_failed: None,
            clock: SelfClock::new(),
            inbox: ChildInbox::default(),
            phase: Phase::Idle,
            target: Phase::Idle,
            position: 0,
            speed: 1.0,
            awaiting_seek: false,
            prefetch_lead_ms: syncplay_common::SyncConfig::default().prefetch_lead_ms,
            lead_overridden: false,
            error: None,
            released: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Output surface handed from clip engine to clip engine
    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_prefetch_lead(mut self, lead_ms: u64) -> Self {
        self.prefetch_lead_ms = lead_ms;
        self.lead_overridden = true;
        self
    }

    pub fn schedule(&self) -> &ClipSchedule {
        &self.schedule
    }

    /// Index of the clip whose engine is bound to the output
    pub fn active_clip(&self) -> Option<usize> {
        self.active.as_ref().map(|clip| clip.index)
    }

    pub fn prefetched_clip(&self) -> Option<usize> {
        self.prefetched.as_ref().map(|clip| clip.index)
    }

    pub fn active_leaf(&self) -> Option<LeafId> {
        self.active.as_ref().map(|clip| clip.player.id())
    }

    pub fn prefetched_leaf(&self) -> Option<LeafId> {
        self.prefetched.as_ref().map(|clip| clip.player.id())
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

    /// End of the last clip
    pub fn duration(&self) -> u64 {
        self.schedule.duration()
    }

    pub fn error(&self) -> Option<&EngineFailure> {
        self.error.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn attach(&mut self, sink: &ReportSink) {
        if !self.lead_overridden {
            self.prefetch_lead_ms = sink.config().prefetch_lead_ms;
        }
        for clip in self.active.iter_mut().chain(self.prefetched.iter_mut()) {
            clip.player.attach(sink);
        }
        self.sink = Some(sink.clone());
    }

    pub fn play(&mut self, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.target = Phase::Playing;
        if self.with_active(cx, |player, c| player.play(c)) {
            return;
        }
        if self.position >= self.schedule.duration() {
            debug!("[{}] play at end of schedule ignored", self.name);
            self.refresh_phase(cx);
            return;
        }
        match self.schedule.locate(self.position) {
            Some(index) => self.activate(index, self.position, false, cx),
            None => {
                self.clock.set(self.position, cx.now());
                self.clock.start(cx.now());
                self.maybe_prefetch(cx);
                self.refresh_phase(cx);
            }
        }
    }

    pub fn pause(&mut self, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.target = Phase::Paused;
        if !self.with_active(cx, |player, c| player.pause(c)) {
            self.clock.pause(cx.now());
            self.refresh_phase(cx);
        }
    }

    pub fn stop(&mut self, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.target = Phase::Ready;
        if !self.with_active(cx, |player, c| player.stop(c)) {
            self.clock.pause(cx.now());
            self.refresh_phase(cx);
        }
    }

    pub fn seek_to(&mut self, target_ms: u64, cx: &mut Ctx) {
        if self.released {
            return;
        }
        let duration = self.schedule.duration();
        let target = target_ms.min(duration);
        debug!("[{}] seek_to {}", self.name, format_position(target));
        self.position = target;

        match self.schedule.locate(target) {
            Some(index) if self.active_clip() == Some(index) => {
                let start = self.schedule.clips()[index].start;
                self.awaiting_seek = true;
                self.with_active(cx, move |player, c| player.seek_to(target - start, c));
            }
            Some(index) => self.activate(index, target, true, cx),
            None => {
                self.deactivate(cx);
                self.clock.set(target, cx.now());
                if self.target == Phase::Playing && target < duration {
                    self.clock.start(cx.now());
                } else {
                    self.clock.pause(cx.now());
                }
                cx.emit(PlayerEvent::SeekTo(target));
                cx.emit(PlayerEvent::PositionChanged(target));
                self.maybe_prefetch(cx);
                self.refresh_phase(cx);
            }
        }
    }

    pub fn set_playback_speed(&mut self, speed: f32, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.speed = speed;
        self.clock.set_speed(speed, cx.now());
        if let Some(clip) = self.prefetched.as_mut() {
            clip.player.set_playback_speed(speed, &mut cx.child());
        }
        self.with_active(cx, move |player, c| player.set_playback_speed(speed, c));
    }

    pub fn deliver(&mut self, leaf: LeafId, report: EngineReport, cx: &mut Ctx) -> bool {
        let mut child_cx = cx.child();
        let routed = match (self.active.as_mut(), self.prefetched.as_mut()) {
            (Some(clip), _) if clip.player.id() == leaf => {
                clip.player.deliver(leaf, report, &mut child_cx);
                Some(clip.index)
            }
            (_, Some(clip)) if clip.player.id() == leaf => {
                clip.player.deliver(leaf, report, &mut child_cx);
                Some(clip.index)
            }
            _ => None,
        };
        match routed {
            Some(index) => {
                self.inbox.collect(index, &mut child_cx);
                self.drain(cx);
                true
            }
            None => false,
        }
    }

    pub fn tick(&mut self, _tick: Tick, cx: &mut Ctx) {
        if self.released {
            return;
        }
        if self.with_active(cx, |player, c| player.tick(Tick::nested(), c)) {
            return;
        }
        if !self.clock.is_running() {
            return;
        }

        let position = self.clock.position(cx.now());
        let clips = self.schedule.clips();
        let upcoming = clips.partition_point(|clip| clip.start < self.position);
        if upcoming < clips.len() && position >= clips[upcoming].start {
            let entry = position.min(clips[upcoming].end - 1);
            self.activate(upcoming, entry, false, cx);
            return;
        }

        if position != self.position {
            self.position = position;
            cx.emit(PlayerEvent::PositionChanged(position));
        }
        self.maybe_prefetch(cx);
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for mut clip in self.active.take().into_iter().chain(self.prefetched.take()) {
            clip.player.release();
        }
        self.surface = None;
        self.inbox.clear();
        info!("[{}] released", self.name);
    }

    /// Bind clip `index` to the output and place it at virtual `position`
    fn activate(&mut self, index: usize, position: u64, user_seek: bool, cx: &mut Ctx) {
        self.deactivate(cx);

        let clip = self.schedule.clips()[index].clone();
        let mut player = match self.take_prefetched(index) {
            Some(player) => player,
            None => match self.create_leaf(index) {
                Ok(player) => player,
                Err(failure) => {
                    self.fail(failure, cx);
                    return;
                }
            },
        };
        info!(
            "[{}] activating clip {} {} ({}) at {}",
            self.name,
            index,
            format_window(clip.start, clip.end),
            clip.source,
            format_position(position)
        );

        self.clock.pause(cx.now());
        self.position = position;
        self.awaiting_seek = user_seek;

        let mut child_cx = cx.child();
        player.seek_to(position - clip.start, &mut child_cx);
        if let Some(surface) = self.surface.take() {
            player.bind_surface(surface);
        }
        if (self.speed - 1.0).abs() > f32::EPSILON {
            player.set_playback_speed(self.speed, &mut child_cx);
        }
        if self.target == Phase::Playing {
            player.play(&mut child_cx);
        }
        self.active = Some(BoundClip { index, player });
        self.inbox.collect(index, &mut child_cx);
        self.drain(cx);
    }

    /// Pause and release the active engine, taking the surface back
    fn deactivate(&mut self, cx: &mut Ctx) {
        self.awaiting_seek = false;
        let Some(mut clip) = self.active.take() else {
            return;
        };
        // Events from the outgoing engine are not relayed
        let mut scratch = cx.child();
        clip.player.pause(&mut scratch);
        if let Some(surface) = clip.player.unbind_surface() {
            self.surface = Some(surface);
        }
        clip.player.release();
        debug!("[{}] deactivated clip {}", self.name, clip.index);
    }

    fn take_prefetched(&mut self, index: usize) -> Option<LeafPlayer> {
        match self.prefetched.take() {
            Some(clip) if clip.index == index => Some(clip.player),
            Some(mut stale) => {
                debug!("[{}] dropping prefetched clip {}", self.name, stale.index);
                stale.player.release();
                None
            }
            None => None,
        }
    }

    fn create_leaf(&mut self, index: usize) -> Result<LeafPlayer, EngineFailure> {
        let source = &self.schedule.clips()[index].source;
        let engine = self.factory.create(source)?;
        let mut player = LeafPlayer::new(engine).with_name(format!("{}#{}", self.name, index));
        if let Some(sink) = &self.sink {
            player.attach(sink);
        }
        Ok(player)
    }

    /// Prepare the next clip's engine once its start is within the lead
    fn maybe_prefetch(&mut self, cx: &mut Ctx) {
        let Some(next) = self.schedule.next_after(self.position) else {
            return;
        };
        if self.prefetched_clip() == Some(next)
            || self.active_clip() == Some(next)
            || self.prefetch_failed == Some(next)
        {
            return;
        }
        let start = self.schedule.clips()[next].start;
        if start.saturating_sub(self.position) > self.prefetch_lead_ms {
            return;
        }

        match self.create_leaf(next) {
            Ok(mut player) => {
                if let Some(mut stale) = self.prefetched.take() {
                    stale.player.release();
                }
                debug!(
                    "[{}] prefetching clip {} at {}",
                    self.name,
                    next,
                    format_position(self.position)
                );
                let mut child_cx = cx.child();
                player.prepare(&mut child_cx);
                if (self.speed - 1.0).abs() > f32::EPSILON {
                    player.set_playback_speed(self.speed, &mut child_cx);
                }
                self.prefetched = Some(BoundClip {
                    index: next,
                    player,
                });
                self.inbox.collect(next, &mut child_cx);
                self.drain(cx);
            }
            Err(failure) => {
                // Activation retries and surfaces the failure if it persists
                warn!("[{}] prefetch of clip {} failed: {}", self.name, next, failure);
                self.prefetch_failed = Some(next);
            }
        }
    }

    /// Run `f` on the active engine; false when the timeline is in a gap
    fn with_active<F>(&mut self, cx: &mut Ctx, f: F) -> bool
    where
        F: FnOnce(&mut LeafPlayer, &mut Ctx),
    {
        let Some(clip) = self.active.as_mut() else {
            return false;
        };
        let index = clip.index;
        let mut child_cx = cx.child();
        f(&mut clip.player, &mut child_cx);
        self.inbox.collect(index, &mut child_cx);
        self.drain(cx);
        true
    }

    fn drain(&mut self, cx: &mut Ctx) {
        if !self.inbox.begin_drain() {
            return;
        }
        while let Some((index, event)) = self.inbox.next() {
            if self.active_clip() == Some(index) {
                self.on_active_event(index, event, cx);
            } else if self.prefetched_clip() == Some(index) {
                self.on_prefetched_event(index, event);
            }
        }
        self.inbox.end_drain();
        self.refresh_phase(cx);
    }

    fn on_active_event(&mut self, index: usize, event: PlayerEvent, cx: &mut Ctx) {
        let clip_start = self.schedule.clips()[index].start;
        let clip_end = self.schedule.clips()[index].end;

        match event {
            PlayerEvent::PositionChanged(position) => {
                if self.awaiting_seek {
                    return;
                }
                let virtual_position = clip_start + position;
                if virtual_position >= clip_end {
                    self.cross_boundary(index, cx);
                    return;
                }
                self.position = virtual_position;
                cx.emit(PlayerEvent::PositionChanged(virtual_position));
                self.maybe_prefetch(cx);
            }
            PlayerEvent::SeekTo(position) => {
                let virtual_position = (clip_start + position).min(clip_end);
                self.position = virtual_position;
                if self.awaiting_seek {
                    self.awaiting_seek = false;
                    cx.emit(PlayerEvent::SeekTo(virtual_position));
                }
                if virtual_position >= clip_end {
                    self.cross_boundary(index, cx);
                }
            }
            PlayerEvent::PhaseChanged(Phase::End) => self.cross_boundary(index, cx),
            PlayerEvent::PhaseChanged(_) => {}
            PlayerEvent::Error(failure) => self.fail(failure, cx),
        }
    }

    fn on_prefetched_event(&mut self, index: usize, event: PlayerEvent) {
        if let PlayerEvent::Error(failure) = event {
            warn!("[{}] prefetched clip {} failed: {}", self.name, index, failure);
            self.prefetch_failed = Some(index);
            if let Some(mut clip) = self.prefetched.take() {
                clip.player.release();
            }
        }
    }

    /// Active clip reached its end: move to the next clip, a gap, or the end
    fn cross_boundary(&mut self, index: usize, cx: &mut Ctx) {
        let end = self.schedule.clips()[index].end;
        debug!("[{}] clip {} finished at {}", self.name, index, format_position(end));
        self.deactivate(cx);
        self.position = end;

        if let Some(next) = self.schedule.locate(end) {
            self.activate(next, end, false, cx);
            return;
        }

        cx.emit(PlayerEvent::PositionChanged(end));
        self.clock.set(end, cx.now());
        if end >= self.schedule.duration() {
            info!("[{}] schedule finished", self.name);
            self.clock.pause(cx.now());
        } else if self.target == Phase::Playing {
            self.clock.start(cx.now());
            self.maybe_prefetch(cx);
        }
    }

    fn fail(&mut self, failure: EngineFailure, cx: &mut Ctx) {
        error!("[{}] clip engine failed, stopping: {}", self.name, failure);
        self.error = Some(failure.clone());
        self.target = Phase::Idle;
        self.deactivate(cx);
        if let Some(mut clip) = self.prefetched.take() {
            clip.player.release();
        }
        self.clock.pause(cx.now());
        cx.emit(PlayerEvent::Error(failure));
        self.refresh_phase(cx);
    }

    fn refresh_phase(&mut self, cx: &mut Ctx) {
        let phase = match &self.active {
            Some(clip) => match clip.player.phase() {
                Phase::Idle | Phase::Ready if self.target == Phase::Playing => Phase::Buffering,
                phase => phase,
            },
            None if self.position >= self.schedule.duration() => Phase::End,
            None => match self.target {
                Phase::Playing => Phase::Playing,
                Phase::Paused => Phase::Paused,
                Phase::Ready => Phase::Ready,
                _ => Phase::Idle,
            },
        };
        if phase != self.phase {
            debug!("[{}] phase {} -> {}", self.name, self.phase, phase);
            self.phase = phase;
            cx.emit(PlayerEvent::PhaseChanged(phase));
        }
    }
}

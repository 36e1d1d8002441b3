//! Selection coordinator: a continuous virtual timeline over disjoint windows
//!
//! Wraps one child and an ordered set of playable windows on the child's
//! timeline. Positions are remapped through a [`TimelineMap`]; when the
//! child's playhead leaves a window, the child is seeked straight to the
//! next window without pausing, so excluded gaps are never shown.

use syncplay_common::human_time::format_position;
use tracing::{debug, error, info};

use crate::engine::{EngineReport, LeafId, ReportSink};
use crate::error::{EngineFailure, Result};
use crate::event::{ChildInbox, Ctx, PlayerEvent, Tick};
use crate::phase::Phase;
use crate::player::Player;
use crate::timeline::{SelectionOptions, TimelineMap};

pub struct SelectionCoordinator {
    name: String,
    child: Box<Player>,
    map: TimelineMap,
    inbox: ChildInbox,
    /// Index of the window the child is playing in
    current: usize,
    phase: Phase,
    target: Phase,
    /// Virtual position
    position: u64,
    /// Child crossed the end of the last window
    ended: bool,
    /// Gap-skip seeks issued by us whose acks are still outstanding
    internal_seeks: u32,
    /// Child has been placed inside a window at least once
    positioned: bool,
    error: Option<EngineFailure>,
    released: bool,
}

impl SelectionCoordinator {
    /// Fails if any window reaches past a known child duration
    pub fn new(child: impl Into<Player>, options: SelectionOptions) -> Result<Self> {
        let child = child.into();
        let child_duration = child.duration();
        if child_duration > 0 {
            options.validate_within(child_duration)?;
        }
        Ok(Self {
            name: "selection".to_string(),
            child: Box::new(child),
            map: TimelineMap::new(&options),
            inbox: ChildInbox::default(),
            current: 0,
            phase: Phase::Idle,
            target: Phase::Idle,
            position: 0,
            ended: false,
            internal_seeks: 0,
            positioned: false,
            error: None,
            released: false,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn child(&self) -> &Player {
        &self.child
    }

    pub fn map(&self) -> &TimelineMap {
        &self.map
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

    /// Sum of all window lengths
    pub fn duration(&self) -> u64 {
        self.map.total()
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
        self.ensure_positioned(cx);
        if self.ended {
            debug!("[{}] play at end of last window ignored", self.name);
            return;
        }
        self.with_child(cx, |child, c| child.play(c));
    }

    pub fn pause(&mut self, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.target = Phase::Paused;
        self.with_child(cx, |child, c| child.pause(c));
    }

    pub fn stop(&mut self, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.target = Phase::Ready;
        self.with_child(cx, |child, c| child.stop(c));
    }

    pub fn seek_to(&mut self, target_ms: u64, cx: &mut Ctx) {
        if self.released {
            return;
        }
        let virtual_target = target_ms.min(self.map.total());
        let underlying = self.map.to_underlying(virtual_target);
        debug!(
            "[{}] seek_to {} -> underlying {}",
            self.name,
            format_position(virtual_target),
            format_position(underlying)
        );
        self.positioned = true;
        self.position = virtual_target;
        self.with_child(cx, move |child, c| child.seek_to(underlying, c));
    }

    pub fn set_playback_speed(&mut self, speed: f32, cx: &mut Ctx) {
        if self.released {
            return;
        }
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

    pub fn tick(&mut self, tick: Tick, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.with_child(cx, move |child, c| child.tick(tick, c));
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

    /// Place the child at the start of the first window before it first plays
    fn ensure_positioned(&mut self, cx: &mut Ctx) {
        if self.positioned {
            return;
        }
        self.positioned = true;
        let first_start = self.map.selections()[0].start;
        if first_start > 0 {
            self.internal_seeks += 1;
            self.with_child(cx, move |child, c| child.seek_to(first_start, c));
        }
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
        match event {
            PlayerEvent::PositionChanged(underlying) => self.on_child_position(underlying, cx),
            PlayerEvent::SeekTo(underlying) => self.on_child_seek(underlying, cx),
            PlayerEvent::PhaseChanged(phase) => {
                if phase == Phase::End && !self.ended {
                    // The child ran out of media at or before the last window's end
                    self.ended = true;
                    self.position = self.map.total();
                }
            }
            PlayerEvent::Error(failure) => {
                error!("[{}] child failed: {}", self.name, failure);
                self.error = Some(failure.clone());
                cx.emit(PlayerEvent::Error(failure));
            }
        }
    }

    fn on_child_position(&mut self, underlying: u64, cx: &mut Ctx) {
        if self.internal_seeks > 0 || self.ended {
            return;
        }
        let selections = self.map.selections();
        match self.map.index_of_underlying(underlying) {
            None => {
                info!(
                    "[{}] crossed the end of the last window at {}",
                    self.name,
                    format_position(underlying)
                );
                self.ended = true;
                self.position = self.map.total();
                self.with_child(cx, |child, c| child.pause(c));
                cx.emit(PlayerEvent::PositionChanged(self.position));
            }
            Some(index) if underlying < selections[index].start => {
                let next_start = selections[index].start;
                debug!(
                    "[{}] skipping gap {} -> {}",
                    self.name,
                    format_position(underlying),
                    format_position(next_start)
                );
                self.current = index;
                self.position = self.map.virtual_start(index);
                self.internal_seeks += 1;
                self.with_child(cx, move |child, c| child.seek_to(next_start, c));
                cx.emit(PlayerEvent::PositionChanged(self.position));
            }
            Some(index) => {
                self.current = index;
                self.position = self.map.to_virtual(underlying);
                cx.emit(PlayerEvent::PositionChanged(self.position));
            }
        }
    }

    fn on_child_seek(&mut self, underlying: u64, cx: &mut Ctx) {
        if self.internal_seeks > 0 {
            self.internal_seeks -= 1;
            return;
        }
        let was_ended = self.ended;
        let virtual_position = self.map.to_virtual(underlying);
        self.position = virtual_position;
        self.current = self
            .map
            .index_of_underlying(underlying)
            .unwrap_or(self.map.selections().len() - 1);
        self.ended = self.map.index_of_underlying(underlying).is_none();
        cx.emit(PlayerEvent::SeekTo(virtual_position));

        if was_ended && !self.ended && self.target == Phase::Playing {
            self.with_child(cx, |child, c| child.play(c));
        }
    }

    fn refresh_phase(&mut self, cx: &mut Ctx) {
        let phase = if self.ended {
            Phase::End
        } else {
            self.child.phase()
        };
        if phase != self.phase {
            debug!("[{}] phase {} -> {}", self.name, self.phase, phase);
            self.phase = phase;
            cx.emit(PlayerEvent::PhaseChanged(phase));
        }
    }
}

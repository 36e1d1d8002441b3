//! Leaf player: phase machine over one external engine
//!
//! Commands request transitions on the engine and record the intended
//! (target) phase; the engine's asynchronous reports complete them:
//!
//! ```text
//! Idle --Ready--> Ready --play--> Playing --pause--> Paused --play--> Playing
//!                 Ready/Playing/Paused <--Buffering/Playing/Paused--> Buffering
//!                 Playing --position >= duration / Ended--> End
//! ```
//!
//! `stop()` enters `Ready` without moving the position.

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::engine::{Engine, EngineReport, LeafId, ReportSink, Surface};
use crate::error::EngineFailure;
use crate::event::{Ctx, PlayerEvent, Tick};
use crate::phase::Phase;

pub struct LeafPlayer {
    id: LeafId,
    name: String,
    engine: Box<dyn Engine>,
    phase: Phase,
    /// Phase requested by the last command
    target: Phase,
    position: u64,
    prepare_requested: bool,
    attached: bool,
    error: Option<EngineFailure>,
    released: bool,
}

impl LeafPlayer {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: "leaf".to_string(),
            engine,
            phase: Phase::Idle,
            target: Phase::Idle,
            position: 0,
            prepare_requested: false,
            attached: false,
            error: None,
            released: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Hand the engine its output surface before playback starts
    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.engine.bind_surface(surface);
        self
    }

    pub fn id(&self) -> LeafId {
        self.id
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
        self.engine.duration()
    }

    pub fn error(&self) -> Option<&EngineFailure> {
        self.error.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn attach(&mut self, sink: &ReportSink) {
        if self.attached {
            return;
        }
        self.engine.attach(sink.reporter(self.id));
        self.attached = true;
    }

    /// Load the engine without starting playback
    pub fn prepare(&mut self, _cx: &mut Ctx) {
        if self.released {
            return;
        }
        if self.target == Phase::Idle {
            self.target = Phase::Ready;
        }
        self.request_prepare();
    }

    pub fn play(&mut self, cx: &mut Ctx) {
        if self.released {
            warn!("[{}] play after release ignored", self.name);
            return;
        }
        match self.phase {
            Phase::Idle => self.request_prepare(),
            Phase::Ready | Phase::Paused => {
                self.engine.play();
                self.set_phase(Phase::Playing, cx);
            }
            // The engine reports Playing once the stall clears
            Phase::Buffering | Phase::Playing => self.engine.play(),
            Phase::End => {
                if self.position < self.duration() {
                    self.engine.play();
                    self.set_phase(Phase::Playing, cx);
                } else {
                    debug!("[{}] play at end of media ignored", self.name);
                }
            }
        }
        self.target = Phase::Playing;
    }

    pub fn pause(&mut self, cx: &mut Ctx) {
        if self.released {
            return;
        }
        match self.phase {
            Phase::Idle => debug!("[{}] pause while idle only records intent", self.name),
            Phase::End => self.engine.pause(),
            _ => {
                self.engine.pause();
                self.set_phase(Phase::Paused, cx);
            }
        }
        self.target = Phase::Paused;
    }

    pub fn stop(&mut self, cx: &mut Ctx) {
        if self.released {
            return;
        }
        if self.phase != Phase::Idle {
            self.engine.pause();
            self.set_phase(Phase::Ready, cx);
        }
        self.target = Phase::Ready;
    }

    pub fn seek_to(&mut self, target_ms: u64, _cx: &mut Ctx) {
        if self.released {
            return;
        }
        let duration = self.duration();
        let clamped = if duration > 0 { target_ms.min(duration) } else { target_ms };
        debug!("[{}] seek_to {} (requested {})", self.name, clamped, target_ms);
        self.engine.seek_to(clamped);
    }

    pub fn set_playback_speed(&mut self, speed: f32, _cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.engine.set_playback_speed(speed);
    }

    pub fn tick(&mut self, _tick: Tick, _cx: &mut Ctx) {}

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.engine.release();
        debug!("[{}] released", self.name);
    }

    pub(crate) fn bind_surface(&mut self, surface: Surface) {
        self.engine.bind_surface(surface);
    }

    pub(crate) fn unbind_surface(&mut self) -> Option<Surface> {
        self.engine.unbind_surface()
    }

    /// Apply a backend report addressed to this leaf
    pub fn deliver(&mut self, leaf: LeafId, report: EngineReport, cx: &mut Ctx) -> bool {
        if leaf != self.id {
            return false;
        }
        if self.released {
            debug!("[{}] report {:?} after release dropped", self.name, report);
            return true;
        }
        self.on_report(report, cx);
        true
    }

    fn request_prepare(&mut self) {
        if !self.prepare_requested {
            self.prepare_requested = true;
            self.error = None;
            self.engine.prepare();
        }
    }

    fn on_report(&mut self, report: EngineReport, cx: &mut Ctx) {
        debug!(
            "[{}] report {:?} when {}, target {}",
            self.name, report, self.phase, self.target
        );

        match report {
            EngineReport::Ready => {
                if self.phase != Phase::Idle {
                    return;
                }
                self.set_phase(Phase::Ready, cx);
                match self.target {
                    Phase::Playing => {
                        self.engine.play();
                        self.set_phase(Phase::Playing, cx);
                    }
                    Phase::Paused => {
                        self.engine.pause();
                        self.set_phase(Phase::Paused, cx);
                    }
                    _ => {}
                }
            }
            EngineReport::Playing => match self.phase {
                Phase::Buffering => {
                    if self.target == Phase::Playing {
                        self.set_phase(Phase::Playing, cx);
                    } else {
                        self.engine.pause();
                        self.set_phase(Phase::Paused, cx);
                    }
                }
                Phase::Playing | Phase::Idle => {}
                _ => {
                    if self.target != Phase::Playing {
                        self.engine.pause();
                    }
                }
            },
            EngineReport::Paused => {
                if self.phase == Phase::Buffering {
                    self.set_phase(Phase::Paused, cx);
                }
            }
            EngineReport::Buffering => match self.phase {
                Phase::Playing => self.set_phase(Phase::Buffering, cx),
                Phase::Paused => self.engine.pause(),
                _ => {}
            },
            EngineReport::Position(position) => {
                self.position = self.clamp(position);
                cx.emit(PlayerEvent::PositionChanged(self.position));
                let duration = self.duration();
                if self.phase == Phase::Playing && duration > 0 && self.position >= duration {
                    self.set_phase(Phase::End, cx);
                }
            }
            EngineReport::SeekCompleted(position) => {
                self.position = self.clamp(position);
                cx.emit(PlayerEvent::SeekTo(self.position));
                let duration = self.duration();
                if duration > 0 && self.position >= duration {
                    if self.phase != Phase::Idle && self.phase != Phase::End {
                        self.engine.pause();
                        self.set_phase(Phase::End, cx);
                    }
                } else if self.phase == Phase::End {
                    // Seeking back from the end resumes the requested state
                    if self.target == Phase::Playing {
                        self.engine.play();
                        self.set_phase(Phase::Playing, cx);
                    } else {
                        self.set_phase(Phase::Paused, cx);
                    }
                }
            }
            EngineReport::Ended => {
                let duration = self.duration();
                if duration > 0 {
                    self.position = duration;
                }
                self.set_phase(Phase::End, cx);
            }
            EngineReport::Failed(message) => {
                let failure = EngineFailure::new(self.name.clone(), message);
                error!("[{}] engine failure: {}", self.name, failure.message);
                self.error = Some(failure.clone());
                self.prepare_requested = false;
                self.set_phase(Phase::Idle, cx);
                cx.emit(PlayerEvent::Error(failure));
            }
        }
    }

    fn clamp(&self, position: u64) -> u64 {
        let duration = self.duration();
        if duration > 0 {
            position.min(duration)
        } else {
            position
        }
    }

    fn set_phase(&mut self, phase: Phase, cx: &mut Ctx) {
        if self.phase != phase {
            debug!("[{}] phase {} -> {}", self.name, self.phase, phase);
            self.phase = phase;
            cx.emit(PlayerEvent::PhaseChanged(phase));
        }
    }
}

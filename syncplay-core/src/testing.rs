//! Scripted engine for synchronous coordinator tests
//!
//! Records every command it receives; tests inject backend reports by calling
//! `deliver` on the player tree with the leaf's id.

use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};

use crate::engine::{Engine, EngineFactory, EngineReport, EngineReporter, LeafId, SourceRef, Surface};
use crate::error::EngineFailure;
use crate::event::{Ctx, PlayerEvent};
use crate::leaf::LeafPlayer;
use crate::player::Player;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Prepare,
    Play,
    Pause,
    SeekTo(u64),
    SetSpeed(f32),
    BindSurface(String),
    UnbindSurface,
    Release,
}

/// Shared view of the calls an engine received
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<EngineCall>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn seeks(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::SeekTo(position) => Some(position),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &EngineCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn push(&self, call: EngineCall) {
        self.0.lock().unwrap().push(call);
    }
}

pub struct ScriptedEngine {
    duration_ms: u64,
    log: CallLog,
    surface: Option<Surface>,
}

impl ScriptedEngine {
    pub fn new(duration_ms: u64) -> (Self, CallLog) {
        let log = CallLog::default();
        (
            Self {
                duration_ms,
                log: log.clone(),
                surface: None,
            },
            log,
        )
    }
}

impl Engine for ScriptedEngine {
    fn attach(&mut self, _reporter: EngineReporter) {}

    fn prepare(&mut self) {
        self.log.push(EngineCall::Prepare);
    }

    fn play(&mut self) {
        self.log.push(EngineCall::Play);
    }

    fn pause(&mut self) {
        self.log.push(EngineCall::Pause);
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.log.push(EngineCall::SeekTo(position_ms));
    }

    fn set_playback_speed(&mut self, speed: f32) {
        self.log.push(EngineCall::SetSpeed(speed));
    }

    fn duration(&self) -> u64 {
        self.duration_ms
    }

    fn bind_surface(&mut self, surface: Surface) {
        self.log.push(EngineCall::BindSurface(surface.label().to_string()));
        self.surface = Some(surface);
    }

    fn unbind_surface(&mut self) -> Option<Surface> {
        self.log.push(EngineCall::UnbindSurface);
        self.surface.take()
    }

    fn release(&mut self) {
        self.log.push(EngineCall::Release);
    }
}

/// Leaf over a scripted engine
pub fn scripted_leaf(name: &str, duration_ms: u64) -> (LeafPlayer, LeafId, CallLog) {
    let (engine, log) = ScriptedEngine::new(duration_ms);
    let leaf = LeafPlayer::new(Box::new(engine)).with_name(name);
    let id = leaf.id();
    (leaf, id, log)
}

/// Engines handed out by a [`ScriptedFactory`], in creation order
#[derive(Debug, Clone, Default)]
pub struct FactoryLog(Arc<Mutex<Vec<(String, CallLog)>>>);

impl FactoryLog {
    pub fn sources(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|(source, _)| source.clone()).collect()
    }

    /// Call log of the `n`-th engine created
    pub fn engine(&self, n: usize) -> CallLog {
        self.0.lock().unwrap()[n].1.clone()
    }
}

pub struct ScriptedFactory {
    duration_ms: u64,
    failing: Option<String>,
    log: FactoryLog,
}

impl ScriptedFactory {
    pub fn new(duration_ms: u64) -> (Self, FactoryLog) {
        let log = FactoryLog::default();
        (
            Self {
                duration_ms,
                failing: None,
                log: log.clone(),
            },
            log,
        )
    }

    /// Refuse to create an engine for `source`
    pub fn failing(mut self, source: &str) -> Self {
        self.failing = Some(source.to_string());
        self
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&mut self, source: &SourceRef) -> Result<Box<dyn Engine>, EngineFailure> {
        if self.failing.as_deref() == Some(source.as_str()) {
            return Err(EngineFailure::new(source.as_str(), "unsupported source"));
        }
        let (engine, calls) = ScriptedEngine::new(self.duration_ms);
        self.log
            .0
            .lock()
            .unwrap()
            .push((source.as_str().to_string(), calls));
        Ok(Box::new(engine))
    }
}

/// Test clock anchored at one instant
pub struct TestClock {
    origin: Instant,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Context reading `ms` milliseconds after the origin
    pub fn at(&self, ms: u64) -> Ctx {
        Ctx::new(self.origin + Duration::from_millis(ms))
    }
}

/// Deliver a report and return what the player emitted
pub fn deliver(player: &mut Player, leaf: LeafId, report: EngineReport, cx: &mut Ctx) -> Vec<PlayerEvent> {
    assert!(player.deliver(leaf, report, cx), "report was not routed");
    cx.take_events()
}

pub fn positions(events: &[PlayerEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|event| match event {
            PlayerEvent::PositionChanged(position) => Some(*position),
            _ => None,
        })
        .collect()
}

//! Shared fixtures for the runtime integration tests
//!
//! Every test runs on a paused tokio clock, so simulated engine load delays,
//! report intervals and stalls advance deterministically.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use syncplay_core::{
    ChannelListener, Engine, EngineReporter, Notification, Phase, PlayerHandle, SimulatedEngine,
    Snapshot, Surface, SyncConfig,
};
use tokio::sync::mpsc;
use tokio::time::{self, Duration};

/// Default config with a fixed 200ms report cadence
pub fn config() -> SyncConfig {
    SyncConfig::default()
}

/// Simulated engine with a short load delay
pub fn sim(label: &str, duration_ms: u64) -> SimulatedEngine {
    SimulatedEngine::new(label, duration_ms).with_load_delay(Duration::from_millis(100))
}

/// Register a channel listener on `handle`
pub fn listen(handle: &PlayerHandle) -> mpsc::UnboundedReceiver<Notification> {
    let (listener, rx) = ChannelListener::new();
    handle.add_listener(Arc::new(listener));
    rx
}

/// Everything received so far, without waiting
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut received = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        received.push(notification);
    }
    received
}

/// Wait for the first notification matching `predicate`
pub async fn next_matching<F>(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
    mut predicate: F,
) -> Notification
where
    F: FnMut(&Notification) -> bool,
{
    loop {
        match rx.recv().await {
            Some(notification) if predicate(&notification) => return notification,
            Some(_) => continue,
            None => panic!("listener channel closed before a matching notification"),
        }
    }
}

pub fn phases(notifications: &[Notification]) -> Vec<Phase> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::Phase { phase, .. } => Some(*phase),
            _ => None,
        })
        .collect()
}

pub fn positions(notifications: &[Notification]) -> Vec<u64> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::Position { position_ms, .. } => Some(*position_ms),
            _ => None,
        })
        .collect()
}

/// Let simulated time pass
pub async fn advance(ms: u64) {
    time::sleep(Duration::from_millis(ms)).await;
}

/// Child snapshot by name, searching the whole tree
pub fn find<'a>(snapshot: &'a Snapshot, name: &str) -> Option<&'a Snapshot> {
    if snapshot.name == name {
        return Some(snapshot);
    }
    snapshot.children.iter().find_map(|child| find(child, name))
}

/// Shared record of what recording engines did
#[derive(Clone, Default)]
pub struct EngineLog(Arc<Mutex<EngineLogState>>);

#[derive(Default)]
struct EngineLogState {
    releases: HashMap<String, usize>,
    created: Vec<String>,
    bound: Vec<String>,
    max_bound: usize,
    bind_order: Vec<String>,
}

impl EngineLog {
    pub fn releases(&self, label: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .releases
            .get(label)
            .copied()
            .unwrap_or(0)
    }

    pub fn created(&self) -> Vec<String> {
        self.0.lock().unwrap().created.clone()
    }

    /// Engines currently holding a surface
    pub fn bound(&self) -> Vec<String> {
        self.0.lock().unwrap().bound.clone()
    }

    /// Most engines ever holding a surface at once
    pub fn max_bound(&self) -> usize {
        self.0.lock().unwrap().max_bound
    }

    pub fn bind_order(&self) -> Vec<String> {
        self.0.lock().unwrap().bind_order.clone()
    }
}

/// Simulated engine that records surface ownership and releases
pub struct RecordingEngine {
    label: String,
    inner: SimulatedEngine,
    log: EngineLog,
}

impl RecordingEngine {
    pub fn new(inner: SimulatedEngine, log: &EngineLog) -> Self {
        let label = inner.label().to_string();
        log.0.lock().unwrap().created.push(label.clone());
        Self {
            label,
            inner,
            log: log.clone(),
        }
    }
}

impl Engine for RecordingEngine {
    fn attach(&mut self, reporter: EngineReporter) {
        self.inner.attach(reporter);
    }

    fn prepare(&mut self) {
        self.inner.prepare();
    }

    fn play(&mut self) {
        self.inner.play();
    }

    fn pause(&mut self) {
        self.inner.pause();
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.inner.seek_to(position_ms);
    }

    fn set_playback_speed(&mut self, speed: f32) {
        self.inner.set_playback_speed(speed);
    }

    fn duration(&self) -> u64 {
        self.inner.duration()
    }

    fn bind_surface(&mut self, surface: Surface) {
        let mut state = self.log.0.lock().unwrap();
        state.bound.push(self.label.clone());
        state.bind_order.push(self.label.clone());
        state.max_bound = state.max_bound.max(state.bound.len());
        drop(state);
        self.inner.bind_surface(surface);
    }

    fn unbind_surface(&mut self) -> Option<Surface> {
        let surface = self.inner.unbind_surface();
        if surface.is_some() {
            self.log.0.lock().unwrap().bound.retain(|l| *l != self.label);
        }
        surface
    }

    fn release(&mut self) {
        let mut state = self.log.0.lock().unwrap();
        *state.releases.entry(self.label.clone()).or_insert(0) += 1;
        state.bound.retain(|l| *l != self.label);
        drop(state);
        self.inner.release();
    }
}

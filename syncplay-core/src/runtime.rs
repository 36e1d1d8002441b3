//! Runtime actor: one task per player tree
//!
//! **Responsibilities:**
//! - Own the root player and serialize every command, engine report, and
//!   timer tick onto one task
//! - Drive the periodic tick (drift correction, position broadcast,
//!   self-clocked pre-roll and gaps); the root receives `Tick::root()`
//! - Deliver root events to registered listeners, in registration order
//! - Publish a [`Snapshot`] after every turn for lock-free reads
//!
//! **Threading:** [`PlayerHandle`] methods enqueue and return immediately.
//! Engine backends report from their own threads through an
//! [`EngineReporter`](crate::engine::EngineReporter) onto the same queue.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use syncplay_common::human_time::format_position;
use syncplay_common::SyncConfig;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{EngineReport, LeafId, ReportSink};
use crate::event::{Ctx, Tick};
use crate::listener::{ListenerId, ListenerRegistry, PlayerListener};
use crate::phase::Phase;
use crate::player::Player;

/// Caller command for the root player
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    SeekTo(u64),
    SetPlaybackSpeed(f32),
}

/// Everything the actor consumes, in arrival order
pub(crate) enum Inbound {
    Command(Command),
    Report { leaf: LeafId, report: EngineReport },
    AddListener(ListenerId, Arc<dyn PlayerListener>),
    RemoveListener(ListenerId),
    Release,
}

/// Tree state as of the end of the last actor turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub name: String,
    pub kind: &'static str,
    pub phase: Phase,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub released: bool,
    pub children: Vec<Snapshot>,
}

impl Snapshot {
    fn of(player: &Player, released: bool) -> Self {
        Self {
            name: player.name().to_string(),
            kind: player.kind(),
            phase: player.phase(),
            position_ms: player.position(),
            duration_ms: player.duration(),
            error: player.error().map(|e| e.to_string()),
            released,
            children: player
                .children()
                .into_iter()
                .map(|child| Snapshot::of(child, released))
                .collect(),
        }
    }
}

/// Cloneable, non-blocking handle to a running player tree
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<Inbound>,
    snapshot: watch::Receiver<Snapshot>,
    released: Arc<AtomicBool>,
}

impl PlayerHandle {
    /// Attach the tree to a new actor task and return its handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(player: impl Into<Player>, config: &SyncConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = Arc::new(config.clone());

        let mut root = player.into();
        root.attach(&ReportSink::new(tx.clone(), config.clone()));

        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::of(&root, false));
        let actor = PlayerActor {
            root,
            rx,
            listeners: ListenerRegistry::new(),
            snapshot_tx,
            tick_interval: config.tick_interval(),
        };
        tokio::spawn(actor.run());

        Self {
            tx,
            snapshot: snapshot_rx,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn play(&self) {
        self.command(Command::Play);
    }

    pub fn pause(&self) {
        self.command(Command::Pause);
    }

    /// Enter `Ready` without rewinding; follow with `seek_to(0)` to rewind
    pub fn stop(&self) {
        self.command(Command::Stop);
    }

    pub fn seek_to(&self, position_ms: u64) {
        self.command(Command::SeekTo(position_ms));
    }

    pub fn set_playback_speed(&self, speed: f32) {
        self.command(Command::SetPlaybackSpeed(speed));
    }

    pub fn command(&self, command: Command) {
        self.send(Inbound::Command(command));
    }

    /// Register a listener; it sees events produced after registration
    pub fn add_listener(&self, listener: Arc<dyn PlayerListener>) -> ListenerId {
        let id = Uuid::new_v4();
        self.send(Inbound::AddListener(id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.send(Inbound::RemoveListener(id));
    }

    /// Tear the tree down. Idempotent: only the first call across all
    /// clones of this handle reaches the actor.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            debug!("release already requested");
            return;
        }
        if self.tx.send(Inbound::Release).is_err() {
            debug!("player actor already stopped");
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn name(&self) -> String {
        self.snapshot.borrow().name.clone()
    }

    pub fn phase(&self) -> Phase {
        self.snapshot.borrow().phase
    }

    pub fn position(&self) -> u64 {
        self.snapshot.borrow().position_ms
    }

    pub fn duration(&self) -> u64 {
        self.snapshot.borrow().duration_ms
    }

    /// Wait until a published snapshot satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> Snapshot
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        loop {
            {
                let current = rx.borrow_and_update();
                if predicate(&current) {
                    return current.clone();
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Wait until the actor has torn the tree down
    pub async fn wait_released(&self) {
        self.wait_for(|snapshot| snapshot.released).await;
    }

    fn send(&self, inbound: Inbound) {
        if self.is_released() {
            debug!("operation after release ignored");
            return;
        }
        if self.tx.send(inbound).is_err() {
            warn!("player actor stopped, operation dropped");
        }
    }
}

struct PlayerActor {
    root: Player,
    rx: mpsc::UnboundedReceiver<Inbound>,
    listeners: ListenerRegistry,
    snapshot_tx: watch::Sender<Snapshot>,
    tick_interval: Duration,
}

impl PlayerActor {
    async fn run(mut self) {
        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Player actor started for {} '{}' ({}ms tick)",
            self.root.kind(),
            self.root.name(),
            self.tick_interval.as_millis()
        );

        loop {
            tokio::select! {
                inbound = self.rx.recv() => {
                    let keep_running = match inbound {
                        Some(inbound) => self.handle(inbound),
                        None => false,
                    };
                    if !keep_running {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let mut cx = Ctx::new(Instant::now());
                    self.root.tick(Tick::root(), &mut cx);
                    self.finish_turn(cx);
                }
            }
        }

        self.shutdown();
    }

    /// Apply one inbound message; false stops the actor
    fn handle(&mut self, inbound: Inbound) -> bool {
        let mut cx = Ctx::new(Instant::now());
        match inbound {
            Inbound::Command(command) => {
                debug!("'{}' <- {:?}", self.root.name(), command);
                match command {
                    Command::Play => self.root.play(&mut cx),
                    Command::Pause => self.root.pause(&mut cx),
                    Command::Stop => self.root.stop(&mut cx),
                    Command::SeekTo(position) => self.root.seek_to(position, &mut cx),
                    Command::SetPlaybackSpeed(speed) => {
                        self.root.set_playback_speed(speed, &mut cx)
                    }
                }
            }
            Inbound::Report { leaf, report } => {
                if !self.root.deliver(leaf, report, &mut cx) {
                    debug!("report from detached engine {} dropped", leaf);
                }
            }
            Inbound::AddListener(id, listener) => self.listeners.add_with_id(id, listener),
            Inbound::RemoveListener(id) => {
                if !self.listeners.remove(id) {
                    debug!("unknown listener {} not removed", id);
                }
            }
            Inbound::Release => return false,
        }
        self.finish_turn(cx);
        true
    }

    /// Deliver root events to listeners and publish the new snapshot
    fn finish_turn(&mut self, mut cx: Ctx) {
        for event in cx.take_events() {
            self.listeners.dispatch(self.root.name(), &event);
        }
        self.snapshot_tx.send_replace(Snapshot::of(&self.root, false));
    }

    fn shutdown(&mut self) {
        self.root.release();
        self.listeners.clear();
        self.snapshot_tx.send_replace(Snapshot::of(&self.root, true));
        info!(
            "Player actor for '{}' stopped at {}",
            self.root.name(),
            format_position(self.root.position())
        );
    }
}

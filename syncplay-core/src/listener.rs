//! Listener registry and dispatch
//!
//! Listeners are registered on a player handle and invoked on that handle's
//! actor task, in registration order. There is no main-thread affinity:
//! implementations that need another thread must hop there themselves.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::error::EngineFailure;
use crate::event::PlayerEvent;
use crate::phase::Phase;

/// Registration handle returned by `add`
pub type ListenerId = Uuid;

/// Observer of a player's event stream
///
/// Implementations must return quickly; they run on the actor that serializes
/// every operation of the player tree.
pub trait PlayerListener: Send + Sync {
    fn on_position_changed(&self, _player: &str, _position_ms: u64) {}

    fn on_phase_changed(&self, _player: &str, _phase: Phase) {}

    fn on_seek_to(&self, _player: &str, _position_ms: u64) {}

    fn on_error(&self, _player: &str, _error: &EngineFailure) {}
}

/// Ordered set of listeners for one player
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<(ListenerId, Arc<dyn PlayerListener>)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener under a fresh id
    pub fn add(&mut self, listener: Arc<dyn PlayerListener>) -> ListenerId {
        let id = Uuid::new_v4();
        self.add_with_id(id, listener);
        id
    }

    /// Register a listener under an id chosen by the caller
    pub(crate) fn add_with_id(&mut self, id: ListenerId, listener: Arc<dyn PlayerListener>) {
        self.listeners.push((id, listener));
    }

    /// Unregister; unknown ids are ignored
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        let removed = self.listeners.len() != before;
        if !removed {
            debug!("remove_listener: unknown listener {}", id);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver one event to every listener
    pub fn dispatch(&self, player: &str, event: &PlayerEvent) {
        for (_, listener) in &self.listeners {
            match event {
                PlayerEvent::PositionChanged(position) => {
                    listener.on_position_changed(player, *position)
                }
                PlayerEvent::PhaseChanged(phase) => listener.on_phase_changed(player, *phase),
                PlayerEvent::SeekTo(position) => listener.on_seek_to(player, *position),
                PlayerEvent::Error(failure) => listener.on_error(player, failure),
            }
        }
    }
}

/// Listener notification as a plain value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Position { player: String, position_ms: u64 },
    Phase { player: String, phase: Phase },
    SeekTo { player: String, position_ms: u64 },
    Error { player: String, message: String },
}

/// Listener forwarding every notification into a channel
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, notification: Notification) {
        // Receiver dropped means nobody is watching anymore
        let _ = self.tx.send(notification);
    }
}

impl PlayerListener for ChannelListener {
    fn on_position_changed(&self, player: &str, position_ms: u64) {
        self.forward(Notification::Position {
            player: player.to_string(),
            position_ms,
        });
    }

    fn on_phase_changed(&self, player: &str, phase: Phase) {
        self.forward(Notification::Phase {
            player: player.to_string(),
            phase,
        });
    }

    fn on_seek_to(&self, player: &str, position_ms: u64) {
        self.forward(Notification::SeekTo {
            player: player.to_string(),
            position_ms,
        });
    }

    fn on_error(&self, player: &str, error: &EngineFailure) {
        self.forward(Notification::Error {
            player: player.to_string(),
            message: error.to_string(),
        });
    }
}

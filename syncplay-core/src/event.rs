//! Player events and the per-turn event context
//!
//! Operations never report completion through return values. Every state
//! change a player wants its owner to see is pushed into the `Ctx` it was
//! called with; the owner (a composite or the runtime actor) drains it.

use std::collections::VecDeque;
use tokio::time::Instant;

use crate::error::EngineFailure;
use crate::phase::Phase;

/// Event emitted by a player towards its owner
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Position on the emitting player's own (virtual) timeline
    PositionChanged(u64),
    /// Phase transition
    PhaseChanged(Phase),
    /// Seek acknowledged at the given position
    SeekTo(u64),
    /// Unrecoverable backend failure, distinct from reaching the end
    Error(EngineFailure),
}

/// Event sink and clock reading for one actor turn
#[derive(Debug)]
pub struct Ctx {
    now: Instant,
    events: Vec<PlayerEvent>,
}

impl Ctx {
    pub fn new(now: Instant) -> Self {
        Self {
            now,
            events: Vec::new(),
        }
    }

    /// Wall clock reading shared by every player touched in this turn
    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn emit(&mut self, event: PlayerEvent) {
        self.events.push(event);
    }

    /// Fresh context for calling into a child during the same turn
    pub fn child(&self) -> Ctx {
        Ctx::new(self.now)
    }

    pub fn events(&self) -> &[PlayerEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<PlayerEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Periodic timer pulse from the runtime actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Only the top-most cluster of a tree corrects drift
    pub drift_correction: bool,
}

impl Tick {
    /// Tick delivered to the root of a tree
    pub fn root() -> Self {
        Self {
            drift_correction: true,
        }
    }

    /// Tick a cluster forwards to its members
    pub fn nested() -> Self {
        Self {
            drift_correction: false,
        }
    }
}

/// FIFO of child events awaiting handling by a composite
///
/// Handling one child event may issue commands that produce further child
/// events. Those are appended and handled by the drain already in progress,
/// so a composite never re-enters its own event handler.
#[derive(Debug, Default)]
pub(crate) struct ChildInbox {
    queue: VecDeque<(usize, PlayerEvent)>,
    draining: bool,
}

impl ChildInbox {
    /// Move everything a child emitted into the queue
    pub(crate) fn collect(&mut self, child: usize, cx: &mut Ctx) {
        self.queue
            .extend(cx.take_events().into_iter().map(|event| (child, event)));
    }

    /// Returns false when a drain is already running further up the stack
    pub(crate) fn begin_drain(&mut self) -> bool {
        if self.draining {
            return false;
        }
        self.draining = true;
        true
    }

    pub(crate) fn next(&mut self) -> Option<(usize, PlayerEvent)> {
        self.queue.pop_front()
    }

    pub(crate) fn end_drain(&mut self) {
        self.draining = false;
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_ctx_shares_clock() {
        let cx = Ctx::new(Instant::now());
        let child = cx.child();
        assert_eq!(child.now(), cx.now());
        assert!(child.events().is_empty());
    }

    #[test]
    fn test_inbox_preserves_order() {
        let mut inbox = ChildInbox::default();
        let mut a = Ctx::new(Instant::now());
        a.emit(PlayerEvent::SeekTo(10));
        a.emit(PlayerEvent::PositionChanged(20));
        let mut b = a.child();
        b.emit(PlayerEvent::PhaseChanged(Phase::Playing));

        inbox.collect(0, &mut a);
        inbox.collect(1, &mut b);
        assert!(a.events().is_empty());

        assert_eq!(inbox.next(), Some((0, PlayerEvent::SeekTo(10))));
        assert_eq!(inbox.next(), Some((0, PlayerEvent::PositionChanged(20))));
        assert_eq!(
            inbox.next(),
            Some((1, PlayerEvent::PhaseChanged(Phase::Playing)))
        );
        assert_eq!(inbox.next(), None);
    }

    #[test]
    fn test_nested_drain_is_refused() {
        let mut inbox = ChildInbox::default();
        assert!(inbox.begin_drain());
        assert!(!inbox.begin_drain());
        inbox.end_drain();
        assert!(inbox.begin_drain());
    }
}

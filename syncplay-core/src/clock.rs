//! Self-owned playback clock
//!
//! Used where a coordinator has to advance virtual time with no engine
//! behind it: the offset pre-roll and the sequencer's gaps between clips.

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct SelfClock {
    /// Position accumulated up to `started_at`
    base_ms: u64,
    /// Set while running
    started_at: Option<Instant>,
    speed: f32,
}

impl SelfClock {
    pub fn new() -> Self {
        Self {
            base_ms: 0,
            started_at: None,
            speed: 1.0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn position(&self, now: Instant) -> u64 {
        match self.started_at {
            Some(started) => self.base_ms + self.scaled_elapsed(started, now),
            None => self.base_ms,
        }
    }

    pub fn start(&mut self, now: Instant) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(started) = self.started_at.take() {
            self.base_ms += self.scaled_elapsed(started, now);
        }
    }

    /// Jump to a position, keeping the running state
    pub fn set(&mut self, position_ms: u64, now: Instant) {
        self.base_ms = position_ms;
        if self.started_at.is_some() {
            self.started_at = Some(now);
        }
    }

    pub fn set_speed(&mut self, speed: f32, now: Instant) {
        let running = self.is_running();
        self.pause(now);
        self.speed = speed;
        if running {
            self.start(now);
        }
    }

    fn scaled_elapsed(&self, started: Instant, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(started).as_millis() as f64;
        (elapsed * self.speed as f64) as u64
    }
}

impl Default for SelfClock {
    fn default() -> Self {
        Self::new()
    }
}

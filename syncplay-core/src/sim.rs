//! Simulated engine backend
//!
//! Stands in for a real decoder in the demo binary and integration tests.
//! Each engine runs its own tokio task with its own clock, so loading
//! delays, buffering stalls, failures, and clock drift all arrive through
//! the same asynchronous report path a real backend would use.

use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::engine::{Engine, EngineReport, EngineReporter, Surface};

/// Default interval between position reports
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(200);

/// Buffering stall injected when playback first reaches `at_ms`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stall {
    pub at_ms: u64,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SimCommand {
    Prepare,
    Play,
    Pause,
    Seek(u64),
    Speed(f32),
    Release,
}

pub struct SimulatedEngine {
    label: String,
    duration_ms: u64,
    load_delay: Duration,
    report_interval: Duration,
    stalls: Vec<Stall>,
    fail_at_ms: Option<u64>,
    clock_rate: f64,
    /// Commands issued before attach
    pending: Vec<SimCommand>,
    tx: Option<mpsc::UnboundedSender<SimCommand>>,
    surface: Option<Surface>,
}

impl SimulatedEngine {
    pub fn new(label: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            label: label.into(),
            duration_ms,
            load_delay: Duration::from_millis(100),
            report_interval: DEFAULT_REPORT_INTERVAL,
            stalls: Vec::new(),
            fail_at_ms: None,
            clock_rate: 1.0,
            pending: Vec::new(),
            tx: None,
            surface: None,
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn with_stall(mut self, at_ms: u64, duration: Duration) -> Self {
        self.stalls.push(Stall { at_ms, duration });
        self.stalls.sort_by_key(|stall| stall.at_ms);
        self
    }

    /// Report an unrecoverable failure once playback reaches `at_ms`
    pub fn failing_at(mut self, at_ms: u64) -> Self {
        self.fail_at_ms = Some(at_ms);
        self
    }

    /// Native clock speed relative to wall time; 1.02 runs 2% fast
    pub fn with_clock_rate(mut self, rate: f64) -> Self {
        self.clock_rate = rate;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn send(&mut self, command: SimCommand) {
        match &self.tx {
            Some(tx) => {
                if tx.send(command).is_err() {
                    debug!("[{}] backend task gone, {:?} dropped", self.label, command);
                }
            }
            None => self.pending.push(command),
        }
    }
}

impl Engine for SimulatedEngine {
    fn attach(&mut self, reporter: EngineReporter) {
        if self.tx.is_some() {
            warn!("[{}] attached twice, keeping the first reporter", self.label);
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let state = SimState {
            label: self.label.clone(),
            reporter,
            duration_ms: self.duration_ms,
            load_delay: self.load_delay,
            stalls: std::mem::take(&mut self.stalls),
            fail_at_ms: self.fail_at_ms,
            clock_rate: self.clock_rate,
            loaded: false,
            loading_until: None,
            stalled_until: None,
            playing: false,
            position_ms: 0.0,
            last_advance: Instant::now(),
            speed: 1.0,
            ended: false,
        };
        tokio::spawn(state.run(rx, self.report_interval));
        for command in self.pending.drain(..) {
            let _ = tx.send(command);
        }
        self.tx = Some(tx);
    }

    fn prepare(&mut self) {
        self.send(SimCommand::Prepare);
    }

    fn play(&mut self) {
        self.send(SimCommand::Play);
    }

    fn pause(&mut self) {
        self.send(SimCommand::Pause);
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.send(SimCommand::Seek(position_ms));
    }

    fn set_playback_speed(&mut self, speed: f32) {
        self.send(SimCommand::Speed(speed));
    }

    fn duration(&self) -> u64 {
        self.duration_ms
    }

    fn bind_surface(&mut self, surface: Surface) {
        debug!("[{}] bound to surface {}", self.label, surface.label());
        self.surface = Some(surface);
    }

    fn unbind_surface(&mut self) -> Option<Surface> {
        self.surface.take()
    }

    fn release(&mut self) {
        self.send(SimCommand::Release);
        self.tx = None;
        self.pending.clear();
    }
}

/// State owned by the backend task
struct SimState {
    label: String,
    reporter: EngineReporter,
    duration_ms: u64,
    load_delay: Duration,
    stalls: Vec<Stall>,
    fail_at_ms: Option<u64>,
    clock_rate: f64,
    loaded: bool,
    loading_until: Option<Instant>,
    stalled_until: Option<Instant>,
    playing: bool,
    position_ms: f64,
    last_advance: Instant,
    speed: f32,
    ended: bool,
}

impl SimState {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SimCommand>, report_interval: Duration) {
        let mut ticker = time::interval(report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                command = rx.recv() => match command {
                    Some(SimCommand::Release) | None => break,
                    Some(command) => self.apply(command),
                },
                _ = ticker.tick() => self.on_tick(),
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_deadline();
                }
            }
        }
        debug!("[{}] backend task finished", self.label);
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.loading_until, self.stalled_until) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn report(&self, report: EngineReport) {
        if !self.reporter.report(report) {
            debug!("[{}] player gone, report dropped", self.label);
        }
    }

    fn advancing(&self) -> bool {
        self.playing && self.loaded && self.stalled_until.is_none() && !self.ended
    }

    fn advance(&mut self) {
        let now = Instant::now();
        if self.advancing() {
            let elapsed = now.saturating_duration_since(self.last_advance).as_secs_f64() * 1000.0;
            self.position_ms += elapsed * self.clock_rate * self.speed as f64;
        }
        self.last_advance = now;
    }

    fn apply(&mut self, command: SimCommand) {
        self.advance();
        match command {
            SimCommand::Prepare => {
                if !self.loaded && self.loading_until.is_none() {
                    self.loading_until = Some(Instant::now() + self.load_delay);
                }
            }
            SimCommand::Play => self.playing = true,
            SimCommand::Pause => self.playing = false,
            SimCommand::Seek(position) => {
                let clamped = position.min(self.duration_ms);
                self.position_ms = clamped as f64;
                self.ended = clamped >= self.duration_ms;
                self.report(EngineReport::SeekCompleted(clamped));
            }
            SimCommand::Speed(speed) => self.speed = speed,
            SimCommand::Release => {}
        }
    }

    fn on_deadline(&mut self) {
        let now = Instant::now();
        if self.loading_until.is_some_and(|until| until <= now) {
            self.loading_until = None;
            self.loaded = true;
            self.last_advance = now;
            self.report(EngineReport::Ready);
        }
        if self.stalled_until.is_some_and(|until| until <= now) {
            self.stalled_until = None;
            self.last_advance = now;
            self.report(if self.playing {
                EngineReport::Playing
            } else {
                EngineReport::Paused
            });
        }
    }

    fn on_tick(&mut self) {
        self.advance();
        if !self.advancing() {
            return;
        }
        let position = self.position_ms as u64;

        if self.fail_at_ms.is_some_and(|at| position >= at) {
            self.fail_at_ms = None;
            self.loaded = false;
            self.playing = false;
            self.report(EngineReport::Failed("simulated decoder failure".to_string()));
            return;
        }

        if let Some(index) = self.stalls.iter().position(|stall| position >= stall.at_ms) {
            let stall = self.stalls.remove(index);
            self.position_ms = stall.at_ms as f64;
            self.stalled_until = Some(Instant::now() + stall.duration);
            self.report(EngineReport::Buffering);
            return;
        }

        if position >= self.duration_ms {
            self.position_ms = self.duration_ms as f64;
            self.ended = true;
            self.report(EngineReport::Position(self.duration_ms));
            self.report(EngineReport::Ended);
            return;
        }

        self.report(EngineReport::Position(position));
    }
}

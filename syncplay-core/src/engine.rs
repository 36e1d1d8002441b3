//! External engine boundary
//!
//! Concrete decode / replay backends live outside this crate. They are driven
//! through the non-blocking [`Engine`] trait and report back asynchronously
//! through an [`EngineReporter`], from whatever thread the backend owns.

use std::any::Any;
use std::sync::Arc;
use syncplay_common::SyncConfig;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::EngineFailure;
use crate::runtime::Inbound;

/// Identity of one leaf in a player tree, used to route engine reports
pub type LeafId = Uuid;

/// Asynchronous report from a backend
#[derive(Debug, Clone, PartialEq)]
pub enum EngineReport {
    /// Prepared and able to play
    Ready,
    /// Advancing (also sent when leaving a buffering stall)
    Playing,
    /// Not advancing (sent when a stall ends while paused)
    Paused,
    /// Stalled waiting for data
    Buffering,
    /// Current position in the engine's own timeline
    Position(u64),
    /// Seek finished at the given position
    SeekCompleted(u64),
    /// Reached the end of the media
    Ended,
    /// Unrecoverable failure
    Failed(String),
}

/// Non-blocking control surface of a concrete backend
///
/// Every method requests a transition and returns immediately; outcomes are
/// reported through the reporter handed to [`Engine::attach`].
pub trait Engine: Send {
    /// Connect the engine to its report channel. Called once, before any command.
    fn attach(&mut self, reporter: EngineReporter);

    fn prepare(&mut self);

    fn play(&mut self);

    fn pause(&mut self);

    fn seek_to(&mut self, position_ms: u64);

    fn set_playback_speed(&mut self, _speed: f32) {}

    /// Media duration in ms, 0 while unknown
    fn duration(&self) -> u64;

    /// Take exclusive ownership of an output surface
    fn bind_surface(&mut self, surface: Surface);

    /// Give the output surface back, if one is bound
    fn unbind_surface(&mut self) -> Option<Surface>;

    fn release(&mut self);
}

/// Sender half handed to engines; tags every report with its leaf id
#[derive(Clone)]
pub struct EngineReporter {
    leaf: LeafId,
    tx: mpsc::UnboundedSender<Inbound>,
}

impl EngineReporter {
    pub fn leaf(&self) -> LeafId {
        self.leaf
    }

    /// Post a report to the owning actor. Returns false once the actor is gone.
    pub fn report(&self, report: EngineReport) -> bool {
        self.tx
            .send(Inbound::Report {
                leaf: self.leaf,
                report,
            })
            .is_ok()
    }
}

impl std::fmt::Debug for EngineReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineReporter")
            .field("leaf", &self.leaf)
            .finish()
    }
}

/// Runtime wiring handed down a player tree on attach
///
/// Mints reporters for leaves (including engines created later, e.g. by the
/// sequencer) and carries the tree-wide tunables.
#[derive(Clone)]
pub struct ReportSink {
    tx: mpsc::UnboundedSender<Inbound>,
    config: Arc<SyncConfig>,
}

impl ReportSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Inbound>, config: Arc<SyncConfig>) -> Self {
        Self { tx, config }
    }

    /// Sink with no actor behind it; reports are dropped
    pub fn detached(config: SyncConfig) -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self::new(tx, Arc::new(config))
    }

    pub fn reporter(&self, leaf: LeafId) -> EngineReporter {
        EngineReporter {
            leaf,
            tx: self.tx.clone(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

/// Opaque handle to a media source, resolved by an [`EngineFactory`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef(String);

impl SourceRef {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceRef {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for SourceRef {
    fn from(source: String) -> Self {
        Self(source)
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates engines for scheduled clips
pub trait EngineFactory: Send {
    fn create(&mut self, source: &SourceRef) -> Result<Box<dyn Engine>, EngineFailure>;
}

impl<F> EngineFactory for F
where
    F: FnMut(&SourceRef) -> Result<Box<dyn Engine>, EngineFailure> + Send,
{
    fn create(&mut self, source: &SourceRef) -> Result<Box<dyn Engine>, EngineFailure> {
        self(source)
    }
}

/// Render target owned by exactly one engine at a time
///
/// Not `Clone`: handing a surface to an engine moves it, so two engines can
/// never render into the same target.
pub struct Surface {
    label: String,
    target: Box<dyn Any + Send>,
}

impl Surface {
    pub fn new<T: Any + Send>(label: impl Into<String>, target: T) -> Self {
        Self {
            label: label.into(),
            target: Box::new(target),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.target.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface").field("label", &self.label).finish()
    }
}

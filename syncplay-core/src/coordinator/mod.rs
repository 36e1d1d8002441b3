//! Composite players
//!
//! Each coordinator owns its children, fans caller operations down to them
//! and folds their events back into one stream on its own timeline.

pub mod cluster;
pub mod offset;
pub mod selection;
pub mod sequencer;

pub use cluster::ClusterCoordinator;
pub use offset::OffsetCoordinator;
pub use selection::SelectionCoordinator;
pub use sequencer::SequencerCoordinator;

//! Convenience constructors for common player trees
//!
//! Nothing here holds state; every function delegates to a coordinator
//! constructor and returns its validation errors unchanged.

use crate::coordinator::{
    ClusterCoordinator, OffsetCoordinator, SelectionCoordinator, SequencerCoordinator,
};
use crate::engine::{Engine, EngineFactory, Surface};
use crate::error::Result;
use crate::leaf::LeafPlayer;
use crate::player::Player;
use crate::timeline::{ClipSchedule, ScheduledClip, SelectionOptions};

/// Lock several players to one timeline
pub fn combine<I, P>(players: I) -> Result<ClusterCoordinator>
where
    I: IntoIterator<Item = P>,
    P: Into<Player>,
{
    ClusterCoordinator::new(players.into_iter().map(Into::into).collect())
}

/// Play only `options` windows of `player`, back to back
pub fn selection(player: impl Into<Player>, options: SelectionOptions) -> Result<SelectionCoordinator> {
    SelectionCoordinator::new(player, options)
}

/// Start `player` after `offset_ms` of self-clocked lead-in
pub fn offset(player: impl Into<Player>, offset_ms: u64) -> OffsetCoordinator {
    OffsetCoordinator::new(player, offset_ms)
}

/// Play scheduled clips one engine at a time
pub fn sequence(
    clips: Vec<ScheduledClip>,
    factory: impl EngineFactory + 'static,
) -> Result<SequencerCoordinator> {
    Ok(SequencerCoordinator::new(ClipSchedule::new(clips)?, factory))
}

/// Wrap a backend in a leaf player
pub fn leaf(engine: impl Engine + 'static) -> LeafPlayer {
    LeafPlayer::new(Box::new(engine))
}

/// `combine!(a, b, ...)`: cluster over heterogeneous players
#[macro_export]
macro_rules! combine {
    ($($player:expr),+ $(,)?) => {
        $crate::facade::combine([$($crate::player::Player::from($player)),+])
    };
}

/// Builds one engine's player stack: leaf, then selection, then offset
pub struct PlayerBuilder {
    engine: Box<dyn Engine>,
    name: Option<String>,
    surface: Option<Surface>,
    selection: Option<SelectionOptions>,
    offset_ms: u64,
}

impl PlayerBuilder {
    pub fn new(engine: impl Engine + 'static) -> Self {
        Self {
            engine: Box::new(engine),
            name: None,
            surface: None,
            selection: None,
            offset_ms: 0,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn surface(mut self, surface: Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn selection(mut self, options: SelectionOptions) -> Self {
        self.selection = Some(options);
        self
    }

    pub fn offset(mut self, offset_ms: u64) -> Self {
        self.offset_ms = offset_ms;
        self
    }

    pub fn build(self) -> Result<Player> {
        let name = self.name.unwrap_or_else(|| "leaf".to_string());

        let mut leaf = LeafPlayer::new(self.engine).with_name(name.clone());
        if let Some(surface) = self.surface {
            leaf = leaf.with_surface(surface);
        }
        let mut player = Player::from(leaf);

        if let Some(options) = self.selection {
            player = SelectionCoordinator::new(player, options)?
                .with_name(format!("{}/selection", name))
                .into();
        }
        if self.offset_ms > 0 {
            player = OffsetCoordinator::new(player, self.offset_ms)
                .with_name(format!("{}/offset", name))
                .into();
        }
        Ok(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::{scripted_leaf, ScriptedEngine};

    #[test]
    fn test_combine_builds_cluster() {
        let (a, _, _) = scripted_leaf("a", 60_000);
        let (b, _, _) = scripted_leaf("b", 90_000);
        let cluster = combine([a, b]).unwrap();
        assert_eq!(cluster.members().len(), 2);
        assert_eq!(cluster.duration(), 90_000);
    }

    #[test]
    fn test_combine_macro_mixes_player_kinds() {
        let (a, _, _) = scripted_leaf("a", 60_000);
        let (b, _, _) = scripted_leaf("b", 30_000);
        let cluster = combine!(a, offset(b, 5000)).unwrap();
        assert_eq!(cluster.duration(), 60_000);
        assert_eq!(cluster.members()[1].kind(), "offset");
    }

    #[test]
    fn test_combine_rejects_empty() {
        let empty: Vec<Player> = Vec::new();
        assert!(matches!(combine(empty), Err(Error::EmptyCluster)));
    }

    #[test]
    fn test_builder_stacks_selection_under_offset() {
        let (engine, _) = ScriptedEngine::new(100_000);
        let player = PlayerBuilder::new(engine)
            .name("doc")
            .selection(SelectionOptions::from_pairs(&[(0, 5000), (10_000, 20_000)]).unwrap())
            .offset(2000)
            .build()
            .unwrap();

        assert_eq!(player.kind(), "offset");
        assert_eq!(player.name(), "doc/offset");
        assert_eq!(player.duration(), 17_000);
    }

    #[test]
    fn test_builder_reports_invalid_selection() {
        let (engine, _) = ScriptedEngine::new(10_000);
        let result = PlayerBuilder::new(engine)
            .selection(SelectionOptions::from_pairs(&[(0, 50_000)]).unwrap())
            .build();
        assert!(matches!(result, Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn test_sequence_validates_schedule() {
        let (factory, _) = crate::testing::ScriptedFactory::new(10_000);
        let result = sequence(Vec::new(), factory);
        assert!(matches!(result, Err(Error::EmptySchedule)));
    }
}

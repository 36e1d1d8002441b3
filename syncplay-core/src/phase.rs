//! Player lifecycle phases and aggregation rules

use serde::Serialize;

/// Lifecycle phase shared by every player, leaf or composite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Not prepared yet (or reset after an engine failure)
    Idle,
    /// Prepared and positioned, not advancing
    Ready,
    /// Waiting on data, position frozen
    Buffering,
    /// Advancing
    Playing,
    /// Paused by request
    Paused,
    /// Position reached duration
    End,
}

impl Phase {
    /// Dominance when several phases are folded into one.
    ///
    /// `Buffering > Paused > Ready > Playing > End`, with `Idle` above all:
    /// a member that has not finished loading holds back the whole group.
    pub fn severity(self) -> u8 {
        match self {
            Phase::Idle => 5,
            Phase::Buffering => 4,
            Phase::Paused => 3,
            Phase::Ready => 2,
            Phase::Playing => 1,
            Phase::End => 0,
        }
    }

    /// Idle or Buffering: the player cannot advance right now
    pub fn is_blocking(self) -> bool {
        matches!(self, Phase::Idle | Phase::Buffering)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Ready => write!(f, "ready"),
            Phase::Buffering => write!(f, "buffering"),
            Phase::Playing => write!(f, "playing"),
            Phase::Paused => write!(f, "paused"),
            Phase::End => write!(f, "end"),
        }
    }
}

/// Fold member phases into one.
///
/// Ended members hold their position and are ignored while any member is
/// still live; the result is `End` only when every member ended. An empty
/// set folds to `Idle`.
pub fn aggregate<I>(phases: I) -> Phase
where
    I: IntoIterator<Item = Phase>,
{
    let mut seen_any = false;
    let mut dominant: Option<Phase> = None;

    for phase in phases {
        seen_any = true;
        if phase == Phase::End {
            continue;
        }
        dominant = match dominant {
            Some(current) if current.severity() >= phase.severity() => Some(current),
            _ => Some(phase),
        };
    }

    match (seen_any, dominant) {
        (false, _) => Phase::Idle,
        (true, None) => Phase::End,
        (true, Some(phase)) => phase,
    }
}

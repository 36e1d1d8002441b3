//! Timeline windows: selections, scheduled clips and the virtual/underlying map
//!
//! Windows are half-open `[start, end)` in milliseconds. Every list of windows
//! is validated at construction: non-empty, each window non-empty, ascending
//! and non-overlapping (`w[i].end <= w[i + 1].start`).

use syncplay_common::human_time::format_window;

use crate::engine::SourceRef;
use crate::error::{Error, Result};

/// Playable window on a child's underlying timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: u64,
    pub end: u64,
}

impl Selection {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if end <= start {
            return Err(Error::EmptyInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> u64 {
        self.end - self.start
    }

    pub fn contains(&self, position: u64) -> bool {
        position >= self.start && position < self.end
    }
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_window(self.start, self.end))
    }
}

/// Ordered, non-overlapping set of selections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionOptions {
    selections: Vec<Selection>,
}

impl SelectionOptions {
    pub fn new(selections: Vec<Selection>) -> Result<Self> {
        if selections.is_empty() {
            return Err(Error::EmptySelection);
        }
        validate_windows(selections.iter().map(|s| (s.start, s.end)))?;
        Ok(Self { selections })
    }

    /// Build from `(start, end)` pairs
    pub fn from_pairs(pairs: &[(u64, u64)]) -> Result<Self> {
        let selections = pairs
            .iter()
            .map(|&(start, end)| Selection::new(start, end))
            .collect::<Result<Vec<_>>>()?;
        Self::new(selections)
    }

    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    /// Sum of all selection lengths
    pub fn total_duration(&self) -> u64 {
        self.selections.iter().map(Selection::duration).sum()
    }

    /// Check every bound lies within `[0, duration]`
    pub fn validate_within(&self, duration: u64) -> Result<()> {
        match self.selections.iter().find(|s| s.end > duration) {
            Some(s) => Err(Error::OutOfBounds {
                start: s.start,
                end: s.end,
                duration,
            }),
            None => Ok(()),
        }
    }
}

/// Shared ordering check for selections and clips
fn validate_windows<I>(windows: I) -> Result<()>
where
    I: IntoIterator<Item = (u64, u64)>,
{
    let mut previous_end: Option<u64> = None;
    for (index, (start, end)) in windows.into_iter().enumerate() {
        if end <= start {
            return Err(Error::EmptyInterval { start, end });
        }
        if let Some(previous_end) = previous_end {
            if start < previous_end {
                return Err(Error::Unordered {
                    index,
                    start,
                    previous_end,
                });
            }
        }
        previous_end = Some(end);
    }
    Ok(())
}

/// Prefix-sum table mapping a continuous virtual timeline onto selections
#[derive(Debug, Clone)]
pub struct TimelineMap {
    selections: Vec<Selection>,
    /// `cumulative[i]` = virtual start of selection `i`; last entry is the total
    cumulative: Vec<u64>,
}

impl TimelineMap {
    pub fn new(options: &SelectionOptions) -> Self {
        let selections = options.selections().to_vec();
        let mut cumulative = Vec::with_capacity(selections.len() + 1);
        let mut acc = 0;
        cumulative.push(acc);
        for selection in &selections {
            acc += selection.duration();
            cumulative.push(acc);
        }
        Self {
            selections,
            cumulative,
        }
    }

    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    pub fn total(&self) -> u64 {
        self.cumulative[self.selections.len()]
    }

    /// Virtual start of selection `index`
    pub fn virtual_start(&self, index: usize) -> u64 {
        self.cumulative[index.min(self.selections.len())]
    }

    /// Selection holding virtual position `v`, None at or past the end
    pub fn index_of_virtual(&self, v: u64) -> Option<usize> {
        if v >= self.total() {
            return None;
        }
        // cumulative[0] == 0 <= v, so the partition point is at least 1
        Some(self.cumulative.partition_point(|&c| c <= v) - 1)
    }

    /// First selection ending after underlying position `u`
    pub fn index_of_underlying(&self, u: u64) -> Option<usize> {
        let index = self.selections.partition_point(|s| s.end <= u);
        (index < self.selections.len()).then_some(index)
    }

    /// Virtual → underlying. Positions at or past the end map to the end of
    /// the last selection.
    pub fn to_underlying(&self, v: u64) -> u64 {
        match self.index_of_virtual(v) {
            Some(i) => self.selections[i].start + (v - self.cumulative[i]),
            None => self.selections[self.selections.len() - 1].end,
        }
    }

    /// Underlying → virtual. Positions inside an excluded gap map to the start
    /// of the following selection; positions past the last selection map to
    /// the total.
    pub fn to_virtual(&self, u: u64) -> u64 {
        match self.index_of_underlying(u) {
            Some(i) => {
                let selection = &self.selections[i];
                self.cumulative[i] + u.saturating_sub(selection.start)
            }
            None => self.total(),
        }
    }
}

/// Clip placed on a shared virtual timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledClip {
    pub start: u64,
    pub end: u64,
    pub source: SourceRef,
}

impl ScheduledClip {
    pub fn new(start: u64, end: u64, source: impl Into<SourceRef>) -> Result<Self> {
        if end <= start {
            return Err(Error::EmptyInterval { start, end });
        }
        Ok(Self {
            start,
            end,
            source: source.into(),
        })
    }

    pub fn duration(&self) -> u64 {
        self.end - self.start
    }

    pub fn contains(&self, position: u64) -> bool {
        position >= self.start && position < self.end
    }
}

/// Ordered, non-overlapping clips
#[derive(Debug, Clone)]
pub struct ClipSchedule {
    clips: Vec<ScheduledClip>,
}

impl ClipSchedule {
    pub fn new(clips: Vec<ScheduledClip>) -> Result<Self> {
        if clips.is_empty() {
            return Err(Error::EmptySchedule);
        }
        validate_windows(clips.iter().map(|c| (c.start, c.end)))?;
        Ok(Self { clips })
    }

    pub fn clips(&self) -> &[ScheduledClip] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// End of the last clip
    pub fn duration(&self) -> u64 {
        self.clips[self.clips.len() - 1].end
    }

    /// The unique clip with `start <= v < end`
    pub fn locate(&self, v: u64) -> Option<usize> {
        let index = self.clips.partition_point(|c| c.end <= v);
        (index < self.clips.len() && self.clips[index].contains(v)).then_some(index)
    }

    /// First clip starting after `v`
    pub fn next_after(&self, v: u64) -> Option<usize> {
        let index = self.clips.partition_point(|c| c.start <= v);
        (index < self.clips.len()).then_some(index)
    }
}

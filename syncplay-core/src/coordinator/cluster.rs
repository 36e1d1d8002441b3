//! Cluster coordinator: N members locked to one timeline
//!
//! **Responsibilities:**
//! - Fan play/pause/stop/seek out to every member
//! - Fold member phases into one (`Buffering > Paused > Ready > Playing > End`)
//! - Buffering barrier: while any member is loading or stalled, playing
//!   members are held paused; all resume once the last blocker clears
//! - Drift correction against the longest member (the timeline reference),
//!   performed only when this cluster is the root of the tree
//! - Position broadcast throttled to the runtime tick

use syncplay_common::human_time::format_position;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineReport, LeafId, ReportSink};
use crate::error::{EngineFailure, Error, Result};
use crate::event::{ChildInbox, Ctx, PlayerEvent, Tick};
use crate::phase::{self, Phase};
use crate::player::Player;

/// Seek fanned out to members, waiting for every acknowledgement
#[derive(Debug, Clone, Copy)]
struct PendingSeek {
    target: u64,
    remaining: usize,
}

pub struct ClusterCoordinator {
    name: String,
    members: Vec<Player>,
    inbox: ChildInbox,
    /// Members paused by the buffering barrier (not by the caller)
    held: Vec<bool>,
    /// Outstanding corrective seeks per member; their acks are not relayed
    corrections: Vec<u32>,
    pending_seek: Option<PendingSeek>,
    phase: Phase,
    target: Phase,
    position: u64,
    last_broadcast: Option<u64>,
    drift_tolerance_ms: u64,
    tolerance_overridden: bool,
    error: Option<EngineFailure>,
    released: bool,
}

impl ClusterCoordinator {
    pub fn new(members: Vec<Player>) -> Result<Self> {
        if members.is_empty() {
            return Err(Error::EmptyCluster);
        }
        let count = members.len();
        Ok(Self {
            name: "cluster".to_string(),
            members,
            inbox: ChildInbox::default(),
            held: vec![false; count],
            corrections: vec![0; count],
            pending_seek: None,
            phase: Phase::Idle,
            target: Phase::Idle,
            position: 0,
            last_broadcast: None,
            drift_tolerance_ms: syncplay_common::SyncConfig::default().drift_tolerance_ms,
            tolerance_overridden: false,
            error: None,
            released: false,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fix the drift tolerance instead of taking it from the runtime config
    pub fn with_drift_tolerance(mut self, tolerance_ms: u64) -> Self {
        self.drift_tolerance_ms = tolerance_ms;
        self.tolerance_overridden = true;
        self
    }

    pub fn members(&self) -> &[Player] {
        &self.members
    }

    pub fn drift_tolerance_ms(&self) -> u64 {
        self.drift_tolerance_ms
    }

    /// Index of the longest member; its position defines the timeline
    pub fn reference_index(&self) -> usize {
        let mut reference = 0;
        for (index, member) in self.members.iter().enumerate() {
            if member.duration() > self.members[reference].duration() {
                reference = index;
            }
        }
        reference
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn position(&self) -> u64 {
        match self.pending_seek {
            Some(pending) => pending.target,
            None => self.position,
        }
    }

    /// The longest member defines the overall timeline
    pub fn duration(&self) -> u64 {
        self.members.iter().map(Player::duration).max().unwrap_or(0)
    }

    pub fn error(&self) -> Option<&EngineFailure> {
        self.error.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn attach(&mut self, sink: &ReportSink) {
        if !self.tolerance_overridden {
            self.drift_tolerance_ms = sink.config().drift_tolerance_ms;
        }
        for member in &mut self.members {
            member.attach(sink);
        }
    }

    pub fn play(&mut self, cx: &mut Ctx) {
        if self.released {
            warn!("[{}] play after release ignored", self.name);
            return;
        }
        self.target = Phase::Playing;
        self.fan_out(cx, |member, c| member.play(c));
    }

    pub fn pause(&mut self, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.target = Phase::Paused;
        self.held.fill(false);
        self.fan_out(cx, |member, c| member.pause(c));
    }

    pub fn stop(&mut self, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.target = Phase::Ready;
        self.held.fill(false);
        self.fan_out(cx, |member, c| member.stop(c));
    }

    /// Clamp, fan out, and acknowledge once every member acknowledged.
    /// Members shorter than the target clamp on their own and settle in `End`.
    /// Corrective seeks still in flight keep their counts: engines ack in
    /// order, so those acks arrive before the ones for this seek.
    pub fn seek_to(&mut self, target_ms: u64, cx: &mut Ctx) {
        if self.released {
            return;
        }
        let duration = self.duration();
        let target = if duration > 0 { target_ms.min(duration) } else { target_ms };
        debug!("[{}] seek_to {}", self.name, format_position(target));

        self.pending_seek = Some(PendingSeek {
            target,
            remaining: self.members.len(),
        });
        self.position = target;
        self.fan_out(cx, move |member, c| member.seek_to(target, c));
    }

    pub fn set_playback_speed(&mut self, speed: f32, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.fan_out(cx, move |member, c| member.set_playback_speed(speed, c));
    }

    pub fn deliver(&mut self, leaf: LeafId, report: EngineReport, cx: &mut Ctx) -> bool {
        for index in 0..self.members.len() {
            let mut child_cx = cx.child();
            if self.members[index].deliver(leaf, report.clone(), &mut child_cx) {
                self.inbox.collect(index, &mut child_cx);
                self.drain(cx);
                return true;
            }
        }
        false
    }

    pub fn tick(&mut self, tick: Tick, cx: &mut Ctx) {
        if self.released {
            return;
        }
        self.fan_out(cx, |member, c| member.tick(Tick::nested(), c));

        if self.phase != Phase::Playing || self.pending_seek.is_some() {
            return;
        }

        let reference = self.reference_index();
        let reference_position = self.members[reference].position();
        self.position = reference_position;
        if self.last_broadcast != Some(reference_position) {
            self.last_broadcast = Some(reference_position);
            cx.emit(PlayerEvent::PositionChanged(reference_position));
        }

        if tick.drift_correction {
            self.correct_drift(reference, reference_position, cx);
        }
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for member in &mut self.members {
            member.release();
        }
        self.inbox.clear();
        info!("[{}] released {} members", self.name, self.members.len());
    }

    fn correct_drift(&mut self, reference: usize, reference_position: u64, cx: &mut Ctx) {
        for index in 0..self.members.len() {
            if index == reference || self.corrections[index] > 0 {
                continue;
            }
            let member = &self.members[index];
            if member.phase() != Phase::Playing {
                continue;
            }
            let member_duration = member.duration();
            let expected = if member_duration > 0 {
                reference_position.min(member_duration)
            } else {
                reference_position
            };
            let drift = member.position().abs_diff(expected);
            if drift > self.drift_tolerance_ms {
                debug!(
                    "[{}] {} drifted {}ms (at {}, reference {}), resyncing",
                    self.name,
                    member.name(),
                    drift,
                    format_position(member.position()),
                    format_position(expected)
                );
                self.corrections[index] += 1;
                self.with_member(index, cx, move |m, c| m.seek_to(expected, c));
            }
        }
    }

    fn fan_out<F>(&mut self, cx: &mut Ctx, f: F)
    where
        F: Fn(&mut Player, &mut Ctx),
    {
        for (index, member) in self.members.iter_mut().enumerate() {
            let mut child_cx = cx.child();
            f(member, &mut child_cx);
            self.inbox.collect(index, &mut child_cx);
        }
        self.drain(cx);
    }

    fn with_member<F>(&mut self, index: usize, cx: &mut Ctx, f: F)
    where
        F: FnOnce(&mut Player, &mut Ctx),
    {
        let mut child_cx = cx.child();
        f(&mut self.members[index], &mut child_cx);
        self.inbox.collect(index, &mut child_cx);
        self.drain(cx);
    }

    fn drain(&mut self, cx: &mut Ctx) {
        if !self.inbox.begin_drain() {
            return;
        }
        while let Some((index, event)) = self.inbox.next() {
            self.on_member_event(index, event, cx);
        }
        self.inbox.end_drain();
        self.refresh_phase(cx);
    }

    fn on_member_event(&mut self, index: usize, event: PlayerEvent, cx: &mut Ctx) {
        match event {
            PlayerEvent::PositionChanged(position) => {
                if self.pending_seek.is_none() && index == self.reference_index() {
                    self.position = position;
                }
            }
            PlayerEvent::SeekTo(position) => self.on_member_seek(index, position, cx),
            PlayerEvent::PhaseChanged(phase) => self.on_member_phase(index, phase, cx),
            PlayerEvent::Error(failure) => self.on_member_error(index, failure, cx),
        }
    }

    fn on_member_seek(&mut self, index: usize, position: u64, cx: &mut Ctx) {
        if self.corrections[index] > 0 {
            self.corrections[index] -= 1;
            return;
        }
        match self.pending_seek.as_mut() {
            Some(pending) => {
                pending.remaining = pending.remaining.saturating_sub(1);
                if pending.remaining == 0 {
                    let target = pending.target;
                    self.pending_seek = None;
                    self.position = target;
                    self.last_broadcast = Some(target);
                    cx.emit(PlayerEvent::SeekTo(target));
                }
            }
            None => debug!(
                "[{}] unsolicited seek ack from {} at {}",
                self.name,
                self.members[index].name(),
                format_position(position)
            ),
        }
    }

    fn on_member_phase(&mut self, index: usize, phase: Phase, cx: &mut Ctx) {
        debug!(
            "[{}] {} -> {} (target {})",
            self.name,
            self.members[index].name(),
            phase,
            self.target
        );
        if self.target != Phase::Playing {
            return;
        }

        match phase {
            Phase::Idle | Phase::Buffering => self.hold_others(index, cx),
            Phase::Playing => {
                if self.blocking_member(index).is_some() {
                    if !self.held[index] {
                        self.held[index] = true;
                        self.with_member(index, cx, |m, c| m.pause(c));
                    }
                } else {
                    self.release_barrier(cx);
                }
            }
            Phase::Paused => {
                if self.held[index] {
                    return;
                }
                // Paused from below while the group should play: keep lockstep
                info!(
                    "[{}] {} paused on its own, pausing the cluster",
                    self.name,
                    self.members[index].name()
                );
                self.target = Phase::Paused;
                for other in 0..self.members.len() {
                    if other != index
                        && matches!(self.members[other].phase(), Phase::Playing | Phase::Buffering)
                    {
                        self.with_member(other, cx, |m, c| m.pause(c));
                    }
                }
            }
            Phase::Ready | Phase::End => {}
        }
    }

    fn on_member_error(&mut self, index: usize, failure: EngineFailure, cx: &mut Ctx) {
        error!(
            "[{}] member {} failed, stopping siblings: {}",
            self.name,
            self.members[index].name(),
            failure
        );
        self.error = Some(failure.clone());
        self.target = Phase::Ready;
        self.held.fill(false);
        self.pending_seek = None;
        for other in 0..self.members.len() {
            if other != index {
                self.with_member(other, cx, |m, c| m.stop(c));
            }
        }
        cx.emit(PlayerEvent::Error(failure));
    }

    /// Pause every playing member except `index`
    fn hold_others(&mut self, index: usize, cx: &mut Ctx) {
        for other in 0..self.members.len() {
            if other != index && !self.held[other] && self.members[other].phase() == Phase::Playing {
                debug!(
                    "[{}] holding {} while {} is {}",
                    self.name,
                    self.members[other].name(),
                    self.members[index].name(),
                    self.members[index].phase()
                );
                self.held[other] = true;
                self.with_member(other, cx, |m, c| m.pause(c));
            }
        }
    }

    fn blocking_member(&self, except: usize) -> Option<usize> {
        (0..self.members.len())
            .find(|&other| other != except && self.members[other].phase().is_blocking())
    }

    fn release_barrier(&mut self, cx: &mut Ctx) {
        for index in 0..self.members.len() {
            if self.held[index] {
                self.held[index] = false;
                self.with_member(index, cx, |m, c| m.play(c));
            }
        }
    }

    fn refresh_phase(&mut self, cx: &mut Ctx) {
        let live: Vec<Phase> = self
            .members
            .iter()
            .map(Player::phase)
            .filter(|phase| *phase != Phase::End)
            .collect();

        let aggregate = if live.is_empty() {
            Phase::End
        } else if live.contains(&Phase::Idle) {
            if self.target == Phase::Playing {
                Phase::Buffering
            } else {
                Phase::Idle
            }
        } else if self.held.iter().any(|held| *held) {
            Phase::Buffering
        } else {
            phase::aggregate(live)
        };

        if aggregate != self.phase {
            debug!("[{}] phase {} -> {}", self.name, self.phase, aggregate);
            self.phase = aggregate;
            cx.emit(PlayerEvent::PhaseChanged(aggregate));
        }
    }
}

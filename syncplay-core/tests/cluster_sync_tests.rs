//! Cluster synchronization over simulated engines
//!
//! Runs real actor tasks on a paused clock: engines load, report positions,
//! stall and drift on their own timers while the cluster keeps them locked.

mod helpers;

use helpers::*;
use syncplay_core::{facade, Notification, Phase, Player, PlayerBuilder, PlayerHandle};
use tokio::time::Duration;

fn named(engine: syncplay_core::SimulatedEngine, name: &str) -> Player {
    PlayerBuilder::new(engine).name(name).build().unwrap()
}

fn spawn_pair(video: syncplay_core::SimulatedEngine, replay: syncplay_core::SimulatedEngine) -> PlayerHandle {
    let cluster = facade::combine([named(video, "video"), named(replay, "replay")])
        .unwrap()
        .with_name("lesson");
    PlayerHandle::spawn(cluster, &config())
}

fn member_position(handle: &PlayerHandle, name: &str) -> u64 {
    find(&handle.snapshot(), name).unwrap().position_ms
}

#[tokio::test(start_paused = true)]
async fn test_members_start_together_after_loading() {
    let handle = spawn_pair(
        sim("video", 60_000).with_load_delay(Duration::from_millis(900)),
        sim("replay", 90_000),
    );
    let mut rx = listen(&handle);

    handle.play();
    next_matching(&mut rx, |n| matches!(n, Notification::Phase { phase: Phase::Playing, .. })).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.duration_ms, 90_000);
    // The fast loader was held at the barrier instead of running ahead
    let replay = find(&snapshot, "replay").unwrap();
    assert!(replay.position_ms < 200, "replay ran ahead to {}", replay.position_ms);
    handle.release();
}

#[tokio::test(start_paused = true)]
async fn test_seek_lands_every_member_within_tolerance() {
    let handle = spawn_pair(sim("video", 60_000), sim("replay", 90_000));
    let mut rx = listen(&handle);

    handle.play();
    next_matching(&mut rx, |n| matches!(n, Notification::Phase { phase: Phase::Playing, .. })).await;
    advance(1000).await;

    handle.seek_to(30_000);
    let ack = next_matching(&mut rx, |n| matches!(n, Notification::SeekTo { .. })).await;
    assert_eq!(
        ack,
        Notification::SeekTo {
            player: "lesson".to_string(),
            position_ms: 30_000
        }
    );

    let tolerance = config().drift_tolerance_ms;
    for name in ["video", "replay"] {
        let position = member_position(&handle, name);
        assert!(
            position.abs_diff(30_000) <= tolerance,
            "{} at {} after seek",
            name,
            position
        );
    }

    advance(3000).await;
    let video = member_position(&handle, "video");
    let replay = member_position(&handle, "replay");
    assert!(video.abs_diff(replay) <= tolerance);
    assert!(handle.position() > 32_000);
    handle.release();
}

#[tokio::test(start_paused = true)]
async fn test_drifting_member_is_pulled_back() {
    // 10% fast: uncorrected it would be a full second ahead after ten seconds
    let handle = spawn_pair(
        sim("video", 60_000).with_clock_rate(1.10),
        sim("replay", 90_000),
    );
    let mut rx = listen(&handle);

    handle.play();
    next_matching(&mut rx, |n| matches!(n, Notification::Phase { phase: Phase::Playing, .. })).await;

    for _ in 0..20 {
        advance(500).await;
        let video = member_position(&handle, "video");
        let replay = member_position(&handle, "replay");
        assert!(
            video.abs_diff(replay) < 600,
            "video {} vs replay {}",
            video,
            replay
        );
    }
    assert!(member_position(&handle, "replay") >= 9_000);
    assert_eq!(handle.phase(), Phase::Playing);
    handle.release();
}

#[tokio::test(start_paused = true)]
async fn test_stalled_member_holds_the_others() {
    let handle = spawn_pair(
        sim("video", 60_000).with_stall(2_000, Duration::from_millis(3_000)),
        sim("replay", 90_000),
    );
    let mut rx = listen(&handle);

    handle.play();
    next_matching(&mut rx, |n| matches!(n, Notification::Phase { phase: Phase::Playing, .. })).await;
    next_matching(&mut rx, |n| matches!(n, Notification::Phase { phase: Phase::Buffering, .. })).await;

    let held_at = member_position(&handle, "replay");
    advance(2_000).await;
    assert_eq!(handle.phase(), Phase::Buffering);
    assert!(member_position(&handle, "replay") <= held_at + 200);

    next_matching(&mut rx, |n| matches!(n, Notification::Phase { phase: Phase::Playing, .. })).await;
    let resumed_at = member_position(&handle, "replay");
    advance(1_000).await;
    assert!(member_position(&handle, "replay") > resumed_at);
    assert!(member_position(&handle, "video") > 2_000);
    handle.release();
}

#[tokio::test(start_paused = true)]
async fn test_seek_past_shorter_member_keeps_cluster_playing() {
    let handle = spawn_pair(sim("video", 60_000), sim("replay", 90_000));
    let mut rx = listen(&handle);

    handle.play();
    next_matching(&mut rx, |n| matches!(n, Notification::Phase { phase: Phase::Playing, .. })).await;

    handle.seek_to(80_000);
    next_matching(&mut rx, |n| matches!(n, Notification::SeekTo { .. })).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, Phase::Playing);
    assert_eq!(snapshot.duration_ms, 90_000);
    assert_eq!(snapshot.error, None);
    assert_eq!(find(&snapshot, "video").unwrap().phase, Phase::End);
    assert_eq!(find(&snapshot, "video").unwrap().position_ms, 60_000);

    advance(2_000).await;
    assert_eq!(handle.phase(), Phase::Playing);
    assert!(member_position(&handle, "replay") > 81_000);
    handle.release();
}

#[tokio::test(start_paused = true)]
async fn test_member_failure_stops_siblings_and_reports() {
    let handle = spawn_pair(sim("video", 60_000).failing_at(1_000), sim("replay", 90_000));
    let mut rx = listen(&handle);

    handle.play();
    let error = next_matching(&mut rx, |n| matches!(n, Notification::Error { .. })).await;
    match error {
        Notification::Error { player, message } => {
            assert_eq!(player, "lesson");
            assert!(message.contains("simulated decoder failure"), "{}", message);
        }
        other => panic!("unexpected notification {:?}", other),
    }

    let snapshot = handle.wait_for(|s| s.phase == Phase::Idle).await;
    assert!(snapshot.error.is_some());
    assert_eq!(find(&snapshot, "replay").unwrap().phase, Phase::Ready);

    let stopped_at = member_position(&handle, "replay");
    advance(1_000).await;
    assert_eq!(member_position(&handle, "replay"), stopped_at);
    handle.release();
}

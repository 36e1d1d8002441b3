//! Offset and selection timelines driven by the runtime

mod helpers;

use helpers::*;
use syncplay_core::{Notification, Phase, PlayerBuilder, PlayerHandle, SelectionOptions};

fn spawn_offset(offset_ms: u64) -> PlayerHandle {
    let player = PlayerBuilder::new(sim("replay", 60_000))
        .name("replay")
        .offset(offset_ms)
        .build()
        .unwrap();
    PlayerHandle::spawn(player, &config())
}

fn spawn_selection() -> PlayerHandle {
    let options =
        SelectionOptions::from_pairs(&[(0, 5_000), (10_000, 20_000), (60_000, 100_000)]).unwrap();
    let player = PlayerBuilder::new(sim("recording", 120_000))
        .name("recording")
        .selection(options)
        .build()
        .unwrap();
    PlayerHandle::spawn(player, &config())
}

#[tokio::test(start_paused = true)]
async fn test_offset_pre_roll_runs_without_the_child() {
    let handle = spawn_offset(5_000);
    assert_eq!(handle.duration(), 65_000);

    handle.play();
    advance(2_000).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, Phase::Playing);
    assert!(
        (1_800..=2_000).contains(&snapshot.position_ms),
        "pre-roll at {}",
        snapshot.position_ms
    );
    let child = find(&snapshot, "replay").unwrap();
    assert_eq!(child.phase, Phase::Idle);
    assert_eq!(child.position_ms, 0);
    handle.release();
}

#[tokio::test(start_paused = true)]
async fn test_offset_hands_over_to_child_at_the_offset() {
    let handle = spawn_offset(5_000);
    let mut rx = listen(&handle);

    handle.play();
    let snapshot = handle.wait_for(|s| s.position_ms > 5_500).await;

    let child = find(&snapshot, "replay").unwrap();
    assert_eq!(child.phase, Phase::Playing);
    assert_eq!(child.position_ms + 5_000, snapshot.position_ms);

    let reported = positions(&drain(&mut rx));
    assert!(reported.contains(&5_000));
    assert!(reported.windows(2).all(|pair| pair[0] <= pair[1]));
    handle.release();
}

#[tokio::test(start_paused = true)]
async fn test_offset_seek_back_into_pre_roll_restarts_child_from_zero() {
    let handle = spawn_offset(2_000);
    let mut rx = listen(&handle);

    handle.play();
    handle.wait_for(|s| s.position_ms > 4_000).await;

    handle.seek_to(1_000);
    let ack = next_matching(&mut rx, |n| matches!(n, Notification::SeekTo { .. })).await;
    assert!(matches!(ack, Notification::SeekTo { position_ms: 1_000, .. }));

    advance(500).await;
    let snapshot = handle.snapshot();
    assert_eq!(find(&snapshot, "replay").unwrap().phase, Phase::Paused);
    assert!(snapshot.position_ms < 2_000);

    let snapshot = handle.wait_for(|s| s.position_ms > 2_500).await;
    let child = find(&snapshot, "replay").unwrap();
    assert_eq!(child.phase, Phase::Playing);
    assert!(child.position_ms < 1_000, "child resumed at {}", child.position_ms);
    handle.release();
}

#[tokio::test(start_paused = true)]
async fn test_selection_maps_seek_into_second_window() {
    let handle = spawn_selection();
    let mut rx = listen(&handle);
    assert_eq!(handle.duration(), 55_000);

    handle.seek_to(6_000);
    let ack = next_matching(&mut rx, |n| matches!(n, Notification::SeekTo { .. })).await;
    assert_eq!(
        ack,
        Notification::SeekTo {
            player: "recording/selection".to_string(),
            position_ms: 6_000
        }
    );
    assert_eq!(find(&handle.snapshot(), "recording").unwrap().position_ms, 11_000);
    handle.release();
}

#[tokio::test(start_paused = true)]
async fn test_selection_skips_the_gap_between_windows() {
    let handle = spawn_selection();
    let mut rx = listen(&handle);

    handle.seek_to(4_000);
    next_matching(&mut rx, |n| matches!(n, Notification::SeekTo { .. })).await;
    handle.play();

    let snapshot = handle.wait_for(|s| s.position_ms >= 6_000).await;
    let child = find(&snapshot, "recording").unwrap();
    assert_eq!(child.position_ms, snapshot.position_ms + 5_000);

    let reported = positions(&drain(&mut rx));
    assert!(reported.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(reported.iter().all(|p| *p <= 6_000 + 400));
    handle.release();
}

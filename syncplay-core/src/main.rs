//! syncplay-demo - drives a simulated player tree and prints its events
//!
//! Each scenario builds a tree over simulated engines, spawns it on the
//! runtime, and streams listener notifications to stdout as JSON lines.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use syncplay_common::human_time::format_position;
use syncplay_common::SyncConfig;
use syncplay_core::facade::{self, PlayerBuilder};
use syncplay_core::{
    ChannelListener, Engine, EngineFailure, Player, PlayerHandle, ScheduledClip, SelectionOptions,
    SimulatedEngine, SourceRef, Surface,
};
use tokio::time::{self, Duration};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Video and document replay locked together, with a stall and drift
    Cluster,
    /// Three windows of one long recording played back to back
    Selection,
    /// Document replay starting five seconds into the timeline
    Offset,
    /// Clips with a gap between them, one engine at a time
    Sequence,
}

/// Command-line arguments for syncplay-demo
#[derive(Parser, Debug)]
#[command(name = "syncplay-demo")]
#[command(about = "Synchronized playback demo over simulated engines")]
#[command(version)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long, env = "SYNCPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Player tree to run
    #[arg(short, long, value_enum, default_value = "cluster")]
    scenario: Scenario,

    /// Seek to this position (ms) two seconds in
    #[arg(long)]
    seek_ms: Option<u64>,

    /// Stop after this much wall time (ms)
    #[arg(long, default_value = "12000")]
    run_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "syncplay_core=debug,syncplay_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = SyncConfig::load(args.config.as_deref()).context("Failed to load config")?;
    info!(
        "Config: drift tolerance {}ms, tick {}ms, prefetch lead {}ms",
        config.drift_tolerance_ms, config.tick_interval_ms, config.prefetch_lead_ms
    );

    let tree = build_scenario(args.scenario, &config).context("Failed to build player tree")?;
    info!("Starting {:?} scenario ({} total)", args.scenario, format_position(tree.duration()));

    let handle = PlayerHandle::spawn(tree, &config);
    let (listener, mut notifications) = ChannelListener::new();
    handle.add_listener(Arc::new(listener));

    let printer = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match serde_json::to_string(&notification) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Failed to encode notification: {}", e),
            }
        }
    });

    handle.play();

    if let Some(seek_ms) = args.seek_ms {
        time::sleep(Duration::from_millis(2000)).await;
        info!("Seeking to {}", format_position(seek_ms));
        handle.seek_to(seek_ms);
    }

    let run = Duration::from_millis(args.run_ms);
    tokio::select! {
        snapshot = handle.wait_for(|s| s.phase == syncplay_core::Phase::End) => {
            info!("Playback finished at {}", format_position(snapshot.position_ms));
        }
        _ = time::sleep(run) => {
            info!("Run time elapsed at {}", format_position(handle.position()));
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    handle.release();
    handle.wait_released().await;
    printer.abort();

    let snapshot = handle.snapshot();
    if let Some(error) = snapshot.error {
        info!("Finished with engine error: {}", error);
    }
    info!("Shutdown complete");
    Ok(())
}

fn build_scenario(scenario: Scenario, config: &SyncConfig) -> Result<Player> {
    let report_interval = config.position_report_interval();

    let player = match scenario {
        Scenario::Cluster => {
            let video = SimulatedEngine::new("video", 60_000)
                .with_report_interval(report_interval)
                .with_load_delay(Duration::from_millis(400))
                .with_stall(3_000, Duration::from_millis(1_500));
            let replay = SimulatedEngine::new("replay", 90_000)
                .with_report_interval(report_interval)
                .with_load_delay(Duration::from_millis(900))
                .with_clock_rate(1.03);
            let video = PlayerBuilder::new(video)
                .name("video")
                .surface(Surface::new("main-view", ()))
                .build()?;
            let replay = PlayerBuilder::new(replay).name("replay").build()?;
            facade::combine([video, replay])?.with_name("lesson").into()
        }
        Scenario::Selection => {
            let recording = SimulatedEngine::new("recording", 120_000)
                .with_report_interval(report_interval);
            PlayerBuilder::new(recording)
                .name("recording")
                .selection(SelectionOptions::from_pairs(&[
                    (0, 5_000),
                    (10_000, 20_000),
                    (60_000, 100_000),
                ])?)
                .build()?
        }
        Scenario::Offset => {
            let replay = SimulatedEngine::new("replay", 60_000).with_report_interval(report_interval);
            PlayerBuilder::new(replay).name("replay").offset(5_000).build()?
        }
        Scenario::Sequence => {
            let clips = vec![
                ScheduledClip::new(0, 4_000, "intro.mp4")?,
                ScheduledClip::new(4_000, 8_000, "part-1.mp4")?,
                ScheduledClip::new(10_000, 14_000, "part-2.mp4")?,
            ];
            let factory = move |source: &SourceRef| -> std::result::Result<Box<dyn Engine>, EngineFailure> {
                Ok(Box::new(
                    SimulatedEngine::new(source.as_str(), 30_000)
                        .with_report_interval(report_interval)
                        .with_load_delay(Duration::from_millis(300)),
                ))
            };
            facade::sequence(clips, factory)?
                .with_name("playlist")
                .with_surface(Surface::new("main-view", ()))
                .into()
        }
    };
    Ok(player)
}

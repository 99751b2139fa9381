use clap::{Args, Parser, Subcommand};
use pullcord::config::{PullcordConfig, WorkerConfig};
use pullcord::error::{PullcordError, Result};
use pullcord::nav::NavigationController;
use pullcord::realtime::{spawn_navigator, Command, NavEvent};
use pullcord::replay::{
    load_plan, RecordedTrip, RecordingWriter, SimulationReport, TelemetryWriter,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "pullcord.toml";

#[derive(Parser)]
#[command(name = "pullcord")]
#[command(about = "Get-ready and pull-the-cord alerts for transit riders")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Replay a recorded trip through the navigator and compare the alerts
    Replay(ReplayArgs),
}

#[derive(Args)]
struct ReplayArgs {
    /// Recorded trip (CSV)
    recording: PathBuf,

    /// Multi-leg trip plan (JSON array of segments); defaults to the recording's single leg
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, env = "PULLCORD_CONFIG")]
    config: Option<PathBuf>,

    /// Write per-fix telemetry as JSON lines
    #[arg(long)]
    telemetry: Option<PathBuf>,

    /// Write a new recording with the flags from this run
    #[arg(long)]
    record: Option<PathBuf>,

    /// Replay at this multiple of recorded time; 0 replays as fast as possible
    #[arg(long, default_value = "0")]
    speed_up: f64,

    /// Leave "get ready" unacknowledged instead of confirming it automatically
    #[arg(long)]
    hold_confirmation: bool,

    /// Skip comparing against the recorded flags
    #[arg(long)]
    no_check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pullcord=info")),
        )
        .init();

    let cli = Cli::parse();
    let outcome = match cli.mode {
        Mode::Replay(args) => replay(args).await,
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PullcordConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            PullcordConfig::load(path)
        }
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            info!("Loading configuration from {}", DEFAULT_CONFIG_FILE);
            PullcordConfig::load(Path::new(DEFAULT_CONFIG_FILE))
        }
        None => {
            info!("Using default configuration");
            Ok(PullcordConfig::default())
        }
    }
}

async fn replay(args: ReplayArgs) -> Result<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    let trip = RecordedTrip::from_path(&args.recording)?;
    let segments = match &args.plan {
        Some(path) => load_plan(path)?,
        None => vec![trip.segment()?],
    };

    info!(
        "Replaying trip {} to stop {} ({} segment(s), {} fixes)",
        trip.header().trip_id,
        trip.header().destination_stop_id,
        segments.len(),
        trip.fixes().len()
    );

    let worker_config = WorkerConfig {
        auto_confirm: !args.hold_confirmation,
        telemetry: true,
        ..config.worker
    };
    let (handle, mut events) =
        spawn_navigator(NavigationController::new(config.proximity), worker_config);

    let listener = tokio::spawn(async move {
        let mut collected = Vec::new();
        while let Some(event) = events.recv().await {
            match &event {
                NavEvent::GetReady { segment } => info!("Get ready (segment {})", segment),
                NavEvent::StopReached {
                    segment,
                    trip_finished,
                } => {
                    if *trip_finished {
                        info!("Pull the cord (segment {}), trip finished", segment);
                    } else {
                        info!("Pull the cord (segment {})", segment);
                    }
                }
                NavEvent::Rejected { reason } => warn!("Rejected: {}", reason),
                NavEvent::Telemetry(_) => {}
            }
            collected.push(event);
        }
        collected
    });

    handle.send(Command::Start(segments)).await?;

    let intervals = trip.intervals_ms();
    for (sample, interval_ms) in trip.fixes().iter().zip(intervals) {
        if args.speed_up > 0.0 && interval_ms > 0 {
            let paced = (interval_ms as f64 / args.speed_up) as u64;
            tokio::time::sleep(Duration::from_millis(paced)).await;
        }
        handle.send(Command::Fix(sample.to_fix())).await?;
    }

    let snapshot = handle.finish().await?;
    let events = listener.await.map_err(|_| PullcordError::WorkerClosed)?;

    let mut telemetry = args
        .telemetry
        .as_deref()
        .map(TelemetryWriter::create)
        .transpose()?;

    let mut report = SimulationReport::default();
    let mut flags = vec![None; trip.fixes().len()];
    for event in events {
        if let NavEvent::Telemetry(record) = event {
            if let Some(writer) = telemetry.as_mut() {
                writer.write(&record)?;
            }
            if let Some(slot) = flags.get_mut(record.seq as usize) {
                *slot = Some((record.ready, record.finished));
            }
            report.observe(record);
        }
    }
    if let Some(writer) = telemetry {
        writer.finish()?;
    }

    if let Some(path) = &args.record {
        let mut recorder = RecordingWriter::create(path, trip.header(), &config.recording)?;
        // Fixes the worker filtered out keep the flags of the fix before them.
        let mut current = (false, false);
        for (sample, flag) in trip.fixes().iter().zip(&flags) {
            if let Some(flag) = flag {
                current = *flag;
            }
            recorder.record(sample, current.0, current.1)?;
        }
        info!(
            "Recorded {} fixes ({} outside {:.0}m)",
            recorder.written(),
            recorder.skipped(),
            config.recording.recording_radius_m
        );
        recorder.finish()?;
    }

    info!(
        "Replay done: get ready at {:?}, finished at {:?}, {} dropped, {} filtered",
        report.get_ready_at, report.finished_at, snapshot.dropped_fixes, snapshot.filtered_fixes
    );

    if args.no_check {
        return Ok(ExitCode::SUCCESS);
    }

    let mismatches = report.check(&trip.expectation());
    if mismatches.is_empty() {
        info!("Alerts match the recording");
        Ok(ExitCode::SUCCESS)
    } else {
        for mismatch in &mismatches {
            warn!("{}", mismatch);
        }
        Ok(ExitCode::FAILURE)
    }
}

//! Run one capture preparation pass against simulated equipment.

use anyhow::{bail, Context};
use capture_prep::astro::HorizontalCoord;
use capture_prep::sim::SimulatedEquipment;
use capture_prep::{
    CalibrationSettings, CapState, DeviceEvent, FlatFieldSource, FrameType, JobTargets, PrepareConfig,
    PrepareEvent, PrepareOrchestrator, PreparationState, SharedCommandSink,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FrameArg {
    Light,
    Flat,
    Dark,
    Bias,
}

impl From<FrameArg> for FrameType {
    fn from(arg: FrameArg) -> Self {
        match arg {
            FrameArg::Light => FrameType::Light,
            FrameArg::Flat => FrameType::Flat,
            FrameArg::Dark => FrameType::Dark,
            FrameArg::Bias => FrameType::Bias,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum SourceArg {
    Manual,
    DawnDusk,
    FlatCap,
    DarkCap,
    Wall,
}

impl From<SourceArg> for FlatFieldSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Manual => FlatFieldSource::Manual,
            SourceArg::DawnDusk => FlatFieldSource::DawnDusk,
            SourceArg::FlatCap => FlatFieldSource::FlatCap,
            SourceArg::DarkCap => FlatFieldSource::DarkCap,
            SourceArg::Wall => FlatFieldSource::Wall,
        }
    }
}

/// Prepare equipment for a capture using simulated devices
#[derive(Parser, Debug)]
#[command(author, version, about = "Capture preparation against simulated equipment")]
struct Args {
    /// Frame type to prepare
    #[arg(short, long, value_enum, default_value = "light")]
    frame: FrameArg,

    /// Flat field source for calibration frames
    #[arg(short, long, value_enum, default_value = "manual")]
    source: SourceArg,

    /// JSON config file, defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wait for the sensor to reach the target temperature
    #[arg(long)]
    enforce_temperature: bool,

    /// Target sensor temperature in °C
    #[arg(long, default_value_t = -10.0, allow_hyphen_values = true)]
    target_temperature: f64,

    /// Sensor temperature before cooling starts
    #[arg(long, default_value_t = 15.0, allow_hyphen_values = true)]
    start_temperature: f64,

    /// Target filter slot
    #[arg(long)]
    filter: Option<i32>,

    /// Target position angle in degrees
    #[arg(long, allow_hyphen_values = true)]
    position_angle: Option<f64>,

    /// Wait for guiding to settle before the first light frame
    #[arg(long)]
    enforce_guiding: bool,

    /// Guider drift reported by the simulated guider, in arc-seconds
    #[arg(long, default_value_t = 0.8)]
    guider_drift: f64,

    /// Preview exposure (no batch mode, no guiding wait)
    #[arg(long)]
    preview: bool,

    /// Equipment has a motorized dust cap, starting parked
    #[arg(long)]
    dust_cap: bool,

    /// Equipment has a light box
    #[arg(long)]
    light_box: bool,

    /// Equipment has a dome
    #[arg(long)]
    dome: bool,

    /// Camera has no mechanical shutter
    #[arg(long)]
    no_shutter: bool,

    /// Operator cancels cover and uncover requests
    #[arg(long)]
    operator_cancels: bool,

    /// Park the mount before calibration frames
    #[arg(long)]
    park_mount: bool,

    /// Park the dome before calibration frames
    #[arg(long)]
    park_dome: bool,

    /// Autofocus positions are available for flat sync focus
    #[arg(long)]
    autofocus_ready: bool,

    /// Wall azimuth in degrees
    #[arg(long, default_value_t = 180.0)]
    wall_azimuth: f64,

    /// Wall altitude in degrees
    #[arg(long, default_value_t = 10.0)]
    wall_altitude: f64,

    /// Device response delay in milliseconds
    #[arg(long, default_value_t = 200)]
    step_ms: u64,

    /// Give up after this many seconds
    #[arg(short, long, default_value_t = 30.0)]
    timeout: f64,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn timeout_duration(secs: f64) -> anyhow::Result<Duration> {
    if secs <= 0.0 {
        bail!("--timeout must be positive, got {}", secs);
    }
    Duration::try_from_secs_f64(secs).with_context(|| format!("invalid --timeout {}", secs))
}

fn build_equipment(args: &Args) -> SimulatedEquipment {
    let mut sim = SimulatedEquipment::new()
        .with_temperature(args.start_temperature)
        .with_shutter(!args.no_shutter)
        .with_operator_confirms(!args.operator_cancels)
        .with_step_delay(Duration::from_millis(args.step_ms));

    if let Some(filter) = args.filter {
        // Start on a different slot so the filter change is announced
        sim = sim.with_filter(filter + 1);
    }
    if args.dust_cap {
        sim = sim.with_dust_cap(CapState::Parked);
    }
    if args.light_box {
        sim = sim.with_light_box();
    }
    if args.dome {
        sim = sim.with_dome();
    }
    sim
}

/// Log queued progress notifications
fn drain_progress(progress: &mut broadcast::Receiver<PrepareEvent>) {
    loop {
        match progress.try_recv() {
            Ok(PrepareEvent::StageChanged(stage)) => tracing::info!(?stage, "Stage changed"),
            Ok(PrepareEvent::NewLog(_)) | Ok(PrepareEvent::PrepareComplete) => {}
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                tracing::warn!("Missed {} progress notifications", n)
            }
            Err(_) => return,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = match &args.config {
        Some(path) => PrepareConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PrepareConfig::default(),
    };
    config.validate().context("invalid config")?;
    let timeout = timeout_duration(args.timeout)?;

    let frame: FrameType = args.frame.into();
    let sim = build_equipment(&args);
    let ctx = sim.capture_context().shared();

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let sink: SharedCommandSink = Arc::new(command_tx);

    let targets = JobTargets {
        filter_id: args.filter,
        position_angle: args.position_angle,
        temperature: args.target_temperature,
        ..JobTargets::default()
    };
    let calibration = CalibrationSettings {
        flat_field_source: args.source.into(),
        pre_mount_park: args.park_mount,
        pre_dome_park: args.park_dome,
        wall_position: Some(HorizontalCoord {
            azimuth_deg: args.wall_azimuth,
            altitude_deg: args.wall_altitude,
        }),
        autofocus_ready: args.autofocus_ready,
    };

    let mut orchestrator = PrepareOrchestrator::new(ctx, config, sink)
        .with_targets(targets)
        .with_calibration(calibration);
    let mut progress = orchestrator.subscribe();

    tokio::spawn(sim.run(command_rx, event_tx.clone()));

    if args.enforce_guiding && frame == FrameType::Light {
        let drift = args.guider_drift;
        let delay = Duration::from_millis(args.step_ms * 5);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = event_tx.send(DeviceEvent::GuiderDrift(drift));
        });
    }

    orchestrator.prepare(frame, args.enforce_temperature, args.enforce_guiding, args.preview);

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        drain_progress(&mut progress);

        match orchestrator.preparation_state() {
            PreparationState::Completed => {
                tracing::info!(?frame, "Equipment ready for capture");
                return Ok(());
            }
            PreparationState::Aborted => bail!("Capture preparation aborted"),
            PreparationState::None | PreparationState::Busy => {}
        }

        tokio::select! {
            event = event_rx.recv() => match event {
                Some(event) => orchestrator.handle_event(event),
                None => bail!("Simulated equipment stopped"),
            },
            _ = &mut deadline => {
                bail!("Timed out after {}s waiting for equipment", args.timeout);
            }
        }
    }
}

//! Capture preparation
//!
//! Before a camera exposure of a given frame type can start, temperature,
//! rotator, guiding and the calibration equipment (flat light sources, dust
//! cap, mount and dome parking, focus, shutter) have to be brought into a
//! ready state. [`PrepareOrchestrator`] does this without ever blocking: it
//! pushes [`PrepareCommand`]s to a [`CommandSink`] and re-evaluates
//! readiness whenever a [`DeviceEvent`] comes back.

pub mod actions;
pub mod astro;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod job;
pub mod orchestrator;
pub mod policy;
pub mod sim;
pub mod state;

pub use actions::{ActionKind, ActionReadinessTable};
pub use commands::{
    CommandSink, NullCommandSink, PrepareCommand, PrepareEvent, PrepareStage, RecordingSink,
    SharedCommandSink,
};
pub use config::PrepareConfig;
pub use context::{
    CapState, CaptureContext, DomeStatus, LightState, MountStatus, ParkStatus,
    SharedCaptureContext, ShutterStatus,
};
pub use error::{PrepareError, PrepareResult};
pub use events::{DeviceEvent, MotionState};
pub use job::{CalibrationSettings, FlatFieldSource, FrameType, JobTargets};
pub use orchestrator::checks::CheckResult;
pub use orchestrator::{PrepareOrchestrator, FLAT_SYNC_RETRY_INTERVAL};
pub use state::{CoverQueryState, FlatSyncStatus, JobStatus, PreparationState, WallPositionStatus};

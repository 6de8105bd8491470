//! Inbound device and operator events

use crate::context::{CapState, DomeStatus, MountStatus, ParkStatus};
use serde::{Deserialize, Serialize};

/// Motion state reported alongside a rotator angle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionState {
    #[default]
    Idle,
    Ok,
    Busy,
    Alert,
}

/// Everything the capture layer reports back to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceEvent {
    FilterChanged(i32),
    Temperature(f64),
    RotatorAngle { raw_angle: f64, motion: MotionState },
    GuiderDrift(f64),
    ManualCoverResult { closed: bool, success: bool },
    LightBox { on: bool },
    DustCap(CapState),
    MountStatus(MountStatus),
    MountParkStatus(ParkStatus),
    DomeStatus(DomeStatus),
    FlatSyncFocus { completed: bool },
    ShutterPresence(bool),
}

//! Scalar state of a preparation job

use serde::{Deserialize, Serialize};

/// Progress of the current preparation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreparationState {
    #[default]
    None,
    Busy,
    Completed,
    /// Abort was emitted, the pass is inert until the next `prepare_*`
    Aborted,
}

/// Coarse job status as seen by the capture layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Idle,
    Busy,
}

/// Manual cover/uncover handshake with the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoverQueryState {
    #[default]
    Task,
    AwaitingConfirmation,
}

/// Progress of pointing the mount at the flat-field wall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WallPositionStatus {
    #[default]
    None,
    Slewing,
    SlewCompleted,
    TrackingBusy,
    TrackingOff,
}

/// Focus synchronization to the target filter before flats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlatSyncStatus {
    #[default]
    Idle,
    Busy,
    Completed,
}

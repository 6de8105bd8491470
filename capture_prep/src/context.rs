//! Capture session context shared between the capture layer and the
//! preparation orchestrator.
//!
//! The capture session owns the context and outlives individual preparation
//! passes. Mutation contract:
//! - capability flags (`has_*`), `observer` and `current_filter_id` are set by
//!   the caller before a pass
//! - the subsystem status fields are written by the orchestrator, both when it
//!   issues a command (optimistic transitional state) and when the matching
//!   device event arrives
//! - `telescope_covered` only changes through a manual operator confirmation

use crate::actions::{ActionKind, ActionMap};
use crate::astro::GeoLocation;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Whether the camera has a mechanical shutter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShutterStatus {
    #[default]
    Unknown,
    /// Query outstanding
    Busy,
    Yes,
    No,
}

/// Dust cap state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CapState {
    /// Unparked (open)
    #[default]
    Idle,
    Parked,
    Parking,
    Unparking,
    Error,
}

/// Light box (flat panel) light state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LightState {
    #[default]
    Off,
    On,
    Busy,
}

/// Mount or dome park state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParkStatus {
    #[default]
    Unknown,
    Unparked,
    Parking,
    Unparking,
    Parked,
    Error,
}

/// Mount motion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MountStatus {
    #[default]
    Idle,
    Moving,
    Slewing,
    Tracking,
    Parking,
    Parked,
    Error,
}

/// Dome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DomeStatus {
    #[default]
    Idle,
    Moving,
    Tracking,
    Parking,
    Unparking,
    Parked,
    Error,
}

/// Session state read and written by the preparation checks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureContext {
    pub has_telescope: bool,
    pub has_dome: bool,
    pub has_dust_cap: bool,
    pub has_light_box: bool,
    pub observer: Option<GeoLocation>,

    pub current_filter_id: Option<i32>,
    pub shutter_status: ShutterStatus,
    pub dust_cap_state: CapState,
    pub light_box_state: LightState,
    pub scope_state: MountStatus,
    pub scope_park_state: ParkStatus,
    pub dome_state: DomeStatus,
    /// Set exclusively by manual cover/uncover confirmation
    pub telescope_covered: bool,

    /// Whether a real observation has arrived for each action since the pass started
    pub initialized: ActionMap<bool>,
}

impl CaptureContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self, kind: ActionKind) -> bool {
        self.initialized[kind]
    }

    pub fn set_initialized(&mut self, kind: ActionKind, initialized: bool) {
        self.initialized[kind] = initialized;
    }

    /// Wrap into a shared handle
    pub fn shared(self) -> SharedCaptureContext {
        SharedCaptureContext::new(self)
    }
}

/// Shared handle to the session context
#[derive(Debug, Clone, Default)]
pub struct SharedCaptureContext(Arc<RwLock<CaptureContext>>);

impl SharedCaptureContext {
    pub fn new(context: CaptureContext) -> Self {
        Self(Arc::new(RwLock::new(context)))
    }

    /// The context holds plain data, so a poisoned lock is still consistent
    pub fn read(&self) -> RwLockReadGuard<'_, CaptureContext> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, CaptureContext> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current context
    pub fn snapshot(&self) -> CaptureContext {
        self.read().clone()
    }
}

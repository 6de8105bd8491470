//! Outbound commands and notifications
//!
//! The orchestrator never talks to devices itself. Every request it makes is
//! pushed to a [`CommandSink`] as a fire-and-forget [`PrepareCommand`]; the
//! embedding capture layer executes it and reports the outcome back through
//! the orchestrator's event setters.

use crate::astro::EquatorialCoord;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Preparation phase reported to the capture layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepareStage {
    ChangingFilter,
    SettingTemperature,
    SettingRotator,
}

/// Command issued towards the equipment or the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrepareCommand {
    /// Batch mode is off for previews
    SetCaptureBatchMode(bool),
    /// Report the current value for a stage before a target is commanded
    ReadCurrentState(PrepareStage),
    SetTemperature(f64),
    SetRotatorAngle(f64),
    /// `true` parks (closes) the cap, `false` unparks it
    ParkDustCap(bool),
    SetLightBoxLight(bool),
    SlewTo(EquatorialCoord),
    SetTracking(bool),
    SetScopeParked(bool),
    SetDomeParked(bool),
    FlatSyncFocus(i32),
    QueryHasShutter,
    RequestManualCover { message: String, label: String },
    RequestManualUncover,
    AbortCapture,
}

/// Progress notification published on the orchestrator's event channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrepareEvent {
    StageChanged(PrepareStage),
    PrepareComplete,
    NewLog(String),
}

/// Receiver of outbound commands
///
/// `send` must not block: the orchestrator calls it from inside event
/// handling and expects to return immediately.
pub trait CommandSink: Send + Sync {
    fn send(&self, command: PrepareCommand);
}

/// Shared command sink handle
pub type SharedCommandSink = Arc<dyn CommandSink>;

impl CommandSink for mpsc::UnboundedSender<PrepareCommand> {
    fn send(&self, command: PrepareCommand) {
        if let Err(e) = mpsc::UnboundedSender::send(self, command) {
            tracing::warn!("Command receiver dropped, discarding {:?}", e.0);
        }
    }
}

/// Sink that only logs, for running without equipment
pub struct NullCommandSink;

impl CommandSink for NullCommandSink {
    fn send(&self, command: PrepareCommand) {
        tracing::info!("[NULL] {:?}", command);
    }
}

/// Sink that keeps every command, for inspecting what a pass requested
#[derive(Default)]
pub struct RecordingSink {
    commands: Mutex<Vec<PrepareCommand>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commands(&self) -> Vec<PrepareCommand> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain the recorded commands
    pub fn take(&self) -> Vec<PrepareCommand> {
        std::mem::take(&mut *self.commands.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn count(&self, predicate: impl Fn(&PrepareCommand) -> bool) -> usize {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| predicate(c))
            .count()
    }
}

impl CommandSink for RecordingSink {
    fn send(&self, command: PrepareCommand) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }
}

//! Capture preparation orchestrator
//!
//! Before an exposure may start, every subsystem relevant to its frame type
//! has to report ready. Subsystems answer asynchronously, so the orchestrator
//! never waits: `prepare_*` issues the initial requests and runs the
//! dispatcher once, then every inbound event updates state and runs the
//! dispatcher again. The dispatcher emits [`PrepareEvent::PrepareComplete`]
//! exactly once per pass, or an abort on the first unrecoverable failure.

pub mod checks;

use crate::actions::{ActionKind, ActionReadinessTable};
use crate::astro::normalize_angle_diff;
use crate::commands::{PrepareCommand, PrepareEvent, PrepareStage, SharedCommandSink};
use crate::config::PrepareConfig;
use crate::context::{CapState, DomeStatus, LightState, MountStatus, ParkStatus, SharedCaptureContext, ShutterStatus};
use crate::events::{DeviceEvent, MotionState};
use crate::job::{CalibrationSettings, FrameType, JobTargets};
use crate::policy;
use crate::state::{CoverQueryState, FlatSyncStatus, JobStatus, PreparationState, WallPositionStatus};
use checks::CheckResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Delay before a busy flat sync focus request is repeated
pub const FLAT_SYNC_RETRY_INTERVAL: Duration = Duration::from_secs(1);

const EVENT_BUFFER_SIZE: usize = 256;

/// Drives the equipment into a ready state for one capture job
pub struct PrepareOrchestrator {
    ctx: SharedCaptureContext,
    config: PrepareConfig,
    sink: SharedCommandSink,
    event_tx: broadcast::Sender<PrepareEvent>,

    targets: JobTargets,
    calibration: CalibrationSettings,
    frame_type: FrameType,

    status: JobStatus,
    preparation_state: PreparationState,
    pass_id: Option<Uuid>,
    enforce_temperature: bool,
    enforce_initial_guiding: bool,
    is_preview: bool,
    actions: ActionReadinessTable,

    cover_query: CoverQueryState,
    wall_status: WallPositionStatus,
    flat_sync: FlatSyncStatus,
    flat_sync_retry: Option<JoinHandle<()>>,
}

impl PrepareOrchestrator {
    pub fn new(ctx: SharedCaptureContext, config: PrepareConfig, sink: SharedCommandSink) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);

        Self {
            ctx,
            config,
            sink,
            event_tx,
            targets: JobTargets::default(),
            calibration: CalibrationSettings::default(),
            frame_type: FrameType::default(),
            status: JobStatus::Idle,
            preparation_state: PreparationState::None,
            pass_id: None,
            enforce_temperature: false,
            enforce_initial_guiding: false,
            is_preview: false,
            actions: ActionReadinessTable::default(),
            cover_query: CoverQueryState::Task,
            wall_status: WallPositionStatus::None,
            flat_sync: FlatSyncStatus::Idle,
            flat_sync_retry: None,
        }
    }

    pub fn with_targets(mut self, targets: JobTargets) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_calibration(mut self, calibration: CalibrationSettings) -> Self {
        self.calibration = calibration;
        self
    }

    /// Subscribe to progress notifications
    pub fn subscribe(&self) -> broadcast::Receiver<PrepareEvent> {
        self.event_tx.subscribe()
    }

    pub fn context(&self) -> &SharedCaptureContext {
        &self.ctx
    }

    pub fn config(&self) -> &PrepareConfig {
        &self.config
    }

    pub fn targets(&self) -> &JobTargets {
        &self.targets
    }

    /// Targets must not change while a pass is running
    pub fn set_targets(&mut self, targets: JobTargets) {
        self.targets = targets;
    }

    pub fn calibration(&self) -> &CalibrationSettings {
        &self.calibration
    }

    pub fn set_calibration(&mut self, calibration: CalibrationSettings) {
        self.calibration = calibration;
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Select the frame type and forget the previous pass
    pub fn set_frame_type(&mut self, frame_type: FrameType) {
        self.clear_pass_substate();
        self.frame_type = frame_type;
        self.status = JobStatus::Idle;
        self.preparation_state = PreparationState::None;
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// The capture layer marks the job idle once the prepared exposure is done
    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }

    pub fn preparation_state(&self) -> PreparationState {
        self.preparation_state
    }

    pub fn is_preview(&self) -> bool {
        self.is_preview
    }

    pub fn cover_query_state(&self) -> CoverQueryState {
        self.cover_query
    }

    pub fn wall_position_status(&self) -> WallPositionStatus {
        self.wall_status
    }

    pub fn flat_sync_status(&self) -> FlatSyncStatus {
        self.flat_sync
    }

    pub fn is_action_ready(&self, kind: ActionKind) -> bool {
        self.actions.is_ready(kind)
    }

    // =========================================================================
    // PREPARATION ENTRY POINTS
    // =========================================================================

    /// Prepare for the given frame type. `enforce_guiding_drift` only applies to light frames.
    pub fn prepare(
        &mut self,
        frame_type: FrameType,
        enforce_temperature: bool,
        enforce_guiding_drift: bool,
        is_preview: bool,
    ) {
        match frame_type {
            FrameType::Light => self.prepare_light(enforce_temperature, enforce_guiding_drift, is_preview),
            FrameType::Flat => self.prepare_flat(enforce_temperature, is_preview),
            FrameType::Dark => self.prepare_dark(enforce_temperature, is_preview),
            FrameType::Bias => self.prepare_bias(enforce_temperature, is_preview),
        }
    }

    pub fn prepare_light(&mut self, enforce_temperature: bool, enforce_guiding_drift: bool, is_preview: bool) {
        if self.already_preparing(FrameType::Light, enforce_temperature)
            && enforce_guiding_drift == self.enforce_initial_guiding
        {
            return;
        }

        self.begin_pass(FrameType::Light, enforce_temperature, is_preview);
        self.prepare_rotator_check();

        self.enforce_initial_guiding = enforce_guiding_drift;
        if enforce_guiding_drift && !is_preview {
            self.actions.set_ready(ActionKind::GuiderDrift, false);
        }

        self.preparation_state = PreparationState::Busy;
        self.check_all_actions_ready();
    }

    pub fn prepare_flat(&mut self, enforce_temperature: bool, is_preview: bool) {
        self.prepare_calibration(FrameType::Flat, enforce_temperature, is_preview);
    }

    pub fn prepare_dark(&mut self, enforce_temperature: bool, is_preview: bool) {
        self.prepare_calibration(FrameType::Dark, enforce_temperature, is_preview);
    }

    /// Bias frames are prepared exactly like darks
    pub fn prepare_bias(&mut self, enforce_temperature: bool, is_preview: bool) {
        self.prepare_calibration(FrameType::Bias, enforce_temperature, is_preview);
    }

    fn prepare_calibration(&mut self, frame_type: FrameType, enforce_temperature: bool, is_preview: bool) {
        if self.already_preparing(frame_type, enforce_temperature) {
            return;
        }

        self.begin_pass(frame_type, enforce_temperature, is_preview);
        self.preparation_state = PreparationState::Busy;
        self.check_all_actions_ready();
    }

    fn already_preparing(&self, frame_type: FrameType, enforce_temperature: bool) -> bool {
        self.status == JobStatus::Busy
            && self.frame_type == frame_type
            && self.enforce_temperature == enforce_temperature
    }

    /// Common start of every pass: reset the action table and issue the
    /// capture mode, filter and temperature requests.
    fn begin_pass(&mut self, frame_type: FrameType, enforce_temperature: bool, is_preview: bool) {
        self.clear_pass_substate();

        let pass_id = Uuid::new_v4();
        tracing::info!(%pass_id, ?frame_type, enforce_temperature, is_preview, "Preparing capture");

        self.pass_id = Some(pass_id);
        self.frame_type = frame_type;
        self.status = JobStatus::Busy;
        self.is_preview = is_preview;

        self.actions.reset();
        let current_filter = {
            let mut ctx = self.ctx.write();
            ctx.initialized.fill(false);
            ctx.current_filter_id
        };

        self.send(PrepareCommand::SetCaptureBatchMode(!is_preview));

        // The filter is changed by the capture step itself, only announce it here
        self.actions.set_ready(ActionKind::Filter, true);
        if let Some(target) = self.targets.filter_id {
            if current_filter != Some(target) {
                self.stage(PrepareStage::ChangingFilter);
            }
        }

        self.prepare_temperature_check(enforce_temperature);
    }

    fn prepare_temperature_check(&mut self, enforce_temperature: bool) {
        self.enforce_temperature = enforce_temperature;
        if !enforce_temperature {
            return;
        }

        self.actions.set_ready(ActionKind::Temperature, false);
        if self.ctx.read().is_initialized(ActionKind::Temperature) {
            // The first reading after a set command echoes the target, whatever the sensor does
            self.actions.ignore_next(ActionKind::Temperature);
            self.send(PrepareCommand::SetTemperature(self.targets.temperature));
            self.stage(PrepareStage::SettingTemperature);
        } else {
            self.send(PrepareCommand::ReadCurrentState(PrepareStage::SettingTemperature));
        }
    }

    fn prepare_rotator_check(&mut self) {
        let Some(position_angle) = self.targets.position_angle else {
            return;
        };

        self.actions.set_ready(ActionKind::Rotator, false);
        if self.ctx.read().is_initialized(ActionKind::Rotator) {
            let raw_angle = self.config.raw_rotator_angle(position_angle);
            self.stage(PrepareStage::SettingRotator);
            self.send(PrepareCommand::SetRotatorAngle(raw_angle));
        } else {
            self.send(PrepareCommand::ReadCurrentState(PrepareStage::SettingRotator));
        }
    }

    // =========================================================================
    // DISPATCHER
    // =========================================================================

    /// True iff every action in the table is ready
    pub fn are_actions_ready(&self) -> bool {
        self.actions.all_ready()
    }

    /// Re-evaluate readiness; safe to call any number of times
    pub fn check_all_actions_ready(&mut self) {
        if self.preparation_state != PreparationState::Busy {
            return;
        }

        let actions_ready = policy::relevant_actions(self.frame_type)
            .iter()
            .all(|&kind| self.actions.is_ready(kind));
        if !actions_ready {
            tracing::debug!(pending = ?self.actions.pending(), "Waiting for actions");
            return;
        }

        for &step in policy::steps(self.frame_type, self.calibration.flat_field_source) {
            match self.run_step(step) {
                CheckResult::Ready => continue,
                CheckResult::Pending => {
                    tracing::debug!(?step, "Preparation step pending");
                    return;
                }
                CheckResult::Failed(reason) => {
                    self.abort_pass(&reason);
                    return;
                }
            }
        }

        self.complete_pass();
    }

    fn complete_pass(&mut self) {
        if self.preparation_state != PreparationState::Busy {
            return;
        }
        self.preparation_state = PreparationState::Completed;
        self.cancel_flat_sync_retry();
        tracing::info!(pass_id = ?self.pass_id, frame_type = ?self.frame_type, "Capture preparation complete");
        self.publish(PrepareEvent::PrepareComplete);
    }

    /// Emit abort-capture and make the current pass inert
    fn abort_pass(&mut self, reason: &str) {
        tracing::warn!(pass_id = ?self.pass_id, "Aborting capture preparation: {}", reason);
        self.log(reason);
        self.clear_pass_substate();
        self.send(PrepareCommand::AbortCapture);

        if self.preparation_state == PreparationState::Busy {
            self.preparation_state = PreparationState::Aborted;
        }
        self.status = JobStatus::Idle;
    }

    // =========================================================================
    // EVENT INTAKE
    // =========================================================================

    pub fn handle_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::FilterChanged(id) => self.set_current_filter_id(id),
            DeviceEvent::Temperature(value) => self.set_current_ccd_temperature(value),
            DeviceEvent::RotatorAngle { raw_angle, motion } => {
                self.set_current_rotator_position_angle(raw_angle, motion)
            }
            DeviceEvent::GuiderDrift(value) => self.set_current_guider_drift(value),
            DeviceEvent::ManualCoverResult { closed, success } => self.manual_scope_light_cover(closed, success),
            DeviceEvent::LightBox { on } => self.light_box_light(on),
            DeviceEvent::DustCap(state) => self.dust_cap_state_changed(state),
            DeviceEvent::MountStatus(status) => self.scope_status_changed(status),
            DeviceEvent::MountParkStatus(status) => self.scope_park_status_changed(status),
            DeviceEvent::DomeStatus(status) => self.dome_status_changed(status),
            DeviceEvent::FlatSyncFocus { completed } => self.flat_sync_focus_changed(completed),
            DeviceEvent::ShutterPresence(present) => self.has_shutter(present),
        }
    }

    pub fn set_current_filter_id(&mut self, filter_id: i32) {
        {
            let mut ctx = self.ctx.write();
            ctx.current_filter_id = Some(filter_id);
            ctx.set_initialized(ActionKind::Filter, true);
        }

        if self.targets.filter_id == Some(filter_id) {
            self.actions.set_ready(ActionKind::Filter, true);
        }

        self.check_all_actions_ready();
    }

    pub fn set_current_ccd_temperature(&mut self, temperature: f64) {
        if self.actions.take_ignore(ActionKind::Temperature) {
            tracing::debug!(temperature, "Ignoring temperature echo after set command");
            return;
        }

        let in_range = !self.enforce_temperature
            || (self.targets.temperature - temperature).abs() <= self.config.max_temperature_diff;

        let was_initialized = {
            let mut ctx = self.ctx.write();
            let initialized = ctx.is_initialized(ActionKind::Temperature);
            ctx.set_initialized(ActionKind::Temperature, true);
            initialized
        };

        if in_range {
            self.actions.set_ready(ActionKind::Temperature, true);
        } else if !was_initialized && self.preparation_state == PreparationState::Busy {
            // Baseline known now, command the target
            self.prepare_temperature_check(self.enforce_temperature);
        }

        self.check_all_actions_ready();
    }

    /// `raw_angle` is the rotator's own angle, converted to a position angle for comparison
    pub fn set_current_rotator_position_angle(&mut self, raw_angle: f64, motion: MotionState) {
        let position_angle = self.config.position_angle(raw_angle);

        let was_initialized = {
            let mut ctx = self.ctx.write();
            let initialized = ctx.is_initialized(ActionKind::Rotator);
            ctx.set_initialized(ActionKind::Rotator, true);
            initialized
        };

        let Some(target) = self.targets.position_angle else {
            self.check_all_actions_ready();
            return;
        };

        let diff_arcmin = normalize_angle_diff(position_angle - target).abs() * 60.0;
        let in_position = diff_arcmin <= self.config.rotator_threshold_arcmin && motion != MotionState::Busy;

        if in_position {
            self.actions.set_ready(ActionKind::Rotator, true);
        } else if !was_initialized
            && self.preparation_state == PreparationState::Busy
            && self.frame_type == FrameType::Light
        {
            self.prepare_rotator_check();
        }

        self.check_all_actions_ready();
    }

    pub fn set_current_guider_drift(&mut self, drift: f64) {
        self.ctx.write().set_initialized(ActionKind::GuiderDrift, true);
        if drift <= self.targets.guider_drift {
            self.actions.set_ready(ActionKind::GuiderDrift, true);
        }
        self.check_all_actions_ready();
    }

    pub fn set_enforce_initial_guiding_drift(&mut self, enforce: bool) {
        self.enforce_initial_guiding = enforce;
        self.actions
            .set_ready(ActionKind::GuiderDrift, !enforce || self.is_preview);
        self.check_all_actions_ready();
    }

    /// Operator answer to a cover or uncover request
    pub fn manual_scope_light_cover(&mut self, closed: bool, success: bool) {
        self.cover_query = CoverQueryState::Task;

        if success {
            self.ctx.write().telescope_covered = closed;
            self.log(if closed { "Telescope covered." } else { "Telescope uncovered." });
            self.check_all_actions_ready();
        } else {
            self.ctx.write().shutter_status = ShutterStatus::Unknown;
            self.abort_pass("Manual scope cover confirmation cancelled, aborting...");
        }
    }

    pub fn light_box_light(&mut self, on: bool) {
        self.ctx.write().light_box_state = if on { LightState::On } else { LightState::Off };
        self.log(if on { "Light box on." } else { "Light box off." });
        self.check_all_actions_ready();
    }

    pub fn dust_cap_state_changed(&mut self, state: CapState) {
        self.ctx.write().dust_cap_state = state;

        match state {
            CapState::Error => {
                self.abort_pass("Dust cap error, aborting...");
                return;
            }
            CapState::Parked => self.log("Dust cap parked."),
            CapState::Idle => self.log("Dust cap unparked."),
            CapState::Parking | CapState::Unparking => {}
        }

        self.check_all_actions_ready();
    }

    pub fn scope_status_changed(&mut self, status: MountStatus) {
        let next = match (self.wall_status, status) {
            (WallPositionStatus::Slewing, MountStatus::Tracking) => Some(WallPositionStatus::SlewCompleted),
            (WallPositionStatus::TrackingBusy, MountStatus::Idle) => Some(WallPositionStatus::TrackingOff),
            _ => None,
        };
        if let Some(next) = next {
            tracing::debug!(from = ?self.wall_status, to = ?next, "Wall position progress");
            self.wall_status = next;
            if next == WallPositionStatus::TrackingOff {
                self.log("Wall position reached, tracking stopped.");
            }
        }

        self.ctx.write().scope_state = status;
        self.check_all_actions_ready();
    }

    pub fn scope_park_status_changed(&mut self, status: ParkStatus) {
        self.ctx.write().scope_park_state = status;
        self.check_all_actions_ready();
    }

    pub fn dome_status_changed(&mut self, status: DomeStatus) {
        self.ctx.write().dome_state = status;
        self.check_all_actions_ready();
    }

    pub fn flat_sync_focus_changed(&mut self, completed: bool) {
        if self.flat_sync == FlatSyncStatus::Busy {
            if completed {
                self.flat_sync = FlatSyncStatus::Completed;
                self.cancel_flat_sync_retry();
            }
        } else {
            tracing::debug!(completed, "Flat sync focus result without outstanding request");
        }
        self.check_all_actions_ready();
    }

    pub fn has_shutter(&mut self, present: bool) {
        self.ctx.write().shutter_status = if present { ShutterStatus::Yes } else { ShutterStatus::No };
        self.check_all_actions_ready();
    }

    // =========================================================================
    // OUTPUT
    // =========================================================================

    fn send(&self, command: PrepareCommand) {
        tracing::debug!(?command, "Prepare command");
        self.sink.send(command);
    }

    fn publish(&self, event: PrepareEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn stage(&self, stage: PrepareStage) {
        self.publish(PrepareEvent::StageChanged(stage));
    }

    fn log(&self, message: &str) {
        tracing::info!("{}", message);
        self.publish(PrepareEvent::NewLog(message.to_string()));
    }

    /// Send a command and log what it does
    fn issue(&self, command: PrepareCommand, message: &str) {
        self.send(command);
        self.log(message);
    }

    // =========================================================================
    // FLAT SYNC RETRY TIMER
    // =========================================================================

    fn schedule_flat_sync_retry(&mut self, filter_id: i32) {
        if self
            .flat_sync_retry
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime for the flat sync retry timer, repeating request now");
            self.send(PrepareCommand::FlatSyncFocus(filter_id));
            return;
        };

        let sink = Arc::clone(&self.sink);
        self.flat_sync_retry = Some(runtime.spawn(async move {
            tokio::time::sleep(FLAT_SYNC_RETRY_INTERVAL).await;
            tracing::debug!(filter_id, "Repeating flat sync focus request");
            sink.send(PrepareCommand::FlatSyncFocus(filter_id));
        }));
    }

    /// Drop half-finished operator and device requests so the next pass issues them again.
    /// A mount already parked at the wall with tracking off and a finished flat sync stay
    /// valid for the rest of the job.
    fn clear_pass_substate(&mut self) {
        self.cancel_flat_sync_retry();
        self.cover_query = CoverQueryState::Task;
        if self.wall_status != WallPositionStatus::TrackingOff {
            self.wall_status = WallPositionStatus::None;
        }
        if self.flat_sync == FlatSyncStatus::Busy {
            self.flat_sync = FlatSyncStatus::Idle;
        }
    }

    fn cancel_flat_sync_retry(&mut self) {
        if let Some(handle) = self.flat_sync_retry.take() {
            handle.abort();
        }
    }
}

impl Drop for PrepareOrchestrator {
    fn drop(&mut self) {
        self.cancel_flat_sync_retry();
    }
}

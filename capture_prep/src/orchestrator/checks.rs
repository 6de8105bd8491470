//! Per-subsystem readiness checks
//!
//! Each check inspects the shared context, issues at most one command when
//! the subsystem is not where it needs to be, and reports a tri-state result.
//! Commands set the subsystem's transitional state first, so re-running a
//! check before the device answers finds it busy instead of commanding again.

use super::PrepareOrchestrator;
use crate::astro::{wall_equatorial_position, EquatorialCoord};
use crate::commands::PrepareCommand;
use crate::context::{CapState, DomeStatus, LightState, ParkStatus, ShutterStatus};
use crate::error::{PrepareError, PrepareResult};
use crate::job::{FlatFieldSource, FrameType};
use crate::policy::PrepareStep;
use crate::state::{CoverQueryState, FlatSyncStatus, WallPositionStatus};

/// Outcome of a single readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    Ready,
    /// Waiting for the next event
    Pending,
    /// Unrecoverable for this pass, the reason is logged with the abort
    Failed(String),
}

impl PrepareOrchestrator {
    pub(super) fn run_step(&mut self, step: PrepareStep) -> CheckResult {
        match step {
            PrepareStep::ScopeCoverOpen => self.check_light_frame_scope_cover_open(),
            PrepareStep::ManualFlatCover => self.check_manual_flats_cover_ready(),
            PrepareStep::DawnDuskSky => {
                CheckResult::Failed("Dawn/dusk flats are not supported, aborting...".to_string())
            }
            PrepareStep::FlatCap => self.check_flat_cap_ready(),
            PrepareStep::DustCap => self.check_dust_cap_ready(self.frame_type),
            PrepareStep::WallPosition => self.check_wall_position_ready(self.frame_type),
            PrepareStep::PreMountPark => self.check_pre_mount_park_ready(),
            PrepareStep::PreDomePark => self.check_pre_dome_park_ready(),
            PrepareStep::FlatSyncFocus => self.check_flat_sync_focus(),
            PrepareStep::ShutterPresence => self.check_has_shutter(),
            PrepareStep::ManualDarkCover => self.check_manual_cover(),
        }
    }

    /// Ask the operator once per pending episode
    fn request_confirmation(&mut self, command: PrepareCommand) -> CheckResult {
        match self.cover_query {
            CoverQueryState::AwaitingConfirmation => CheckResult::Pending,
            CoverQueryState::Task => {
                self.cover_query = CoverQueryState::AwaitingConfirmation;
                self.send(command);
                CheckResult::Pending
            }
        }
    }

    fn check_manual_flats_cover_ready(&mut self) -> CheckResult {
        if self.ctx.read().telescope_covered {
            return CheckResult::Ready;
        }
        self.request_confirmation(PrepareCommand::RequestManualCover {
            message: "Cover telescope with an evenly illuminated light source.".to_string(),
            label: "Flat Frame".to_string(),
        })
    }

    fn check_flat_cap_ready(&mut self) -> CheckResult {
        let mut ctx = self.ctx.write();

        match (ctx.light_box_state, ctx.dust_cap_state) {
            (LightState::On, _) => return CheckResult::Ready,
            (LightState::Busy, _) | (_, CapState::Parking) => return CheckResult::Pending,
            (_, CapState::Error) => {
                return CheckResult::Failed("Dust cap reported an error, aborting...".to_string())
            }
            (LightState::Off, CapState::Idle | CapState::Parked | CapState::Unparking) => {}
        }

        if ctx.has_dust_cap && ctx.dust_cap_state != CapState::Parked {
            ctx.dust_cap_state = CapState::Parking;
            drop(ctx);
            self.issue(PrepareCommand::ParkDustCap(true), "Parking dust cap...");
            return CheckResult::Pending;
        }

        if ctx.has_light_box {
            ctx.light_box_state = LightState::Busy;
            drop(ctx);
            self.issue(PrepareCommand::SetLightBoxLight(true), "Turn light box light on...");
            return CheckResult::Pending;
        }

        CheckResult::Ready
    }

    /// Cap closed and light off for darks, cap open and light on for flats
    fn check_dust_cap_ready(&mut self, frame_type: FrameType) -> CheckResult {
        let flats = frame_type == FrameType::Flat;
        let mut ctx = self.ctx.write();

        match (ctx.light_box_state, ctx.dust_cap_state) {
            (LightState::Busy, _) | (_, CapState::Parking | CapState::Unparking) => {
                return CheckResult::Pending
            }
            (_, CapState::Error) => {
                return CheckResult::Failed("Dust cap reported an error, aborting...".to_string())
            }
            (LightState::On | LightState::Off, CapState::Idle | CapState::Parked) => {}
        }

        let target_cap = if flats { CapState::Idle } else { CapState::Parked };
        if ctx.has_dust_cap && ctx.dust_cap_state != target_cap {
            ctx.dust_cap_state = if flats { CapState::Unparking } else { CapState::Parking };
            drop(ctx);
            if flats {
                self.issue(PrepareCommand::ParkDustCap(false), "Unparking dust cap...");
            } else {
                self.issue(PrepareCommand::ParkDustCap(true), "Parking dust cap...");
            }
            return CheckResult::Pending;
        }

        drop(ctx);
        self.drive_light_box(flats)
    }

    /// Switch the light box, if any, to the wanted state
    fn drive_light_box(&mut self, on: bool) -> CheckResult {
        let target = if on { LightState::On } else { LightState::Off };
        let mut ctx = self.ctx.write();

        if !ctx.has_light_box || ctx.light_box_state == target {
            return CheckResult::Ready;
        }
        if ctx.light_box_state == LightState::Busy {
            return CheckResult::Pending;
        }

        ctx.light_box_state = LightState::Busy;
        drop(ctx);
        if on {
            self.issue(PrepareCommand::SetLightBoxLight(true), "Turn light box light on...");
        } else {
            self.issue(PrepareCommand::SetLightBoxLight(false), "Turn light box light off...");
        }
        CheckResult::Pending
    }

    fn check_wall_position_ready(&mut self, frame_type: FrameType) -> CheckResult {
        if !self.ctx.read().has_telescope {
            return CheckResult::Ready;
        }

        match self.wall_status {
            WallPositionStatus::None => match self.wall_target() {
                Ok(target) => {
                    self.wall_status = WallPositionStatus::Slewing;
                    self.issue(PrepareCommand::SlewTo(target), "Mount slewing to wall position...");
                    CheckResult::Pending
                }
                Err(e) => CheckResult::Failed(e.to_string()),
            },
            WallPositionStatus::Slewing | WallPositionStatus::TrackingBusy => CheckResult::Pending,
            WallPositionStatus::SlewCompleted => {
                self.wall_status = WallPositionStatus::TrackingBusy;
                self.issue(
                    PrepareCommand::SetTracking(false),
                    "Slew to wall position complete, stop tracking.",
                );
                CheckResult::Pending
            }
            WallPositionStatus::TrackingOff => self.drive_light_box(frame_type == FrameType::Flat),
        }
    }

    fn wall_target(&self) -> PrepareResult<EquatorialCoord> {
        let wall = self
            .calibration
            .wall_position
            .ok_or(PrepareError::MissingWallPosition)?;
        let observer = self
            .ctx
            .read()
            .observer
            .ok_or(PrepareError::MissingObserverLocation)?;
        Ok(wall_equatorial_position(wall, observer, &chrono::Utc::now()))
    }

    fn check_pre_mount_park_ready(&mut self) -> CheckResult {
        // Wall positioning already moves the mount
        if !self.calibration.pre_mount_park || self.calibration.flat_field_source == FlatFieldSource::Wall {
            return CheckResult::Ready;
        }

        let mut ctx = self.ctx.write();
        if !ctx.has_telescope {
            return CheckResult::Ready;
        }

        let park_state = ctx.scope_park_state;
        match park_state {
            ParkStatus::Error => CheckResult::Failed("Parking mount failed, aborting...".to_string()),
            ParkStatus::Parking => CheckResult::Pending,
            ParkStatus::Parked => CheckResult::Ready,
            ParkStatus::Unknown | ParkStatus::Unparked | ParkStatus::Unparking => {
                ctx.scope_park_state = ParkStatus::Parking;
                drop(ctx);
                self.issue(
                    PrepareCommand::SetScopeParked(true),
                    "Parking mount prior to calibration frames capture...",
                );
                CheckResult::Pending
            }
        }
    }

    fn check_pre_dome_park_ready(&mut self) -> CheckResult {
        if !self.calibration.pre_dome_park {
            return CheckResult::Ready;
        }

        let mut ctx = self.ctx.write();
        if !ctx.has_dome {
            return CheckResult::Ready;
        }

        let dome_state = ctx.dome_state;
        match dome_state {
            DomeStatus::Error => CheckResult::Failed("Parking dome failed, aborting...".to_string()),
            DomeStatus::Parking => CheckResult::Pending,
            DomeStatus::Parked => CheckResult::Ready,
            DomeStatus::Idle | DomeStatus::Moving | DomeStatus::Tracking | DomeStatus::Unparking => {
                ctx.dome_state = DomeStatus::Parking;
                drop(ctx);
                self.issue(
                    PrepareCommand::SetDomeParked(true),
                    "Parking dome prior to calibration frames capture...",
                );
                CheckResult::Pending
            }
        }
    }

    /// Move the focuser to the position recorded for the target filter by the last autofocus
    fn check_flat_sync_focus(&mut self) -> CheckResult {
        let Some(filter_id) = self.targets.filter_id else {
            return CheckResult::Ready;
        };

        match self.flat_sync {
            FlatSyncStatus::Busy => {
                self.schedule_flat_sync_retry(filter_id);
                CheckResult::Pending
            }
            FlatSyncStatus::Completed => CheckResult::Ready,
            FlatSyncStatus::Idle => {
                if self.frame_type == FrameType::Flat
                    && self.calibration.autofocus_ready
                    && self.config.flat_sync_focus
                {
                    self.flat_sync = FlatSyncStatus::Busy;
                    self.send(PrepareCommand::FlatSyncFocus(filter_id));
                    CheckResult::Pending
                } else {
                    CheckResult::Ready
                }
            }
        }
    }

    fn check_has_shutter(&mut self) -> CheckResult {
        let mut ctx = self.ctx.write();
        let shutter_status = ctx.shutter_status;
        match shutter_status {
            ShutterStatus::Busy => CheckResult::Pending,
            ShutterStatus::Yes | ShutterStatus::No => CheckResult::Ready,
            ShutterStatus::Unknown => {
                ctx.shutter_status = ShutterStatus::Busy;
                drop(ctx);
                self.send(PrepareCommand::QueryHasShutter);
                CheckResult::Pending
            }
        }
    }

    /// Shutterless cameras need the operator to cover the scope for darks
    fn check_manual_cover(&mut self) -> CheckResult {
        let needs_cover = {
            let ctx = self.ctx.read();
            ctx.shutter_status == ShutterStatus::No && !ctx.telescope_covered
        };
        if !needs_cover {
            return CheckResult::Ready;
        }
        self.request_confirmation(PrepareCommand::RequestManualCover {
            message: "Cover the telescope in order to take a dark exposure.".to_string(),
            label: "Dark Exposure".to_string(),
        })
    }

    fn check_light_frame_scope_cover_open(&mut self) -> CheckResult {
        if self.calibration.flat_field_source.is_cap() {
            return self.check_cap_open();
        }
        if self.ctx.read().telescope_covered {
            self.request_confirmation(PrepareCommand::RequestManualUncover)
        } else {
            CheckResult::Ready
        }
    }

    fn check_cap_open(&mut self) -> CheckResult {
        let mut ctx = self.ctx.write();

        if ctx.light_box_state == LightState::Busy || ctx.dust_cap_state == CapState::Unparking {
            return CheckResult::Pending;
        }

        if ctx.has_light_box && ctx.light_box_state != LightState::Off {
            ctx.light_box_state = LightState::Busy;
            drop(ctx);
            self.issue(PrepareCommand::SetLightBoxLight(false), "Turn light box light off...");
            return CheckResult::Pending;
        }

        if !ctx.has_dust_cap {
            drop(ctx);
            self.log("Skipping flat/dark cap since it is not connected.");
            return CheckResult::Ready;
        }

        let cap_state = ctx.dust_cap_state;
        match cap_state {
            CapState::Idle => CheckResult::Ready,
            CapState::Parking | CapState::Unparking => CheckResult::Pending,
            CapState::Error => CheckResult::Failed("Dust cap reported an error, aborting...".to_string()),
            CapState::Parked => {
                ctx.dust_cap_state = CapState::Unparking;
                drop(ctx);
                self.issue(PrepareCommand::ParkDustCap(false), "Unparking dust cap...");
                CheckResult::Pending
            }
        }
    }
}

//! Simulated observatory equipment
//!
//! Answers every [`PrepareCommand`] with the device events real hardware
//! would report, including the transitional states in between. Used by the
//! `prep-sim` binary and by the scenario tests.

use crate::astro::GeoLocation;
use crate::commands::{PrepareCommand, PrepareStage};
use crate::context::{CapState, CaptureContext, DomeStatus, MountStatus, ParkStatus};
use crate::events::{DeviceEvent, MotionState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::mpsc;

/// Sensor noise on simulated temperature readings, in degrees
const TEMPERATURE_JITTER: f64 = 0.03;

/// Equipment that answers preparation commands after a delay
#[derive(Debug)]
pub struct SimulatedEquipment {
    pub has_telescope: bool,
    pub has_dome: bool,
    pub has_dust_cap: bool,
    pub has_light_box: bool,
    pub has_shutter: bool,
    pub observer: Option<GeoLocation>,

    temperature: f64,
    rotator_raw_angle: f64,
    filter_id: i32,
    dust_cap: CapState,

    /// Readings reported while the cooler converges on a new target
    temperature_steps: usize,
    /// How many flat sync requests answer "not yet" before one completes
    flat_sync_busy_replies: u32,
    operator_confirms: bool,
    step_delay: Duration,
    rng: StdRng,
}

impl Default for SimulatedEquipment {
    fn default() -> Self {
        Self {
            has_telescope: true,
            has_dome: false,
            has_dust_cap: false,
            has_light_box: false,
            has_shutter: true,
            observer: Some(GeoLocation {
                latitude_deg: 48.2,
                longitude_deg: 16.4,
            }),
            temperature: 15.0,
            rotator_raw_angle: 0.0,
            filter_id: 0,
            dust_cap: CapState::Idle,
            temperature_steps: 5,
            flat_sync_busy_replies: 0,
            operator_confirms: true,
            step_delay: Duration::from_millis(200),
            rng: StdRng::from_entropy(),
        }
    }
}

impl SimulatedEquipment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_rotator_angle(mut self, raw_angle: f64) -> Self {
        self.rotator_raw_angle = raw_angle;
        self
    }

    pub fn with_filter(mut self, filter_id: i32) -> Self {
        self.filter_id = filter_id;
        self
    }

    pub fn with_dust_cap(mut self, state: CapState) -> Self {
        self.has_dust_cap = true;
        self.dust_cap = state;
        self
    }

    pub fn with_light_box(mut self) -> Self {
        self.has_light_box = true;
        self
    }

    pub fn with_dome(mut self) -> Self {
        self.has_dome = true;
        self
    }

    pub fn with_shutter(mut self, has_shutter: bool) -> Self {
        self.has_shutter = has_shutter;
        self
    }

    pub fn with_flat_sync_busy_replies(mut self, replies: u32) -> Self {
        self.flat_sync_busy_replies = replies;
        self
    }

    pub fn with_operator_confirms(mut self, confirms: bool) -> Self {
        self.operator_confirms = confirms;
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Fixed seed for reproducible temperature noise
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn rotator_angle(&self) -> f64 {
        self.rotator_raw_angle
    }

    /// Session context matching this equipment, before any status is known
    pub fn capture_context(&self) -> CaptureContext {
        CaptureContext {
            has_telescope: self.has_telescope,
            has_dome: self.has_dome,
            has_dust_cap: self.has_dust_cap,
            has_light_box: self.has_light_box,
            observer: self.observer,
            current_filter_id: Some(self.filter_id),
            dust_cap_state: self.dust_cap,
            ..CaptureContext::default()
        }
    }

    /// Events produced by one command, each with its delay after the previous one
    pub fn respond(&mut self, command: &PrepareCommand) -> Vec<(Duration, DeviceEvent)> {
        let step = self.step_delay;

        match command {
            PrepareCommand::SetCaptureBatchMode(_) | PrepareCommand::AbortCapture => Vec::new(),

            PrepareCommand::ReadCurrentState(stage) => {
                let event = match stage {
                    PrepareStage::ChangingFilter => DeviceEvent::FilterChanged(self.filter_id),
                    PrepareStage::SettingTemperature => DeviceEvent::Temperature(self.temperature),
                    PrepareStage::SettingRotator => DeviceEvent::RotatorAngle {
                        raw_angle: self.rotator_raw_angle,
                        motion: MotionState::Idle,
                    },
                };
                vec![(step, event)]
            }

            PrepareCommand::SetTemperature(target) => self.cool_to(*target),

            PrepareCommand::SetRotatorAngle(raw_angle) => {
                let midway = (self.rotator_raw_angle + raw_angle) / 2.0;
                self.rotator_raw_angle = *raw_angle;
                vec![
                    (
                        step,
                        DeviceEvent::RotatorAngle {
                            raw_angle: midway,
                            motion: MotionState::Busy,
                        },
                    ),
                    (
                        step,
                        DeviceEvent::RotatorAngle {
                            raw_angle: *raw_angle,
                            motion: MotionState::Ok,
                        },
                    ),
                ]
            }

            PrepareCommand::ParkDustCap(park) => {
                if !self.has_dust_cap {
                    return vec![(step, DeviceEvent::DustCap(CapState::Error))];
                }
                let (moving, done) = if *park {
                    (CapState::Parking, CapState::Parked)
                } else {
                    (CapState::Unparking, CapState::Idle)
                };
                self.dust_cap = done;
                vec![(step, DeviceEvent::DustCap(moving)), (step, DeviceEvent::DustCap(done))]
            }

            PrepareCommand::SetLightBoxLight(on) => vec![(step, DeviceEvent::LightBox { on: *on })],

            PrepareCommand::SlewTo(_) => vec![
                (step, DeviceEvent::MountStatus(MountStatus::Slewing)),
                (step * 3, DeviceEvent::MountStatus(MountStatus::Tracking)),
            ],

            PrepareCommand::SetTracking(enabled) => {
                let status = if *enabled { MountStatus::Tracking } else { MountStatus::Idle };
                vec![(step, DeviceEvent::MountStatus(status))]
            }

            PrepareCommand::SetScopeParked(park) => {
                let (moving, done) = if *park {
                    (ParkStatus::Parking, ParkStatus::Parked)
                } else {
                    (ParkStatus::Unparking, ParkStatus::Unparked)
                };
                vec![
                    (step, DeviceEvent::MountParkStatus(moving)),
                    (step * 2, DeviceEvent::MountParkStatus(done)),
                ]
            }

            PrepareCommand::SetDomeParked(park) => {
                let (moving, done) = if *park {
                    (DomeStatus::Parking, DomeStatus::Parked)
                } else {
                    (DomeStatus::Unparking, DomeStatus::Idle)
                };
                vec![
                    (step, DeviceEvent::DomeStatus(moving)),
                    (step * 2, DeviceEvent::DomeStatus(done)),
                ]
            }

            PrepareCommand::FlatSyncFocus(_) => {
                let completed = self.flat_sync_busy_replies == 0;
                self.flat_sync_busy_replies = self.flat_sync_busy_replies.saturating_sub(1);
                vec![(step, DeviceEvent::FlatSyncFocus { completed })]
            }

            PrepareCommand::QueryHasShutter => vec![(step, DeviceEvent::ShutterPresence(self.has_shutter))],

            PrepareCommand::RequestManualCover { .. } => vec![(
                step,
                DeviceEvent::ManualCoverResult {
                    closed: true,
                    success: self.operator_confirms,
                },
            )],

            PrepareCommand::RequestManualUncover => vec![(
                step,
                DeviceEvent::ManualCoverResult {
                    closed: false,
                    success: self.operator_confirms,
                },
            )],
        }
    }

    /// The driver echoes the target first, then the sensor converges on it
    fn cool_to(&mut self, target: f64) -> Vec<(Duration, DeviceEvent)> {
        let start = self.temperature;
        let steps = self.temperature_steps.max(1);
        let mut events = vec![(self.step_delay / 2, DeviceEvent::Temperature(target))];

        for i in 1..=steps {
            let fraction = i as f64 / steps as f64;
            let jitter = self.rng.gen_range(-TEMPERATURE_JITTER..=TEMPERATURE_JITTER);
            let reading = start + (target - start) * fraction + jitter;
            events.push((self.step_delay, DeviceEvent::Temperature(reading)));
        }

        self.temperature = target;
        events
    }

    /// Serve commands until the command channel closes
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<PrepareCommand>,
        events: mpsc::UnboundedSender<DeviceEvent>,
    ) {
        while let Some(command) = commands.recv().await {
            tracing::debug!(?command, "[SIM] Command received");
            let responses = self.respond(&command);
            if responses.is_empty() {
                continue;
            }

            let events = events.clone();
            tokio::spawn(async move {
                for (delay, event) in responses {
                    tokio::time::sleep(delay).await;
                    tracing::debug!(?event, "[SIM] Device event");
                    if events.send(event).is_err() {
                        return;
                    }
                }
            });
        }
        tracing::debug!("[SIM] Command channel closed");
    }
}

mod common;

use capture_prep::{
    ActionKind, CalibrationSettings, CapState, CaptureContext, DeviceEvent, FlatFieldSource, JobStatus,
    JobTargets, LightState, MotionState, PrepareCommand, PrepareConfig, PrepareStage, PreparationState,
};
use common::Harness;

fn light_harness(ctx: CaptureContext, targets: JobTargets) -> Harness {
    Harness::new(ctx, targets, CalibrationSettings::default())
}

#[test]
fn test_nothing_enforced_completes_immediately() {
    let mut h = light_harness(CaptureContext::new(), JobTargets::default());

    h.orchestrator.prepare_light(false, false, false);

    assert_eq!(h.completions(), 1);
    assert_eq!(h.orchestrator.preparation_state(), PreparationState::Completed);
    assert_eq!(h.sink.commands(), vec![PrepareCommand::SetCaptureBatchMode(true)]);
    assert_eq!(h.count(|c| matches!(c, PrepareCommand::SetTemperature(_))), 0);
    assert_eq!(h.count(|c| matches!(c, PrepareCommand::SetRotatorAngle(_))), 0);
}

#[test]
fn test_preview_disables_batch_mode() {
    let mut h = light_harness(CaptureContext::new(), JobTargets::default());

    h.orchestrator.prepare_light(false, false, true);

    assert!(h.orchestrator.is_preview());
    assert_eq!(h.sink.commands()[0], PrepareCommand::SetCaptureBatchMode(false));
    assert_eq!(h.completions(), 1);
}

#[test]
fn test_repeated_prepare_is_a_noop() {
    let mut h = light_harness(CaptureContext::new(), JobTargets::default());

    h.orchestrator.prepare_light(false, false, false);
    let issued = h.sink.commands().len();
    h.orchestrator.prepare_light(false, false, false);
    h.orchestrator.check_all_actions_ready();

    assert_eq!(h.sink.commands().len(), issued);
    assert_eq!(h.completions(), 1);
}

#[test]
fn test_new_pass_after_job_goes_idle() {
    let mut h = light_harness(CaptureContext::new(), JobTargets::default());

    h.orchestrator.prepare_light(false, false, false);
    h.orchestrator.set_status(JobStatus::Idle);
    h.orchestrator.prepare_light(false, false, false);

    assert_eq!(h.completions(), 2);
    assert_eq!(h.count(|c| matches!(c, PrepareCommand::SetCaptureBatchMode(_))), 2);
}

#[test]
fn test_changed_arguments_start_a_new_pass() {
    let ctx = CaptureContext::new();
    let targets = JobTargets {
        temperature: -5.0,
        ..JobTargets::default()
    };
    let mut h = light_harness(ctx, targets);

    h.orchestrator.prepare_light(false, false, false);
    assert_eq!(h.completions(), 1);

    // Status is still busy, but temperature is now enforced
    h.orchestrator.prepare_light(true, false, false);
    assert_eq!(h.orchestrator.preparation_state(), PreparationState::Busy);
    assert_eq!(
        h.count(|c| *c == PrepareCommand::ReadCurrentState(PrepareStage::SettingTemperature)),
        1
    );
}

#[test]
fn test_filter_change_is_announced() {
    let ctx = CaptureContext {
        current_filter_id: Some(1),
        ..CaptureContext::default()
    };
    let targets = JobTargets {
        filter_id: Some(3),
        ..JobTargets::default()
    };
    let mut h = light_harness(ctx, targets);

    h.orchestrator.prepare_light(false, false, false);

    assert_eq!(h.stages(), vec![PrepareStage::ChangingFilter]);
    assert!(h.orchestrator.is_action_ready(ActionKind::Filter));
    assert_eq!(h.completions(), 1);
}

#[test]
fn test_temperature_converges_after_echo() {
    let targets = JobTargets {
        temperature: -10.0,
        ..JobTargets::default()
    };
    let config = PrepareConfig {
        max_temperature_diff: 0.5,
        ..PrepareConfig::default()
    };
    let mut h = Harness::with_config(CaptureContext::new(), config, targets, CalibrationSettings::default());

    h.orchestrator.prepare_light(true, false, false);
    assert_eq!(
        h.count(|c| *c == PrepareCommand::ReadCurrentState(PrepareStage::SettingTemperature)),
        1
    );
    assert_eq!(h.count(|c| matches!(c, PrepareCommand::SetTemperature(_))), 0);

    // Baseline reading, far from target
    h.orchestrator.handle_event(DeviceEvent::Temperature(-3.0));
    assert_eq!(h.count(|c| *c == PrepareCommand::SetTemperature(-10.0)), 1);
    assert!(h.stages().contains(&PrepareStage::SettingTemperature));

    // Driver echo of the target is skipped
    h.orchestrator.handle_event(DeviceEvent::Temperature(-10.0));
    assert!(!h.orchestrator.is_action_ready(ActionKind::Temperature));
    assert_eq!(h.completions(), 0);

    h.orchestrator.handle_event(DeviceEvent::Temperature(-7.0));
    assert_eq!(h.completions(), 0);
    assert_eq!(h.count(|c| matches!(c, PrepareCommand::SetTemperature(_))), 1);

    h.orchestrator.handle_event(DeviceEvent::Temperature(-9.8));
    assert!(h.orchestrator.is_action_ready(ActionKind::Temperature));
    assert_eq!(h.completions(), 1);
}

#[test]
fn test_temperature_already_in_range() {
    let targets = JobTargets {
        temperature: -10.0,
        ..JobTargets::default()
    };
    let mut h = light_harness(CaptureContext::new(), targets);

    h.orchestrator.prepare_light(true, false, false);
    h.orchestrator.handle_event(DeviceEvent::Temperature(-10.05));

    assert_eq!(h.count(|c| matches!(c, PrepareCommand::SetTemperature(_))), 0);
    assert_eq!(h.completions(), 1);
}

#[test]
fn test_rotator_moves_to_position_angle() {
    let targets = JobTargets {
        position_angle: Some(90.0),
        ..JobTargets::default()
    };
    let mut h = light_harness(CaptureContext::new(), targets);

    h.orchestrator.prepare_light(false, false, false);
    assert_eq!(
        h.count(|c| *c == PrepareCommand::ReadCurrentState(PrepareStage::SettingRotator)),
        1
    );
    assert!(!h.orchestrator.is_action_ready(ActionKind::Rotator));

    h.orchestrator.handle_event(DeviceEvent::RotatorAngle {
        raw_angle: 10.0,
        motion: MotionState::Idle,
    });
    assert_eq!(h.count(|c| *c == PrepareCommand::SetRotatorAngle(90.0)), 1);
    assert!(h.stages().contains(&PrepareStage::SettingRotator));

    // Within tolerance but still moving
    h.orchestrator.handle_event(DeviceEvent::RotatorAngle {
        raw_angle: 89.995,
        motion: MotionState::Busy,
    });
    assert_eq!(h.completions(), 0);

    h.orchestrator.handle_event(DeviceEvent::RotatorAngle {
        raw_angle: 90.0,
        motion: MotionState::Ok,
    });
    assert_eq!(h.completions(), 1);
    assert_eq!(h.count(|c| matches!(c, PrepareCommand::SetRotatorAngle(_))), 1);
}

#[test]
fn test_rotator_compares_across_the_wrap() {
    let targets = JobTargets {
        position_angle: Some(180.0),
        ..JobTargets::default()
    };
    let mut h = light_harness(CaptureContext::new(), targets);

    h.orchestrator.prepare_light(false, false, false);
    h.orchestrator.handle_event(DeviceEvent::RotatorAngle {
        raw_angle: -179.995,
        motion: MotionState::Idle,
    });

    assert_eq!(h.count(|c| matches!(c, PrepareCommand::SetRotatorAngle(_))), 0);
    assert_eq!(h.completions(), 1);
}

#[test]
fn test_rotator_applies_offset_and_multiplier() {
    let targets = JobTargets {
        position_angle: Some(30.0),
        ..JobTargets::default()
    };
    let config = PrepareConfig {
        pa_offset: 10.0,
        pa_multiplier: -1.0,
        ..PrepareConfig::default()
    };
    let mut h = Harness::with_config(CaptureContext::new(), config, targets, CalibrationSettings::default());

    h.orchestrator.prepare_light(false, false, false);
    h.orchestrator.handle_event(DeviceEvent::RotatorAngle {
        raw_angle: 0.0,
        motion: MotionState::Idle,
    });
    assert_eq!(h.count(|c| *c == PrepareCommand::SetRotatorAngle(-40.0)), 1);

    h.orchestrator.handle_event(DeviceEvent::RotatorAngle {
        raw_angle: -40.0,
        motion: MotionState::Ok,
    });
    assert_eq!(h.completions(), 1);
}

#[test]
fn test_guiding_drift_gates_first_light() {
    let mut h = light_harness(CaptureContext::new(), JobTargets::default());

    h.orchestrator.prepare_light(false, true, false);
    assert!(!h.orchestrator.is_action_ready(ActionKind::GuiderDrift));

    h.orchestrator.handle_event(DeviceEvent::GuiderDrift(3.5));
    assert_eq!(h.completions(), 0);

    h.orchestrator.handle_event(DeviceEvent::GuiderDrift(1.2));
    assert_eq!(h.completions(), 1);
}

#[test]
fn test_guiding_not_enforced_for_previews() {
    let mut h = light_harness(CaptureContext::new(), JobTargets::default());

    h.orchestrator.prepare_light(false, true, true);

    assert_eq!(h.completions(), 1);
}

#[test]
fn test_disabling_guiding_enforcement_releases_pass() {
    let mut h = light_harness(CaptureContext::new(), JobTargets::default());

    h.orchestrator.prepare_light(false, true, false);
    assert_eq!(h.completions(), 0);

    h.orchestrator.set_enforce_initial_guiding_drift(false);
    assert_eq!(h.completions(), 1);
}

#[test]
fn test_covered_scope_asks_to_uncover_once() {
    let ctx = CaptureContext {
        telescope_covered: true,
        ..CaptureContext::default()
    };
    let mut h = light_harness(ctx, JobTargets::default());

    h.orchestrator.prepare_light(false, false, false);
    h.orchestrator.check_all_actions_ready();
    h.orchestrator.check_all_actions_ready();
    assert_eq!(h.count(|c| *c == PrepareCommand::RequestManualUncover), 1);

    h.orchestrator.handle_event(DeviceEvent::ManualCoverResult {
        closed: false,
        success: true,
    });
    assert!(!h.orchestrator.context().read().telescope_covered);
    assert_eq!(h.completions(), 1);
}

#[test]
fn test_cap_source_opens_cap_for_lights() {
    let ctx = CaptureContext {
        has_dust_cap: true,
        has_light_box: true,
        dust_cap_state: CapState::Parked,
        light_box_state: LightState::On,
        ..CaptureContext::default()
    };
    let calibration = CalibrationSettings {
        flat_field_source: FlatFieldSource::FlatCap,
        ..CalibrationSettings::default()
    };
    let mut h = Harness::new(ctx, JobTargets::default(), calibration);

    h.orchestrator.prepare_light(false, false, false);
    assert_eq!(h.count(|c| *c == PrepareCommand::SetLightBoxLight(false)), 1);

    h.orchestrator.handle_event(DeviceEvent::LightBox { on: false });
    assert_eq!(h.count(|c| *c == PrepareCommand::ParkDustCap(false)), 1);

    h.orchestrator.handle_event(DeviceEvent::DustCap(CapState::Unparking));
    assert_eq!(h.completions(), 0);

    h.orchestrator.handle_event(DeviceEvent::DustCap(CapState::Idle));
    assert_eq!(h.completions(), 1);
    assert_eq!(h.count(|c| matches!(c, PrepareCommand::ParkDustCap(_))), 1);
}

#[test]
fn test_cap_source_without_cap_is_skipped() {
    let calibration = CalibrationSettings {
        flat_field_source: FlatFieldSource::DarkCap,
        ..CalibrationSettings::default()
    };
    let mut h = Harness::new(CaptureContext::new(), JobTargets::default(), calibration);

    h.orchestrator.prepare_light(false, false, false);

    assert_eq!(h.completions(), 1);
    assert!(h
        .logs()
        .iter()
        .any(|l| l == "Skipping flat/dark cap since it is not connected."));
}

#[test]
fn test_generic_prepare_and_frame_type_reset() {
    let mut h = light_harness(CaptureContext::new(), JobTargets::default());

    h.orchestrator.prepare(capture_prep::FrameType::Light, false, false, false);
    assert_eq!(h.orchestrator.preparation_state(), PreparationState::Completed);

    h.orchestrator.set_frame_type(capture_prep::FrameType::Dark);
    assert_eq!(h.orchestrator.preparation_state(), PreparationState::None);

    // Nothing is outstanding, so stray events do not complete anything
    h.orchestrator.handle_event(DeviceEvent::GuiderDrift(0.5));
    assert_eq!(h.completions(), 1);
}

#[test]
fn test_frame_type_change_allows_fresh_pass() {
    let ctx = CaptureContext {
        shutter_status: capture_prep::ShutterStatus::Yes,
        ..CaptureContext::new()
    };
    let mut h = light_harness(ctx, JobTargets::default());

    h.orchestrator.prepare_light(false, false, false);
    assert_eq!(h.orchestrator.status(), JobStatus::Busy);

    h.orchestrator.set_frame_type(capture_prep::FrameType::Dark);
    assert_eq!(h.orchestrator.status(), JobStatus::Idle);

    h.orchestrator.prepare_dark(false, false);
    assert_eq!(h.orchestrator.preparation_state(), PreparationState::Completed);
    assert_eq!(h.completions(), 2);
    assert_eq!(h.count(|c| *c == PrepareCommand::SetCaptureBatchMode(true)), 2);
}

//! Which checks gate each frame type, and in which order
//!
//! Frame-specific steps run only once every generic action is ready. Steps
//! are evaluated in order and the first one that is not ready ends the pass.

use crate::actions::ActionKind;
use crate::job::{FlatFieldSource, FrameType};

/// A frame-specific readiness step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareStep {
    /// Light frames: the optical path is uncovered
    ScopeCoverOpen,
    /// Flats with a manual source: operator placed a light source over the scope
    ManualFlatCover,
    /// Flats from twilight sky, not automated
    DawnDuskSky,
    /// Flats with a flat cap: cap parked and light on
    FlatCap,
    /// Dust cap and light box driven to the frame's target state
    DustCap,
    /// Mount pointed at the wall, tracking off, light box at target
    WallPosition,
    /// Mount parked before calibration frames
    PreMountPark,
    /// Dome parked before calibration frames
    PreDomePark,
    /// Focuser moved to the recorded position of the target filter
    FlatSyncFocus,
    /// Camera shutter presence known
    ShutterPresence,
    /// Darks without a shutter: operator covered the scope
    ManualDarkCover,
}

/// Actions that can hold up the given frame type
pub fn relevant_actions(frame: FrameType) -> &'static [ActionKind] {
    match frame {
        FrameType::Light => &ActionKind::ALL,
        FrameType::Flat | FrameType::Dark | FrameType::Bias => {
            &[ActionKind::Filter, ActionKind::Temperature]
        }
    }
}

/// Frame-specific steps run after the generic actions are ready
pub fn steps(frame: FrameType, source: FlatFieldSource) -> &'static [PrepareStep] {
    use PrepareStep::*;

    match frame {
        FrameType::Light => &[ScopeCoverOpen],
        FrameType::Flat => match source {
            FlatFieldSource::Manual => &[ManualFlatCover, PreMountPark, PreDomePark, FlatSyncFocus],
            FlatFieldSource::DawnDusk => &[DawnDuskSky, PreMountPark, PreDomePark, FlatSyncFocus],
            FlatFieldSource::FlatCap => &[FlatCap, PreMountPark, PreDomePark, FlatSyncFocus],
            FlatFieldSource::DarkCap => &[DustCap, PreMountPark, PreDomePark, FlatSyncFocus],
            FlatFieldSource::Wall => &[WallPosition, PreMountPark, PreDomePark, FlatSyncFocus],
        },
        FrameType::Dark | FrameType::Bias => match source {
            FlatFieldSource::Manual | FlatFieldSource::DawnDusk => &[ShutterPresence, ManualDarkCover],
            FlatFieldSource::FlatCap | FlatFieldSource::DarkCap => &[ShutterPresence, DustCap],
            FlatFieldSource::Wall => &[ShutterPresence, WallPosition],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_only_checks_cover() {
        for source in [
            FlatFieldSource::Manual,
            FlatFieldSource::FlatCap,
            FlatFieldSource::Wall,
        ] {
            assert_eq!(steps(FrameType::Light, source), &[PrepareStep::ScopeCoverOpen]);
        }
        assert_eq!(relevant_actions(FrameType::Light).len(), 4);
    }

    #[test]
    fn test_flat_order() {
        let flat = steps(FrameType::Flat, FlatFieldSource::FlatCap);
        assert_eq!(
            flat,
            &[
                PrepareStep::FlatCap,
                PrepareStep::PreMountPark,
                PrepareStep::PreDomePark,
                PrepareStep::FlatSyncFocus,
            ]
        );
        assert_eq!(steps(FrameType::Flat, FlatFieldSource::DarkCap)[0], PrepareStep::DustCap);
    }

    #[test]
    fn test_dark_and_bias_share_policy() {
        for source in [
            FlatFieldSource::Manual,
            FlatFieldSource::DawnDusk,
            FlatFieldSource::FlatCap,
            FlatFieldSource::DarkCap,
            FlatFieldSource::Wall,
        ] {
            let dark = steps(FrameType::Dark, source);
            assert_eq!(dark, steps(FrameType::Bias, source));
            assert_eq!(dark[0], PrepareStep::ShutterPresence);
        }
    }

    #[test]
    fn test_calibration_frames_skip_rotator_and_guiding() {
        for frame in [FrameType::Flat, FrameType::Dark, FrameType::Bias] {
            let actions = relevant_actions(frame);
            assert!(!actions.contains(&ActionKind::Rotator));
            assert!(!actions.contains(&ActionKind::GuiderDrift));
        }
    }
}

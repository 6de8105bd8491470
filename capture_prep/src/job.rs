//! Job parameters for a capture preparation
//!
//! Targets and calibration settings are set by the caller before `prepare_*`
//! and stay fixed for the duration of the pass.

use crate::astro::HorizontalCoord;
use serde::{Deserialize, Serialize};

/// Camera frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrameType {
    #[default]
    Light,
    Flat,
    Dark,
    Bias,
}

/// How the optical path is illuminated (flats) or darkened (darks)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlatFieldSource {
    /// Operator covers the scope by hand
    #[default]
    Manual,
    /// Twilight sky flats
    DawnDusk,
    /// Dust cap with built-in light box
    FlatCap,
    /// Dust cap used with an external light source
    DarkCap,
    /// Mount points at an illuminated wall
    Wall,
}

impl FlatFieldSource {
    /// Sources driven through the dust cap and light box
    pub fn is_cap(self) -> bool {
        matches!(self, FlatFieldSource::FlatCap | FlatFieldSource::DarkCap)
    }
}

/// Target values the preparation drives the equipment towards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTargets {
    /// Filter slot the exposure is taken with
    #[serde(default)]
    pub filter_id: Option<i32>,
    /// Position angle (degrees), `None` leaves the rotator alone
    #[serde(default)]
    pub position_angle: Option<f64>,
    /// Sensor temperature (°C) used when temperature is enforced
    #[serde(default)]
    pub temperature: f64,
    /// Guider drift (arc-seconds) to reach before the first light frame
    #[serde(default = "default_guider_drift")]
    pub guider_drift: f64,
}

impl Default for JobTargets {
    fn default() -> Self {
        Self {
            filter_id: None,
            position_angle: None,
            temperature: 0.0,
            guider_drift: default_guider_drift(),
        }
    }
}

fn default_guider_drift() -> f64 {
    2.0
}

/// Calibration frame settings of the job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSettings {
    #[serde(default)]
    pub flat_field_source: FlatFieldSource,
    /// Park the mount before calibration frames
    #[serde(default)]
    pub pre_mount_park: bool,
    /// Park the dome before calibration frames
    #[serde(default)]
    pub pre_dome_park: bool,
    /// Fixed wall position, required for [`FlatFieldSource::Wall`]
    #[serde(default)]
    pub wall_position: Option<HorizontalCoord>,
    /// An autofocus run succeeded earlier, so per-filter focus positions exist
    #[serde(default)]
    pub autofocus_ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_classification() {
        assert!(FlatFieldSource::FlatCap.is_cap());
        assert!(FlatFieldSource::DarkCap.is_cap());
        assert!(!FlatFieldSource::Manual.is_cap());
        assert!(!FlatFieldSource::Wall.is_cap());
    }

    #[test]
    fn test_settings_serde() {
        let json = r#"{
            "flat_field_source": "Wall",
            "wall_position": { "azimuth_deg": 90.0, "altitude_deg": 10.0 }
        }"#;
        let settings: CalibrationSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.flat_field_source, FlatFieldSource::Wall);
        assert!(!settings.pre_mount_park);
        assert_eq!(settings.wall_position.unwrap().azimuth_deg, 90.0);

        let targets: JobTargets = serde_json::from_str("{}").unwrap();
        assert_eq!(targets.filter_id, None);
        assert_eq!(targets.guider_drift, 2.0);
    }
}

//! Preparation configuration
//!
//! Tolerances and calibration constants read by the readiness checks. The
//! values are owned by the embedding application and treated as read-only
//! for the lifetime of a preparation pass.

use crate::error::{PrepareError, PrepareResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration consumed by the preparation checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareConfig {
    /// Maximum deviation (°C) between target and measured sensor temperature
    #[serde(default = "default_max_temperature_diff")]
    pub max_temperature_diff: f64,

    /// Rotator position angle tolerance in arc-minutes
    #[serde(default = "default_rotator_threshold_arcmin")]
    pub rotator_threshold_arcmin: f64,

    /// Offset between position angle and raw rotator angle (degrees)
    /// raw = (PA + offset) / multiplier
    #[serde(default)]
    pub pa_offset: f64,

    /// Multiplier between raw rotator angle and position angle, usually +1 or -1
    #[serde(default = "default_pa_multiplier")]
    pub pa_multiplier: f64,

    /// Move the focuser to the recorded per-filter position before flats
    #[serde(default)]
    pub flat_sync_focus: bool,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            max_temperature_diff: default_max_temperature_diff(),
            rotator_threshold_arcmin: default_rotator_threshold_arcmin(),
            pa_offset: 0.0,
            pa_multiplier: default_pa_multiplier(),
            flat_sync_focus: false,
        }
    }
}

fn default_max_temperature_diff() -> f64 {
    0.1
}

fn default_rotator_threshold_arcmin() -> f64 {
    1.0
}

fn default_pa_multiplier() -> f64 {
    1.0
}

impl PrepareConfig {
    /// Parse and validate a JSON config document
    pub fn from_json_str(json: &str) -> PrepareResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> PrepareResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| PrepareError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> PrepareResult<()> {
        if !self.max_temperature_diff.is_finite() || self.max_temperature_diff < 0.0 {
            return Err(PrepareError::invalid(
                "max_temperature_diff",
                self.max_temperature_diff,
                "must be a non-negative number",
            ));
        }
        if !self.rotator_threshold_arcmin.is_finite() || self.rotator_threshold_arcmin < 0.0 {
            return Err(PrepareError::invalid(
                "rotator_threshold_arcmin",
                self.rotator_threshold_arcmin,
                "must be a non-negative number",
            ));
        }
        if !self.pa_multiplier.is_finite() || self.pa_multiplier == 0.0 {
            return Err(PrepareError::invalid(
                "pa_multiplier",
                self.pa_multiplier,
                "must be non-zero",
            ));
        }
        if !self.pa_offset.is_finite() {
            return Err(PrepareError::invalid("pa_offset", self.pa_offset, "must be finite"));
        }
        Ok(())
    }

    /// Raw rotator angle that realizes the given position angle
    pub fn raw_rotator_angle(&self, position_angle: f64) -> f64 {
        (position_angle + self.pa_offset) / self.pa_multiplier
    }

    /// Position angle for a raw rotator reading, normalized to (-180, 180]
    pub fn position_angle(&self, raw_angle: f64) -> f64 {
        let pa = crate::astro::range360(raw_angle * self.pa_multiplier - self.pa_offset);
        if pa > 180.0 {
            pa - 360.0
        } else {
            pa
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PrepareConfig::default();
        assert_eq!(config.max_temperature_diff, 0.1);
        assert_eq!(config.rotator_threshold_arcmin, 1.0);
        assert_eq!(config.pa_multiplier, 1.0);
        assert!(!config.flat_sync_focus);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PrepareConfig::from_json_str(r#"{ "max_temperature_diff": 0.5 }"#).unwrap();
        assert_eq!(config.max_temperature_diff, 0.5);
        assert_eq!(config.pa_multiplier, 1.0);
    }

    #[test]
    fn test_zero_multiplier_rejected() {
        let err = PrepareConfig::from_json_str(r#"{ "pa_multiplier": 0.0 }"#).unwrap_err();
        assert!(matches!(err, PrepareError::InvalidConfig { field: "pa_multiplier", .. }));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = PrepareConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, PrepareError::ConfigParse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = PrepareConfig::load("/nonexistent/capture_prep.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/capture_prep.json"));
    }

    #[test]
    fn test_rotator_angle_conversion() {
        let config = PrepareConfig {
            pa_offset: 10.0,
            pa_multiplier: -1.0,
            ..Default::default()
        };
        let raw = config.raw_rotator_angle(30.0);
        assert_eq!(raw, -40.0);
        assert!((config.position_angle(raw) - 30.0).abs() < 1e-9);

        // 190° wraps into the negative half
        let plain = PrepareConfig::default();
        assert!((plain.position_angle(190.0) + 170.0).abs() < 1e-9);
        assert!((plain.position_angle(180.0) - 180.0).abs() < 1e-9);
    }
}

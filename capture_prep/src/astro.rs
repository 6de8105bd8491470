//! Coordinate helpers for the wall flat-field target
//!
//! The wall target is fixed in the horizontal frame, while the mount slews in
//! equatorial coordinates, so it has to be converted using the current local
//! sidereal time and observer latitude each time it is used.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Horizontal (alt/az) coordinates in degrees, azimuth measured from north through east
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizontalCoord {
    pub azimuth_deg: f64,
    pub altitude_deg: f64,
}

/// Equatorial coordinates of date: RA in hours, Dec in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquatorialCoord {
    pub ra_hours: f64,
    pub dec_degrees: f64,
}

/// Observer location in degrees (east longitude positive)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

/// Wrap an angle into [0, 360)
pub fn range360(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap an angle difference into (-180, 180]
pub fn normalize_angle_diff(diff: f64) -> f64 {
    let wrapped = range360(diff);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Julian Day for a UTC instant
pub fn julian_day(dt: &DateTime<Utc>) -> f64 {
    let (y, m) = if dt.month() <= 2 {
        (dt.year() - 1, dt.month() + 12)
    } else {
        (dt.year(), dt.month())
    };

    let a = y / 100;
    let b = 2 - a + a / 4;

    let day_fraction = (dt.hour() as f64
        + dt.minute() as f64 / 60.0
        + (dt.second() as f64 + dt.nanosecond() as f64 * 1e-9) / 3600.0)
        / 24.0;

    (365.25 * (y as f64 + 4716.0)).floor()
        + (30.6001 * (m as f64 + 1.0)).floor()
        + dt.day() as f64
        + b as f64
        - 1524.5
        + day_fraction
}

/// Local mean sidereal time in hours for a Julian Day and east longitude
pub fn local_sidereal_time(jd: f64, longitude_deg: f64) -> f64 {
    let d = jd - 2451545.0;
    let t = d / 36525.0;

    let gmst_deg = 280.46061837 + 360.98564736629 * d + 0.000387933 * t * t
        - t * t * t / 38710000.0;

    range360(gmst_deg + longitude_deg) / 15.0
}

/// Convert horizontal coordinates to equatorial for the given LST (hours) and latitude
pub fn horizontal_to_equatorial(
    coord: HorizontalCoord,
    lst_hours: f64,
    latitude_deg: f64,
) -> EquatorialCoord {
    let alt = coord.altitude_deg.to_radians();
    let az = coord.azimuth_deg.to_radians();
    let lat = latitude_deg.to_radians();

    let sin_dec = alt.sin() * lat.sin() + alt.cos() * lat.cos() * az.cos();
    let dec = sin_dec.clamp(-1.0, 1.0).asin();

    let ha = (-az.sin() * alt.cos()).atan2(lat.cos() * alt.sin() - lat.sin() * alt.cos() * az.cos());
    let ha_hours = ha.to_degrees() / 15.0;

    EquatorialCoord {
        ra_hours: (lst_hours - ha_hours).rem_euclid(24.0),
        dec_degrees: dec.to_degrees(),
    }
}

/// Equatorial position of a horizontal target at the given instant and location
pub fn wall_equatorial_position(
    wall: HorizontalCoord,
    location: GeoLocation,
    now: &DateTime<Utc>,
) -> EquatorialCoord {
    let lst = local_sidereal_time(julian_day(now), location.longitude_deg);
    horizontal_to_equatorial(wall, lst, location.latitude_deg)
}

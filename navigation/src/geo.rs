//! Geo primitives: great-circle distance and a local planar projection.
//!
//! All coordinates are WGS84 lat/lon in decimal degrees; no datum correction.

use crate::models::Coordinate;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;
pub const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;

pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    haversine_km(a, b) * 1000.0
}

pub fn path_length_km(path: &[Coordinate]) -> f64 {
    path.windows(2).map(|w| haversine_km(w[0], w[1])).sum()
}

/// Equirectangular projection to meters around a reference latitude.
///
/// Longitude is scaled by `cos(reference_latitude)`, so the projection is
/// only accurate close to that latitude and over short spans (a search
/// window of a few dozen route points). Callers re-derive the reference
/// near the current navigation index instead of fixing it per route.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    cos_ref: f64,
}

impl LocalProjection {
    pub fn new(reference_latitude: f64) -> Self {
        Self {
            cos_ref: reference_latitude.to_radians().cos(),
        }
    }

    /// Projected `(x, y)` in meters.
    pub fn to_xy(&self, coord: Coordinate) -> (f64, f64) {
        let x = coord.lon.to_radians() * EARTH_RADIUS_M * self.cos_ref;
        let y = coord.lat.to_radians() * EARTH_RADIUS_M;
        (x, y)
    }

    pub fn to_coordinate(&self, x: f64, y: f64) -> Coordinate {
        Coordinate {
            lat: (y / EARTH_RADIUS_M).to_degrees(),
            lon: (x / (EARTH_RADIUS_M * self.cos_ref)).to_degrees(),
        }
    }
}

/// Parses `"lat,lon"` in decimal degrees, as typed on a command line.
pub fn parse_coordinate(input: &str) -> Result<Coordinate, String> {
    let (lat, lon) = input
        .split_once(',')
        .ok_or_else(|| format!("expected `lat,lon`, got `{input}`"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude `{}`", lat.trim()))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude `{}`", lon.trim()))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("coordinate out of range: {lat},{lon}"));
    }
    Ok(Coordinate { lat, lon })
}

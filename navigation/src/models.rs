use serde::{Deserialize, Serialize};

pub use shared::{Coordinate, Place, RouteInfo, SavedLocation};

/// Where the live position sits on the active route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Start index of the winning segment, always in `[0, N-2]`.
    pub nearest_segment_index: usize,
    /// Clamped to `[0, 1]`.
    pub fraction_along_segment: f64,
    pub projected_point: Coordinate,
    pub distance_to_route_km: f64,
    pub raw_remaining_distance_km: f64,
    pub smoothed_remaining_distance_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EtaUpdate {
    pub duration_s: f64,
    pub distance_m: f64,
    pub smoothed_duration_s: f64,
}

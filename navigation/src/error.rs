use thiserror::Error;

use crate::config::ConfigError;
use crate::geocode::GeocodeError;
use crate::osrm::RoutingError;
use crate::trace::TraceError;

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("routing service error: {0}")]
    Routing(#[from] RoutingError),
    #[error("geocoding error: {0}")]
    Geocode(#[from] GeocodeError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("GPX trace error: {0}")]
    Trace(#[from] TraceError),
    #[error("route needs at least 2 points, got {0}")]
    DegenerateRoute(usize),
}

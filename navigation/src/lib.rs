pub mod bridge;
pub mod config;
pub mod error;
pub mod eta;
pub mod format;
pub mod geo;
pub mod geocode;
pub mod models;
pub mod osrm;
pub mod progress;
pub mod reroute;
pub mod route;
pub mod session;
pub mod smoothing;
pub mod trace;

#[cfg(test)]
mod testing;

pub use config::NavigationConfig;
pub use error::NavigationError;
pub use models::{Coordinate, EtaUpdate, Place, ProgressState, RouteInfo, SavedLocation};
pub use osrm::{OsrmClient, Overview, RoutedPath, RoutingError, RoutingService};
pub use route::Route;
pub use session::{NavigationEvent, NavigationSession, SessionCommand, SessionHandle, SessionState};

/// Fetches a full route between two points, ready to navigate.
pub async fn fetch_route<S: RoutingService>(
    service: &S,
    from: Coordinate,
    to: Coordinate,
) -> Result<Route, NavigationError> {
    let route = service.route(from, to, Overview::Full).await?.into_route();
    if !route.is_navigable() {
        return Err(NavigationError::DegenerateRoute(route.len()));
    }
    Ok(route)
}

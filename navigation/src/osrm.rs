//! Routing service seam and the OSRM HTTP client behind it.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::config::ServiceConfig;
use crate::models::{Coordinate, RouteInfo};
use crate::route::Route;

pub const OSRM_ROUTE_API_PATH: &str = "/route/v1/";

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("routing service answered HTTP {0}")]
    Status(u16),

    #[error("malformed routing response: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("routing service returned `{code}`: {message}")]
    Service { code: String, message: String },

    #[error("routing service returned no route")]
    NoRoute,

    #[error("route has no usable geometry")]
    MissingGeometry,
}

/// How much geometry to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overview {
    /// Distance and duration only.
    Summary,
    /// Full polyline, needed whenever the route will be followed.
    Full,
}

impl Overview {
    fn as_query(self) -> &'static str {
        match self {
            Overview::Summary => "false",
            Overview::Full => "full",
        }
    }
}

/// Result of one routing request. `coordinates` is empty for summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedPath {
    pub coordinates: Vec<Coordinate>,
    pub info: RouteInfo,
}

impl RoutedPath {
    pub fn into_route(self) -> Route {
        Route::with_info(self.coordinates, Some(self.info))
    }
}

/// Anything able to compute a driving route between two points.
///
/// # Contract
/// - `Overview::Full` results carry at least 2 coordinates.
/// - Failures are reported as `RoutingError`, never as panics.
pub trait RoutingService: Send + Sync {
    fn route(
        &self,
        from: Coordinate,
        to: Coordinate,
        overview: Overview,
    ) -> impl Future<Output = Result<RoutedPath, RoutingError>> + Send;
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    #[serde(default)]
    geometry: Option<OsrmGeometry>,
    /// Meters
    distance: f64,
    /// Seconds
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: `[lon, lat]`.
    coordinates: Vec<[f64; 2]>,
}

pub struct OsrmClientParams {
    pub osrm_url: String,
    pub profile: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl From<&ServiceConfig> for OsrmClientParams {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            osrm_url: config.osrm_url.clone(),
            profile: config.osrm_profile.clone(),
            timeout: config.http_timeout(),
            user_agent: config.user_agent.clone(),
        }
    }
}

pub struct OsrmClient {
    params: OsrmClientParams,
    client: reqwest::Client,
}

impl OsrmClient {
    pub fn new(params: OsrmClientParams) -> Result<Self, RoutingError> {
        let client = reqwest::Client::builder()
            .timeout(params.timeout)
            .user_agent(params.user_agent.clone())
            .build()?;
        Ok(Self { params, client })
    }

    fn route_url(&self, from: Coordinate, to: Coordinate) -> String {
        format!(
            "{}{}{}/{},{};{},{}",
            self.params.osrm_url.trim_end_matches('/'),
            OSRM_ROUTE_API_PATH,
            self.params.profile,
            from.lon,
            from.lat,
            to.lon,
            to.lat
        )
    }
}

impl RoutingService for OsrmClient {
    async fn route(
        &self,
        from: Coordinate,
        to: Coordinate,
        overview: Overview,
    ) -> Result<RoutedPath, RoutingError> {
        let url = self.route_url(from, to);
        tracing::debug!(%url, ?overview, "requesting route");

        let response = self
            .client
            .get(url)
            .query(&[("overview", overview.as_query()), ("geometries", "geojson")])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            // OSRM reports bad queries as 4xx with a JSON `code`.
            if let Ok(parsed) = serde_json::from_slice::<OsrmRouteResponse>(&body) {
                if parsed.code != "Ok" {
                    return Err(service_error(parsed));
                }
            }
            return Err(RoutingError::Status(status.as_u16()));
        }

        parse_route_response(&body, overview)
    }
}

fn service_error(response: OsrmRouteResponse) -> RoutingError {
    RoutingError::Service {
        message: response.message.unwrap_or_default(),
        code: response.code,
    }
}

fn parse_route_response(body: &[u8], overview: Overview) -> Result<RoutedPath, RoutingError> {
    let response: OsrmRouteResponse = serde_json::from_slice(body)?;
    if response.code != "Ok" {
        return Err(service_error(response));
    }

    let route = response.routes.into_iter().next().ok_or(RoutingError::NoRoute)?;
    let info = RouteInfo {
        distance_m: route.distance,
        duration_s: route.duration,
    };

    let coordinates: Vec<Coordinate> = route
        .geometry
        .map(|geometry| {
            geometry
                .coordinates
                .into_iter()
                .map(|[lon, lat]| Coordinate { lat, lon })
                .collect()
        })
        .unwrap_or_default();

    if overview == Overview::Full && coordinates.len() < 2 {
        return Err(RoutingError::MissingGeometry);
    }

    Ok(RoutedPath { coordinates, info })
}

//! Reroute Detector.
//!
//! `Idle -> Requesting -> Idle`. A request fires only when the live position
//! is farther than the threshold from the route, the cooldown since the last
//! trigger has elapsed and no other reroute is outstanding. There is no
//! retry beyond the fixed cooldown.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::RerouteConfig;
use crate::models::Coordinate;
use crate::osrm::{Overview, RoutedPath, RoutingError, RoutingService};
use crate::route::{DistanceMetric, Route};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerouteState {
    Idle,
    Requesting,
}

/// Full-geometry request from the live position to the route's end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerouteRequest {
    pub from: Coordinate,
    pub to: Coordinate,
    pub offset_m: f64,
}

#[derive(Debug, Clone)]
pub struct RerouteDetector {
    threshold_m: f64,
    cooldown: Duration,
    window: usize,
    last_trigger_at: Option<Instant>,
    state: RerouteState,
}

impl RerouteDetector {
    pub fn new(threshold_m: f64, cooldown: Duration, window: usize) -> Self {
        Self {
            threshold_m,
            cooldown,
            window,
            last_trigger_at: None,
            state: RerouteState::Idle,
        }
    }

    pub fn from_config(config: &RerouteConfig) -> Self {
        Self::new(config.off_route_threshold_m, config.cooldown(), config.window)
    }

    pub fn state(&self) -> RerouteState {
        self.state
    }

    pub fn reset(&mut self) {
        self.last_trigger_at = None;
        self.state = RerouteState::Idle;
    }

    /// Planar distance in meters from `position` to the route.
    pub fn off_route_distance_m(&self, route: &Route, position: Coordinate, nav_index_hint: usize) -> Option<f64> {
        route
            .nearest_segment(position, nav_index_hint, self.window, DistanceMetric::Planar)
            .map(|hit| hit.offset_m)
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_trigger_at {
            Some(last) => now.saturating_duration_since(last) > self.cooldown,
            None => true,
        }
    }

    /// Checks one live sample. On trigger the detector enters `Requesting`
    /// and the caller is expected to send the returned request.
    pub fn check(
        &mut self,
        route: &Route,
        live: Option<Coordinate>,
        nav_index_hint: usize,
        now: Instant,
        enabled: bool,
    ) -> Option<RerouteRequest> {
        if !enabled {
            return None;
        }
        let position = live?;
        let offset_m = self.off_route_distance_m(route, position, nav_index_hint)?;

        if offset_m <= self.threshold_m
            || !self.cooldown_elapsed(now)
            || self.state == RerouteState::Requesting
        {
            return None;
        }

        let destination = route.destination()?;
        self.state = RerouteState::Requesting;
        self.last_trigger_at = Some(now);
        tracing::info!(offset_m, "off route, requesting a new route");

        Some(RerouteRequest {
            from: position,
            to: destination,
            offset_m,
        })
    }

    /// Back to `Idle`. Returns the replacement route on success; failures
    /// are logged and leave the current route active.
    pub fn complete(&mut self, result: Result<RoutedPath, RoutingError>) -> Option<Route> {
        self.state = RerouteState::Idle;
        match result {
            Ok(path) => {
                let route = path.into_route();
                tracing::info!(points = route.len(), "reroute succeeded");
                Some(route)
            }
            Err(err) => {
                tracing::warn!("reroute failed, keeping current route: {err}");
                None
            }
        }
    }

    /// `check`, request and `complete` in one step.
    pub async fn run<S: RoutingService>(
        &mut self,
        service: &S,
        route: &Route,
        live: Option<Coordinate>,
        nav_index_hint: usize,
        now: Instant,
        enabled: bool,
    ) -> Option<Route> {
        let request = self.check(route, live, nav_index_hint, now, enabled)?;
        let result = service.route(request.from, request.to, Overview::Full).await;
        self.complete(result)
    }
}

impl Default for RerouteDetector {
    fn default() -> Self {
        Self::from_config(&RerouteConfig::default())
    }
}

//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::models::{Coordinate, RouteInfo};
use crate::osrm::{Overview, RoutedPath, RoutingError, RoutingService};

pub fn pt(lat: f64, lon: f64) -> Coordinate {
    Coordinate { lat, lon }
}

pub fn summary(duration_s: f64, distance_m: f64) -> RoutedPath {
    RoutedPath {
        coordinates: Vec::new(),
        info: RouteInfo {
            distance_m,
            duration_s,
        },
    }
}

pub fn full(coordinates: Vec<Coordinate>, duration_s: f64, distance_m: f64) -> RoutedPath {
    RoutedPath {
        coordinates,
        info: RouteInfo {
            distance_m,
            duration_s,
        },
    }
}

/// Replays queued responses in order and records every request.
#[derive(Default)]
pub struct ScriptedRouter {
    responses: Mutex<VecDeque<Result<RoutedPath, RoutingError>>>,
    requests: Mutex<Vec<(Coordinate, Coordinate, Overview)>>,
}

impl ScriptedRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: Result<RoutedPath, RoutingError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<(Coordinate, Coordinate, Overview)> {
        self.requests.lock().unwrap().clone()
    }
}

impl RoutingService for ScriptedRouter {
    async fn route(
        &self,
        from: Coordinate,
        to: Coordinate,
        overview: Overview,
    ) -> Result<RoutedPath, RoutingError> {
        self.requests.lock().unwrap().push((from, to, overview));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(RoutingError::NoRoute))
    }
}

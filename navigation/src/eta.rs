//! ETA Estimator.
//!
//! Polls the routing service for a summary route between the live position
//! and the destination and smooths the returned duration. Failures keep the
//! last good value: a stale ETA beats no ETA.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::EtaConfig;
use crate::models::{Coordinate, EtaUpdate};
use crate::osrm::{Overview, RoutedPath, RoutingError, RoutingService};
use crate::smoothing::Ema;

/// A request the caller should send to the routing service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
}

#[derive(Debug, Clone)]
pub struct EtaEstimator {
    min_interval: Duration,
    duration: Ema,
    last_request_at: Option<Instant>,
    in_flight: bool,
    last_update: Option<EtaUpdate>,
}

impl EtaEstimator {
    pub fn new(min_interval: Duration, smoothing_alpha: f64) -> Self {
        Self {
            min_interval,
            duration: Ema::new(smoothing_alpha),
            last_request_at: None,
            in_flight: false,
            last_update: None,
        }
    }

    pub fn from_config(config: &EtaConfig) -> Self {
        Self::new(config.interval(), config.smoothing_alpha)
    }

    pub fn reset(&mut self) {
        self.duration.reset();
        self.last_request_at = None;
        self.in_flight = false;
        self.last_update = None;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn smoothed_duration_s(&self) -> Option<f64> {
        self.duration.value()
    }

    pub fn last_update(&self) -> Option<EtaUpdate> {
        self.last_update
    }

    /// Decides whether this tick issues a request. When it does, the
    /// estimator is marked in flight until `complete` is called.
    pub fn begin(
        &mut self,
        now: Instant,
        origin: Option<Coordinate>,
        destination: Option<Coordinate>,
        enabled: bool,
    ) -> Option<EtaRequest> {
        if !enabled {
            return None;
        }
        let (origin, destination) = (origin?, destination?);
        if self.in_flight {
            return None;
        }
        if let Some(last) = self.last_request_at {
            if now.saturating_duration_since(last) < self.min_interval {
                return None;
            }
        }

        self.in_flight = true;
        self.last_request_at = Some(now);
        Some(EtaRequest {
            origin,
            destination,
        })
    }

    pub fn complete(&mut self, result: Result<RoutedPath, RoutingError>) -> Option<EtaUpdate> {
        self.in_flight = false;
        match result {
            Ok(path) => {
                let smoothed = self.duration.push(path.info.duration_s);
                let update = EtaUpdate {
                    duration_s: path.info.duration_s,
                    distance_m: path.info.distance_m,
                    smoothed_duration_s: smoothed,
                };
                tracing::debug!(
                    duration_s = update.duration_s,
                    smoothed_s = update.smoothed_duration_s,
                    "eta updated"
                );
                self.last_update = Some(update);
                Some(update)
            }
            Err(err) => {
                tracing::warn!("ETA request failed, keeping previous estimate: {err}");
                None
            }
        }
    }

    /// `begin`, request and `complete` in one step.
    pub async fn poll<S: RoutingService>(
        &mut self,
        service: &S,
        now: Instant,
        origin: Option<Coordinate>,
        destination: Option<Coordinate>,
        enabled: bool,
    ) -> Option<EtaUpdate> {
        let request = self.begin(now, origin, destination, enabled)?;
        let result = service
            .route(request.origin, request.destination, Overview::Summary)
            .await;
        self.complete(result)
    }
}

impl Default for EtaEstimator {
    fn default() -> Self {
        Self::from_config(&EtaConfig::default())
    }
}

//! Route Progress Estimator.
//!
//! Snaps the live position onto the active route inside a bounded window
//! around the navigation index and reports how far there is left to go.

use crate::config::ProgressConfig;
use crate::models::{Coordinate, ProgressState};
use crate::route::{DistanceMetric, Route, RouteId};
use crate::smoothing::Ema;

#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    window: usize,
    remaining: Ema,
    /// Route the smoothing memory belongs to.
    route_id: Option<RouteId>,
}

impl ProgressEstimator {
    pub fn new(window: usize, smoothing_alpha: f64) -> Self {
        Self {
            window,
            remaining: Ema::new(smoothing_alpha),
            route_id: None,
        }
    }

    pub fn from_config(config: &ProgressConfig) -> Self {
        Self::new(config.window, config.smoothing_alpha)
    }

    pub fn reset(&mut self) {
        self.remaining.reset();
        self.route_id = None;
    }

    pub fn smoothed_remaining_km(&self) -> Option<f64> {
        self.remaining.value()
    }

    /// Returns `None` without touching any state when there is no position
    /// or the route has fewer than 2 points.
    pub fn update(
        &mut self,
        route: &Route,
        live: Option<Coordinate>,
        nav_index_hint: usize,
    ) -> Option<ProgressState> {
        let position = live?;
        let hit = route.nearest_segment(position, nav_index_hint, self.window, DistanceMetric::Haversine)?;

        if self.route_id != Some(route.id()) {
            self.remaining.reset();
            self.route_id = Some(route.id());
        }

        let raw = (1.0 - hit.t) * route.segment_length_km(hit.index)
            + route.remaining_from_km(hit.index + 1);
        let smoothed = self.remaining.push(raw);

        tracing::debug!(
            segment = hit.index,
            t = hit.t,
            raw_km = raw,
            smoothed_km = smoothed,
            "route progress"
        );

        Some(ProgressState {
            nearest_segment_index: hit.index,
            fraction_along_segment: hit.t,
            projected_point: hit.projected,
            distance_to_route_km: hit.offset_m / 1000.0,
            raw_remaining_distance_km: raw,
            smoothed_remaining_distance_km: smoothed,
        })
    }
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::from_config(&ProgressConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> Coordinate {
        Coordinate { lat, lon }
    }

    fn equator_route() -> Route {
        Route::new(vec![pt(0.0, 0.0), pt(0.0, 1.0), pt(0.0, 2.0)])
    }

    #[test]
    fn midpoint_of_first_segment() {
        let route = equator_route();
        let mut estimator = ProgressEstimator::default();
        let state = estimator.update(&route, Some(pt(0.0001, 0.5)), 0).unwrap();

        assert_eq!(state.nearest_segment_index, 0);
        assert!((state.fraction_along_segment - 0.5).abs() < 1e-6);
        // Half of the first segment plus the whole second one.
        let expected = 0.5 * route.segment_length_km(0) + route.remaining_from_km(1);
        assert!((state.raw_remaining_distance_km - expected).abs() < 0.01);
        assert!((state.raw_remaining_distance_km - 0.75 * route.total_km()).abs() < 0.01);
        assert_eq!(state.smoothed_remaining_distance_km, state.raw_remaining_distance_km);
    }

    #[test]
    fn recovers_segment_and_fraction_for_on_route_points() {
        let route = Route::new(vec![
            pt(45.0, 5.0),
            pt(45.0, 5.01),
            pt(45.01, 5.01),
            pt(45.01, 5.02),
        ]);
        let mut estimator = ProgressEstimator::default();
        for (segment, t) in [(0usize, 0.3), (1, 0.5), (2, 0.8)] {
            let a = route.points()[segment];
            let b = route.points()[segment + 1];
            let state = estimator.update(&route, Some(a.interpolate(b, t)), segment).unwrap();
            assert_eq!(state.nearest_segment_index, segment);
            assert!((state.fraction_along_segment - t).abs() < 1e-6);
            assert!(state.distance_to_route_km < 1e-6);
        }
    }

    #[test]
    fn no_op_without_position() {
        let mut estimator = ProgressEstimator::default();
        assert!(estimator.update(&equator_route(), None, 0).is_none());
        assert!(estimator.smoothed_remaining_km().is_none());
    }

    #[test]
    fn no_op_on_degenerate_routes() {
        let mut estimator = ProgressEstimator::default();
        assert!(estimator.update(&Route::new(Vec::new()), Some(pt(0.0, 0.0)), 0).is_none());
        assert!(estimator
            .update(&Route::new(vec![pt(0.0, 0.0)]), Some(pt(0.0, 0.0)), 0)
            .is_none());
        assert!(estimator.smoothed_remaining_km().is_none());
    }

    #[test]
    fn smoothing_blends_successive_samples() {
        let route = equator_route();
        let mut estimator = ProgressEstimator::new(60, 0.5);
        let first = estimator.update(&route, Some(pt(0.0, 0.5)), 0).unwrap();
        let second = estimator.update(&route, Some(pt(0.0, 1.5)), 0).unwrap();
        let expected =
            0.5 * second.raw_remaining_distance_km + 0.5 * first.smoothed_remaining_distance_km;
        assert!((second.smoothed_remaining_distance_km - expected).abs() < 1e-9);
    }

    #[test]
    fn converges_when_standing_still() {
        let route = equator_route();
        let mut estimator = ProgressEstimator::default();
        estimator.update(&route, Some(pt(0.0, 0.1)), 0);
        let mut last = None;
        for _ in 0..20 {
            last = estimator.update(&route, Some(pt(0.0, 1.2)), 0);
        }
        let state = last.unwrap();
        assert!((state.smoothed_remaining_distance_km - state.raw_remaining_distance_km).abs() < 0.01);
    }

    #[test]
    fn replacing_the_route_reseeds_smoothing() {
        let mut estimator = ProgressEstimator::new(60, 0.2);
        estimator.update(&equator_route(), Some(pt(0.0, 0.1)), 0);

        let replacement = Route::new(vec![pt(0.0, 1.0), pt(0.0, 2.0)]);
        let state = estimator.update(&replacement, Some(pt(0.0, 1.5)), 0).unwrap();
        assert_eq!(state.smoothed_remaining_distance_km, state.raw_remaining_distance_km);
    }

    #[test]
    fn reset_reseeds_smoothing() {
        let route = equator_route();
        let mut estimator = ProgressEstimator::new(60, 0.2);
        estimator.update(&route, Some(pt(0.0, 0.1)), 0);
        estimator.reset();
        let state = estimator.update(&route, Some(pt(0.0, 1.9)), 0).unwrap();
        assert_eq!(state.smoothed_remaining_distance_km, state.raw_remaining_distance_km);
    }

    #[test]
    fn remaining_never_grows_moving_forward() {
        let route = Route::new((0..30).map(|i| pt(45.0, 5.0 + i as f64 * 0.0005)).collect());
        let mut estimator = ProgressEstimator::default();
        let mut hint = 0;
        let mut previous_raw = f64::INFINITY;
        let mut previous_smoothed = f64::INFINITY;
        for step in 0..=100 {
            let lon = 5.0 + 0.0145 * step as f64 / 100.0;
            let state = estimator.update(&route, Some(pt(45.00003, lon)), hint).unwrap();
            assert!(state.raw_remaining_distance_km <= previous_raw + 1e-9);
            assert!(state.smoothed_remaining_distance_km <= previous_smoothed + 1e-9);
            previous_raw = state.raw_remaining_distance_km;
            previous_smoothed = state.smoothed_remaining_distance_km;
            hint = state.nearest_segment_index;
        }
        assert!(previous_raw < 1e-3);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn city_coord() -> impl Strategy<Value = Coordinate> {
            (44.95..45.05, 4.95..5.05).prop_map(|(lat, lon)| Coordinate { lat, lon })
        }

        proptest! {
            #[test]
            fn prop_state_within_bounds(
                points in prop::collection::vec(city_coord(), 2..50),
                position in city_coord(),
                hint in 0usize..60,
            ) {
                let route = Route::new(points);
                let mut estimator = ProgressEstimator::default();
                let state = estimator.update(&route, Some(position), hint).unwrap();
                prop_assert!(state.nearest_segment_index <= route.len() - 2);
                prop_assert!((0.0..=1.0).contains(&state.fraction_along_segment));
                prop_assert!(state.raw_remaining_distance_km >= 0.0);
                prop_assert!(state.raw_remaining_distance_km <= route.total_km() + 1e-9);
            }

            #[test]
            fn prop_constant_input_converges(raw_lon in 5.0..5.01f64, samples in 5usize..30) {
                let route = Route::new(vec![
                    Coordinate { lat: 45.0, lon: 5.0 },
                    Coordinate { lat: 45.0, lon: 5.01 },
                ]);
                let mut estimator = ProgressEstimator::new(60, 0.9);
                estimator.update(&route, Some(Coordinate { lat: 45.0, lon: 5.0 }), 0);
                let mut state = None;
                for _ in 0..samples {
                    state = estimator.update(&route, Some(Coordinate { lat: 45.0, lon: raw_lon }), 0);
                }
                let state = state.unwrap();
                prop_assert!(
                    (state.smoothed_remaining_distance_km - state.raw_remaining_distance_km).abs() < 1e-3
                );
            }
        }
    }
}

//! Immutable route polyline shared by the estimators.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::geo::{haversine_km, haversine_m, LocalProjection};
use crate::models::{Coordinate, RouteInfo};

static NEXT_ROUTE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a published route. A reroute always yields a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteId(u64);

/// An ordered polyline produced by one routing request.
///
/// Cloning is cheap and never copies the points. The route is never edited
/// once built; replacing it means building a new `Route`.
#[derive(Debug, Clone)]
pub struct Route {
    inner: Arc<RouteData>,
}

#[derive(Debug)]
struct RouteData {
    id: RouteId,
    points: Vec<Coordinate>,
    /// `remaining_km[i]` = distance from point i to the last point.
    remaining_km: Vec<f64>,
    info: Option<RouteInfo>,
}

/// How candidate segments are compared during the windowed search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Great-circle distance from the position to the projected point.
    Haversine,
    /// Euclidean distance in the local projection plane.
    Planar,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentMatch {
    pub index: usize,
    /// Clamped projection parameter along the segment.
    pub t: f64,
    pub projected: Coordinate,
    /// Distance from the position to `projected` in meters, measured with
    /// the requested metric.
    pub offset_m: f64,
}

impl Route {
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self::with_info(points, None)
    }

    pub fn with_info(points: Vec<Coordinate>, info: Option<RouteInfo>) -> Self {
        let remaining_km = suffix_distances_km(&points);
        Self {
            inner: Arc::new(RouteData {
                id: RouteId(NEXT_ROUTE_ID.fetch_add(1, Ordering::Relaxed)),
                points,
                remaining_km,
                info,
            }),
        }
    }

    pub fn id(&self) -> RouteId {
        self.inner.id
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.inner.points
    }

    pub fn len(&self) -> usize {
        self.inner.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.points.is_empty()
    }

    /// Segment-based projection needs at least one segment.
    pub fn is_navigable(&self) -> bool {
        self.len() >= 2
    }

    pub fn info(&self) -> Option<RouteInfo> {
        self.inner.info
    }

    pub fn destination(&self) -> Option<Coordinate> {
        self.inner.points.last().copied()
    }

    pub fn total_km(&self) -> f64 {
        self.remaining_from_km(0)
    }

    /// Distance along the route from point `index` to the destination.
    pub fn remaining_from_km(&self, index: usize) -> f64 {
        self.inner.remaining_km.get(index).copied().unwrap_or(0.0)
    }

    pub fn segment_length_km(&self, index: usize) -> f64 {
        match (self.inner.points.get(index), self.inner.points.get(index + 1)) {
            (Some(a), Some(b)) => haversine_km(*a, *b),
            _ => 0.0,
        }
    }

    /// Segment indices within `window` of `hint`, clamped to `[0, N-2]`.
    pub fn search_window(&self, hint: usize, window: usize) -> Option<RangeInclusive<usize>> {
        if !self.is_navigable() {
            return None;
        }
        let last_segment = self.len() - 2;
        let start = hint.saturating_sub(window).min(last_segment);
        let end = hint.saturating_add(window).min(last_segment);
        Some(start..=end)
    }

    /// Latitude of the route point nearest to `hint`, used as the planar
    /// projection reference.
    pub fn reference_latitude(&self, hint: usize) -> Option<f64> {
        let last = self.len().checked_sub(1)?;
        Some(self.inner.points[hint.min(last)].lat)
    }

    /// Closest point on any segment inside the search window.
    ///
    /// Ties keep the lowest segment index. Returns `None` for routes with
    /// fewer than 2 points or a non-finite position.
    pub fn nearest_segment(
        &self,
        position: Coordinate,
        hint: usize,
        window: usize,
        metric: DistanceMetric,
    ) -> Option<SegmentMatch> {
        let range = self.search_window(hint, window)?;
        let projection = LocalProjection::new(self.reference_latitude(hint)?);
        let (px, py) = projection.to_xy(position);
        let points = self.points();

        let mut best: Option<SegmentMatch> = None;
        for index in range {
            let (ax, ay) = projection.to_xy(points[index]);
            let (bx, by) = projection.to_xy(points[index + 1]);
            let (vx, vy) = (bx - ax, by - ay);
            let (wx, wy) = (px - ax, py - ay);
            let vv = vx * vx + vy * vy;

            let t = if vv == 0.0 { 0.0 } else { (wx * vx + wy * vy) / vv };
            let t = t.clamp(0.0, 1.0);
            let proj_x = ax + t * vx;
            let proj_y = ay + t * vy;
            let projected = projection.to_coordinate(proj_x, proj_y);

            let offset_m = match metric {
                DistanceMetric::Haversine => haversine_m(position, projected),
                DistanceMetric::Planar => ((px - proj_x).powi(2) + (py - proj_y).powi(2)).sqrt(),
            };

            let is_better = match &best {
                Some(prev) => offset_m < prev.offset_m,
                None => offset_m.is_finite(),
            };
            if is_better {
                best = Some(SegmentMatch {
                    index,
                    t,
                    projected,
                    offset_m,
                });
            }
        }

        best
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

fn suffix_distances_km(points: &[Coordinate]) -> Vec<f64> {
    let mut remaining = vec![0.0; points.len()];
    for i in (0..points.len().saturating_sub(1)).rev() {
        remaining[i] = remaining[i + 1] + haversine_km(points[i], points[i + 1]);
    }
    remaining
}

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use navigation::{
    geo::haversine_m, Coordinate, NavigationConfig, NavigationEvent, NavigationSession, Overview,
    Route, RouteInfo, RoutedPath, RoutingError, RoutingService, SessionCommand, SessionHandle,
};
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};

/// Answers every request with a straight line at 10 m/s.
#[derive(Default)]
struct StraightLineRouter {
    requests: Mutex<Vec<Overview>>,
}

impl StraightLineRouter {
    fn count(&self, overview: Overview) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|o| **o == overview)
            .count()
    }
}

impl RoutingService for StraightLineRouter {
    async fn route(
        &self,
        from: Coordinate,
        to: Coordinate,
        overview: Overview,
    ) -> Result<RoutedPath, RoutingError> {
        self.requests.lock().unwrap().push(overview);
        let distance_m = haversine_m(from, to);
        let coordinates = match overview {
            Overview::Full => vec![from, from.interpolate(to, 0.5), to],
            Overview::Summary => Vec::new(),
        };
        Ok(RoutedPath {
            coordinates,
            info: RouteInfo {
                distance_m,
                duration_s: distance_m / 10.0,
            },
        })
    }
}

fn pt(lat: f64, lon: f64) -> Coordinate {
    Coordinate { lat, lon }
}

/// East along the 45th parallel, ~790 m per step.
fn route() -> Route {
    Route::new((0..=5).map(|i| pt(45.0, 5.0 + 0.01 * i as f64)).collect())
}

struct Harness {
    handle: SessionHandle,
    events: UnboundedReceiver<NavigationEvent>,
    router: Arc<StraightLineRouter>,
}

async fn start() -> Harness {
    start_with(NavigationConfig::default()).await
}

async fn start_with(config: NavigationConfig) -> Harness {
    let router = Arc::new(StraightLineRouter::default());
    let (session, events) = NavigationSession::new(config, Arc::clone(&router));
    let handle = session.spawn();
    handle.commands.send(SessionCommand::Start(route())).await.unwrap();
    Harness {
        handle,
        events,
        router,
    }
}

impl Harness {
    async fn position(&self, position: Coordinate) {
        self.handle.positions.send(position).await.unwrap();
    }

    /// Collects events up to and including the first one matching `pred`.
    async fn until(&mut self, pred: impl Fn(&NavigationEvent) -> bool) -> Vec<NavigationEvent> {
        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(120), self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event stream closed");
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn progress_and_eta_follow_the_driver() {
    let mut h = start().await;
    h.until(|e| matches!(e, NavigationEvent::Started { .. })).await;

    h.position(pt(45.0, 5.015)).await;
    let events = h.until(|e| matches!(e, NavigationEvent::Progress(_))).await;
    let Some(NavigationEvent::Progress(progress)) = events.last() else {
        unreachable!()
    };
    assert_eq!(progress.nearest_segment_index, 1);
    assert!((progress.fraction_along_segment - 0.5).abs() < 1e-6);

    let events = h.until(|e| matches!(e, NavigationEvent::Eta(_))).await;
    let Some(NavigationEvent::Eta(eta)) = events.last() else {
        unreachable!()
    };
    let expected_m = haversine_m(pt(45.0, 5.015), pt(45.0, 5.05));
    assert!((eta.distance_m - expected_m).abs() < 1e-6);
    assert_eq!(eta.smoothed_duration_s, eta.duration_s);
}

#[tokio::test(start_paused = true)]
async fn eta_is_polled_on_the_configured_interval() {
    let h = start().await;
    h.position(pt(45.0, 5.001)).await;

    // Ticks at 0 s, 8 s and 16 s.
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(h.router.count(Overview::Summary), 3);
    assert_eq!(h.router.count(Overview::Full), 0);
}

/// Lets the session and its spawned requests run without moving the clock.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn late_ticks_keep_their_schedule() {
    let mut config = NavigationConfig::default();
    config.eta.interval_ms = 1_000;
    let h = start_with(config).await;
    h.position(pt(45.0, 5.001)).await;
    settle().await;
    assert_eq!(h.router.count(Overview::Summary), 1);

    // The 1 s tick is handled 3 ms late, the 2 s tick 1 ms late: the
    // scheduled instants are still exactly one interval apart.
    tokio::time::advance(Duration::from_millis(1_003)).await;
    settle().await;
    assert_eq!(h.router.count(Overview::Summary), 2);

    tokio::time::advance(Duration::from_millis(998)).await;
    settle().await;
    assert_eq!(h.router.count(Overview::Summary), 3);
}

#[tokio::test(start_paused = true)]
async fn leaving_the_route_swaps_in_a_new_one() {
    let mut h = start().await;
    h.position(pt(45.0, 5.001)).await;

    // ~55 m north of the route.
    let off_route = pt(45.0005, 5.002);
    h.position(off_route).await;

    let events = h
        .until(|e| matches!(e, NavigationEvent::RerouteStarted { .. }))
        .await;
    let Some(NavigationEvent::RerouteStarted { from, offset_m }) = events.last() else {
        unreachable!()
    };
    assert_eq!(*from, off_route);
    assert!(*offset_m > 30.0);

    let events = h.until(|e| matches!(e, NavigationEvent::Rerouted { .. })).await;
    let Some(NavigationEvent::Rerouted { route: replacement }) = events.last() else {
        unreachable!()
    };
    assert_eq!(replacement.points()[0], off_route);
    assert_eq!(replacement.destination(), route().destination());
    assert_eq!(h.router.count(Overview::Full), 1);

    // Back on the new route: no further reroute.
    h.position(pt(45.0005, 5.0021)).await;
    h.until(|e| matches!(e, NavigationEvent::Progress(_))).await;
    assert_eq!(h.router.count(Overview::Full), 1);
}

#[tokio::test(start_paused = true)]
async fn arrival_ends_polling() {
    let mut h = start().await;
    h.position(pt(45.0, 5.0499)).await;
    h.until(|e| matches!(e, NavigationEvent::Arrived)).await;

    let polled = h.router.count(Overview::Summary);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.router.count(Overview::Summary), polled);
}

#[tokio::test(start_paused = true)]
async fn stop_ignores_further_positions() {
    let mut h = start().await;
    h.handle.commands.send(SessionCommand::Stop).await.unwrap();
    h.until(|e| matches!(e, NavigationEvent::Stopped)).await;

    h.position(pt(45.0, 5.01)).await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(matches!(h.events.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(h.router.count(Overview::Summary), 0);
}

#[tokio::test(start_paused = true)]
async fn closed_position_stream_stops_the_session() {
    let Harness {
        handle,
        mut events,
        ..
    } = start().await;
    let SessionHandle {
        positions,
        commands,
        task,
    } = handle;

    drop(positions);
    task.await.unwrap();
    drop(commands);

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }
    assert!(matches!(seen.last(), Some(NavigationEvent::Stopped)));
}

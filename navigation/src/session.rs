//! Navigation session: the consumer of the three estimators.
//!
//! A session owns the active route and drives progress, ETA polling and
//! reroute detection from a single event loop. Lifecycle transitions are
//! explicit (`start`, `stop`, `replace_route`) and each one resets the
//! estimators. Network calls run as spawned tasks; their results are tagged
//! with the session generation so anything arriving after a transition is
//! dropped.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::NavigationConfig;
use crate::eta::EtaEstimator;
use crate::geo::haversine_m;
use crate::models::{Coordinate, EtaUpdate, ProgressState};
use crate::osrm::{Overview, RoutedPath, RoutingError, RoutingService};
use crate::progress::ProgressEstimator;
use crate::reroute::RerouteDetector;
use crate::route::Route;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Navigating,
    Arrived,
}

#[derive(Debug, Clone)]
pub enum NavigationEvent {
    Started { route: Route },
    Progress(ProgressState),
    Eta(EtaUpdate),
    RerouteStarted { from: Coordinate, offset_m: f64 },
    Rerouted { route: Route },
    Arrived,
    Stopped,
}

#[derive(Debug, Clone)]
pub enum SessionCommand {
    Start(Route),
    Stop,
    SetEtaEnabled(bool),
    SetRerouteEnabled(bool),
}

#[derive(Debug)]
enum TaskResult {
    Eta {
        generation: u64,
        result: Result<RoutedPath, RoutingError>,
    },
    Reroute {
        generation: u64,
        result: Result<RoutedPath, RoutingError>,
    },
}

pub struct NavigationSession<S> {
    config: NavigationConfig,
    service: Arc<S>,
    state: SessionState,
    route: Option<Route>,
    nav_index: usize,
    last_position: Option<Coordinate>,
    /// Bumped on every lifecycle transition.
    generation: u64,
    /// Set while a spawned request of that kind has not reported back,
    /// whatever its generation.
    eta_outstanding: bool,
    reroute_outstanding: bool,
    eta_enabled: bool,
    reroute_enabled: bool,
    progress: ProgressEstimator,
    eta: EtaEstimator,
    reroute: RerouteDetector,
    events: mpsc::UnboundedSender<NavigationEvent>,
    results_tx: mpsc::UnboundedSender<TaskResult>,
    results_rx: Option<mpsc::UnboundedReceiver<TaskResult>>,
}

/// Channels into a session running on its own task.
pub struct SessionHandle {
    pub positions: mpsc::Sender<Coordinate>,
    pub commands: mpsc::Sender<SessionCommand>,
    pub task: JoinHandle<()>,
}

impl<S> NavigationSession<S>
where
    S: RoutingService + 'static,
{
    pub fn new(
        config: NavigationConfig,
        service: Arc<S>,
    ) -> (Self, mpsc::UnboundedReceiver<NavigationEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let session = Self {
            progress: ProgressEstimator::from_config(&config.progress),
            eta: EtaEstimator::from_config(&config.eta),
            reroute: RerouteDetector::from_config(&config.reroute),
            config,
            service,
            state: SessionState::Idle,
            route: None,
            nav_index: 0,
            last_position: None,
            generation: 0,
            eta_outstanding: false,
            reroute_outstanding: false,
            eta_enabled: true,
            reroute_enabled: true,
            events,
            results_tx,
            results_rx: Some(results_rx),
        };
        (session, events_rx)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn nav_index(&self) -> usize {
        self.nav_index
    }

    pub fn start(&mut self, route: Route) {
        if !route.is_navigable() {
            tracing::warn!(points = route.len(), "starting navigation on a route without segments");
        }
        tracing::info!(points = route.len(), total_km = route.total_km(), "navigation started");
        self.state = SessionState::Navigating;
        self.install_route(route.clone());
        self.emit(NavigationEvent::Started { route });
    }

    pub fn stop(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        tracing::info!("navigation stopped");
        self.state = SessionState::Idle;
        self.route = None;
        self.last_position = None;
        self.reset_estimators();
        self.emit(NavigationEvent::Stopped);
    }

    /// Swaps the active route for a new one, keeping the session running.
    pub fn replace_route(&mut self, route: Route) {
        if self.state != SessionState::Navigating {
            tracing::debug!("ignoring route replacement outside navigation");
            return;
        }
        tracing::info!(points = route.len(), "route replaced");
        self.install_route(route.clone());
        self.emit(NavigationEvent::Rerouted { route });
    }

    fn install_route(&mut self, route: Route) {
        self.route = Some(route);
        self.nav_index = 0;
        self.reset_estimators();
    }

    fn reset_estimators(&mut self) {
        self.generation += 1;
        self.progress.reset();
        self.eta.reset();
        self.reroute.reset();
    }

    pub fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start(route) => self.start(route),
            SessionCommand::Stop => self.stop(),
            SessionCommand::SetEtaEnabled(enabled) => self.eta_enabled = enabled,
            SessionCommand::SetRerouteEnabled(enabled) => self.reroute_enabled = enabled,
        }
    }

    pub fn on_position(&mut self, position: Coordinate, now: Instant) {
        if self.state != SessionState::Navigating {
            return;
        }
        let Some(route) = self.route.clone() else {
            return;
        };
        self.last_position = Some(position);

        if let Some(progress) = self.progress.update(&route, Some(position), self.nav_index) {
            self.nav_index = progress.nearest_segment_index;
            self.emit(NavigationEvent::Progress(progress));

            if self.has_arrived(&route, position, &progress) {
                self.arrive();
                return;
            }
        }

        if self.reroute_outstanding {
            return;
        }
        let request = self.reroute.check(
            &route,
            Some(position),
            self.nav_index,
            now,
            self.reroute_enabled,
        );
        if let Some(request) = request {
            self.emit(NavigationEvent::RerouteStarted {
                from: request.from,
                offset_m: request.offset_m,
            });
            let generation = self.generation;
            self.reroute_outstanding = true;
            self.spawn_request(request.from, request.to, Overview::Full, move |result| {
                TaskResult::Reroute { generation, result }
            });
        }
    }

    /// Both the route length left and the straight line to the destination
    /// must be inside the arrival radius. The projection clamps onto the
    /// final point, so a driver far beside it also reads zero remaining.
    fn has_arrived(&self, route: &Route, position: Coordinate, progress: &ProgressState) -> bool {
        let radius_m = self.config.arrival_radius_m;
        progress.raw_remaining_distance_km * 1000.0 <= radius_m
            && route
                .destination()
                .is_some_and(|destination| haversine_m(position, destination) <= radius_m)
    }

    /// `now` is the scheduled tick instant, not the wall clock at dispatch.
    pub fn on_eta_tick(&mut self, now: Instant) {
        if self.state != SessionState::Navigating || self.eta_outstanding {
            return;
        }
        let destination = self
            .route
            .as_ref()
            .filter(|route| route.is_navigable())
            .and_then(Route::destination);
        if let Some(request) = self
            .eta
            .begin(now, self.last_position, destination, self.eta_enabled)
        {
            let generation = self.generation;
            self.eta_outstanding = true;
            self.spawn_request(
                request.origin,
                request.destination,
                Overview::Summary,
                move |result| TaskResult::Eta { generation, result },
            );
        }
    }

    fn on_task_result(&mut self, result: TaskResult) {
        match result {
            TaskResult::Eta { generation, result } => {
                self.eta_outstanding = false;
                if generation != self.generation {
                    tracing::debug!("discarding ETA result from a previous route");
                    return;
                }
                if let Some(update) = self.eta.complete(result) {
                    self.emit(NavigationEvent::Eta(update));
                }
            }
            TaskResult::Reroute { generation, result } => {
                self.reroute_outstanding = false;
                if generation != self.generation {
                    tracing::debug!("discarding reroute result from a previous route");
                    return;
                }
                if let Some(route) = self.reroute.complete(result) {
                    self.replace_route(route);
                }
            }
        }
    }

    fn arrive(&mut self) {
        tracing::info!("arrived at destination");
        self.state = SessionState::Arrived;
        // In-flight results for this route are no longer wanted.
        self.generation += 1;
        self.emit(NavigationEvent::Arrived);
    }

    fn spawn_request<F>(&self, from: Coordinate, to: Coordinate, overview: Overview, wrap: F)
    where
        F: FnOnce(Result<RoutedPath, RoutingError>) -> TaskResult + Send + 'static,
    {
        let service = Arc::clone(&self.service);
        let results = self.results_tx.clone();
        tokio::spawn(async move {
            let result = service.route(from, to, overview).await;
            // The session may be gone already; nothing to deliver to then.
            let _ = results.send(wrap(result));
        });
    }

    fn emit(&self, event: NavigationEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("navigation event dropped, no listener");
        }
    }

    /// Runs the session until the command channel closes. A closed position
    /// stream (e.g. location permission revoked) stops navigation and ends
    /// the loop.
    pub async fn run(
        mut self,
        mut positions: mpsc::Receiver<Coordinate>,
        mut commands: mpsc::Receiver<SessionCommand>,
    ) {
        let Some(mut results) = self.results_rx.take() else {
            tracing::error!("navigation session is already running");
            return;
        };
        let mut ticker = time::interval(self.config.eta.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command);
                }

                Some(result) = results.recv() => self.on_task_result(result),

                position = positions.recv() => {
                    let Some(position) = position else {
                        tracing::warn!("position stream closed");
                        self.stop();
                        break;
                    };
                    self.on_position(position, Instant::now());
                }

                scheduled = ticker.tick(), if self.state == SessionState::Navigating => {
                    self.on_eta_tick(scheduled);
                }
            }
        }

        self.stop();
    }

    pub fn spawn(self) -> SessionHandle {
        let (positions, positions_rx) = mpsc::channel(64);
        let (commands, commands_rx) = mpsc::channel(8);
        let task = tokio::spawn(self.run(positions_rx, commands_rx));
        SessionHandle {
            positions,
            commands,
            task,
        }
    }
}

use std::{fs::File, io::BufReader, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use navigation::{
    fetch_route,
    format::{format_distance, format_duration},
    geo::parse_coordinate,
    trace::{read_trace, write_route},
    Coordinate, NavigationConfig, NavigationEvent, NavigationSession, OsrmClient, Route,
};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Replay a recorded GPX drive against a live OSRM route"
)]
struct Args {
    /// GPX file whose track points are fed as live positions
    #[arg(long)]
    trace: PathBuf,

    /// Delivery destination as `lat,lon`; defaults to the last trace point
    #[arg(long, value_parser = parse_coordinate)]
    destination: Option<Coordinate>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// OSRM base URL, overrides the config file and OSRM_URL
    #[arg(long)]
    osrm_url: Option<String>,

    /// Delay between two replayed positions
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Write the last followed route (after reroutes) to this GPX file
    #[arg(long)]
    export_route: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "navigation=info,replay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = NavigationConfig::load(args.config.as_deref())?;
    if let Some(url) = args.osrm_url {
        config.services.osrm_url = url;
    }

    let positions = read_trace(BufReader::new(File::open(&args.trace)?))?;
    let (Some(&start), Some(&last)) = (positions.first(), positions.last()) else {
        return Err("trace has no points".into());
    };
    let destination = args.destination.unwrap_or(last);
    tracing::info!(
        "replaying {} positions from {:?}, destination {},{}",
        positions.len(),
        args.trace,
        destination.lat,
        destination.lon
    );

    let client = Arc::new(OsrmClient::new((&config.services).into())?);
    let route = fetch_route(client.as_ref(), start, destination).await?;
    if let Some(info) = route.info() {
        tracing::info!(
            "initial route: {} points, {}, {}",
            route.len(),
            format_distance(info.distance_m),
            format_duration(info.duration_s)
        );
    }

    let (session, events) = NavigationSession::new(config, client);
    let logger = tokio::spawn(log_events(events, route.clone()));
    let handle = session.spawn();

    handle
        .commands
        .send(navigation::SessionCommand::Start(route))
        .await?;
    for position in positions {
        if handle.positions.send(position).await.is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    // Closing both channels ends the session loop, then the event stream.
    drop(handle.positions);
    drop(handle.commands);
    handle.task.await?;
    let followed = logger.await?;

    if let Some(path) = args.export_route {
        write_route(&followed, Some("replay"), File::create(&path)?)?;
        tracing::info!("followed route written to {:?}", path);
    }

    Ok(())
}

/// Logs every event and returns the route that was active last.
async fn log_events(mut events: mpsc::UnboundedReceiver<NavigationEvent>, mut route: Route) -> Route {
    while let Some(event) = events.recv().await {
        match event {
            NavigationEvent::Started { route: started } => {
                tracing::info!("navigation started on {} points", started.len());
                route = started;
            }
            NavigationEvent::Progress(progress) => tracing::info!(
                "segment {} ({:.0}%), {} off route, {} to go",
                progress.nearest_segment_index,
                progress.fraction_along_segment * 100.0,
                format_distance(progress.distance_to_route_km * 1000.0),
                format_distance(progress.smoothed_remaining_distance_km * 1000.0)
            ),
            NavigationEvent::Eta(eta) => tracing::info!(
                "ETA {} for {}",
                format_duration(eta.smoothed_duration_s),
                format_distance(eta.distance_m)
            ),
            NavigationEvent::RerouteStarted { offset_m, .. } => {
                tracing::warn!("{} off route, rerouting", format_distance(offset_m));
            }
            NavigationEvent::Rerouted { route: replacement } => {
                tracing::info!("rerouted onto {} points", replacement.len());
                route = replacement;
            }
            NavigationEvent::Arrived => tracing::info!("arrived"),
            NavigationEvent::Stopped => tracing::info!("navigation stopped"),
        }
    }
    route
}

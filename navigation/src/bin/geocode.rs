use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use navigation::{
    format::format_distance,
    geo::parse_coordinate,
    geocode::{NominatimClient, PhotonClient},
    Coordinate, NavigationConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Provider {
    Photon,
    Nominatim,
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Search an address or place name")]
struct Args {
    /// Free-text query, e.g. "12 cours Jean Jaures Grenoble"
    query: String,

    /// Rank results by distance to this `lat,lon` (Photon only)
    #[arg(long, value_parser = parse_coordinate)]
    near: Option<Coordinate>,

    #[arg(long, value_enum, default_value_t = Provider::Photon)]
    provider: Provider,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of results
    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "navigation=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = NavigationConfig::load(args.config.as_deref())?;
    if let Some(limit) = args.limit {
        config.services.geocode_limit = limit;
    }

    let places = match args.provider {
        Provider::Photon => {
            PhotonClient::from_config(&config.services)?
                .search(&args.query, args.near)
                .await?
        }
        Provider::Nominatim => {
            NominatimClient::from_config(&config.services)?
                .search(&args.query)
                .await?
        }
    };

    if places.is_empty() {
        tracing::info!("no results for {:?}", args.query);
    }
    for place in places {
        let distance = place
            .distance_m
            .map(|d| format!(" ({})", format_distance(d)))
            .unwrap_or_default();
        println!(
            "{:.6},{:.6}  {}{}",
            place.coordinate.lat, place.coordinate.lon, place.label, distance
        );
    }

    Ok(())
}

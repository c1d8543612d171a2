use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";
pub const DEFAULT_PHOTON_URL: &str = "https://photon.komoot.io";
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// The ETA timer never ticks faster than this, whatever the configured interval.
const MIN_ETA_TICK: Duration = Duration::from_millis(1000);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to open config file {path:?}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("`{field}` {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub progress: ProgressConfig,
    pub eta: EtaConfig,
    pub reroute: RerouteConfig,
    /// Distance from the destination, both along the route and in a straight
    /// line, at which it counts as reached.
    pub arrival_radius_m: f64,
    pub services: ServiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Segments searched on each side of the navigation index.
    pub window: usize,
    pub smoothing_alpha: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtaConfig {
    pub interval_ms: u64,
    pub smoothing_alpha: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerouteConfig {
    pub off_route_threshold_m: f64,
    pub cooldown_ms: u64,
    pub window: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub osrm_url: String,
    pub osrm_profile: String,
    pub photon_url: String,
    pub nominatim_url: String,
    /// Sent with every request; Nominatim's usage policy requires one.
    pub user_agent: String,
    pub http_timeout_ms: u64,
    pub geocode_limit: usize,
    pub geocode_cache_size: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            progress: ProgressConfig::default(),
            eta: EtaConfig::default(),
            reroute: RerouteConfig::default(),
            arrival_radius_m: 25.0,
            services: ServiceConfig::default(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            window: 60,
            smoothing_alpha: 0.45,
        }
    }
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            interval_ms: 8_000,
            smoothing_alpha: 0.35,
        }
    }
}

impl Default for RerouteConfig {
    fn default() -> Self {
        Self {
            off_route_threshold_m: 30.0,
            cooldown_ms: 15_000,
            window: 60,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            osrm_url: DEFAULT_OSRM_URL.to_string(),
            osrm_profile: "driving".to_string(),
            photon_url: DEFAULT_PHOTON_URL.to_string(),
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            user_agent: concat!("navigation/", env!("CARGO_PKG_VERSION")).to_string(),
            http_timeout_ms: 10_000,
            geocode_limit: 5,
            geocode_cache_size: 64,
        }
    }
}

impl EtaConfig {
    /// Minimum spacing between two ETA requests.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Period of the polling timer.
    pub fn tick(&self) -> Duration {
        self.interval().max(MIN_ETA_TICK)
    }
}

impl RerouteConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl ServiceConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl NavigationConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Io {
            source,
            path: path.into(),
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// File (or defaults), then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("OSRM_URL") {
            self.services.osrm_url = url;
        }
        if let Some(url) = lookup("PHOTON_URL") {
            self.services.photon_url = url;
        }
        if let Some(url) = lookup("NOMINATIM_URL") {
            self.services.nominatim_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_alpha("progress.smoothing_alpha", self.progress.smoothing_alpha)?;
        check_alpha("eta.smoothing_alpha", self.eta.smoothing_alpha)?;
        if self.eta.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "eta.interval_ms",
                reason: "must be positive",
            });
        }
        if !is_non_negative(self.reroute.off_route_threshold_m) {
            return Err(ConfigError::Invalid {
                field: "reroute.off_route_threshold_m",
                reason: "must be a non-negative number",
            });
        }
        if !is_non_negative(self.arrival_radius_m) {
            return Err(ConfigError::Invalid {
                field: "arrival_radius_m",
                reason: "must be a non-negative number",
            });
        }
        if self.services.geocode_cache_size == 0 {
            return Err(ConfigError::Invalid {
                field: "services.geocode_cache_size",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn check_alpha(field: &'static str, alpha: f64) -> Result<(), ConfigError> {
    if alpha > 0.0 && alpha <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "must be in (0, 1]",
        })
    }
}

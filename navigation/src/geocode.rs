//! Free-text place search against Photon and Nominatim.
//!
//! Both clients keep an LRU cache of raw results keyed by the normalized
//! query and result limit. Photon results are re-ranked by distance to an
//! optional bias point (usually the driver's position) on every call, so
//! the cache stays bias-independent.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use lru::LruCache;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ServiceConfig;
use crate::geo::haversine_m;
use crate::models::{Coordinate, Place};

/// Photon answers garbage for very short prefixes.
pub const MIN_QUERY_LEN: usize = 3;

const UNNAMED_PLACE: &str = "Unnamed place";

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("geocoder answered HTTP {0}")]
    Status(u16),
    #[error("malformed geocoder response: {0}")]
    Deserialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct GeocodeParams {
    pub base_url: String,
    pub limit: usize,
    pub cache_size: usize,
    pub timeout: Duration,
    pub user_agent: String,
}

impl GeocodeParams {
    pub fn photon(config: &ServiceConfig) -> Self {
        Self::with_base_url(config, &config.photon_url)
    }

    pub fn nominatim(config: &ServiceConfig) -> Self {
        Self::with_base_url(config, &config.nominatim_url)
    }

    fn with_base_url(config: &ServiceConfig, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            limit: config.geocode_limit,
            cache_size: config.geocode_cache_size,
            timeout: config.http_timeout(),
            user_agent: config.user_agent.clone(),
        }
    }
}

type CacheKey = (String, usize);

struct PlaceCache {
    inner: Mutex<LruCache<CacheKey, Vec<Place>>>,
}

impl PlaceCache {
    fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<Vec<Place>> {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(key).cloned()
    }

    fn put(&self, key: CacheKey, places: Vec<Place>) {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(key, places);
    }
}

fn cache_key(query: &str, limit: usize) -> CacheKey {
    (query.trim().to_lowercase(), limit)
}

fn http_client(params: &GeocodeParams) -> Result<reqwest::Client, GeocodeError> {
    Ok(reqwest::Client::builder()
        .timeout(params.timeout)
        .user_agent(params.user_agent.clone())
        .build()?)
}

async fn fetch_json<T>(request: reqwest::RequestBuilder) -> Result<T, GeocodeError>
where
    T: serde::de::DeserializeOwned,
{
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(GeocodeError::Status(status.as_u16()));
    }
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Sorts by distance to `bias`, filling `distance_m` along the way.
pub fn rank_by_distance(places: &mut [Place], bias: Coordinate) {
    for place in places.iter_mut() {
        place.distance_m = Some(haversine_m(bias, place.coordinate));
    }
    places.sort_by(|a, b| {
        let a = a.distance_m.unwrap_or(f64::MAX);
        let b = b.distance_m.unwrap_or(f64::MAX);
        a.total_cmp(&b)
    });
}

// Photon: GeoJSON FeatureCollection.

#[derive(Debug, Deserialize)]
struct PhotonResponse {
    #[serde(default)]
    features: Vec<PhotonFeature>,
}

#[derive(Debug, Deserialize)]
struct PhotonFeature {
    geometry: Option<PhotonGeometry>,
    #[serde(default)]
    properties: PhotonProperties,
}

#[derive(Debug, Deserialize)]
struct PhotonGeometry {
    coordinates: Vec<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct PhotonProperties {
    name: Option<String>,
    street: Option<String>,
    housenumber: Option<String>,
    city: Option<String>,
    postcode: Option<String>,
    country: Option<String>,
    label: Option<String>,
}

impl PhotonFeature {
    fn into_place(self) -> Option<Place> {
        let coordinate = match self.geometry?.coordinates.as_slice() {
            [lon, lat, ..] => Coordinate::new(*lat, *lon),
            _ => return None,
        };
        let props = self.properties;
        let name = props
            .name
            .clone()
            .or_else(|| props.street.clone())
            .unwrap_or_else(|| UNNAMED_PLACE.to_string());
        let label = props
            .label
            .clone()
            .or_else(|| props.compose_label())
            .unwrap_or_else(|| name.clone());

        Some(Place {
            name,
            label,
            coordinate,
            distance_m: None,
        })
    }
}

impl PhotonProperties {
    fn compose_label(&self) -> Option<String> {
        let street = match (&self.housenumber, &self.street) {
            (Some(number), Some(street)) => Some(format!("{number} {street}")),
            (None, Some(street)) => Some(street.clone()),
            _ => None,
        };
        let mut parts: Vec<String> = Vec::new();
        for part in [
            self.name.clone(),
            street,
            self.postcode.clone(),
            self.city.clone(),
            self.country.clone(),
        ]
        .into_iter()
        .flatten()
        {
            if !parts.contains(&part) {
                parts.push(part);
            }
        }
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

fn parse_photon(body: PhotonResponse) -> Vec<Place> {
    body.features
        .into_iter()
        .filter_map(PhotonFeature::into_place)
        .collect()
}

pub struct PhotonClient {
    params: GeocodeParams,
    client: reqwest::Client,
    cache: PlaceCache,
}

impl PhotonClient {
    pub fn new(params: GeocodeParams) -> Result<Self, GeocodeError> {
        let client = http_client(&params)?;
        let cache = PlaceCache::new(params.cache_size);
        Ok(Self {
            params,
            client,
            cache,
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, GeocodeError> {
        Self::new(GeocodeParams::photon(config))
    }

    /// Queries shorter than [`MIN_QUERY_LEN`] return nothing without a
    /// request. With a `bias`, results come back nearest first.
    pub async fn search(
        &self,
        query: &str,
        bias: Option<Coordinate>,
    ) -> Result<Vec<Place>, GeocodeError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Ok(Vec::new());
        }

        let key = cache_key(query, self.params.limit);
        let mut places = match self.cache.get(&key) {
            Some(places) => {
                tracing::debug!(query, "photon cache hit");
                places
            }
            None => {
                let url = format!("{}/api/", self.params.base_url);
                let request = self
                    .client
                    .get(url)
                    .query(&[("q", query.to_string()), ("limit", self.params.limit.to_string())]);
                let places = parse_photon(fetch_json(request).await?);
                tracing::debug!(query, results = places.len(), "photon search");
                self.cache.put(key, places.clone());
                places
            }
        };

        if let Some(bias) = bias {
            rank_by_distance(&mut places, bias);
        }
        Ok(places)
    }
}

// Nominatim: flat JSON array, coordinates as strings.

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    name: Option<String>,
}

impl NominatimPlace {
    fn into_place(self) -> Option<Place> {
        let lat = self.lat.parse::<f64>().ok()?;
        let lon = self.lon.parse::<f64>().ok()?;
        let name = self
            .name
            .filter(|name| !name.is_empty())
            .or_else(|| self.display_name.split(',').next().map(|s| s.trim().to_string()))
            .unwrap_or_else(|| UNNAMED_PLACE.to_string());
        Some(Place {
            name,
            label: self.display_name,
            coordinate: Coordinate::new(lat, lon),
            distance_m: None,
        })
    }
}

pub struct NominatimClient {
    params: GeocodeParams,
    client: reqwest::Client,
    cache: PlaceCache,
}

impl NominatimClient {
    pub fn new(params: GeocodeParams) -> Result<Self, GeocodeError> {
        let client = http_client(&params)?;
        let cache = PlaceCache::new(params.cache_size);
        Ok(Self {
            params,
            client,
            cache,
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, GeocodeError> {
        Self::new(GeocodeParams::nominatim(config))
    }

    /// Results keep Nominatim's own ranking.
    pub async fn search(&self, query: &str) -> Result<Vec<Place>, GeocodeError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let key = cache_key(query, self.params.limit);
        if let Some(places) = self.cache.get(&key) {
            return Ok(places);
        }

        let url = format!("{}/search", self.params.base_url);
        let request = self.client.get(url).query(&[
            ("format", "json".to_string()),
            ("q", query.to_string()),
            ("limit", self.params.limit.to_string()),
        ]);
        let raw: Vec<NominatimPlace> = fetch_json(request).await?;
        let places: Vec<Place> = raw.into_iter().filter_map(NominatimPlace::into_place).collect();
        tracing::debug!(query, results = places.len(), "nominatim search");

        self.cache.put(key, places.clone());
        Ok(places)
    }
}

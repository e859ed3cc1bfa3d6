//! External mapping and weather providers, and the cached adapters in front of them.
//!
//! Provider traits return `anyhow::Result`; [`ProviderAdapters`] turns every
//! failure into a cached or neutral value so callers never see an outage.

pub mod adapters;
pub mod cache;
pub mod openweather;
pub mod tomtom;

pub use adapters::{Lookup, ProviderAdapters};
pub use cache::{CacheKey, Capability, ProviderCache};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{Coordinates, RouteStats, TrafficFlow, VehicleClass, WeatherReading};

/// A candidate place returned by free-text address search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceMatch {
    pub address: String,
    pub coordinates: Coordinates,
    pub score: f64,
}

/// Where to ask the weather provider about.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherQuery {
    At(Coordinates),
    Address(String),
}

impl WeatherQuery {
    pub(crate) fn cache_query(&self) -> String {
        match self {
            WeatherQuery::At(c) => format!("{:.3},{:.3}", c.lat, c.lng),
            WeatherQuery::Address(a) => a.trim().to_lowercase(),
        }
    }
}

/// Geocoding, search, traffic and road-routing capabilities of a mapping vendor.
#[async_trait]
pub trait MappingProvider: Send + Sync {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>>;

    async fn reverse_geocode(&self, at: Coordinates) -> Result<Option<String>>;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PlaceMatch>>;

    async fn traffic_flow(&self, at: Coordinates) -> Result<TrafficFlow>;

    /// Road distance and time through `points` in order, or `None` when no route exists.
    async fn route_stats(
        &self,
        points: &[Coordinates],
        class: VehicleClass,
    ) -> Result<Option<RouteStats>>;
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, query: &WeatherQuery) -> Result<WeatherReading>;
}

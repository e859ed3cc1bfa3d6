use anyhow::{Result, anyhow};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::cache::{CacheKey, Capability, ProviderCache};
use super::{MappingProvider, PlaceMatch, WeatherProvider, WeatherQuery};
use crate::config::ProviderConfig;
use crate::model::{Coordinates, RouteStats, TrafficFlow, VehicleClass, WeatherReading};

/// Result of an adapter call and whether it was answered from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup<V> {
    pub value: V,
    pub from_cache: bool,
}

impl<V> Lookup<V> {
    fn fresh(value: V) -> Self {
        Self {
            value,
            from_cache: false,
        }
    }

    fn cached(value: V) -> Self {
        Self {
            value,
            from_cache: true,
        }
    }
}

/// Traffic reading used when the provider is down and nothing is cached.
pub fn neutral_traffic() -> TrafficFlow {
    TrafficFlow::from_speeds(30.0, 40.0)
}

/// Weather reading used when the provider is down and nothing is cached.
pub fn neutral_weather() -> WeatherReading {
    WeatherReading {
        condition: "Clouds".to_string(),
        temperature_c: 25.0,
        wind_speed: 3.0,
        humidity: 60.0,
        pressure: 1013.0,
        visibility: 10000.0,
    }
}

/// Case-folds, trims and collapses whitespace, then appends the region unless
/// the address already names it.
pub fn normalize_address(address: &str, region: Option<&str>) -> String {
    let folded = address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    match region.map(|r| r.trim().to_lowercase()) {
        Some(region) if !region.is_empty() && !folded.contains(&region) => {
            format!("{folded}, {region}")
        }
        _ => folded,
    }
}

fn points_query(points: &[Coordinates], class: VehicleClass) -> String {
    let coords = points
        .iter()
        .map(|p| format!("{:.5},{:.5}", p.lat, p.lng))
        .collect::<Vec<_>>()
        .join(";");
    format!("{}|{}", class.as_str(), coords)
}

/// One adapter per provider capability, each with its own cache, TTL and fallback.
pub struct ProviderAdapters {
    mapping: Arc<dyn MappingProvider>,
    weather: Arc<dyn WeatherProvider>,
    config: ProviderConfig,
    geocodes: ProviderCache<Coordinates>,
    places: ProviderCache<String>,
    searches: ProviderCache<Vec<PlaceMatch>>,
    readings: ProviderCache<WeatherReading>,
    flows: ProviderCache<TrafficFlow>,
    routes: ProviderCache<RouteStats>,
}

impl ProviderAdapters {
    pub fn new(
        mapping: Arc<dyn MappingProvider>,
        weather: Arc<dyn WeatherProvider>,
        config: ProviderConfig,
    ) -> Self {
        let grace = Duration::from_secs(config.stale_grace_secs);
        Self {
            mapping,
            weather,
            config,
            geocodes: ProviderCache::new(grace),
            places: ProviderCache::new(grace),
            searches: ProviderCache::new(grace),
            readings: ProviderCache::new(grace),
            flows: ProviderCache::new(grace),
            routes: ProviderCache::new(grace),
        }
    }

    /// Runs one provider request under the configured timeout.
    async fn bounded<T, Fut>(&self, fetch: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.timeout(), fetch).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("timed out after {:?}", self.config.timeout())),
        }
    }

    /// Cache-first lookup. `fetch` yields `Ok(None)` when the provider answered
    /// but found nothing; such answers are not cached. On error the last cached
    /// value is served if one is still within the grace window.
    async fn lookup<V, Fut>(
        &self,
        cache: &ProviderCache<V>,
        key: CacheKey,
        ttl: Duration,
        fetch: Fut,
    ) -> Lookup<Option<V>>
    where
        V: Clone,
        Fut: Future<Output = Result<Option<V>>>,
    {
        self.lookup_unbounded(cache, key, ttl, self.bounded(fetch)).await
    }

    /// Like `lookup`, for fetches that apply the timeout per request themselves.
    async fn lookup_unbounded<V, Fut>(
        &self,
        cache: &ProviderCache<V>,
        key: CacheKey,
        ttl: Duration,
        fetch: Fut,
    ) -> Lookup<Option<V>>
    where
        V: Clone,
        Fut: Future<Output = Result<Option<V>>>,
    {
        if let Some(value) = cache.get(&key) {
            debug!(capability = %key.capability, query = %key.query, "Provider cache hit");
            return Lookup::cached(Some(value));
        }

        match fetch.await {
            Ok(Some(value)) => {
                cache.insert(key, value.clone(), ttl);
                Lookup::fresh(Some(value))
            }
            Ok(None) => Lookup::fresh(None),
            Err(e) => match cache.get_stale(&key) {
                Some(value) => {
                    warn!(
                        capability = %key.capability,
                        query = %key.query,
                        error = %e,
                        "Provider lookup failed, serving last cached value"
                    );
                    Lookup::cached(Some(value))
                }
                None => {
                    warn!(
                        capability = %key.capability,
                        query = %key.query,
                        error = %e,
                        "Provider lookup failed, no cached value"
                    );
                    Lookup::fresh(None)
                }
            },
        }
    }

    /// Resolves an address to coordinates. `None` means the address could not be placed.
    #[tracing::instrument(skip(self))]
    pub async fn geocode(&self, address: &str) -> Lookup<Option<Coordinates>> {
        let query = normalize_address(address, self.config.region.as_deref());
        let key = CacheKey::new(Capability::Geocode, query.clone());
        let ttl = Duration::from_secs(self.config.geocode_ttl_secs);
        self.lookup(&self.geocodes, key, ttl, self.mapping.geocode(&query))
            .await
    }

    pub async fn reverse_geocode(&self, at: Coordinates) -> Lookup<Option<String>> {
        let key = CacheKey::new(
            Capability::ReverseGeocode,
            format!("{:.5},{:.5}", at.lat, at.lng),
        );
        let ttl = Duration::from_secs(self.config.geocode_ttl_secs);
        self.lookup(&self.places, key, ttl, self.mapping.reverse_geocode(at))
            .await
    }

    /// Free-text address search; empty when the provider is unavailable.
    pub async fn search(&self, query: &str, limit: usize) -> Lookup<Vec<PlaceMatch>> {
        let normalized = normalize_address(query, self.config.region.as_deref());
        let key = CacheKey::new(Capability::AddressSearch, format!("{normalized}|{limit}"));
        let ttl = Duration::from_secs(self.config.search_ttl_secs);
        let fetch = async {
            let matches = self.mapping.search(&normalized, limit).await?;
            Ok((!matches.is_empty()).then_some(matches))
        };
        let lookup = self.lookup(&self.searches, key, ttl, fetch).await;
        Lookup {
            value: lookup.value.unwrap_or_default(),
            from_cache: lookup.from_cache,
        }
    }

    pub async fn weather(&self, query: &WeatherQuery) -> Lookup<WeatherReading> {
        let key = CacheKey::new(Capability::Weather, query.cache_query());
        let ttl = Duration::from_secs(self.config.weather_ttl_secs);
        let fetch = async { self.weather.current(query).await.map(Some) };
        let lookup = self.lookup(&self.readings, key, ttl, fetch).await;
        Lookup {
            value: lookup.value.unwrap_or_else(neutral_weather),
            from_cache: lookup.from_cache,
        }
    }

    pub async fn traffic(&self, at: Coordinates) -> Lookup<TrafficFlow> {
        let key = CacheKey::new(Capability::Traffic, format!("{:.4},{:.4}", at.lat, at.lng));
        let ttl = Duration::from_secs(self.config.traffic_ttl_secs);
        let fetch = async { self.mapping.traffic_flow(at).await.map(Some) };
        let lookup = self.lookup(&self.flows, key, ttl, fetch).await;
        Lookup {
            value: lookup.value.unwrap_or_else(neutral_traffic),
            from_cache: lookup.from_cache,
        }
    }

    /// Road statistics for `points` in order. A failed heavy-vehicle request is
    /// retried once with the passenger-car profile.
    pub async fn route_stats(
        &self,
        points: &[Coordinates],
        class: VehicleClass,
    ) -> Lookup<Option<RouteStats>> {
        if points.len() < 2 {
            return Lookup::fresh(None);
        }
        let key = CacheKey::new(Capability::RouteStats, points_query(points, class));
        let ttl = Duration::from_secs(self.config.route_stats_ttl_secs);
        let fetch = self.fetch_route_stats(points, class);
        self.lookup_unbounded(&self.routes, key, ttl, fetch).await
    }

    async fn fetch_route_stats(
        &self,
        points: &[Coordinates],
        class: VehicleClass,
    ) -> Result<Option<RouteStats>> {
        let car = || self.bounded(self.mapping.route_stats(points, VehicleClass::Car));
        if class == VehicleClass::Car {
            return car().await;
        }

        match self.bounded(self.mapping.route_stats(points, class)).await {
            Ok(Some(stats)) => Ok(Some(stats)),
            Ok(None) => {
                debug!("No truck route found, retrying with car profile");
                car().await
            }
            Err(e) => {
                warn!(error = %e, "Truck route request failed, retrying with car profile");
                car().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Congestion;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FlakyMapping {
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
        hang_truck: std::sync::atomic::AtomicBool,
        classes: Mutex<Vec<VehicleClass>>,
    }

    #[async_trait]
    impl MappingProvider for FlakyMapping {
        async fn geocode(&self, query: &str) -> Result<Option<Coordinates>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(anyhow!("503 from geocoder"));
            }
            Ok(query.contains("pune").then(|| Coordinates::new(18.52, 73.85)))
        }

        async fn reverse_geocode(&self, _at: Coordinates) -> Result<Option<String>> {
            Ok(Some("Shivajinagar, Pune".to_string()))
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<PlaceMatch>> {
            Err(anyhow!("search down"))
        }

        async fn traffic_flow(&self, _at: Coordinates) -> Result<TrafficFlow> {
            Err(anyhow!("traffic down"))
        }

        async fn route_stats(
            &self,
            _points: &[Coordinates],
            class: VehicleClass,
        ) -> Result<Option<RouteStats>> {
            self.classes.lock().unwrap().push(class);
            if class == VehicleClass::Truck && self.hang_truck.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(600)).await;
            }
            match class {
                VehicleClass::Truck => Err(anyhow!("truck profile unsupported")),
                VehicleClass::Car => Ok(Some(RouteStats {
                    distance_km: 12.0,
                    time_min: 25.0,
                    has_tolls: false,
                })),
            }
        }
    }

    struct DownWeather;

    #[async_trait]
    impl WeatherProvider for DownWeather {
        async fn current(&self, _query: &WeatherQuery) -> Result<WeatherReading> {
            Err(anyhow!("weather down"))
        }
    }

    fn adapters(mapping: Arc<FlakyMapping>) -> ProviderAdapters {
        ProviderAdapters::new(mapping, Arc::new(DownWeather), ProviderConfig::default())
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            normalize_address("  12  MG Road,   Pune ", Some("India")),
            "12 mg road, pune, india"
        );
        assert_eq!(
            normalize_address("FC Road, Pune, India", Some("india")),
            "fc road, pune, india"
        );
        assert_eq!(normalize_address("FC Road", None), "fc road");
    }

    #[tokio::test]
    async fn test_geocode_hits_cache_for_equivalent_queries() {
        let mapping = Arc::new(FlakyMapping::default());
        let adapters = adapters(mapping.clone());

        let first = adapters.geocode("FC Road, Pune").await;
        let second = adapters.geocode("  fc road,  PUNE ").await;

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.value, Some(Coordinates::new(18.52, 73.85)));
        assert_eq!(mapping.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_geocode_failure_without_cache_is_none() {
        let mapping = Arc::new(FlakyMapping::default());
        mapping.fail.store(true, Ordering::SeqCst);
        let adapters = adapters(mapping);

        let lookup = adapters.geocode("FC Road, Pune").await;
        assert_eq!(lookup.value, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_geocode_outage_serves_expired_value() {
        let mapping = Arc::new(FlakyMapping::default());
        let adapters = adapters(mapping.clone());

        adapters.geocode("FC Road, Pune").await;
        tokio::time::advance(Duration::from_secs(25 * 60 * 60)).await;
        mapping.fail.store(true, Ordering::SeqCst);

        let lookup = adapters.geocode("FC Road, Pune").await;
        assert!(lookup.from_cache);
        assert_eq!(lookup.value, Some(Coordinates::new(18.52, 73.85)));
        assert_eq!(mapping.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_outages_fall_back_to_neutral_values() {
        let adapters = adapters(Arc::new(FlakyMapping::default()));
        let at = Coordinates::new(18.52, 73.85);

        let traffic = adapters.traffic(at).await;
        assert_eq!(traffic.value.congestion, Congestion::Moderate);
        assert!(!traffic.from_cache);

        let weather = adapters.weather(&WeatherQuery::At(at)).await;
        assert_eq!(weather.value, neutral_weather());

        let search = adapters.search("fc road", 5).await;
        assert!(search.value.is_empty());
    }

    #[tokio::test]
    async fn test_truck_route_retries_with_car_profile() {
        let mapping = Arc::new(FlakyMapping::default());
        let adapters = adapters(mapping.clone());
        let points = [Coordinates::new(18.52, 73.85), Coordinates::new(18.60, 73.90)];

        let lookup = adapters.route_stats(&points, VehicleClass::Truck).await;

        assert_eq!(lookup.value.map(|s| s.distance_km), Some(12.0));
        assert_eq!(
            *mapping.classes.lock().unwrap(),
            vec![VehicleClass::Truck, VehicleClass::Car]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_truck_route_still_retries_with_car_profile() {
        let mapping = Arc::new(FlakyMapping::default());
        mapping.hang_truck.store(true, Ordering::SeqCst);
        let adapters = adapters(mapping.clone());
        let points = [Coordinates::new(18.52, 73.85), Coordinates::new(18.60, 73.90)];

        let lookup = adapters.route_stats(&points, VehicleClass::Truck).await;

        assert_eq!(lookup.value.map(|s| s.distance_km), Some(12.0));
        assert_eq!(
            *mapping.classes.lock().unwrap(),
            vec![VehicleClass::Truck, VehicleClass::Car]
        );
    }

    #[tokio::test]
    async fn test_route_stats_needs_two_points() {
        let adapters = adapters(Arc::new(FlakyMapping::default()));
        let lookup = adapters
            .route_stats(&[Coordinates::new(1.0, 1.0)], VehicleClass::Car)
            .await;
        assert_eq!(lookup.value, None);
    }
}

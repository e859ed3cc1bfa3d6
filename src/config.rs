//! Engine tunables.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides:
//! ```json
//! {
//!   "cost": { "diesel_price_per_litre": 92.5 },
//!   "decision": { "interval_secs": 600, "concurrency": 8 }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cost: CostConfig,
    pub providers: ProviderConfig,
    pub advisor: AdvisorConfig,
    pub synthesis: SynthesisConfig,
    pub decision: DecisionConfig,
}

impl EngineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{path}'"))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file '{path}'"))?;
        Ok(config)
    }
}

/// Rates for the cost model. Currency is whatever the rates are quoted in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub diesel_price_per_litre: f64,
    /// Kilometers per litre assumed for fuel costing.
    pub assumed_mileage_kmpl: f64,
    pub maintenance_per_km: f64,
    pub toll_per_km: f64,
    /// Distance above which tolls are assumed even without provider data.
    pub toll_threshold_km: f64,
    /// Wage per 12 hours of estimated travel.
    pub day_rate: f64,
    pub day_rate_floor: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            diesel_price_per_litre: 90.0,
            assumed_mileage_kmpl: 4.0,
            maintenance_per_km: 3.0,
            toll_per_km: 2.0,
            toll_threshold_km: 100.0,
            day_rate: 1200.0,
            day_rate_floor: 1200.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Appended to geocode queries that don't already mention it.
    pub region: Option<String>,
    pub timeout_secs: u64,
    pub geocode_ttl_secs: u64,
    pub search_ttl_secs: u64,
    pub weather_ttl_secs: u64,
    pub traffic_ttl_secs: u64,
    pub route_stats_ttl_secs: u64,
    /// How long an expired entry is still served when the provider is down.
    pub stale_grace_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: Some("india".to_string()),
            timeout_secs: 5,
            geocode_ttl_secs: 24 * 60 * 60,
            search_ttl_secs: 24 * 60 * 60,
            weather_ttl_secs: 10 * 60,
            traffic_ttl_secs: 5 * 60,
            route_stats_ttl_secs: 60 * 60,
            stale_grace_secs: 24 * 60 * 60,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub timeout_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl AdvisorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Reported distances below this share of the great-circle distance are rejected.
    pub plausibility_floor: f64,
    /// Empirical road/air distance ratio used for corrected estimates.
    pub road_factor: f64,
    pub average_speed_kmh: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            plausibility_floor: 0.9,
            road_factor: 1.35,
            average_speed_kmh: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub interval_secs: u64,
    /// Only routes created within this window are swept.
    pub lookback_hours: i64,
    pub concurrency: usize,
    pub delay_speed_ratio: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5 * 60,
            lookback_hours: 24,
            concurrency: 4,
            delay_speed_ratio: 0.6,
        }
    }
}

impl DecisionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

//! Cost model applied to every synthesized route, whichever path produced it.

use crate::config::CostConfig;
use crate::model::CostBreakdown;

/// Minutes of travel covered by one day-rate unit.
const MINUTES_PER_DAY_RATE: f64 = 12.0 * 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub breakdown: CostBreakdown,
    pub fuel_litres: f64,
    pub diesel_price: f64,
}

/// Stepped wage: one day rate per started 12 hours of travel, never below the floor.
pub fn wage(config: &CostConfig, time_min: f64) -> f64 {
    let units = (time_min.max(0.0) / MINUTES_PER_DAY_RATE).ceil();
    (units * config.day_rate).max(config.day_rate_floor)
}

pub fn tolls_apply(config: &CostConfig, distance_km: f64, provider_reports_tolls: bool) -> bool {
    provider_reports_tolls || distance_km > config.toll_threshold_km
}

pub fn estimate(
    config: &CostConfig,
    distance_km: f64,
    time_min: f64,
    provider_reports_tolls: bool,
) -> CostEstimate {
    let fuel_litres = if config.assumed_mileage_kmpl > 0.0 {
        distance_km / config.assumed_mileage_kmpl
    } else {
        0.0
    };
    let fuel = fuel_litres * config.diesel_price_per_litre;
    let maintenance = distance_km * config.maintenance_per_km;
    let tolls = if tolls_apply(config, distance_km, provider_reports_tolls) {
        distance_km * config.toll_per_km
    } else {
        0.0
    };

    CostEstimate {
        breakdown: CostBreakdown::new(fuel, wage(config, time_min), maintenance, tolls),
        fuel_litres: (fuel_litres * 100.0).round() / 100.0,
        diesel_price: config.diesel_price_per_litre,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CostConfig {
        CostConfig {
            diesel_price_per_litre: 90.0,
            assumed_mileage_kmpl: 4.0,
            maintenance_per_km: 3.0,
            toll_per_km: 2.0,
            toll_threshold_km: 100.0,
            day_rate: 1000.0,
            day_rate_floor: 1500.0,
        }
    }

    #[test]
    fn test_wage_steps_every_twelve_hours() {
        let c = config();
        assert_eq!(wage(&c, 0.0), 1500.0);
        assert_eq!(wage(&c, 720.0), 1500.0);
        assert_eq!(wage(&c, 721.0), 2000.0);
        assert_eq!(wage(&c, 3000.0), 5000.0);
    }

    #[test]
    fn test_short_route_has_no_tolls() {
        let estimate = estimate(&config(), 40.0, 60.0, false);
        let b = estimate.breakdown;
        assert_eq!(b.fuel(), 900.0);
        assert_eq!(b.maintenance(), 120.0);
        assert_eq!(b.tolls(), 0.0);
        assert_eq!(b.time(), 1500.0);
        assert_eq!(b.total(), 2520.0);
        assert_eq!(estimate.fuel_litres, 10.0);
    }

    #[test]
    fn test_tolls_from_provider_or_distance() {
        assert_eq!(estimate(&config(), 40.0, 60.0, true).breakdown.tolls(), 80.0);
        assert_eq!(estimate(&config(), 150.0, 200.0, false).breakdown.tolls(), 300.0);
    }

    #[test]
    fn test_total_matches_parts_for_fractional_inputs() {
        let b = estimate(&config(), 67.4837, 101.2, false).breakdown;
        assert_eq!(b.total(), b.fuel() + b.time() + b.maintenance() + b.tolls());
    }
}

//! Route synthesis: delivery list in, priced and ordered route out.
//!
//! The advisor only ever proposes an ordering and rough numbers. Coordinates
//! come from the geocode adapter, distances are checked against the
//! great-circle lower bound, and costs are always computed locally.

pub mod cost;
pub mod plausibility;

use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use crate::advisor::{self, Advisor, AdvisorResult, SynthesisAdvice, prompt};
use crate::config::EngineConfig;
use crate::error::{AdvisorFailure, SynthesisError};
use crate::geo::{path_distance_km, segment_distances_km};
use crate::model::{
    Coordinates, DeliveryStop, GeneratedBy, PricedRoute, RouteConstraints, RouteLeg, RouteStats,
    TrafficAnalysis, VehicleProfile,
};
use crate::providers::ProviderAdapters;
use plausibility::{DistanceEstimate, DistanceSource};

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub struct SynthesisEngine {
    advisor: Arc<dyn Advisor>,
    adapters: Arc<ProviderAdapters>,
    config: EngineConfig,
}

impl SynthesisEngine {
    pub fn new(advisor: Arc<dyn Advisor>, adapters: Arc<ProviderAdapters>, config: EngineConfig) -> Self {
        Self {
            advisor,
            adapters,
            config,
        }
    }

    pub fn adapters(&self) -> &Arc<ProviderAdapters> {
        &self.adapters
    }

    pub fn advisor(&self) -> &Arc<dyn Advisor> {
        &self.advisor
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds a priced route for `deliveries`.
    ///
    /// Advisor problems of any kind fall back to input order. The only error is
    /// an address that cannot be geocoded.
    #[tracing::instrument(skip_all, fields(stops = deliveries.len(), vehicle = %vehicle.kind))]
    pub async fn synthesize(
        &self,
        deliveries: &[DeliveryStop],
        vehicle: &VehicleProfile,
        constraints: &RouteConstraints,
    ) -> Result<PricedRoute, SynthesisError> {
        let prompt = prompt::synthesis_prompt(deliveries, vehicle, constraints);
        let advise = async {
            if deliveries.is_empty() {
                return AdvisorResult::Unusable(AdvisorFailure::Malformed(
                    "no stops to order".to_string(),
                ));
            }
            advisor::advise_synthesis(
                self.advisor.as_ref(),
                &prompt,
                deliveries.len(),
                self.config.advisor.timeout(),
            )
            .await
        };
        let (advice, resolved) = tokio::join!(advise, self.resolve_stops(deliveries));
        let resolved = resolved?;

        let (order, advice) = match advice {
            AdvisorResult::Verified(advice) => (advice.order.clone(), Some(advice)),
            AdvisorResult::Unusable(_) => ((0..resolved.len()).collect(), None),
        };

        let route: Vec<DeliveryStop> = order.iter().map(|&i| resolved[i].clone()).collect();
        let points: Vec<Coordinates> = route.iter().filter_map(|s| s.coordinates).collect();
        let great_circle = path_distance_km(&points);

        let stats = self
            .adapters
            .route_stats(&points, vehicle.vehicle_class())
            .await
            .value;
        let (reported_km, reported_time) = match (&stats, &advice) {
            (Some(stats), _) => (Some(stats.distance_km), Some(stats.time_min)),
            (None, Some(advice)) => (advice.distance_km, advice.time_min),
            (None, None) => (None, None),
        };

        let estimate =
            plausibility::check(&self.config.synthesis, reported_km, reported_time, great_circle);
        if let DistanceSource::Overridden { reported_km } = estimate.source {
            warn!(
                reported_km,
                great_circle_km = great_circle,
                corrected_km = estimate.distance_km,
                "Reported distance below great-circle floor, overriding"
            );
        }

        let generated_by = match (&advice, estimate.source) {
            (None, _) => GeneratedBy::Fallback,
            (Some(_), DistanceSource::Accepted) => GeneratedBy::AdvisorVerified,
            (Some(_), _) => GeneratedBy::PlausibilityOverride,
        };

        let provider_tolls = stats.is_some_and(|s| s.has_tolls);
        let costs = cost::estimate(
            &self.config.cost,
            estimate.distance_km,
            estimate.time_min,
            provider_tolls,
        );
        let traffic_analysis = self.traffic_analysis(points.first().copied(), &estimate).await;
        let constraints_alert = advice
            .as_ref()
            .and_then(|a| a.constraints_alert.clone())
            .or_else(|| capacity_alert(deliveries, vehicle));
        let reasoning = describe(generated_by, &estimate, great_circle, stats.as_ref(), advice.as_ref());
        let route_legs = legs(&route, &points, &estimate);

        info!(
            generated_by = ?generated_by,
            distance_km = estimate.distance_km,
            time_min = estimate.time_min,
            total_cost = costs.breakdown.total(),
            "Route synthesized"
        );

        Ok(PricedRoute {
            route,
            route_legs,
            total_distance: estimate.distance_km,
            estimated_time: estimate.time_min,
            fuel_required_litres: costs.fuel_litres,
            diesel_price_used: costs.diesel_price,
            cost_breakdown: costs.breakdown,
            traffic_analysis,
            reasoning,
            constraints_alert,
            generated_by,
        })
    }

    /// Geocodes every stop lacking coordinates, all concurrently.
    async fn resolve_stops(
        &self,
        deliveries: &[DeliveryStop],
    ) -> Result<Vec<DeliveryStop>, SynthesisError> {
        let lookups = deliveries.iter().map(|stop| async move {
            if stop.coordinates.is_some() {
                return stop.coordinates;
            }
            self.adapters.geocode(&stop.address).await.value
        });
        let coordinates = join_all(lookups).await;

        deliveries
            .iter()
            .zip(coordinates)
            .map(|(stop, coordinates)| match coordinates {
                Some(c) => Ok(DeliveryStop {
                    coordinates: Some(c),
                    ..stop.clone()
                }),
                None => {
                    warn!(address = %stop.address, "Delivery address could not be geocoded");
                    Err(SynthesisError::LocationUnresolvable {
                        address: stop.address.clone(),
                    })
                }
            })
            .collect()
    }

    async fn traffic_analysis(
        &self,
        start: Option<Coordinates>,
        estimate: &DistanceEstimate,
    ) -> TrafficAnalysis {
        let flow = match start {
            Some(at) => self.adapters.traffic(at).await.value,
            None => crate::providers::adapters::neutral_traffic(),
        };

        let ratio = flow.speed_ratio();
        let delay = if ratio > 0.0 {
            (estimate.time_min * (1.0 / ratio - 1.0)).clamp(0.0, estimate.time_min)
        } else {
            estimate.time_min
        };
        let average_speed = if estimate.time_min > 0.0 {
            estimate.distance_km / (estimate.time_min / 60.0)
        } else {
            self.config.synthesis.average_speed_kmh
        };

        TrafficAnalysis {
            delay_min: delay.round(),
            average_speed_kmh: (average_speed * 10.0).round() / 10.0,
            congestion: flow.congestion,
        }
    }
}

fn capacity_alert(deliveries: &[DeliveryStop], vehicle: &VehicleProfile) -> Option<String> {
    let load: f64 = deliveries.iter().map(|d| d.package.weight).sum();
    (load > vehicle.capacity).then(|| {
        format!(
            "Total package weight {load} exceeds vehicle capacity {}",
            vehicle.capacity
        )
    })
}

/// Splits the total distance across legs in proportion to their straight-line length.
fn legs(route: &[DeliveryStop], points: &[Coordinates], estimate: &DistanceEstimate) -> Vec<RouteLeg> {
    if route.len() < 2 {
        return Vec::new();
    }
    let segments = segment_distances_km(points);
    let great_circle: f64 = segments.iter().sum();
    let count = segments.len() as f64;

    route
        .windows(2)
        .zip(segments.iter())
        .map(|(pair, segment)| {
            let share = if great_circle > 0.0 {
                segment / great_circle
            } else {
                1.0 / count
            };
            RouteLeg {
                from: pair[0].address.clone(),
                to: pair[1].address.clone(),
                distance_km: round2(estimate.distance_km * share),
                time_min: round2(estimate.time_min * share),
            }
        })
        .collect()
}

/// Annotation stating which path produced the numbers.
fn describe(
    generated_by: GeneratedBy,
    estimate: &DistanceEstimate,
    great_circle: f64,
    stats: Option<&RouteStats>,
    advice: Option<&SynthesisAdvice>,
) -> String {
    let source = match (estimate.source, stats) {
        (DistanceSource::Accepted, Some(_)) => "distance from road routing".to_string(),
        (DistanceSource::Accepted, None) => "distance from advisor estimate".to_string(),
        (DistanceSource::Overridden { reported_km }, _) => format!(
            "reported {reported_km:.1} km is below the {great_circle:.1} km straight-line distance; using {:.1} km great-circle estimate",
            estimate.distance_km
        ),
        (DistanceSource::Estimated, _) => format!(
            "no reported distance; using {:.1} km great-circle estimate",
            estimate.distance_km
        ),
    };

    match (generated_by, advice) {
        (GeneratedBy::Fallback, _) => {
            format!("[fallback] advisor unavailable, stops kept in input order; {source}")
        }
        (tag, Some(advice)) => {
            let label = if tag == GeneratedBy::AdvisorVerified {
                "advisor-verified"
            } else {
                "plausibility-override"
            };
            let mut text = format!("[{label}] {source}");
            if advice.clamped > 0 {
                text.push_str(&format!("; {} out-of-range stop index(es) clamped", advice.clamped));
            }
            if !advice.reasoning.is_empty() {
                text.push_str(". ");
                text.push_str(&advice.reasoning);
            }
            text
        }
        (_, None) => format!("[fallback] {source}"),
    }
}

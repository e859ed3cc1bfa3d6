//! Guards reported distances against physically impossible values.

use crate::config::SynthesisConfig;
use crate::geo::km_to_minutes;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceSource {
    /// The reported distance was at least the plausibility floor.
    Accepted,
    /// A reported distance was below the floor and replaced.
    Overridden { reported_km: f64 },
    /// Nothing was reported; the great-circle estimate was used.
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceEstimate {
    pub distance_km: f64,
    pub time_min: f64,
    pub source: DistanceSource,
}

/// Applies the plausibility floor to a reported distance/time pair.
///
/// `great_circle_km` is the straight-line length of the ordered path. A
/// reported distance shorter than `plausibility_floor × great_circle_km` is
/// discarded in favor of `great_circle_km × road_factor`, with time derived
/// from the assumed average speed.
pub fn check(
    config: &SynthesisConfig,
    reported_km: Option<f64>,
    reported_time_min: Option<f64>,
    great_circle_km: f64,
) -> DistanceEstimate {
    let floor = great_circle_km * config.plausibility_floor;
    let derived_time = |km: f64| km_to_minutes(km, config.average_speed_kmh);

    match reported_km {
        Some(km) if km >= floor => DistanceEstimate {
            distance_km: km,
            time_min: reported_time_min
                .filter(|t| *t > 0.0)
                .unwrap_or_else(|| derived_time(km)),
            source: DistanceSource::Accepted,
        },
        Some(km) => {
            let distance_km = great_circle_km * config.road_factor;
            DistanceEstimate {
                distance_km,
                time_min: derived_time(distance_km),
                source: DistanceSource::Overridden { reported_km: km },
            }
        }
        None => {
            let distance_km = great_circle_km * config.road_factor;
            DistanceEstimate {
                distance_km,
                time_min: derived_time(distance_km),
                source: DistanceSource::Estimated,
            }
        }
    }
}

//! Local significance signal and the two-signal gate.
//!
//! The gate is a pure function of the advisor's answer and the live
//! telemetry, so the same inputs always yield the same decision.

use regex::Regex;
use std::sync::LazyLock;

use crate::advisor::ReoptimizationAdvice;
use crate::model::{Congestion, TrafficFlow, WeatherReading};

static SEVERE_WEATHER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)storm|rain|snow|thunder").expect("valid regex"));

static CRITICAL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(critical|major)\b").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignificanceSignal {
    pub speed_ratio: f64,
    pub significant_delay: bool,
    pub severe_weather: bool,
}

impl SignificanceSignal {
    pub fn evaluate(traffic: &TrafficFlow, weather: &WeatherReading, delay_speed_ratio: f64) -> Self {
        let speed_ratio = traffic.speed_ratio();
        Self {
            speed_ratio,
            significant_delay: speed_ratio < delay_speed_ratio
                || traffic.congestion == Congestion::High,
            severe_weather: SEVERE_WEATHER.is_match(&weather.condition),
        }
    }
}

pub fn has_critical_marker(reason: &str) -> bool {
    CRITICAL_MARKER.is_match(reason)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    AdvisorUnavailable,
    AdvisorDeclined,
    NoSecondarySignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Reoptimize,
    Hold(HoldReason),
}

/// Recompute only when the advisor says yes and at least one local signal agrees.
pub fn gate(advice: Option<&ReoptimizationAdvice>, signal: &SignificanceSignal) -> GateDecision {
    let Some(advice) = advice else {
        return GateDecision::Hold(HoldReason::AdvisorUnavailable);
    };
    if !advice.should_reoptimize {
        return GateDecision::Hold(HoldReason::AdvisorDeclined);
    }
    if signal.significant_delay || signal.severe_weather || has_critical_marker(&advice.reason) {
        GateDecision::Reoptimize
    } else {
        GateDecision::Hold(HoldReason::NoSecondarySignal)
    }
}

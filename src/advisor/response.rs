//! Parsing and validation of advisor output.

use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::warn;

use super::AdvisorResult;
use crate::error::AdvisorFailure;

/// A validated route suggestion. `order` is always a permutation of `0..stop_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisAdvice {
    pub order: Vec<usize>,
    pub distance_km: Option<f64>,
    pub time_min: Option<f64>,
    pub reasoning: String,
    pub constraints_alert: Option<String>,
    /// Indices that were out of range and clamped to the first stop.
    pub clamped: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReoptimizationAdvice {
    pub should_reoptimize: bool,
    pub reason: String,
}

/// Pulls the first complete JSON object out of model text, tolerating code
/// fences, surrounding prose and anything after the object.
pub(crate) fn extract_object(text: &str) -> Result<Map<String, Value>, AdvisorFailure> {
    let mut failure = AdvisorFailure::Malformed("no JSON object in response".to_string());

    for (start, _) in text.match_indices('{') {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Object(map))) => return Ok(map),
            Some(Ok(_)) => {}
            Some(Err(e)) => failure = AdvisorFailure::Malformed(e.to_string()),
            None => {}
        }
    }
    Err(failure)
}

fn field<'a>(map: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| map.get(*name))
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .next()
            .and_then(|lead| lead.parse().ok()),
        _ => None,
    }?;
    (n.is_finite() && n >= 0.0).then_some(n)
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Converts 1-based indices into a 0-based permutation of `0..stop_count`.
///
/// Out-of-range entries are clamped to the first stop. Duplicates are then
/// dropped and any stop the advisor left out is appended in input order, so
/// every delivery appears exactly once.
pub(crate) fn repair_order(raw: &[Value], stop_count: usize) -> (Vec<usize>, usize) {
    let mut clamped = 0;
    let mut seen = HashSet::new();
    let mut order = Vec::with_capacity(stop_count);

    for value in raw {
        let index = match number(value).map(|n| n.round() as usize) {
            Some(i) if (1..=stop_count).contains(&i) => i - 1,
            _ => {
                warn!(index = %value, stop_count, "Advisor index out of range, clamping to first stop");
                clamped += 1;
                0
            }
        };
        if seen.insert(index) {
            order.push(index);
        }
    }

    order.extend((0..stop_count).filter(|i| !seen.contains(i)));
    (order, clamped)
}

pub fn parse_synthesis(text_body: &str, stop_count: usize) -> AdvisorResult<SynthesisAdvice> {
    let map = match extract_object(text_body) {
        Ok(map) => map,
        Err(failure) => return AdvisorResult::Unusable(failure),
    };

    let raw = match field(&map, &["optimizedOrder", "optimized_order", "order"]) {
        Some(Value::Array(raw)) if !raw.is_empty() || stop_count == 0 => raw,
        _ => {
            return AdvisorResult::Unusable(AdvisorFailure::Malformed(
                "missing optimizedOrder".to_string(),
            ));
        }
    };

    let (order, clamped) = repair_order(raw, stop_count);

    AdvisorResult::Verified(SynthesisAdvice {
        order,
        distance_km: field(&map, &["totalDistanceKm", "totalDistance", "distanceKm"])
            .and_then(number),
        time_min: field(&map, &["estimatedTimeMin", "estimatedTime", "timeMin"]).and_then(number),
        reasoning: text(field(&map, &["reasoning", "explanation"])).unwrap_or_default(),
        constraints_alert: text(field(&map, &["constraintsAlert", "constraints_alert"])),
        clamped,
    })
}

pub fn parse_reoptimization(text_body: &str) -> AdvisorResult<ReoptimizationAdvice> {
    let map = match extract_object(text_body) {
        Ok(map) => map,
        Err(failure) => return AdvisorResult::Unusable(failure),
    };

    let should_reoptimize = match field(&map, &["shouldReoptimize", "should_reoptimize", "reoptimize"]) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes"),
        _ => {
            return AdvisorResult::Unusable(AdvisorFailure::Malformed(
                "missing shouldReoptimize".to_string(),
            ));
        }
    };

    AdvisorResult::Verified(ReoptimizationAdvice {
        should_reoptimize,
        reason: text(field(&map, &["reason", "reasoning"])).unwrap_or_default(),
    })
}

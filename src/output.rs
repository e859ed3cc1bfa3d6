//! Output formatting and persistence for plans and re-optimization history.

use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::debug;

use crate::model::{Congestion, RealTimeUpdate};

/// Serializes a value as pretty-printed JSON, to `path` or stdout.
pub fn write_json(value: &impl Serialize, path: Option<&str>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

/// Flat CSV row for one [`RealTimeUpdate`].
#[derive(Debug, Serialize)]
struct UpdateRow<'a> {
    timestamp: DateTime<Utc>,
    route_id: String,
    current_speed_kmh: f64,
    free_flow_speed_kmh: f64,
    congestion: Congestion,
    weather: &'a str,
    temperature_c: f64,
    significant_delay: bool,
    severe_weather: bool,
    reoptimized: bool,
    advisor_reason: &'a str,
}

impl<'a> From<&'a RealTimeUpdate> for UpdateRow<'a> {
    fn from(u: &'a RealTimeUpdate) -> Self {
        Self {
            timestamp: u.timestamp,
            route_id: u.route_id.to_string(),
            current_speed_kmh: u.traffic.current_speed_kmh,
            free_flow_speed_kmh: u.traffic.free_flow_speed_kmh,
            congestion: u.traffic.congestion,
            weather: &u.weather.condition,
            temperature_c: u.weather.temperature_c,
            significant_delay: u.significant_delay,
            severe_weather: u.severe_weather,
            reoptimized: u.reoptimized,
            advisor_reason: &u.advisor_reason,
        }
    }
}

/// Appends a [`RealTimeUpdate`] as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_update(path: &str, update: &RealTimeUpdate) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending history record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // headers only on a fresh file
        .from_writer(file);

    writer.serialize(UpdateRow::from(update))?;
    writer.flush()?;

    Ok(())
}

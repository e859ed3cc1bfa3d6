//! TomTom Search, Traffic Flow and Routing APIs.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

use super::{MappingProvider, PlaceMatch};
use crate::fetch::auth::UrlParam;
use crate::fetch::{BasicClient, HttpClient, get_json};
use crate::model::{Coordinates, RouteStats, TrafficFlow, VehicleClass};

const BASE_URL: &str = "https://api.tomtom.com";

pub struct TomTomClient<C> {
    client: C,
    base_url: String,
}

impl TomTomClient<UrlParam<BasicClient>> {
    /// Client authenticated with the `key` query parameter.
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        let inner = BasicClient::new(timeout)?;
        Ok(Self::with_client(UrlParam::new(inner, "key", api_key)))
    }
}

impl<C: HttpClient> TomTomClient<C> {
    pub fn with_client(client: C) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_string(),
        }
    }

    fn url(&self, segments: &[&str], params: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("base url cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }
}

fn point(c: Coordinates) -> String {
    format!("{:.6},{:.6}", c.lat, c.lng)
}

fn position(value: &Value) -> Option<Coordinates> {
    Some(Coordinates::new(value["lat"].as_f64()?, value["lon"].as_f64()?))
}

pub(crate) fn parse_geocode(body: &Value) -> Option<Coordinates> {
    body["results"].as_array()?.first().and_then(|r| position(&r["position"]))
}

pub(crate) fn parse_reverse(body: &Value) -> Option<String> {
    body["addresses"]
        .as_array()?
        .first()?
        .pointer("/address/freeformAddress")?
        .as_str()
        .map(str::to_string)
}

pub(crate) fn parse_search(body: &Value) -> Vec<PlaceMatch> {
    body["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter_map(|r| {
                    Some(PlaceMatch {
                        address: r.pointer("/address/freeformAddress")?.as_str()?.to_string(),
                        coordinates: position(&r["position"])?,
                        score: r["score"].as_f64().unwrap_or(0.0),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_flow(body: &Value) -> Result<TrafficFlow> {
    let data = &body["flowSegmentData"];
    let current = data["currentSpeed"]
        .as_f64()
        .ok_or_else(|| anyhow!("flow response missing currentSpeed"))?;
    let free_flow = data["freeFlowSpeed"]
        .as_f64()
        .ok_or_else(|| anyhow!("flow response missing freeFlowSpeed"))?;
    Ok(TrafficFlow::from_speeds(current, free_flow))
}

pub(crate) fn parse_route(body: &Value) -> Option<RouteStats> {
    let route = body["routes"].as_array()?.first()?;
    let summary = &route["summary"];
    let meters = summary["lengthInMeters"].as_f64()?;
    let seconds = summary["travelTimeInSeconds"].as_f64()?;
    let has_tolls = route["sections"]
        .as_array()
        .is_some_and(|sections| {
            sections
                .iter()
                .any(|s| s["sectionType"].as_str() == Some("TOLL_ROAD"))
        });

    Some(RouteStats {
        distance_km: meters / 1000.0,
        time_min: seconds / 60.0,
        has_tolls,
    })
}

#[async_trait]
impl<C: HttpClient> MappingProvider for TomTomClient<C> {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>> {
        let segment = format!("{query}.json");
        let url = self.url(
            &["search", "2", "geocode", &segment],
            &[("limit", "1".to_string())],
        )?;
        let body: Value = get_json(&self.client, url.as_str()).await?;
        Ok(parse_geocode(&body))
    }

    async fn reverse_geocode(&self, at: Coordinates) -> Result<Option<String>> {
        let segment = format!("{}.json", point(at));
        let url = self.url(&["search", "2", "reverseGeocode", &segment], &[])?;
        let body: Value = get_json(&self.client, url.as_str()).await?;
        Ok(parse_reverse(&body))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PlaceMatch>> {
        let segment = format!("{query}.json");
        let url = self.url(
            &["search", "2", "search", &segment],
            &[("limit", limit.to_string())],
        )?;
        let body: Value = get_json(&self.client, url.as_str()).await?;
        Ok(parse_search(&body))
    }

    async fn traffic_flow(&self, at: Coordinates) -> Result<TrafficFlow> {
        let url = self.url(
            &["traffic", "services", "4", "flowSegmentData", "absolute", "10", "json"],
            &[("point", point(at)), ("unit", "KMPH".to_string())],
        )?;
        let body: Value = get_json(&self.client, url.as_str()).await?;
        parse_flow(&body)
    }

    async fn route_stats(
        &self,
        points: &[Coordinates],
        class: VehicleClass,
    ) -> Result<Option<RouteStats>> {
        let locations = points.iter().map(|p| point(*p)).collect::<Vec<_>>().join(":");
        let url = self.url(
            &["routing", "1", "calculateRoute", &locations, "json"],
            &[
                ("travelMode", class.as_str().to_string()),
                ("traffic", "true".to_string()),
                ("sectionType", "tollRoad".to_string()),
            ],
        )?;
        let body: Value = get_json(&self.client, url.as_str()).await?;
        Ok(parse_route(&body))
    }
}

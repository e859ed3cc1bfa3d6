//! OpenWeather current-conditions API.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

use super::{WeatherProvider, WeatherQuery};
use crate::fetch::auth::UrlParam;
use crate::fetch::{BasicClient, HttpClient, get_json};
use crate::model::WeatherReading;

const CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    weather: Vec<Condition>,
    main: Main,
    #[serde(default)]
    wind: Wind,
    #[serde(default)]
    visibility: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    main: String,
}

#[derive(Debug, Deserialize)]
struct Main {
    temp: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Debug, Default, Deserialize)]
struct Wind {
    #[serde(default)]
    speed: f64,
}

impl TryFrom<CurrentResponse> for WeatherReading {
    type Error = anyhow::Error;

    fn try_from(resp: CurrentResponse) -> Result<Self> {
        let condition = resp
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("weather response has no conditions"))?
            .main;
        Ok(WeatherReading {
            condition,
            temperature_c: resp.main.temp,
            wind_speed: resp.wind.speed,
            humidity: resp.main.humidity,
            pressure: resp.main.pressure,
            visibility: resp.visibility,
        })
    }
}

pub struct OpenWeatherClient<C> {
    client: C,
}

impl OpenWeatherClient<UrlParam<BasicClient>> {
    /// Client authenticated with the `appid` query parameter.
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        let inner = BasicClient::new(timeout)?;
        Ok(Self {
            client: UrlParam::new(inner, "appid", api_key),
        })
    }
}

impl<C: HttpClient> OpenWeatherClient<C> {
    pub fn with_client(client: C) -> Self {
        Self { client }
    }
}

fn current_url(query: &WeatherQuery) -> Result<Url> {
    let mut url = Url::parse(CURRENT_URL)?;
    {
        let mut pairs = url.query_pairs_mut();
        match query {
            WeatherQuery::At(c) => {
                pairs
                    .append_pair("lat", &c.lat.to_string())
                    .append_pair("lon", &c.lng.to_string());
            }
            WeatherQuery::Address(address) => {
                pairs.append_pair("q", address);
            }
        }
        pairs.append_pair("units", "metric");
    }
    Ok(url)
}

#[async_trait]
impl<C: HttpClient> WeatherProvider for OpenWeatherClient<C> {
    async fn current(&self, query: &WeatherQuery) -> Result<WeatherReading> {
        let url = current_url(query)?;
        let resp: CurrentResponse = get_json(&self.client, url.as_str()).await?;
        resp.try_into()
    }
}

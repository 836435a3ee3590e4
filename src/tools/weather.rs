//! OpenWeatherMap toolkit.
//!
//! One capability, `get_weather`: look up the current weather for a
//! human-readable place name and return a flat snapshot with the
//! temperature converted from the provider's native Kelvin to Celsius.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::WeatherConfig;
use crate::error::{NimbusError, Result};
use crate::tool::{Tool, ToolRegistry};

const KELVIN_OFFSET: f64 = 273.15;

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

/// Create the weather toolkit backed by one shared client.
pub fn weather_toolkit(cfg: &WeatherConfig) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(GetWeatherTool::new(WeatherClient::from_config(cfg)?));
    Ok(registry)
}

/// One location's current weather snapshot. Immutable once constructed;
/// serialized to JSON text for the tool-result message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    /// Celsius, converted from the provider's Kelvin reading.
    pub temperature: f64,
    pub city: String,
    pub country: String,
    pub coordinates: Coordinates,
    pub description: String,
    pub pressure: f64,
    pub humidity: f64,
    /// Absent when the provider omits the altitude-adjusted readings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sea_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_level: Option<f64>,
    pub visibility: f64,
    pub wind_speed: f64,
    pub wind_degrees: f64,
    pub clouds: CloudCover,
    /// Provider's observation epoch timestamp.
    pub observed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudCover {
    pub all: f64,
}

/// Synchronous-in-spirit client for the current-weather-by-city endpoint.
/// Single attempt, no retry; a hung call is bounded by the request timeout.
#[derive(Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl WeatherClient {
    pub fn from_config(cfg: &WeatherConfig) -> Result<Self> {
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            NimbusError::Config("missing OpenWeatherMap API key (OPEN_WEATHER_MAP_API_KEY)".into())
        })?;
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|err| NimbusError::ExternalService(format!("http client error: {err}")))?,
            endpoint: cfg.endpoint.clone(),
            api_key,
        })
    }

    pub async fn fetch(&self, location: &str) -> Result<WeatherReport> {
        let url = format!(
            "{}?q={}&appid={}",
            self.endpoint,
            urlencoding::encode(location),
            self.api_key
        );

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| NimbusError::ExternalService(format!("weather request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(NimbusError::ExternalService(format!(
                "weather request for `{location}` failed with {status}: {body}"
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|err| NimbusError::ExternalService(format!("weather body error: {err}")))?;
        tracing::debug!(%location, %body, "weather provider response");

        parse_report(location, &body)
    }
}

/// Validate the provider body at the boundary: any missing required field
/// is a lookup failure, never a partially filled report.
pub fn parse_report(location: &str, body: &str) -> Result<WeatherReport> {
    let raw: CurrentWeatherResponse = serde_json::from_str(body).map_err(|err| {
        NimbusError::ExternalService(format!("malformed weather response for `{location}`: {err}"))
    })?;

    let condition = raw.weather.into_iter().next().ok_or_else(|| {
        NimbusError::ExternalService(format!("weather response for `{location}` has no conditions"))
    })?;

    Ok(WeatherReport {
        location: location.to_string(),
        temperature: kelvin_to_celsius(raw.main.temp),
        city: raw.name,
        country: raw.sys.country,
        coordinates: raw.coord,
        description: condition.description,
        pressure: raw.main.pressure,
        humidity: raw.main.humidity,
        sea_level: raw.main.sea_level,
        ground_level: raw.main.grnd_level,
        visibility: raw.visibility,
        wind_speed: raw.wind.speed,
        wind_degrees: raw.wind.deg,
        clouds: raw.clouds,
        observed_at: raw.dt,
    })
}

pub struct GetWeatherTool {
    client: WeatherClient,
}

impl GetWeatherTool {
    pub fn new(client: WeatherClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get current weather for the given location."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and country, e.g. San Francisco, United States"
                }
            },
            "required": ["location"]
        })
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let location = input
            .get("location")
            .and_then(Value::as_str)
            .filter(|loc| !loc.trim().is_empty())
            .ok_or_else(|| NimbusError::Protocol("missing `location` for get_weather".into()))?;

        let report = self.client.fetch(location).await?;
        Ok(serde_json::to_value(report)?)
    }
}

// Provider wire format. Required fields are non-optional so a missing field
// fails deserialization instead of propagating into the report.
#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    coord: Coordinates,
    weather: Vec<WeatherCondition>,
    main: MainReadings,
    visibility: f64,
    wind: WindReadings,
    clouds: CloudCover,
    dt: i64,
    sys: SysReadings,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WeatherCondition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    pressure: f64,
    humidity: f64,
    #[serde(default)]
    sea_level: Option<f64>,
    #[serde(default)]
    grnd_level: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WindReadings {
    speed: f64,
    deg: f64,
}

#[derive(Debug, Deserialize)]
struct SysReadings {
    country: String,
}

//! Current weather and a short hourly forecast from the Open-Meteo API.
//!
//! The tool never fails at the dispatch level once its arguments validate:
//! upstream trouble is reported inside the payload so the model can explain
//! it to the user.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use stratus_common::tools::{Function, Parameters, Property, Tool};

use crate::{DEFAULT_TOOL_TIMEOUT, ToolImplementation};

/// Public Open-Meteo endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

/// Number of hourly entries in every report.
pub const FORECAST_HOURS: usize = 5;

/// Placeholder for any value the upstream response did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

const NO_DATA_MESSAGE: &str =
    "No current weather data available. Cannot provide weather information.";

const HOURLY_FIELDS: &str =
    "temperature_2m,apparent_temperature,relative_humidity_2m,wind_speed_10m,rain";

/// The `get_weather` tool.
#[derive(Debug, Clone)]
pub struct WeatherTool {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl Default for WeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherTool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Points the tool at another Open-Meteo compatible server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Bounds the HTTP request and the whole execution.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch(&self, lat: f64, lon: f64) -> Result<ForecastResponse> {
        let url = url::Url::parse(&format!("{}/v1/forecast", self.base_url))?;
        debug!("Fetching forecast for ({lat}, {lon}) from {url}");

        let response = self
            .client
            .get(url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("current_weather", "true".to_string()),
                ("hourly", HOURLY_FIELDS.to_string()),
                ("timezone", "auto".to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<ForecastResponse>().await?)
    }
}

#[async_trait]
impl ToolImplementation for WeatherTool {
    fn get_definition(&self) -> Tool {
        Tool::builder()
            .function(Function {
                name: "get_weather".to_string(),
                description: "Get current weather and forecast for the next 5 hours based on latitude and longitude of provided city.".to_string(),
                parameters: Parameters::new()
                    .required("lat", Property::number("Latitude of the location"))
                    .required("lon", Property::number("Longitude of the location")),
            })
            .build()
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let coordinate = |name: &str| {
            args.get(name)
                .and_then(Value::as_f64)
                .ok_or_else(|| anyhow::anyhow!("'{name}' must be a number"))
        };
        let lat = coordinate("lat")?;
        let lon = coordinate("lon")?;

        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Ok(json!({
                "error": format!(
                    "Invalid coordinates ({lat}, {lon}): latitude must be within -90..90 and longitude within -180..180"
                )
            }));
        }

        match self.fetch(lat, lon).await {
            Ok(forecast) => Ok(build_report(forecast)),
            Err(e) => {
                warn!("Weather lookup for ({lat}, {lon}) failed: {e}");
                Ok(json!({ "error": format!("Error fetching weather data: {e}") }))
            }
        }
    }

    fn timeout(&self) -> Duration {
        // Leave headroom so the HTTP timeout fires first and becomes a payload
        self.timeout + Duration::from_secs(1)
    }
}

/// The subset of the Open-Meteo response the tool reads.
#[derive(Debug, Default, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub current_weather: Option<Map<String, Value>>,
    #[serde(default)]
    pub hourly: Option<HourlySeries>,
}

/// Parallel hourly arrays, indexed by hour.
#[derive(Debug, Default, Deserialize)]
pub struct HourlySeries {
    #[serde(default)]
    pub time: Option<Vec<Value>>,
    #[serde(default)]
    pub temperature_2m: Option<Vec<Value>>,
    #[serde(default)]
    pub apparent_temperature: Option<Vec<Value>>,
    #[serde(default)]
    pub relative_humidity_2m: Option<Vec<Value>>,
    #[serde(default)]
    pub wind_speed_10m: Option<Vec<Value>>,
    #[serde(default)]
    pub rain: Option<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct CurrentConditions {
    temperature: Value,
    wind_speed: Value,
    time: Value,
}

#[derive(Debug, Serialize)]
struct HourlyForecast {
    time: Value,
    temperature: Value,
    apparent_temperature: Value,
    relative_humidity: Value,
    wind_speed: Value,
    rain: Value,
}

#[derive(Debug, Serialize)]
struct WeatherReport {
    current_weather: CurrentConditions,
    next_5_hours: Vec<HourlyForecast>,
}

fn or_not_available(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::String(NOT_AVAILABLE.to_string()),
        Some(v) => v.clone(),
    }
}

fn hour(series: Option<&[Value]>, index: usize) -> Value {
    or_not_available(series.and_then(|s| s.get(index)))
}

/// Shapes a raw forecast into the payload handed back to the model.
///
/// Always yields exactly [`FORECAST_HOURS`] hourly entries; anything the
/// upstream omitted is `"N/A"`. An absent or empty `current_weather` yields
/// the `no_data` payload instead.
#[must_use]
pub fn build_report(forecast: ForecastResponse) -> Value {
    let current = match forecast.current_weather {
        Some(current) if !current.is_empty() => current,
        _ => {
            return json!({ "status": "no_data", "message": NO_DATA_MESSAGE });
        }
    };

    let hourly = forecast.hourly.unwrap_or_default();
    let next_5_hours = (0..FORECAST_HOURS)
        .map(|i| HourlyForecast {
            time: hour(hourly.time.as_deref(), i),
            temperature: hour(hourly.temperature_2m.as_deref(), i),
            apparent_temperature: hour(hourly.apparent_temperature.as_deref(), i),
            relative_humidity: hour(hourly.relative_humidity_2m.as_deref(), i),
            wind_speed: hour(hourly.wind_speed_10m.as_deref(), i),
            rain: hour(hourly.rain.as_deref(), i),
        })
        .collect();

    let report = WeatherReport {
        current_weather: CurrentConditions {
            temperature: or_not_available(current.get("temperature")),
            wind_speed: or_not_available(
                current.get("windspeed").or_else(|| current.get("wind_speed")),
            ),
            time: or_not_available(current.get("time")),
        },
        next_5_hours,
    };

    serde_json::to_value(report).unwrap_or_else(
        |e| json!({ "error": format!("Error fetching weather data: {e}") }),
    )
}


#[cfg(test)]
mod proptests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    fn series(len: usize) -> Option<Vec<Value>> {
        Some((0..len).map(|i| json!(i)).collect())
    }

    proptest! {
        #[test]
        fn report_always_has_five_hours(
            time in 0usize..10,
            temperature in 0usize..10,
            apparent in 0usize..10,
            humidity in 0usize..10,
            wind in 0usize..10,
            rain in 0usize..10,
        ) {
            let mut current = Map::new();
            current.insert("temperature".into(), json!(20.0));
            let forecast = ForecastResponse {
                current_weather: Some(current),
                hourly: Some(HourlySeries {
                    time: series(time),
                    temperature_2m: series(temperature),
                    apparent_temperature: series(apparent),
                    relative_humidity_2m: series(humidity),
                    wind_speed_10m: series(wind),
                    rain: series(rain),
                }),
            };

            let report = build_report(forecast);
            let hours = report["next_5_hours"].as_array().unwrap();
            prop_assert_eq!(hours.len(), FORECAST_HOURS);

            for (i, entry) in hours.iter().enumerate() {
                let expected = |len: usize| if i < len { json!(i) } else { json!(NOT_AVAILABLE) };
                prop_assert_eq!(&entry["time"], &expected(time));
                prop_assert_eq!(&entry["temperature"], &expected(temperature));
                prop_assert_eq!(&entry["apparent_temperature"], &expected(apparent));
                prop_assert_eq!(&entry["relative_humidity"], &expected(humidity));
                prop_assert_eq!(&entry["wind_speed"], &expected(wind));
                prop_assert_eq!(&entry["rain"], &expected(rain));
            }
            prop_assert_eq!(&report["current_weather"]["wind_speed"], &json!(NOT_AVAILABLE));
        }
    }
}

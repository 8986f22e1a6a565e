// Weather tools backed by the Open-Meteo forecast API

use crate::upstream::{endpoint, UpstreamClient};
use serde::{Deserialize, Serialize};
use toolhost_core::schema::{
    json_schema_array, json_schema_number, json_schema_number_range, json_schema_object,
    json_schema_string,
};
use toolhost_core::{
    RenderHint, ToolContext, ToolDefinition, ToolError, ToolFailure, ToolHandler, ToolReply,
    UpstreamError,
};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

/// Hours shown in the forecast table; `data` always carries the full series.
const FORECAST_TABLE_ROWS: usize = 24;

#[derive(Debug, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

fn coordinates_schema() -> serde_json::Value {
    json_schema_object(
        serde_json::json!({
            "latitude": json_schema_number_range("Latitude coordinate", -90.0, 90.0),
            "longitude": json_schema_number_range("Longitude coordinate", -180.0, 180.0)
        }),
        vec!["latitude", "longitude"],
    )
}

fn forecast_url(
    base_url: &Url,
    coords: &Coordinates,
    block: &str,
    variables: &str,
) -> Result<Url, UpstreamError> {
    let latitude = coords.latitude.to_string();
    let longitude = coords.longitude.to_string();

    endpoint(
        base_url,
        "v1/forecast",
        &[
            ("latitude", latitude.as_str()),
            ("longitude", longitude.as_str()),
            (block, variables),
        ],
    )
}

// Current conditions

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    current: Option<CurrentBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    temperature_2m: f64,
    wind_speed_10m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWeather {
    pub temperature: f64,
    pub wind_speed: f64,
}

/// Handler for `get-weather`.
pub struct CurrentWeatherHandler {
    client: UpstreamClient,
    base_url: Url,
}

#[async_trait::async_trait]
impl ToolHandler for CurrentWeatherHandler {
    type Input = Coordinates;
    type Output = CurrentWeather;

    async fn call(
        &self,
        input: Coordinates,
        _ctx: &ToolContext,
    ) -> Result<ToolReply<CurrentWeather>, ToolFailure> {
        let url = forecast_url(&self.base_url, &input, "current", "temperature_2m,wind_speed_10m")?;
        let response: CurrentResponse = self.client.get_json(url).await?;

        let current = response
            .current
            .ok_or_else(|| UpstreamError::MissingResult("current conditions".to_string()))?;

        let weather = CurrentWeather {
            temperature: current.temperature_2m,
            wind_speed: current.wind_speed_10m,
        };
        let text = format!(
            "The current temperature is {}°C with wind speed of {} km/h",
            weather.temperature, weather.wind_speed
        );

        Ok(ToolReply::new(text.clone(), weather).with_render(RenderHint::card(
            format!("Weather at {}, {}", input.latitude, input.longitude),
            text,
        )))
    }
}

pub fn current_weather_tool(client: UpstreamClient, base_url: Url) -> Result<ToolDefinition, ToolError> {
    ToolDefinition::builder("get-weather")
        .name("Get Weather")
        .description("Fetches current weather for a pair of coordinates")
        .input_schema(coordinates_schema())
        .output_schema(json_schema_object(
            serde_json::json!({
                "temperature": json_schema_number("Current temperature in Celsius"),
                "windSpeed": json_schema_number("Current wind speed in km/h")
            }),
            vec!["temperature", "windSpeed"],
        ))
        .pricing(0.0, "USD")
        .failure_message("Sorry, I couldn't fetch the current weather right now. Please try again later.")
        .handler(CurrentWeatherHandler { client, base_url })
        .build()
}

// Hourly forecast

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: Option<HourlyBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct HourlyBlock {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<f64>,
    #[serde(default)]
    wind_speed_10m: Vec<f64>,
    #[serde(default)]
    relative_humidity_2m: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    pub times: Vec<String>,
    pub temperatures: Vec<f64>,
    pub wind_speeds: Vec<f64>,
    pub humidity: Vec<f64>,
}

impl WeatherForecast {
    fn table(&self) -> RenderHint {
        let rows = self
            .times
            .iter()
            .enumerate()
            .take(FORECAST_TABLE_ROWS)
            .map(|(i, time)| {
                serde_json::json!({
                    "time": time,
                    "temperature": self.temperatures.get(i),
                    "windSpeed": self.wind_speeds.get(i),
                    "humidity": self.humidity.get(i),
                })
            })
            .collect();

        RenderHint::table(
            &[
                ("time", "Time"),
                ("temperature", "Temperature (°C)"),
                ("windSpeed", "Wind (km/h)"),
                ("humidity", "Humidity (%)"),
            ],
            rows,
        )
    }
}

/// Handler for `get-weather-forecast`.
pub struct WeatherForecastHandler {
    client: UpstreamClient,
    base_url: Url,
}

#[async_trait::async_trait]
impl ToolHandler for WeatherForecastHandler {
    type Input = Coordinates;
    type Output = WeatherForecast;

    async fn call(
        &self,
        input: Coordinates,
        _ctx: &ToolContext,
    ) -> Result<ToolReply<WeatherForecast>, ToolFailure> {
        let url = forecast_url(
            &self.base_url,
            &input,
            "hourly",
            "temperature_2m,relative_humidity_2m,wind_speed_10m",
        )?;
        let response: ForecastResponse = self.client.get_json(url).await?;

        let hourly = response
            .hourly
            .ok_or_else(|| UpstreamError::MissingResult("hourly forecast".to_string()))?;

        let forecast = WeatherForecast {
            times: hourly.time,
            temperatures: hourly.temperature_2m,
            wind_speeds: hourly.wind_speed_10m,
            humidity: hourly.relative_humidity_2m,
        };

        let text = format!(
            "Weather forecast available for the next {} hours",
            forecast.times.len()
        );
        let table = forecast.table();

        Ok(ToolReply::new(text, forecast).with_render(table))
    }
}

pub fn weather_forecast_tool(client: UpstreamClient, base_url: Url) -> Result<ToolDefinition, ToolError> {
    ToolDefinition::builder("get-weather-forecast")
        .name("Get Weather Forecast")
        .description("Fetches hourly weather forecast for a pair of coordinates")
        .input_schema(coordinates_schema())
        .output_schema(json_schema_object(
            serde_json::json!({
                "times": json_schema_array(json_schema_string("ISO 8601 hour"), "Forecast times"),
                "temperatures": json_schema_array(json_schema_number("°C"), "Temperature forecasts in Celsius"),
                "windSpeeds": json_schema_array(json_schema_number("km/h"), "Wind speed forecasts in km/h"),
                "humidity": json_schema_array(json_schema_number("%"), "Relative humidity forecasts in %")
            }),
            vec!["times", "temperatures", "windSpeeds", "humidity"],
        ))
        .pricing(0.0, "USD")
        .failure_message("Sorry, I couldn't fetch the weather forecast right now. Please try again later.")
        .handler(WeatherForecastHandler { client, base_url })
        .build()
}

/// Both weather tools against one Open-Meteo base URL.
pub fn tools(client: &UpstreamClient, base_url: &Url) -> Result<Vec<ToolDefinition>, ToolError> {
    Ok(vec![
        current_weather_tool(client.clone(), base_url.clone())?,
        weather_forecast_tool(client.clone(), base_url.clone())?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ctx, upstream};
    use serde_json::json;
    use toolhost_core::RenderKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_current_weather_maps_fields() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("latitude", "40"))
            .and(query_param("longitude", "-75"))
            .and(query_param("current", "temperature_2m,wind_speed_10m"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "latitude": 40.0,
                "longitude": -75.0,
                "current": {"time": "2024-06-01T12:00", "temperature_2m": 21.5, "wind_speed_10m": 12.0}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, base) = upstream(&server);
        let tool = current_weather_tool(client, base).unwrap();

        let result = tool
            .invoke(json!({"latitude": 40.0, "longitude": -75.0}), &ctx())
            .await
            .unwrap();

        assert_eq!(result.data, Some(json!({"temperature": 21.5, "windSpeed": 12.0})));
        assert!(result.text.contains("21.5"));
        assert!(result.text.contains("12"));
        assert_eq!(result.render_hint.unwrap().kind, RenderKind::Card);
    }

    #[tokio::test]
    async fn test_current_weather_missing_block() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"latitude": 40.0})))
            .mount(&server)
            .await;

        let (client, base) = upstream(&server);
        let tool = current_weather_tool(client, base).unwrap();

        let result = tool
            .invoke(json!({"latitude": 40.0, "longitude": -75.0}), &ctx())
            .await
            .unwrap();

        assert!(result.is_failure());
        assert!(result.text.starts_with("Sorry"));
        assert_eq!(result.render_hint.unwrap().kind, RenderKind::Alert);
    }

    #[tokio::test]
    async fn test_current_weather_upstream_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": true,
                "reason": "Latitude must be in range of -90 to 90°."
            })))
            .mount(&server)
            .await;

        let (client, base) = upstream(&server);
        let tool = current_weather_tool(client, base).unwrap();

        let result = tool
            .invoke(json!({"latitude": 10.0, "longitude": 10.0}), &ctx())
            .await
            .unwrap();
        assert!(result.data.is_none());
    }

    #[tokio::test]
    async fn test_invalid_coordinates_make_no_request() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, base) = upstream(&server);
        let tool = current_weather_tool(client, base).unwrap();

        let err = tool
            .invoke(json!({"latitude": 120.0, "longitude": "east"}), &ctx())
            .await
            .unwrap_err();

        match err {
            ToolError::InputValidation { violations, .. } => {
                let paths: Vec<&str> = violations.iter().map(|v| v.path.as_str()).collect();
                assert!(paths.contains(&"/latitude"));
                assert!(paths.contains(&"/longitude"));
            }
            other => panic!("Expected InputValidation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forecast_maps_series() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("hourly", "temperature_2m,relative_humidity_2m,wind_speed_10m"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hourly": {
                    "time": ["2024-06-01T00:00", "2024-06-01T01:00", "2024-06-01T02:00"],
                    "temperature_2m": [14.1, 13.8, 13.2],
                    "relative_humidity_2m": [81, 83, 85],
                    "wind_speed_10m": [5.4, 4.9, 4.3]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, base) = upstream(&server);
        let tool = weather_forecast_tool(client, base).unwrap();

        let result = tool
            .invoke(json!({"latitude": 52.52, "longitude": 13.41}), &ctx())
            .await
            .unwrap();

        assert_eq!(result.text, "Weather forecast available for the next 3 hours");
        let data = result.data.unwrap();
        assert_eq!(data["times"].as_array().unwrap().len(), 3);
        assert_eq!(data["temperatures"], json!([14.1, 13.8, 13.2]));
        assert_eq!(data["windSpeeds"], json!([5.4, 4.9, 4.3]));
        assert_eq!(data["humidity"], json!([81.0, 83.0, 85.0]));

        let hint = result.render_hint.unwrap();
        assert_eq!(hint.kind, RenderKind::Table);
        assert_eq!(hint.ui_data["rows"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_forecast_tolerates_missing_arrays() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hourly": {"time": ["2024-06-01T00:00"], "temperature_2m": [10.0]}
            })))
            .mount(&server)
            .await;

        let (client, base) = upstream(&server);
        let tool = weather_forecast_tool(client, base).unwrap();

        let result = tool
            .invoke(json!({"latitude": 0.0, "longitude": 0.0}), &ctx())
            .await
            .unwrap();

        let data = result.data.unwrap();
        assert_eq!(data["windSpeeds"], json!([]));
        assert_eq!(data["humidity"], json!([]));
    }

    #[test]
    fn test_tool_ids() {
        let client = UpstreamClient::new(Default::default()).unwrap();
        let base = Url::parse(DEFAULT_BASE_URL).unwrap();
        let ids: Vec<String> = tools(&client, &base)
            .unwrap()
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        assert_eq!(ids, vec!["get-weather", "get-weather-forecast"]);
    }
}

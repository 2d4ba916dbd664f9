use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info};

use crate::config::Config;
use crate::model::WeatherRecord;
use crate::outcome::{StageError, StageOutcome};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches one current-weather observation from OpenWeather and maps it onto
/// the canonical [`WeatherRecord`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    city: String,
    api_key: String,
    base_url: String,
    http: Client,
}

impl Fetcher {
    pub fn new(
        city: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            city: city.into(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            http: Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.city, &config.api_key, &config.api_base_url)
    }

    /// Issue one bounded request and map the payload.
    ///
    /// Every failure mode (transport, non-2xx status, malformed body)
    /// collapses into `StageOutcome::Failed`; callers treat the absence of a
    /// record as "skip the remaining stages", never as a fatal pipeline error.
    /// Nothing is persisted on failure.
    pub async fn fetch_current(&self) -> StageOutcome<WeatherRecord> {
        let url = format!("{}/data/2.5/weather", self.base_url);

        let res = match self
            .http
            .get(&url)
            .query(&[
                ("q", self.city.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => {
                error!(city = %self.city, error = %e, "weather request failed to send");
                return StageOutcome::Failed(StageError::Transport(e.to_string()));
            }
        };

        let status = res.status();
        let body = match res.text().await {
            Ok(body) => body,
            Err(e) => {
                return StageOutcome::Failed(StageError::Transport(format!(
                    "failed to read response body: {e}"
                )));
            }
        };

        if !status.is_success() {
            error!(city = %self.city, %status, "weather request rejected upstream");
            return StageOutcome::Failed(StageError::UpstreamStatus {
                status: status.as_u16(),
                detail: truncate_body(&body),
            });
        }

        let parsed: OwCurrentResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(city = %self.city, error = %e, "weather response body is malformed");
                return StageOutcome::Failed(StageError::MalformedPayload(e.to_string()));
            }
        };

        let Some(condition) = parsed.weather.first() else {
            return StageOutcome::Failed(StageError::MalformedPayload(
                "'weather' array is empty".to_string(),
            ));
        };

        let (Some(sunrise), Some(sunset)) = (
            DateTime::from_timestamp(parsed.sys.sunrise, 0),
            DateTime::from_timestamp(parsed.sys.sunset, 0),
        ) else {
            return StageOutcome::Failed(StageError::MalformedPayload(
                "sunrise/sunset epoch seconds out of range".to_string(),
            ));
        };

        let (timestamp, date, time) = WeatherRecord::temporal_parts(Utc::now());

        let record = WeatherRecord {
            city: self.city.clone(),
            country: parsed.sys.country,
            timestamp,
            date,
            time,
            temperature: parsed.main.temp,
            feels_like: parsed.main.feels_like,
            temp_min: parsed.main.temp_min,
            temp_max: parsed.main.temp_max,
            humidity: parsed.main.humidity,
            pressure: parsed.main.pressure,
            weather: condition.description.clone(),
            weather_main: condition.main.clone(),
            wind_speed: parsed.wind.speed,
            wind_deg: parsed.wind.deg,
            clouds: parsed.clouds.all,
            sunrise,
            sunset,
            visibility: parsed.visibility,
            coord_lat: parsed.coord.lat,
            coord_lon: parsed.coord.lon,
        };

        info!(
            city = %record.city,
            temperature = record.temperature,
            humidity = record.humidity,
            weather = %record.weather,
            "fetched weather observation"
        );

        StageOutcome::Success(record)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    #[serde(default)]
    feels_like: f64,
    #[serde(default)]
    temp_min: f64,
    #[serde(default)]
    temp_max: f64,
    humidity: u8,
    pressure: u32,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
    main: String,
}

#[derive(Debug, Deserialize, Default)]
struct OwWind {
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    deg: u16,
}

#[derive(Debug, Deserialize, Default)]
struct OwClouds {
    #[serde(default)]
    all: u8,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    country: String,
    sunrise: i64,
    sunset: i64,
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

/// Required sections are plain fields: a body missing any of them fails to
/// deserialize and the fetch yields no record. Optional measurements default
/// to zero, never null.
#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    weather: Vec<OwWeather>,
    sys: OwSys,
    coord: OwCoord,
    #[serde(default)]
    wind: OwWind,
    #[serde(default)]
    clouds: OwClouds,
    #[serde(default)]
    visibility: u32,
}

/// Cap an error body for diagnostics, never splitting a UTF-8 character.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn paris_payload() -> serde_json::Value {
        json!({
            "coord": {"lat": 48.85, "lon": 2.35},
            "weather": [{"id": 800, "main": "Clear", "description": "clear sky"}],
            "main": {
                "temp": 15.2,
                "feels_like": 14.1,
                "temp_min": 12.0,
                "temp_max": 17.3,
                "humidity": 60,
                "pressure": 1013
            },
            "wind": {"speed": 3.4, "deg": 220},
            "clouds": {"all": 10},
            "visibility": 10000,
            "sys": {"country": "FR", "sunrise": 1700000000, "sunset": 1700030000},
            "name": "Paris"
        })
    }

    fn mock_fetcher(server: &MockServer) -> Fetcher {
        Fetcher::new("Paris", "TEST_KEY", server.uri())
    }

    #[tokio::test]
    async fn valid_response_maps_to_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "Paris"))
            .and(query_param("appid", "TEST_KEY"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paris_payload()))
            .mount(&server)
            .await;

        let outcome = mock_fetcher(&server).fetch_current().await;
        let record = outcome.success().expect("fetch must succeed");

        assert_eq!(record.city, "Paris");
        assert_eq!(record.country, "FR");
        assert_eq!(record.temperature, 15.2);
        assert_eq!(record.humidity, 60);
        assert_eq!(record.pressure, 1013);
        assert_eq!(record.weather, "clear sky");
        assert_eq!(record.weather_main, "Clear");
        assert_eq!(record.sunrise.timestamp(), 1_700_000_000);
        assert_eq!(record.sunset.timestamp(), 1_700_030_000);
        assert_eq!(record.coord_lat, 48.85);
        assert_eq!(record.coord_lon, 2.35);

        // date/time are projections of the same instant as timestamp
        assert_eq!(record.date.and_time(record.time).and_utc(), record.timestamp);
    }

    #[tokio::test]
    async fn optional_sections_default_to_zero() {
        let mut payload = paris_payload();
        payload.as_object_mut().unwrap().remove("wind");
        payload.as_object_mut().unwrap().remove("clouds");
        payload.as_object_mut().unwrap().remove("visibility");

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload))
            .mount(&server)
            .await;

        let record = mock_fetcher(&server)
            .fetch_current()
            .await
            .success()
            .expect("fetch must succeed");

        assert_eq!(record.wind_speed, 0.0);
        assert_eq!(record.wind_deg, 0);
        assert_eq!(record.clouds, 0);
        assert_eq!(record.visibility, 0);
    }

    #[tokio::test]
    async fn missing_main_section_yields_no_record() {
        let mut payload = paris_payload();
        payload.as_object_mut().unwrap().remove("main");

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload))
            .mount(&server)
            .await;

        let outcome = mock_fetcher(&server).fetch_current().await;

        assert!(matches!(
            outcome,
            StageOutcome::Failed(StageError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn empty_weather_array_yields_no_record() {
        let mut payload = paris_payload();
        payload["weather"] = json!([]);

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload))
            .mount(&server)
            .await;

        let outcome = mock_fetcher(&server).fetch_current().await;

        assert!(matches!(
            outcome,
            StageOutcome::Failed(StageError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn upstream_error_status_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"cod": 401, "message": "Invalid API key"})),
            )
            .mount(&server)
            .await;

        let outcome = mock_fetcher(&server).fetch_current().await;

        match outcome {
            StageOutcome::Failed(StageError::UpstreamStatus { status, detail }) => {
                assert_eq!(status, 401);
                assert!(detail.contains("Invalid API key"));
            }
            other => panic!("expected UpstreamStatus failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_is_surfaced() {
        // Reserve a port, then release it so nothing is listening there.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let outcome = Fetcher::new("Paris", "TEST_KEY", base_url)
            .fetch_current()
            .await;

        assert!(matches!(
            outcome,
            StageOutcome::Failed(StageError::Transport(_))
        ));
    }

    #[test]
    fn long_error_body_is_truncated_on_a_char_boundary() {
        let ascii = "y".repeat(300);
        assert_eq!(truncate_body(&ascii), format!("{}...", "y".repeat(200)));

        // The 200th byte falls inside a two-byte character.
        let body = format!("{}é and more", "x".repeat(199));
        assert_eq!(truncate_body(&body), format!("{}...", "x".repeat(199)));

        assert_eq!(truncate_body("short"), "short");
    }
}

//! Weather API client implementation

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::error::{WeatherError, WeatherResult};
use crate::models::{CurrentConditions, NowcastEnvelope, NowcastItem};

/// KMA open-data API base URL
const WEATHER_API_URL: &str = "http://apis.data.go.kr/1360000";

/// Ultra-short-term nowcast endpoint path
const NOWCAST_PATH: &str = "/VilageFcstInfoService_2.0/getUltraSrtNcst";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 100;

/// Weather API client
#[derive(Clone)]
pub struct WeatherClient {
    http_client: Client,
    service_key: String,
    base_url: String,
    max_retries: u32,
}

impl fmt::Debug for WeatherClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherClient")
            .field("service_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl WeatherClient {
    /// Create a new weather client with the given service key
    ///
    /// # Errors
    /// Returns `WeatherError::MissingServiceKey` if the service key is empty
    pub fn new(service_key: impl Into<String>) -> WeatherResult<Self> {
        let service_key = service_key.into();
        if service_key.is_empty() {
            return Err(WeatherError::MissingServiceKey);
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("Vitalink/1.0")
            .build()?;

        Ok(Self {
            http_client,
            service_key,
            base_url: WEATHER_API_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Create a weather client from environment variable
    ///
    /// Reads `WEATHER_SERVICE_KEY` from the environment.
    ///
    /// # Errors
    /// - `WeatherError::MissingServiceKey` if the variable is not set or is empty
    /// - `WeatherError::InvalidInput` if the variable contains invalid UTF-8
    pub fn from_env() -> WeatherResult<Self> {
        match std::env::var("WEATHER_SERVICE_KEY") {
            Ok(key) if key.is_empty() => Err(WeatherError::MissingServiceKey),
            Ok(key) => Self::new(key),
            Err(std::env::VarError::NotPresent) => Err(WeatherError::MissingServiceKey),
            Err(std::env::VarError::NotUnicode(_)) => Err(WeatherError::InvalidInput(
                "WEATHER_SERVICE_KEY contains invalid UTF-8".to_string(),
            )),
        }
    }

    /// Override the API base URL (test servers, gateways)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Validate a coordinate pair
    fn validate_coordinates(lat: f64, lon: f64) -> WeatherResult<()> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(WeatherError::InvalidInput(format!(
                "latitude out of range: {}",
                lat
            )));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(WeatherError::InvalidInput(format!(
                "longitude out of range: {}",
                lon
            )));
        }
        Ok(())
    }

    /// Convert latitude/longitude to the nowcast grid.
    ///
    /// Approximation of the KMA Lambert projection, anchored on the Korean
    /// peninsula. Good enough for nowcast cell resolution.
    fn to_grid(lat: f64, lon: f64) -> (i32, i32) {
        let nx = ((lon - 124.0) * 10.0) as i32 + 1;
        let ny = ((lat - 33.0) * 10.0) as i32 + 1;
        (nx, ny)
    }

    /// Execute an operation with retry logic for transient failures
    async fn with_retry<T, F, Fut>(&self, operation: F) -> WeatherResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = WeatherResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay_ms = RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
                    warn!(
                        attempt = attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "Weather request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Make a nowcast request and return the raw response body
    async fn make_request(&self, params: &[(&str, &str)]) -> WeatherResult<String> {
        let url = format!("{}{}", self.base_url, NOWCAST_PATH);
        let response = self
            .http_client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WeatherError::Timeout
                } else {
                    WeatherError::Http(e)
                }
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("Weather API rate limited");
            return Err(WeatherError::RateLimited);
        }
        let response = response.error_for_status().map_err(WeatherError::Http)?;

        response.text().await.map_err(WeatherError::Http)
    }

    /// Fold nowcast observation items into `CurrentConditions`
    fn fold_observations(items: &[NowcastItem]) -> WeatherResult<CurrentConditions> {
        let mut temperature = None;
        let mut humidity = None;
        let mut wind_speed = None;
        let mut rainfall = None;

        for item in items {
            let value: Option<f64> = item.obsr_value.trim().parse().ok();
            match item.category.as_str() {
                "T1H" => temperature = value,
                "REH" => humidity = value,
                "WSD" => wind_speed = value,
                "RN1" => rainfall = value,
                _ => {}
            }
        }

        let temperature_c = temperature.ok_or(WeatherError::MissingObservation)?;

        Ok(CurrentConditions {
            temperature_c,
            humidity_pct: humidity.unwrap_or(0.0),
            wind_speed_ms: wind_speed,
            rainfall_mm: rainfall,
        })
    }

    /// Fetch current conditions for a coordinate pair
    ///
    /// # Errors
    /// - `WeatherError::InvalidInput` - If the coordinates are out of range
    /// - `WeatherError::Api` - If the weather API returns an error code
    /// - `WeatherError::MissingObservation` - If no temperature was reported
    /// - `WeatherError::Http` - If the HTTP request fails
    #[instrument(skip(self))]
    pub async fn current_conditions(&self, lat: f64, lon: f64) -> WeatherResult<CurrentConditions> {
        Self::validate_coordinates(lat, lon)?;
        let (nx, ny) = Self::to_grid(lat, lon);

        let now = Utc::now();
        let base_date = now.format("%Y%m%d").to_string();
        let base_time = now.format("%H00").to_string();
        let nx_str = nx.to_string();
        let ny_str = ny.to_string();

        debug!(lat, lon, nx, ny, "Fetching current weather");

        let text = self
            .with_retry(|| async {
                self.make_request(&[
                    ("serviceKey", &self.service_key),
                    ("numOfRows", "10"),
                    ("pageNo", "1"),
                    ("dataType", "JSON"),
                    ("base_date", &base_date),
                    ("base_time", &base_time),
                    ("nx", &nx_str),
                    ("ny", &ny_str),
                ])
                .await
            })
            .await?;

        let envelope: NowcastEnvelope = serde_json::from_str(&text)?;

        let header = &envelope.response.header;
        if header.result_code != "00" {
            return Err(WeatherError::Api {
                code: header.result_code.clone(),
                message: header.result_msg.clone(),
            });
        }

        let items = envelope
            .response
            .body
            .map(|b| b.items.item)
            .unwrap_or_default();

        let conditions = Self::fold_observations(&items)?;

        debug!(
            temperature_c = conditions.temperature_c,
            humidity_pct = conditions.humidity_pct,
            "Current conditions resolved"
        );

        Ok(conditions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn nowcast_body(items: &[(&str, &str)]) -> serde_json::Value {
        let item: Vec<_> = items
            .iter()
            .map(|(category, value)| {
                serde_json::json!({ "category": category, "obsrValue": value })
            })
            .collect();
        serde_json::json!({
            "response": {
                "header": { "resultCode": "00", "resultMsg": "NORMAL_SERVICE" },
                "body": { "items": { "item": item } }
            }
        })
    }

    #[test]
    fn test_client_requires_service_key() {
        let result = WeatherClient::new("");
        assert!(matches!(result, Err(WeatherError::MissingServiceKey)));
    }

    #[test]
    fn test_client_debug_redacts_service_key() {
        let client = WeatherClient::new("secret_key").unwrap();
        let debug_str = format!("{:?}", client);
        assert!(!debug_str.contains("secret_key"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_validate_coordinates_rejects_out_of_range() {
        assert!(WeatherClient::validate_coordinates(91.0, 0.0).is_err());
        assert!(WeatherClient::validate_coordinates(0.0, 181.0).is_err());
        assert!(WeatherClient::validate_coordinates(f64::NAN, 0.0).is_err());
        assert!(WeatherClient::validate_coordinates(37.5, 127.0).is_ok());
    }

    #[test]
    fn test_grid_conversion_seoul() {
        let (nx, ny) = WeatherClient::to_grid(37.5665, 126.9780);
        assert_eq!(nx, 30);
        assert_eq!(ny, 46);
    }

    #[test]
    fn test_fold_observations_requires_temperature() {
        let items = vec![NowcastItem {
            category: "REH".to_string(),
            obsr_value: "55".to_string(),
        }];
        let result = WeatherClient::fold_observations(&items);
        assert!(matches!(result, Err(WeatherError::MissingObservation)));
    }

    #[test]
    fn test_fold_observations_ignores_unknown_categories() {
        let items = vec![
            NowcastItem {
                category: "T1H".to_string(),
                obsr_value: "21.3".to_string(),
            },
            NowcastItem {
                category: "PTY".to_string(),
                obsr_value: "0".to_string(),
            },
        ];
        let conditions = WeatherClient::fold_observations(&items).unwrap();
        assert!((conditions.temperature_c - 21.3).abs() < f64::EPSILON);
        assert!((conditions.humidity_pct - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(WeatherError::Timeout.is_retryable());
        assert!(WeatherError::RateLimited.is_retryable());
        assert!(!WeatherError::MissingServiceKey.is_retryable());
        assert!(!WeatherError::MissingObservation.is_retryable());
    }

    #[tokio::test]
    async fn test_current_conditions_parses_nowcast() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(NOWCAST_PATH))
            .and(query_param("dataType", "JSON"))
            .respond_with(ResponseTemplate::new(200).set_body_json(nowcast_body(&[
                ("T1H", "21.3"),
                ("REH", "55"),
                ("WSD", "2.4"),
            ])))
            .mount(&server)
            .await;

        let client = WeatherClient::new("test_key")
            .unwrap()
            .with_base_url(server.uri());

        let conditions = client.current_conditions(37.5665, 126.9780).await.unwrap();
        assert!((conditions.temperature_c - 21.3).abs() < f64::EPSILON);
        assert!((conditions.humidity_pct - 55.0).abs() < f64::EPSILON);
        assert_eq!(conditions.wind_speed_ms, Some(2.4));
    }

    #[tokio::test]
    async fn test_current_conditions_surfaces_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(NOWCAST_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": {
                    "header": { "resultCode": "30", "resultMsg": "SERVICE_KEY_IS_NOT_REGISTERED_ERROR" }
                }
            })))
            .mount(&server)
            .await;

        let client = WeatherClient::new("bad_key")
            .unwrap()
            .with_base_url(server.uri());

        let result = client.current_conditions(37.5665, 126.9780).await;
        assert!(matches!(result, Err(WeatherError::Api { code, .. }) if code == "30"));
    }
}

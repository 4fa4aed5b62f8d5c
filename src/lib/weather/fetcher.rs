use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::*;

use super::types::{WeatherReading, UNKNOWN_CONDITION};

pub const MAX_ATTEMPTS: u32 = 3;
pub const MAX_BODY_BYTES: usize = 1 << 20;

const USER_AGENT: &str = "curl/8.4.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("invalid weather payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no current condition in weather payload")]
    NoCurrentCondition,

    #[error("failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

/// Status code and (capped) body of a single upstream GET.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse, FetchError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .tcp_keepalive(TCP_KEEPALIVE)
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()
            .map_err(|error| FetchError::Transport(error.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| FetchError::Transport(error.to_string()))?;

        let status = response.status().as_u16();
        if status != reqwest::StatusCode::OK.as_u16() {
            return Ok(RawResponse {
                status,
                body: Vec::new(),
            });
        }

        // Anything past the cap is dropped, the JSON parser rejects the truncated body
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|error| FetchError::Transport(error.to_string()))?
        {
            let remaining = MAX_BODY_BYTES - body.len();
            if chunk.len() >= remaining {
                body.extend_from_slice(&chunk[..remaining]);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(RawResponse { status, body })
    }
}

/// Retrieves the current weather for the configured location.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    url: String,
    location: String,
}

impl Fetcher {
    pub fn new(base_url: &str, location: &str) -> Result<Self, FetchError> {
        Ok(Self::with_transport(
            Arc::new(HttpTransport::new()?),
            base_url,
            location,
        ))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, base_url: &str, location: &str) -> Self {
        Self {
            transport,
            url: format!("{}/{location}?format=j1", base_url.trim_end_matches('/')),
            location: location.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Transport failures and non-200 answers are retried with exponential backoff,
    /// a body that does not parse is returned as an error right away.
    #[instrument(level = "debug", skip(self), fields(url = %self.url))]
    pub async fn fetch(&self) -> Result<WeatherReading, FetchError> {
        let mut attempt = 1;

        loop {
            let error = match self.attempt().await {
                Ok(body) => return parse_reading(&body, &self.location),
                Err(error) => error,
            };

            if attempt >= MAX_ATTEMPTS {
                warn!("Weather fetch attempt {attempt}/{MAX_ATTEMPTS} failed: {error}");
                return Err(FetchError::Exhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let delay = backoff_delay(attempt);
            warn!("Weather fetch attempt {attempt}/{MAX_ATTEMPTS} failed: {error}, retrying in {delay:?}");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self) -> Result<Vec<u8>, FetchError> {
        let response = self.transport.get(&self.url).await?;
        if response.status != 200 {
            return Err(FetchError::Status(response.status));
        }

        Ok(response.body)
    }
}

/// 1s after the first failure, 2s after the second, and so on.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(16))
}

#[derive(Debug, Default, Deserialize)]
struct WttrResponse {
    #[serde(default)]
    nearest_area: Vec<NearestArea>,
    #[serde(default)]
    current_condition: Vec<CurrentCondition>,
}

#[derive(Debug, Default, Deserialize)]
struct NearestArea {
    #[serde(rename = "areaName", default)]
    area_name: Vec<TextValue>,
}

#[derive(Debug, Default, Deserialize)]
struct CurrentCondition {
    #[serde(rename = "temp_C", default)]
    temp_c: Value,
    #[serde(default)]
    humidity: Value,
    #[serde(rename = "weatherDesc", default)]
    weather_desc: Vec<TextValue>,
}

#[derive(Debug, Default, Deserialize)]
struct TextValue {
    #[serde(default)]
    value: Value,
}

impl TextValue {
    fn text(&self) -> Option<&str> {
        self.value.as_str().filter(|text| !text.is_empty())
    }
}

// wttr.in sends numbers as strings, anything unparsable becomes 0
fn lenient_integer(value: &Value) -> i64 {
    match value {
        Value::String(text) => text.trim().parse().unwrap_or(0),
        Value::Number(number) => number.as_i64().unwrap_or(0),
        _ => 0,
    }
}

pub fn parse_reading(body: &[u8], fallback_location: &str) -> Result<WeatherReading, FetchError> {
    let payload: WttrResponse = serde_json::from_slice(body)?;

    let current = payload
        .current_condition
        .first()
        .ok_or(FetchError::NoCurrentCondition)?;

    let location = payload
        .nearest_area
        .first()
        .and_then(|area| area.area_name.first())
        .and_then(TextValue::text)
        .unwrap_or(fallback_location);

    let condition = current
        .weather_desc
        .first()
        .and_then(TextValue::text)
        .unwrap_or(UNKNOWN_CONDITION);

    Ok(WeatherReading {
        location: location.to_string(),
        temperature_c: lenient_integer(&current.temp_c),
        condition: condition.to_string(),
        humidity_pct: lenient_integer(&current.humidity),
        updated_at: Utc::now(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use tracing_test::traced_test;

    use super::*;

    pub const SLEMAN_PAYLOAD: &str = r#"{
        "current_condition": [
            {"temp_C": "28", "humidity": "60", "weatherDesc": [{"value": "Sunny"}]}
        ],
        "nearest_area": [{"areaName": [{"value": "Sleman"}]}]
    }"#;

    pub enum Scripted {
        Fail,
        Status(u16),
        Body(&'static str),
    }

    /// Answers each GET with the next scripted outcome and records when it was called.
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        pub calls: Mutex<Vec<tokio::time::Instant>>,
    }

    impl ScriptedTransport {
        pub fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, _url: &str) -> Result<RawResponse, FetchError> {
            self.calls.lock().unwrap().push(tokio::time::Instant::now());

            match self.script.lock().unwrap().pop_front() {
                Some(Scripted::Fail) | None => {
                    Err(FetchError::Transport("connection refused".into()))
                }
                Some(Scripted::Status(status)) => Ok(RawResponse {
                    status,
                    body: Vec::new(),
                }),
                Some(Scripted::Body(body)) => Ok(RawResponse {
                    status: 200,
                    body: body.as_bytes().to_vec(),
                }),
            }
        }
    }

    #[test]
    fn request_url() {
        let transport = ScriptedTransport::new(vec![]);
        let fetcher = Fetcher::with_transport(transport, "https://wttr.in/", "Sleman");
        assert_eq!(fetcher.url(), "https://wttr.in/Sleman?format=j1");
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn gives_up_after_three_attempts() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Fail,
            Scripted::Status(503),
            Scripted::Fail,
            Scripted::Body(SLEMAN_PAYLOAD),
        ]);
        let fetcher = Fetcher::with_transport(transport.clone(), "http://weather", "Sleman");

        let error = fetcher.fetch().await.unwrap_err();
        assert!(
            matches!(error, FetchError::Exhausted { attempts: 3, .. }),
            "unexpected error: {error:?}"
        );
        assert_eq!(error.to_string(), "failed after 3 attempts: transport error: connection refused");

        let calls = transport.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_secs(1));
        assert_eq!(calls[2] - calls[1], Duration::from_secs(2));

        assert!(logs_contain("retrying in 1s"));
        assert!(logs_contain("retrying in 2s"));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_on_second_attempt() {
        let transport =
            ScriptedTransport::new(vec![Scripted::Status(500), Scripted::Body(SLEMAN_PAYLOAD)]);
        let fetcher = Fetcher::with_transport(transport.clone(), "http://weather", "Sleman");

        let start = tokio::time::Instant::now();
        let reading = fetcher.fetch().await.unwrap();

        assert_eq!(transport.call_count(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(reading.location, "Sleman");
        assert_eq!(reading.temperature_c, 28);
        assert_eq!(reading.condition, "Sunny");
        assert_eq!(reading.humidity_pct, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_payload_is_not_retried() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Body(r#"{"current_condition": []}"#),
            Scripted::Body(SLEMAN_PAYLOAD),
        ]);
        let fetcher = Fetcher::with_transport(transport.clone(), "http://weather", "Sleman");

        let error = fetcher.fetch().await.unwrap_err();
        assert!(matches!(error, FetchError::NoCurrentCondition));
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn missing_fields_fall_back() {
        let body = r#"{"current_condition": [{"temp_C": "hot", "humidity": null}]}"#;
        let reading = parse_reading(body.as_bytes(), "Sleman").unwrap();

        assert_eq!(reading.location, "Sleman");
        assert_eq!(reading.temperature_c, 0);
        assert_eq!(reading.condition, UNKNOWN_CONDITION);
        assert_eq!(reading.humidity_pct, 0);
    }

    #[test]
    fn numeric_fields_are_accepted() {
        let body = r#"{
            "current_condition": [{"temp_C": -3, "humidity": " 91 ", "weatherDesc": [{"value": "Snow"}]}],
            "nearest_area": [{"areaName": [{"value": "Yogyakarta"}]}]
        }"#;
        let reading = parse_reading(body.as_bytes(), "Sleman").unwrap();

        assert_eq!(reading.location, "Yogyakarta");
        assert_eq!(reading.temperature_c, -3);
        assert_eq!(reading.condition, "Snow");
        assert_eq!(reading.humidity_pct, 91);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let truncated = &SLEMAN_PAYLOAD[..SLEMAN_PAYLOAD.len() / 2];
        assert!(matches!(
            parse_reading(truncated.as_bytes(), "Sleman"),
            Err(FetchError::Parse(_))
        ));
    }
}

/// External API clients module
use crate::domain::{OrbitalElements, SatelliteState};
use crate::errors::{ApiError, ApiResult};
use crate::utils::normalize_longitude;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Name prefix identifying the ISS record in multi-satellite TLE files
const ISS_NAME_PREFIX: &str = "ISS";

/// HTTP client wrapper with common configuration
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("iss-pass-tracker/1.0")
            .build()?;
        Ok(Self { client })
    }

    /// GET a URL and return its body, failing on non-2xx
    async fn get_text(&self, url: &str) -> ApiResult<String> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::UpstreamStatus(resp.status().as_u16()));
        }
        Ok(resp.text().await?)
    }
}

/// Live telemetry payload; only the fields the tracker relies on
#[derive(Debug, Deserialize)]
pub struct TelemetryPayload {
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch seconds
    pub timestamp: i64,
    /// km/h
    pub velocity: Option<f64>,
}

impl TelemetryPayload {
    pub fn into_state(self) -> ApiResult<SatelliteState> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ApiError::InvalidPayload(format!(
                "latitude out of range: {}",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() {
            return Err(ApiError::InvalidPayload("longitude is not finite".into()));
        }
        if self.timestamp <= 0 {
            return Err(ApiError::InvalidPayload(format!(
                "invalid timestamp: {}",
                self.timestamp
            )));
        }
        Ok(SatelliteState {
            lat: self.latitude,
            lng: normalize_longitude(self.longitude),
            timestamp_ms: self.timestamp.saturating_mul(1000),
            speed_kmh: self.velocity.filter(|v| v.is_finite() && *v >= 0.0),
        })
    }
}

/// Live ISS telemetry client
#[derive(Clone)]
pub struct TelemetryClient {
    http_client: HttpClient,
    base_url: String,
}

impl TelemetryClient {
    pub fn new(base_url: String) -> ApiResult<Self> {
        Ok(Self {
            http_client: HttpClient::new()?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch current ISS position
    pub async fn fetch_position(&self) -> ApiResult<SatelliteState> {
        let body = self.http_client.get_text(&self.base_url).await?;
        let payload: TelemetryPayload = serde_json::from_str(&body)?;
        payload.into_state()
    }
}

/// JSON shape served by TLE APIs
#[derive(Debug, Deserialize)]
struct TleJson {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    header: Option<String>,
    line1: String,
    line2: String,
}

/// Orbital elements client trying an ordered list of sources
#[derive(Clone)]
pub struct ElementsClient {
    http_client: HttpClient,
    sources: Vec<String>,
}

impl ElementsClient {
    pub fn new(sources: Vec<String>) -> ApiResult<Self> {
        Ok(Self {
            http_client: HttpClient::new()?,
            sources,
        })
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// First source returning a parseable ISS record wins
    pub async fn fetch_elements(&self, now_ms: i64) -> ApiResult<OrbitalElements> {
        let mut last_error = ApiError::Internal("no orbital element sources configured".into());

        for source in &self.sources {
            let result = match self.http_client.get_text(source).await {
                Ok(body) => parse_elements_body(&body, now_ms),
                Err(e) => Err(e),
            };
            match result {
                Ok(elements) => {
                    debug!("Orbital elements loaded from {}", source);
                    return Ok(elements);
                }
                Err(e) => {
                    warn!("Orbital elements source {} failed: {}", source, e);
                    last_error = e;
                }
            }
        }

        Err(ApiError::ElementsUnavailable(last_error.to_string()))
    }
}

/// Parse either JSON (`line1`/`line2`/optional name) or plain TLE text
pub fn parse_elements_body(body: &str, now_ms: i64) -> ApiResult<OrbitalElements> {
    let trimmed = body.trim_start();
    let text = if trimmed.starts_with('{') {
        let json: TleJson = serde_json::from_str(trimmed)?;
        let name = json
            .name
            .or(json.header)
            .unwrap_or_else(|| ISS_NAME_PREFIX.to_string());
        format!("{}\n{}\n{}", name, json.line1.trim(), json.line2.trim())
    } else {
        body.to_string()
    };

    let (name, line1, line2) = extract_iss_record(&text).ok_or(ApiError::NoIssRecord)?;
    Ok(OrbitalElements {
        name,
        line1,
        line2,
        fetched_at_ms: now_ms,
    })
}

/// Locate the ISS record by name prefix and return its two data lines.
///
/// A body holding exactly one nameless two-line record is accepted as is.
pub fn extract_iss_record(text: &str) -> Option<(Option<String>, String, String)> {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim_end())
        .filter(|l| !l.trim().is_empty())
        .collect();

    for (i, line) in lines.iter().enumerate() {
        let name = line.trim();
        let name = name.strip_prefix("0 ").unwrap_or(name);
        if !name.to_ascii_uppercase().starts_with(ISS_NAME_PREFIX) {
            continue;
        }
        let (Some(l1), Some(l2)) = (lines.get(i + 1), lines.get(i + 2)) else {
            continue;
        };
        if l1.starts_with("1 ") && l2.starts_with("2 ") {
            return Some((Some(name.to_string()), l1.to_string(), l2.to_string()));
        }
    }

    if let [l1, l2] = lines.as_slice() {
        if l1.starts_with("1 ") && l2.starts_with("2 ") {
            return Some((None, l1.to_string(), l2.to_string()));
        }
    }
    None
}

//! HTTP client for the Breathe London API.
//!
//! Two endpoints are used:
//!
//! - `GET {base}/ListSensors?key=...` returns `[[SiteRecord, ...]]`, or a
//!   JSON object when the request failed
//! - `GET {base}/getClarityData/{code}/I{SERIES}/{start}/{end}/Hourly?key=...`
//!   returns `[ReadingRecord, ...]`, or a JSON object when there is no data
//!
//! Every call goes through [`with_retry`]; the pure `parse_*` functions
//! hold the payload rules and are tested without a network.
//!
//! # Example
//!
//! ```no_run
//! use airq_core::remote::{BreatheLondon, RemoteConfig};
//! use airq_core::RemoteSource;
//!
//! # async fn example() -> Result<(), airq_core::Error> {
//! let client = BreatheLondon::new(RemoteConfig {
//!     api_key: Some("secret".to_string()),
//!     ..RemoteConfig::default()
//! })?;
//!
//! let sites = client.list_sites().await?;
//! println!("{} sites", sites.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use airq_types::{Classification, Reading, Series, SiteMetadata, SiteStatus, Source};

use crate::error::{Error, Result};
use crate::region::{RegionResolver, UnresolvedRegion};
use crate::retry::{RetryConfig, with_retry};
use crate::traits::RemoteSource;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.breathelondon.org/api";

/// Client settings.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// API root, without trailing slash.
    pub base_url: String,
    /// Sent as the `key` query parameter when set.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// Breathe London network client.
#[derive(Clone)]
pub struct BreatheLondon {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    retry: RetryConfig,
    regions: Arc<dyn RegionResolver>,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for BreatheLondon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreatheLondon")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl BreatheLondon {
    /// Create a client.
    ///
    /// The base URL must start with `http://` or `https://`; a trailing
    /// slash is removed.
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::invalid_config(format!("failed to build HTTP client: {e}")))?;

        Self::with_client(config, client)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(config: RemoteConfig, client: Client) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::invalid_config(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            timeout: config.timeout,
            retry: config.retry,
            regions: Arc::new(UnresolvedRegion),
            cancel: None,
        })
    }

    /// Resolve each site's region with `resolver`.
    #[must_use]
    pub fn with_region_resolver(mut self, resolver: Arc<dyn RegionResolver>) -> Self {
        self.regions = resolver;
        self
    }

    /// Stop retrying once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn readings_url(
        &self,
        site_code: &str,
        series: Series,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<String> {
        Ok(format!(
            "{}/getClarityData/{}/{}/{}/{}/Hourly",
            self.base_url,
            site_code,
            series.remote_code(),
            format_request_time(start)?,
            format_request_time(end)?,
        ))
    }

    /// GET a JSON document with retries.
    async fn get_json(&self, operation: &str, url: &str) -> Result<Value> {
        with_retry(&self.retry, operation, self.cancel.as_ref(), || self.get_json_once(url)).await
    }

    async fn get_json_once(&self, url: &str) -> Result<Value> {
        debug!("GET {}", url);

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request.send().await.map_err(|e| self.transport_error(url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or_else(|| status.to_string());

            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    fn transport_error(&self, url: &str, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::timeout(url, self.timeout)
        } else {
            Error::Request {
                url: url.to_string(),
                source: error.without_url(),
            }
        }
    }
}

#[async_trait]
impl RemoteSource for BreatheLondon {
    fn source(&self) -> Source {
        Source::BreatheLondon
    }

    async fn list_sites(&self) -> Result<Vec<SiteMetadata>> {
        let url = format!("{}/ListSensors", self.base_url);
        let payload = self.get_json("ListSensors", &url).await?;
        parse_sites(payload, self.regions.as_ref())
    }

    async fn get_readings(
        &self,
        site_code: &str,
        series: Series,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>> {
        let url = self.readings_url(site_code, series, start, end)?;
        let payload = self.get_json("getClarityData", &url).await?;
        parse_readings(payload)
    }
}

/// Format a request timestamp as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_request_time(at: OffsetDateTime) -> Result<String> {
    at.to_offset(time::UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
        ))
        .map_err(|e| Error::invalid_config(format!("unformattable timestamp {at}: {e}")))
}

/// Parse a response timestamp; fractional seconds are optional.
fn parse_remote_time(field: &str, raw: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|e| Error::contract(format!("{field} '{raw}' is not a valid timestamp: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SiteRecord {
    site_code: String,
    #[serde(default)]
    site_name: Option<String>,
    #[serde(default)]
    overall_status: Option<String>,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    site_classification: Option<String>,
    #[serde(default, rename = "SitePhotoURL")]
    site_photo_url: Option<String>,
    #[serde(default)]
    site_description: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadingRecord {
    #[serde(default, rename = "DateTime")]
    date_time: Option<String>,
    #[serde(default, rename = "ScaledValue")]
    scaled_value: Option<Value>,
}

/// Parse a `ListSensors` payload.
///
/// The payload is a list wrapping the list of site records. The API
/// answers with a JSON object when the request failed, so an object is a
/// contract error carrying whatever message it holds.
pub fn parse_sites(payload: Value, regions: &dyn RegionResolver) -> Result<Vec<SiteMetadata>> {
    let records = match payload {
        Value::Object(body) => {
            let message = ["error", "message", "Message"]
                .iter()
                .find_map(|key| body.get(*key).and_then(Value::as_str))
                .unwrap_or("no site list");
            return Err(Error::contract(format!(
                "ListSensors returned an object instead of a site list: {message}"
            )));
        }
        Value::Array(mut outer) => match outer.first_mut().map(Value::take) {
            Some(Value::Array(inner)) => inner,
            _ => {
                return Err(Error::contract(
                    "ListSensors payload is not a list of site lists",
                ));
            }
        },
        other => {
            return Err(Error::contract(format!(
                "ListSensors payload has unexpected type: {}",
                json_type(&other)
            )));
        }
    };

    records
        .into_iter()
        .map(|record| {
            let record: SiteRecord = serde_json::from_value(record)
                .map_err(|e| Error::contract(format!("malformed site record: {e}")))?;
            site_from_record(record, regions)
        })
        .collect()
}

fn site_from_record(record: SiteRecord, regions: &dyn RegionResolver) -> Result<SiteMetadata> {
    let start_date = record
        .start_date
        .as_deref()
        .map(|raw| parse_remote_time("StartDate", raw))
        .transpose()?;
    let end_date = record
        .end_date
        .as_deref()
        .map(|raw| parse_remote_time("EndDate", raw))
        .transpose()?;

    Ok(SiteMetadata {
        name: record.site_name.unwrap_or_default(),
        source: Source::BreatheLondon,
        status: SiteStatus::from_remote(record.overall_status.as_deref().unwrap_or_default()),
        classification: Classification::from_remote(
            record.site_classification.as_deref().unwrap_or_default(),
        ),
        enabled: true,
        latitude: record.latitude,
        longitude: record.longitude,
        photo_url: record.site_photo_url,
        description: record.site_description,
        region: regions.resolve_region(record.latitude, record.longitude),
        start_date,
        end_date,
        site_code: record.site_code,
    })
}

/// Parse a `getClarityData` payload.
///
/// A bare JSON object means "no data". Records with a null or absent value
/// are dropped with a warning; a missing timestamp or non-numeric value is a
/// contract violation.
pub fn parse_readings(payload: Value) -> Result<Vec<Reading>> {
    let records = match payload {
        Value::Object(_) => return Ok(Vec::new()),
        Value::Array(records) => records,
        other => {
            return Err(Error::contract(format!(
                "getClarityData payload has unexpected type: {}",
                json_type(&other)
            )));
        }
    };

    let mut readings = Vec::with_capacity(records.len());
    let mut dropped = 0usize;

    for record in records {
        let record: ReadingRecord = serde_json::from_value(record)
            .map_err(|e| Error::contract(format!("malformed reading record: {e}")))?;

        let raw_time = record
            .date_time
            .ok_or_else(|| Error::contract("reading record has no DateTime"))?;
        let timestamp = parse_remote_time("DateTime", &raw_time)?;

        let value = match record.scaled_value {
            None | Some(Value::Null) => {
                dropped += 1;
                continue;
            }
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| Error::contract(format!("ScaledValue {n} is not representable")))?,
            Some(other) => {
                return Err(Error::contract(format!(
                    "ScaledValue at {raw_time} is not numeric: {other}"
                )));
            }
        };

        readings.push(Reading::new(timestamp, value));
    }

    if dropped > 0 {
        warn!("Dropped {} readings with no value", dropped);
    }

    Ok(readings)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! In-memory remote source and store for testing.
//!
//! [`MockRemote`] implements [`RemoteSource`] and [`MockStore`] implements
//! [`SensorStore`], so a [`SyncEngine`](crate::SyncEngine) or
//! [`OutlierWindower`](crate::OutlierWindower) can run without a network or a
//! database.
//!
//! # Features
//!
//! - **Failure injection**: transient 503s, permanent contract errors,
//!   per-site failures, and failed store writes
//! - **Latency simulation**: delay every remote call
//! - **Request log**: every readings request is recorded with its window

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use airq_store::{StoredReading, StoredSite};
use airq_types::{Reading, Series, SiteMetadata, Source, TimeRange};

use crate::error::{Error, Result};
use crate::retry::{RetryConfig, with_retry};
use crate::traits::{RemoteSource, SensorStore};

/// One recorded readings request.
pub type ReadingsRequest = (String, Series, OffsetDateTime, OffsetDateTime);

/// A fake remote network.
///
/// Calls go through [`with_retry`] with the configured policy, which is
/// [`RetryConfig::none`] unless set with [`MockRemote::with_retry`].
///
/// # Example
///
/// ```
/// use airq_core::{MockRemote, RemoteSource};
/// use airq_types::{Reading, Series};
/// use time::macros::datetime;
///
/// #[tokio::main]
/// async fn main() {
///     let remote = MockRemote::new();
///     remote
///         .set_readings("CLDP0001", Series::Pm25, vec![Reading::new(datetime!(2022-01-01 0:00 UTC), 28.4)])
///         .await;
///
///     let readings = remote
///         .get_readings("CLDP0001", Series::Pm25, datetime!(2021-12-31 0:00 UTC), datetime!(2022-01-02 0:00 UTC))
///         .await
///         .unwrap();
///     assert_eq!(readings.len(), 1);
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockRemote {
    sites: RwLock<Vec<SiteMetadata>>,
    readings: RwLock<BTreeMap<(String, Series), Vec<Reading>>>,
    requests: RwLock<Vec<ReadingsRequest>>,
    failing_sites: RwLock<HashSet<String>>,
    retry: RetryConfig,
    cancel: Option<CancellationToken>,
    list_calls: AtomicU32,
    read_calls: AtomicU32,
    /// Number of calls to fail with a 503 before succeeding.
    remaining_failures: AtomicU32,
    /// Fail every call with a contract error.
    contract_error: AtomicBool,
    /// Simulated latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            retry: RetryConfig::none(),
            ..Self::default()
        }
    }

    /// Retry transient failures with this policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Give up waiting between retries once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub async fn set_sites(&self, sites: Vec<SiteMetadata>) {
        *self.sites.write().await = sites;
    }

    /// Replace the readings served for one site and series.
    pub async fn set_readings(&self, site_code: &str, series: Series, mut readings: Vec<Reading>) {
        readings.sort_by_key(|r| r.timestamp);
        self.readings
            .write()
            .await
            .insert((site_code.to_string(), series), readings);
    }

    /// Every readings request seen so far, in call order.
    pub async fn requests(&self) -> Vec<ReadingsRequest> {
        self.requests.read().await.clone()
    }

    /// Fail every readings request for this site with a contract error.
    pub async fn fail_site(&self, site_code: &str) {
        self.failing_sites.write().await.insert(site_code.to_string());
    }

    /// Fail the next `count` calls with a 503.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    pub fn remaining_failures(&self) -> u32 {
        self.remaining_failures.load(Ordering::Relaxed)
    }

    /// Fail every call with a contract error.
    pub fn fail_with_contract_error(&self, fail: bool) {
        self.contract_error.store(fail, Ordering::Relaxed);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Attempts made on `list_sites`, retries included.
    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// Attempts made on `get_readings`, retries included.
    pub fn read_calls(&self) -> u32 {
        self.read_calls.load(Ordering::Relaxed)
    }

    async fn check_should_fail(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Api {
                status: 503,
                message: "Service Unavailable".to_string(),
            });
        }

        if self.contract_error.load(Ordering::Relaxed) {
            return Err(Error::contract("expected an array of readings"));
        }
        Ok(())
    }

    async fn readings_once(
        &self,
        site_code: &str,
        series: Series,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>> {
        self.read_calls.fetch_add(1, Ordering::Relaxed);
        self.check_should_fail().await?;

        if self.failing_sites.read().await.contains(site_code) {
            return Err(Error::contract(format!("no such sensor {site_code}")));
        }

        let window = TimeRange { start, end };
        Ok(self
            .readings
            .read()
            .await
            .get(&(site_code.to_string(), series))
            .map(|all| {
                all.iter()
                    .filter(|r| window.contains(r.timestamp))
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl RemoteSource for MockRemote {
    fn source(&self) -> Source {
        Source::BreatheLondon
    }

    async fn list_sites(&self) -> Result<Vec<SiteMetadata>> {
        with_retry(&self.retry, "ListSensors", self.cancel.as_ref(), || async {
            self.list_calls.fetch_add(1, Ordering::Relaxed);
            self.check_should_fail().await?;
            Ok(self.sites.read().await.clone())
        })
        .await
    }

    async fn get_readings(
        &self,
        site_code: &str,
        series: Series,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>> {
        self.requests
            .write()
            .await
            .push((site_code.to_string(), series, start, end));

        with_retry(&self.retry, "getClarityData", self.cancel.as_ref(), || {
            self.readings_once(site_code, series, start, end)
        })
        .await
    }
}

/// A store kept entirely in memory.
#[derive(Debug)]
pub struct MockStore {
    sites: RwLock<BTreeMap<String, StoredSite>>,
    readings: RwLock<BTreeMap<(i64, Series, OffsetDateTime), f64>>,
    next_site_id: AtomicI64,
    fail_writes: AtomicBool,
    write_calls: AtomicU32,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            sites: RwLock::new(BTreeMap::new()),
            readings: RwLock::new(BTreeMap::new()),
            next_site_id: AtomicI64::new(1),
            fail_writes: AtomicBool::new(false),
            write_calls: AtomicU32::new(0),
        }
    }

    /// Make every `write_readings` call fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Number of `write_readings` calls, failed ones included.
    pub fn write_calls(&self) -> u32 {
        self.write_calls.load(Ordering::Relaxed)
    }

    /// Every stored reading for a site code and series, ascending.
    pub async fn readings(&self, site_code: &str, series: Series) -> Vec<Reading> {
        let Some(site_id) = self.sites.read().await.get(site_code).map(|s| s.site_id) else {
            return Vec::new();
        };
        self.readings
            .read()
            .await
            .iter()
            .filter(|((id, s, _), _)| *id == site_id && *s == series)
            .map(|((_, _, timestamp), value)| Reading::new(*timestamp, *value))
            .collect()
    }
}

#[async_trait]
impl SensorStore for MockStore {
    async fn get_site(&self, site_code: &str) -> Result<Option<StoredSite>> {
        Ok(self.sites.read().await.get(site_code).cloned())
    }

    async fn list_sites(&self) -> Result<Vec<StoredSite>> {
        Ok(self.sites.read().await.values().cloned().collect())
    }

    async fn upsert_sites(&self, sites: &[SiteMetadata]) -> Result<usize> {
        let now = OffsetDateTime::now_utc();
        let mut stored = self.sites.write().await;

        for meta in sites {
            let (site_id, enabled, region, status_override) = match stored.get(&meta.site_code) {
                Some(existing) => (
                    existing.site_id,
                    existing.enabled,
                    meta.region.clone().or_else(|| existing.region.clone()),
                    existing.status_override,
                ),
                None => (
                    self.next_site_id.fetch_add(1, Ordering::Relaxed),
                    meta.enabled,
                    meta.region.clone(),
                    None,
                ),
            };

            stored.insert(
                meta.site_code.clone(),
                StoredSite {
                    site_id,
                    site_code: meta.site_code.clone(),
                    name: meta.name.clone(),
                    source: meta.source,
                    status: status_override.unwrap_or(meta.status),
                    classification: meta.classification,
                    enabled,
                    latitude: meta.latitude,
                    longitude: meta.longitude,
                    photo_url: meta.photo_url.clone(),
                    description: meta.description.clone(),
                    region,
                    start_date: meta.start_date,
                    end_date: meta.end_date,
                    updated_at: now,
                    status_override,
                },
            );
        }
        Ok(sites.len())
    }

    async fn latest_timestamp(&self, site_id: i64, series: Series) -> Result<Option<OffsetDateTime>> {
        Ok(self
            .readings
            .read()
            .await
            .keys()
            .filter(|(id, s, _)| *id == site_id && *s == series)
            .map(|(_, _, timestamp)| *timestamp)
            .max())
    }

    async fn write_readings(&self, readings: &[StoredReading]) -> Result<usize> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::Store(airq_store::Error::Database(
                rusqlite_busy_error(),
            )));
        }

        let mut stored = self.readings.write().await;
        for r in readings {
            stored.insert((r.site_id, r.series, r.timestamp), r.value);
        }
        Ok(readings.len())
    }

    async fn delete_readings(&self, site_id: i64, series: Series) -> Result<usize> {
        let mut stored = self.readings.write().await;
        let before = stored.len();
        stored.retain(|(id, s, _), _| !(*id == site_id && *s == series));
        Ok(before - stored.len())
    }

    async fn query_range(&self, site_id: i64, series: Series, range: TimeRange) -> Result<Vec<Reading>> {
        Ok(self
            .readings
            .read()
            .await
            .range((site_id, series, range.start)..(site_id, series, range.end))
            .map(|((_, _, timestamp), value)| Reading::new(*timestamp, *value))
            .collect())
    }

    async fn query_above_threshold(
        &self,
        series: Series,
        threshold: f64,
    ) -> Result<BTreeMap<String, Vec<Reading>>> {
        let sites = self.sites.read().await;
        let readings = self.readings.read().await;

        let mut by_site: BTreeMap<String, Vec<Reading>> = BTreeMap::new();
        for site in sites.values() {
            let above: Vec<Reading> = readings
                .iter()
                .filter(|((id, s, _), value)| *id == site.site_id && *s == series && **value > threshold)
                .map(|((_, _, timestamp), value)| Reading::new(*timestamp, *value))
                .collect();
            if !above.is_empty() {
                by_site.insert(site.site_code.clone(), above);
            }
        }
        Ok(by_site)
    }
}

fn rusqlite_busy_error() -> airq_store::rusqlite::Error {
    airq_store::rusqlite::Error::SqliteFailure(
        airq_store::rusqlite::ffi::Error::new(airq_store::rusqlite::ffi::SQLITE_BUSY),
        Some("database is locked".to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_mock_remote_filters_window() {
        let remote = MockRemote::new();
        remote
            .set_readings(
                "CLDP0001",
                Series::No2,
                vec![
                    Reading::new(datetime!(2022-01-01 0:00 UTC), 1.0),
                    Reading::new(datetime!(2022-01-01 1:00 UTC), 2.0),
                    Reading::new(datetime!(2022-01-01 2:00 UTC), 3.0),
                ],
            )
            .await;

        let readings = remote
            .get_readings(
                "CLDP0001",
                Series::No2,
                datetime!(2022-01-01 1:00 UTC),
                datetime!(2022-01-01 2:00 UTC),
            )
            .await
            .unwrap();
        assert_eq!(readings, vec![Reading::new(datetime!(2022-01-01 1:00 UTC), 2.0)]);
        assert_eq!(remote.requests().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_remote_transient_failures_are_retried() {
        let remote = MockRemote::new().with_retry(RetryConfig::default());
        remote.set_transient_failures(2);

        assert!(remote.list_sites().await.unwrap().is_empty());
        assert_eq!(remote.list_calls(), 3);
        assert_eq!(remote.remaining_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_remote_retries_exhausted() {
        let remote = MockRemote::new().with_retry(RetryConfig::default());
        remote.set_transient_failures(10);

        let err = remote
            .get_readings(
                "CLDP0001",
                Series::Pm25,
                datetime!(2022-01-01 0:00 UTC),
                datetime!(2022-01-02 0:00 UTC),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 503, .. }));
        assert_eq!(remote.read_calls(), 4);
    }

    #[tokio::test]
    async fn test_mock_store_upsert_keeps_id_and_region() {
        let store = MockStore::new();
        let mut meta = SiteMetadata {
            site_code: "CLDP0001".to_string(),
            name: "Royal London University Hospital".to_string(),
            source: Source::BreatheLondon,
            status: airq_types::SiteStatus::Healthy,
            classification: airq_types::Classification::UrbanBackground,
            enabled: true,
            latitude: 51.518775939941406,
            longitude: -0.059463899582624435,
            photo_url: None,
            description: None,
            region: Some("Tower Hamlets".to_string()),
            start_date: None,
            end_date: None,
        };
        store.upsert_sites(&[meta.clone()]).await.unwrap();

        meta.region = None;
        meta.status = airq_types::SiteStatus::Offline;
        store.upsert_sites(&[meta]).await.unwrap();

        let site = store.get_site("CLDP0001").await.unwrap().unwrap();
        assert_eq!(site.site_id, 1);
        assert_eq!(site.region.as_deref(), Some("Tower Hamlets"));
        assert_eq!(site.status, airq_types::SiteStatus::Offline);
    }

    #[tokio::test]
    async fn test_mock_store_write_failure() {
        let store = MockStore::new();
        store.fail_writes(true);
        let reading = StoredReading::from_reading(1, Series::Pm25, &Reading::new(datetime!(2022-01-01 0:00 UTC), 1.0));
        assert!(matches!(store.write_readings(&[reading]).await, Err(Error::Store(_))));
        assert_eq!(store.write_calls(), 1);
        assert_eq!(store.latest_timestamp(1, Series::Pm25).await.unwrap(), None);
    }
}

//! Trait seams between the sync pipeline and its collaborators.
//!
//! [`RemoteSource`] abstracts the external sensor network, [`SensorStore`]
//! the local time-series store. Both have an in-memory double in
//! [`crate::mock`] for testing.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;

use airq_store::{StoredReading, StoredSite};
use airq_types::{Reading, Series, SiteMetadata, Source, TimeRange};

use crate::error::Result;

/// A network that publishes site metadata and hourly readings.
///
/// Implementations own their retry policy: callers should not wrap these
/// methods in another retry loop.
///
/// # Example
///
/// ```ignore
/// use airq_core::{RemoteSource, Result};
/// use airq_types::Series;
///
/// async fn site_count<R: RemoteSource>(remote: &R) -> Result<usize> {
///     Ok(remote.list_sites().await?.len())
/// }
/// ```
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Which network this is.
    fn source(&self) -> Source;

    /// Every site the network knows about.
    async fn list_sites(&self) -> Result<Vec<SiteMetadata>>;

    /// Hourly readings for `[start, end)`, ascending by timestamp.
    ///
    /// Missing values are dropped, so the result may have gaps. A window
    /// with no data yields an empty list, not an error.
    async fn get_readings(
        &self,
        site_code: &str,
        series: Series,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>>;
}

/// Time-series storage for sites and readings.
#[async_trait]
pub trait SensorStore: Send + Sync {
    /// Look a site up by its external code.
    async fn get_site(&self, site_code: &str) -> Result<Option<StoredSite>>;

    /// All sites, ordered by site code.
    async fn list_sites(&self) -> Result<Vec<StoredSite>>;

    /// Insert or update sites by code, keeping existing site ids.
    async fn upsert_sites(&self, sites: &[SiteMetadata]) -> Result<usize>;

    /// Most recent stored timestamp for a site and series.
    async fn latest_timestamp(&self, site_id: i64, series: Series) -> Result<Option<OffsetDateTime>>;

    /// Idempotently upsert a batch as one unit.
    async fn write_readings(&self, readings: &[StoredReading]) -> Result<usize>;

    /// Remove every reading for a site and series.
    async fn delete_readings(&self, site_id: i64, series: Series) -> Result<usize>;

    /// Readings inside `range`, ascending.
    async fn query_range(&self, site_id: i64, series: Series, range: TimeRange) -> Result<Vec<Reading>>;

    /// Readings strictly above `threshold`, grouped by site code, each list
    /// ascending.
    async fn query_above_threshold(
        &self,
        series: Series,
        threshold: f64,
    ) -> Result<BTreeMap<String, Vec<Reading>>>;
}

#[async_trait]
impl<T: RemoteSource + ?Sized> RemoteSource for Arc<T> {
    fn source(&self) -> Source {
        (**self).source()
    }

    async fn list_sites(&self) -> Result<Vec<SiteMetadata>> {
        (**self).list_sites().await
    }

    async fn get_readings(
        &self,
        site_code: &str,
        series: Series,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>> {
        (**self).get_readings(site_code, series, start, end).await
    }
}

#[async_trait]
impl<T: SensorStore + ?Sized> SensorStore for Arc<T> {
    async fn get_site(&self, site_code: &str) -> Result<Option<StoredSite>> {
        (**self).get_site(site_code).await
    }

    async fn list_sites(&self) -> Result<Vec<StoredSite>> {
        (**self).list_sites().await
    }

    async fn upsert_sites(&self, sites: &[SiteMetadata]) -> Result<usize> {
        (**self).upsert_sites(sites).await
    }

    async fn latest_timestamp(&self, site_id: i64, series: Series) -> Result<Option<OffsetDateTime>> {
        (**self).latest_timestamp(site_id, series).await
    }

    async fn write_readings(&self, readings: &[StoredReading]) -> Result<usize> {
        (**self).write_readings(readings).await
    }

    async fn delete_readings(&self, site_id: i64, series: Series) -> Result<usize> {
        (**self).delete_readings(site_id, series).await
    }

    async fn query_range(&self, site_id: i64, series: Series, range: TimeRange) -> Result<Vec<Reading>> {
        (**self).query_range(site_id, series, range).await
    }

    async fn query_above_threshold(
        &self,
        series: Series,
        threshold: f64,
    ) -> Result<BTreeMap<String, Vec<Reading>>> {
        (**self).query_above_threshold(series, threshold).await
    }
}

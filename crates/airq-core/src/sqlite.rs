//! [`SensorStore`] over the SQLite store.
//!
//! A [`Store`] holds one connection, so it is shared behind a
//! `tokio::sync::Mutex`. Each call takes the lock once and completes its
//! statement or transaction before releasing it; a batch write is never
//! interleaved with another call.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use airq_store::{Store, StoredReading, StoredSite};
use airq_types::{Reading, Series, SiteMetadata, TimeRange};

use crate::error::Result;
use crate::traits::SensorStore;

/// A store shared between the sync engine and the outlier windower.
pub type SharedStore = Arc<Mutex<Store>>;

#[async_trait]
impl SensorStore for Mutex<Store> {
    async fn get_site(&self, site_code: &str) -> Result<Option<StoredSite>> {
        Ok(self.lock().await.get_site(site_code)?)
    }

    async fn list_sites(&self) -> Result<Vec<StoredSite>> {
        Ok(self.lock().await.list_sites(None)?)
    }

    async fn upsert_sites(&self, sites: &[SiteMetadata]) -> Result<usize> {
        Ok(self.lock().await.upsert_sites(sites)?)
    }

    async fn latest_timestamp(&self, site_id: i64, series: Series) -> Result<Option<OffsetDateTime>> {
        Ok(self.lock().await.latest_timestamp(site_id, series)?)
    }

    async fn write_readings(&self, readings: &[StoredReading]) -> Result<usize> {
        Ok(self.lock().await.write_readings(readings)?)
    }

    async fn delete_readings(&self, site_id: i64, series: Series) -> Result<usize> {
        Ok(self.lock().await.delete_readings(site_id, series)?)
    }

    async fn query_range(&self, site_id: i64, series: Series, range: TimeRange) -> Result<Vec<Reading>> {
        Ok(self.lock().await.query_range(site_id, series, range)?)
    }

    async fn query_above_threshold(
        &self,
        series: Series,
        threshold: f64,
    ) -> Result<BTreeMap<String, Vec<Reading>>> {
        let store = self.lock().await;
        let codes: HashMap<i64, String> = store
            .list_sites(None)?
            .into_iter()
            .map(|site| (site.site_id, site.site_code))
            .collect();

        let mut by_site: BTreeMap<String, Vec<Reading>> = BTreeMap::new();
        for reading in store.query_above_threshold(series, threshold)? {
            if let Some(code) = codes.get(&reading.site_id) {
                by_site.entry(code.clone()).or_default().push(reading.to_reading());
            }
        }
        Ok(by_site)
    }
}

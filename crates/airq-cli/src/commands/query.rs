//! Read-only commands over the local store.

use anyhow::{Context, Result, ensure};
use serde::Serialize;
use time::OffsetDateTime;

use airq_core::SharedStore;
use airq_store::{AggregatePoint, AggregateQuery, BreachCount, SiteAverage, StoredSite};
use airq_types::{Series, Source, TimeRange};

/// Latest stored reading for one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesLatest {
    pub series: Series,
    #[serde(with = "time::serde::rfc3339::option")]
    pub latest: Option<OffsetDateTime>,
}

/// Result of `last-time`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteLatest {
    pub site_code: String,
    pub series: Vec<SeriesLatest>,
}

pub async fn cmd_sites(store: &SharedStore, source: Option<Source>) -> Result<Vec<StoredSite>> {
    Ok(store.lock().await.list_sites(source)?)
}

/// Average readings per bucket.
pub async fn cmd_read(store: &SharedStore, query: &AggregateQuery) -> Result<Vec<AggregatePoint>> {
    store
        .lock()
        .await
        .aggregate(query)
        .context("Failed to aggregate readings")
}

pub async fn cmd_site_average(
    store: &SharedStore,
    series: Series,
    range: TimeRange,
) -> Result<Vec<SiteAverage>> {
    Ok(store.lock().await.site_averages(series, range)?)
}

/// Count days per site whose mean exceeded `limit`.
pub async fn cmd_breaches(
    store: &SharedStore,
    series: Series,
    range: TimeRange,
    limit: f64,
) -> Result<Vec<BreachCount>> {
    ensure!(
        limit.is_finite() && limit > 0.0,
        "limit must be a positive number, got {limit}"
    );
    Ok(store.lock().await.breach_days(series, range, limit)?)
}

/// Latest stored timestamp per series for one site.
pub async fn cmd_last_time(
    store: &SharedStore,
    site_code: &str,
    series: Option<Series>,
) -> Result<SiteLatest> {
    let store = store.lock().await;
    let site = store
        .get_site(site_code)?
        .with_context(|| format!("Site not found: {site_code}"))?;

    let wanted: Vec<Series> = match series {
        Some(series) => vec![series],
        None => Series::ALL.to_vec(),
    };

    let series = wanted
        .into_iter()
        .map(|series| {
            Ok(SeriesLatest {
                series,
                latest: store.latest_timestamp(site.site_id, series)?,
            })
        })
        .collect::<Result<_>>()?;

    Ok(SiteLatest {
        site_code: site.site_code,
        series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use airq_store::{Bucket, Store, StoredReading};
    use airq_types::{Classification, Reading, SiteMetadata, SiteStatus};
    use time::Duration;
    use time::macros::datetime;
    use tokio::sync::Mutex;

    fn site(code: &str, classification: Classification) -> SiteMetadata {
        SiteMetadata {
            site_code: code.to_string(),
            name: format!("Site {code}"),
            source: Source::BreatheLondon,
            status: SiteStatus::Healthy,
            classification,
            enabled: true,
            latitude: 51.5,
            longitude: -0.1,
            photo_url: None,
            description: None,
            region: None,
            start_date: None,
            end_date: None,
        }
    }

    /// Two sites with two days of hourly NO2; CLDP0001 reads 30, CLDP0002 reads 10.
    fn seeded() -> SharedStore {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_sites(&[
                site("CLDP0001", Classification::Roadside),
                site("CLDP0002", Classification::Suburban),
            ])
            .unwrap();

        let mut batch = Vec::new();
        for (code, value) in [("CLDP0001", 30.0), ("CLDP0002", 10.0)] {
            let site_id = store.get_site(code).unwrap().unwrap().site_id;
            for h in 0..48 {
                let at = datetime!(2022-01-01 0:00 UTC) + Duration::hours(h);
                batch.push(StoredReading::from_reading(site_id, Series::No2, &Reading::new(at, value)));
            }
        }
        store.write_readings(&batch).unwrap();
        Arc::new(Mutex::new(store))
    }

    fn two_days() -> TimeRange {
        TimeRange::new(datetime!(2022-01-01 0:00 UTC), datetime!(2022-01-03 0:00 UTC)).unwrap()
    }

    #[tokio::test]
    async fn test_sites_lists_all() {
        let store = seeded();
        let sites = cmd_sites(&store, None).await.unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].site_code, "CLDP0001");
    }

    #[tokio::test]
    async fn test_read_daily_by_classification() {
        let store = seeded();
        let query = AggregateQuery::new(Series::No2)
            .bucket(Bucket::Daily)
            .classification(Classification::Roadside);

        let points = cmd_read(&store, &query).await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].bucket, datetime!(2022-01-01 0:00 UTC));
        assert_eq!(points[0].average, 30.0);
        assert_eq!(points[0].count, 24);
    }

    #[tokio::test]
    async fn test_site_average_and_breaches() {
        let store = seeded();

        let averages = cmd_site_average(&store, Series::No2, two_days()).await.unwrap();
        assert_eq!(averages.len(), 2);
        assert_eq!(averages[1].average, 10.0);

        let breaches = cmd_breaches(&store, Series::No2, two_days(), 25.0).await.unwrap();
        let cldp0001 = breaches.iter().find(|b| b.site_code == "CLDP0001").unwrap();
        assert_eq!(cldp0001.breach_days, 2);
        assert_eq!(cldp0001.days_with_data(), 2);
        assert_eq!(cldp0001.no_data_days, 0);
        let cldp0002 = breaches.iter().find(|b| b.site_code == "CLDP0002").unwrap();
        assert_eq!(cldp0002.breach_days, 0);

        assert!(cmd_breaches(&store, Series::No2, two_days(), 0.0).await.is_err());
    }

    #[tokio::test]
    async fn test_last_time() {
        let store = seeded();

        let latest = cmd_last_time(&store, "CLDP0001", None).await.unwrap();
        assert_eq!(
            latest.series,
            vec![
                SeriesLatest {
                    series: Series::Pm25,
                    latest: None,
                },
                SeriesLatest {
                    series: Series::No2,
                    latest: Some(datetime!(2022-01-02 23:00 UTC)),
                },
            ]
        );

        let json = serde_json::to_value(&latest).unwrap();
        assert_eq!(json["series"][1]["latest"], "2022-01-02T23:00:00Z");

        assert!(cmd_last_time(&store, "CLDP0404", None).await.is_err());
    }
}

//! Sync commands - import sites and pull readings from the remote API.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use airq_core::{
    JobOutcome, RemoteSource, SensorStore, SyncEngine, SyncMetricsSummary, SyncReport,
};
use airq_types::Series;

/// Result of `sync-all`.
#[derive(Debug, Serialize)]
pub struct SyncAllOutput {
    pub report: SyncReport,
    pub metrics: SyncMetricsSummary,
}

/// Import site metadata. Returns the number of sites written.
pub async fn cmd_sync_sites<R: RemoteSource, S: SensorStore>(engine: &SyncEngine<R, S>) -> Result<usize> {
    let count = engine
        .sync_site_metadata()
        .await
        .context("Failed to import site metadata")?;
    info!("Imported {} sites", count);
    Ok(count)
}

/// Sync one series of one site.
pub async fn cmd_sync<R: RemoteSource, S: SensorStore>(
    engine: &SyncEngine<R, S>,
    site_code: &str,
    series: Series,
    resync: bool,
) -> Result<JobOutcome> {
    let outcome = engine.sync_site(site_code, series, resync).await?;
    if outcome.window.is_none() {
        info!("{}:{} is already up to date", site_code, series);
    }
    Ok(outcome)
}

/// Sync every series of every imported site.
pub async fn cmd_sync_all<R: RemoteSource, S: SensorStore>(
    engine: &SyncEngine<R, S>,
    resync: bool,
    start: Option<&str>,
) -> Result<SyncAllOutput> {
    let report = engine.sync_all(resync, start).await?;
    Ok(SyncAllOutput {
        report,
        metrics: engine.metrics().summary(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use airq_core::{MockRemote, MockStore, SyncOptions};
    use airq_types::{Classification, Reading, SiteMetadata, SiteStatus, Source};
    use time::macros::datetime;

    fn site(code: &str) -> SiteMetadata {
        SiteMetadata {
            site_code: code.to_string(),
            name: code.to_string(),
            source: Source::BreatheLondon,
            status: SiteStatus::Healthy,
            classification: Classification::Kerbside,
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

    async fn engine() -> SyncEngine<Arc<MockRemote>, Arc<MockStore>> {
        let remote = Arc::new(MockRemote::new());
        remote.set_sites(vec![site("CLDP0001"), site("CLDP0002")]).await;
        remote
            .set_readings(
                "CLDP0001",
                Series::Pm25,
                vec![Reading::new(datetime!(2022-01-01 0:00 UTC), 28.38500068664551)],
            )
            .await;
        SyncEngine::new(remote, Arc::new(MockStore::new()))
            .with_clock(|| datetime!(2022-01-02 0:00 UTC))
    }

    #[tokio::test]
    async fn test_sync_sites_then_single_sync() {
        let engine = engine().await;
        assert_eq!(cmd_sync_sites(&engine).await.unwrap(), 2);

        let outcome = cmd_sync(&engine, "CLDP0001", Series::Pm25, false).await.unwrap();
        assert_eq!(outcome.written, 1);
    }

    #[tokio::test]
    async fn test_sync_unknown_site_fails() {
        let engine = engine().await;
        let err = cmd_sync(&engine, "CLDP0404", Series::Pm25, false).await.unwrap_err();
        assert!(err.to_string().contains("CLDP0404"));
    }

    #[tokio::test]
    async fn test_sync_all_output_serializes() {
        let engine = engine().await.with_options(SyncOptions::default());
        cmd_sync_sites(&engine).await.unwrap();

        let output = cmd_sync_all(&engine, false, Some("CLDP0002")).await.unwrap();
        assert_eq!(output.report.skipped_sites, 1);
        assert_eq!(output.report.completed.len(), 2);

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["report"]["skipped_sites"], 1);
        assert_eq!(json["metrics"]["fetch"]["count"], 2);
    }
}

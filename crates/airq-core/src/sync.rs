//! Incremental synchronization of remote readings into the local store.
//!
//! Each (site, series) pair is a job. A job reads the latest stored
//! timestamp, asks the remote source for everything after it, and writes
//! the result back as one batch:
//!
//! ```text
//! Idle -> ResolvingCursor -> Fetching -> Writing -> Done
//! ```
//!
//! Running a job twice with nothing new upstream leaves the store
//! unchanged, since writes are upserts keyed on
//! `(site, series, timestamp)`.
//!
//! A forced resync deletes the pair's readings first and then pulls from
//! [`EPOCH_SENTINEL`]. Two resyncs of the same pair must not run at the
//! same time; callers serialize them.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use airq_store::StoredReading;
use airq_types::{Series, TimeRange};

use crate::error::{Error, JobPhase, Result};
use crate::metrics::SyncMetrics;
use crate::traits::{RemoteSource, SensorStore};

/// Cursor used when a pair has no stored data, or on resync.
pub const EPOCH_SENTINEL: OffsetDateTime = datetime!(2000-01-01 0:00 UTC);

/// Spacing between consecutive hourly readings.
const STEP: Duration = Duration::HOUR;

/// Options for [`SyncEngine::sync_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Sites synced at the same time. Series within a site always run in order.
    pub concurrency: usize,
    /// Abort on the first failed job instead of collecting failures.
    pub stop_on_error: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            stop_on_error: false,
        }
    }
}

/// Result of one successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub site_code: String,
    pub series: Series,
    /// Requested window, or `None` when the store was already current.
    pub window: Option<TimeRange>,
    /// Readings removed by a resync.
    pub deleted: usize,
    pub fetched: usize,
    pub written: usize,
}

/// A job that did not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub site_code: String,
    pub series: Series,
    /// Phase the job was in when it failed.
    pub phase: JobPhase,
    pub error: String,
}

/// Aggregated result of [`SyncEngine::sync_all`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub completed: Vec<JobOutcome>,
    pub failed: Vec<JobFailure>,
    /// Sites ordered before the resume point.
    pub skipped_sites: usize,
    /// Whether the run stopped because of cancellation.
    pub cancelled: bool,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    pub fn readings_written(&self) -> usize {
        self.completed.iter().map(|job| job.written).sum()
    }

    fn sort(&mut self) {
        self.completed
            .sort_by(|a, b| (&a.site_code, a.series).cmp(&(&b.site_code, b.series)));
        self.failed
            .sort_by(|a, b| (&a.site_code, a.series).cmp(&(&b.site_code, b.series)));
    }
}

/// Pulls readings from a [`RemoteSource`] into a [`SensorStore`].
pub struct SyncEngine<R, S> {
    remote: R,
    store: S,
    options: SyncOptions,
    metrics: Arc<SyncMetrics>,
    cancel: CancellationToken,
    clock: fn() -> OffsetDateTime,
}

impl<R: RemoteSource, S: SensorStore> SyncEngine<R, S> {
    pub fn new(remote: R, store: S) -> Self {
        Self {
            remote,
            store,
            options: SyncOptions::default(),
            metrics: SyncMetrics::shared(),
            cancel: CancellationToken::new(),
            clock: OffsetDateTime::now_utc,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop before the next site or job once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Replace the source of "now" used as the window end.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> OffsetDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> Arc<SyncMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Import the remote site list, keyed by site code.
    ///
    /// Existing sites keep their local id. Returns the number of sites
    /// written.
    pub async fn sync_site_metadata(&self) -> Result<usize> {
        let sites = self.remote.list_sites().await?;
        info!(
            "Fetched {} sites from {}",
            sites.len(),
            self.remote.source()
        );
        self.store.upsert_sites(&sites).await
    }

    /// Sync one series of one site.
    ///
    /// Returns [`Error::SiteNotFound`] if the site has not been imported and
    /// [`Error::Cancelled`] if cancellation was requested before or during
    /// the job. Any other failure is wrapped in [`Error::Job`].
    pub async fn sync_site(&self, site_code: &str, series: Series, resync: bool) -> Result<JobOutcome> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let span = info_span!(
            "sync",
            site_code = %site_code,
            series = %series,
            phase = %JobPhase::Idle
        );
        self.run_job(site_code, series, resync).instrument(span).await
    }

    async fn run_job(&self, site_code: &str, series: Series, resync: bool) -> Result<JobOutcome> {
        let mut phase = JobPhase::Idle;
        let fail = move |phase: JobPhase| {
            move |e: Error| match e {
                Error::Cancelled => Error::Cancelled,
                e => e.in_job(site_code, series, phase),
            }
        };

        enter(&mut phase, JobPhase::ResolvingCursor);

        let site = self
            .store
            .get_site(site_code)
            .await
            .map_err(fail(phase))?
            .ok_or_else(|| Error::SiteNotFound(site_code.to_string()))?;

        let mut deleted = 0;
        let cursor = if resync {
            deleted = self
                .store
                .delete_readings(site.site_id, series)
                .await
                .map_err(fail(phase))?;
            info!("Resync: deleted {} readings", deleted);
            EPOCH_SENTINEL
        } else {
            self.store
                .latest_timestamp(site.site_id, series)
                .await
                .map_err(fail(phase))?
                .unwrap_or(EPOCH_SENTINEL)
        };

        let start = cursor + STEP;
        let end = (self.clock)();
        let window = match TimeRange::new(start, end) {
            Ok(window) if start < end => Some(window),
            _ => None,
        };
        let Some(window) = window else {
            enter(&mut phase, JobPhase::Done);
            debug!("Up to date at {}", cursor);
            return Ok(JobOutcome {
                site_code: site_code.to_string(),
                series,
                window: None,
                deleted,
                fetched: 0,
                written: 0,
            });
        };

        enter(&mut phase, JobPhase::Fetching);
        let fetch_started = Instant::now();
        let fetched = self
            .remote
            .get_readings(site_code, series, window.start, window.end)
            .await;
        let fetch_elapsed = fetch_started.elapsed();
        self.metrics.fetch.record_result(&fetched, fetch_elapsed);
        let fetched = fetched.map_err(fail(phase))?;
        self.metrics.add_fetched(fetched.len());

        enter(&mut phase, JobPhase::Writing);
        let batch: Vec<StoredReading> = fetched
            .iter()
            .map(|reading| StoredReading::from_reading(site.site_id, series, reading))
            .collect();

        let write_started = Instant::now();
        let written = self.store.write_readings(&batch).await;
        let write_elapsed = write_started.elapsed();
        self.metrics.write.record_result(&written, write_elapsed);
        let written = written.map_err(fail(phase))?;
        self.metrics.add_written(written);
        enter(&mut phase, JobPhase::Done);

        info!(
            fetched = fetched.len(),
            written,
            fetch_ms = fetch_elapsed.as_millis() as u64,
            write_ms = write_elapsed.as_millis() as u64,
            "Synced {} to {}",
            window.start,
            window.end
        );

        Ok(JobOutcome {
            site_code: site_code.to_string(),
            series,
            window: Some(window),
            deleted,
            fetched: fetched.len(),
            written,
        })
    }

    /// Sync every series of every stored site.
    ///
    /// Sites are visited in site-code order; codes ordered before
    /// `resume_from` are skipped. Failed jobs are collected in the report
    /// unless [`SyncOptions::stop_on_error`] is set, in which case the first
    /// failure is returned. Cancellation stops the run before the next site
    /// or job and is reported in [`SyncReport::cancelled`].
    pub async fn sync_all(&self, resync: bool, resume_from: Option<&str>) -> Result<SyncReport> {
        let sites = self.store.list_sites().await?;
        let total = sites.len();

        let codes: Vec<String> = sites
            .into_iter()
            .map(|site| site.site_code)
            .filter(|code| resume_from.is_none_or(|start| code.as_str() >= start))
            .collect();

        let mut report = SyncReport {
            skipped_sites: total - codes.len(),
            ..SyncReport::default()
        };

        info!(
            "Syncing {} sites ({} skipped), concurrency {}",
            codes.len(),
            report.skipped_sites,
            self.options.concurrency.max(1)
        );

        let mut runs = stream::iter(codes)
            .map(|code| async move { self.sync_site_series(code, resync).await })
            .buffer_unordered(self.options.concurrency.max(1));

        while let Some((code, results)) = runs.next().await {
            for (series, result) in results {
                match result {
                    Ok(outcome) => report.completed.push(outcome),
                    Err(Error::Cancelled) => report.cancelled = true,
                    Err(e) if self.options.stop_on_error => {
                        error!("Stopping sync: {}", e);
                        return Err(e);
                    }
                    Err(e) => {
                        warn!("{}", e);
                        report.failed.push(failure_from(&code, series, e));
                    }
                }
            }
        }

        report.sort();
        info!(
            "Sync finished: {} jobs ok, {} failed, {} readings written",
            report.completed.len(),
            report.failed.len(),
            report.readings_written()
        );
        Ok(report)
    }

    /// Run each series of one site in order.
    async fn sync_site_series(
        &self,
        site_code: String,
        resync: bool,
    ) -> (String, Vec<(Series, Result<JobOutcome>)>) {
        let mut results = Vec::with_capacity(Series::ALL.len());

        for series in Series::ALL {
            let result = self.sync_site(&site_code, series, resync).await;
            let stop = match &result {
                Ok(_) => false,
                Err(Error::Cancelled) => true,
                Err(_) => self.options.stop_on_error,
            };
            results.push((series, result));
            if stop {
                break;
            }
        }

        (site_code, results)
    }
}

/// Move a job to `next` and record it on the current span.
fn enter(phase: &mut JobPhase, next: JobPhase) {
    *phase = next;
    Span::current().record("phase", tracing::field::display(next));
}

/// Errors raised outside a job phase, like an unknown site, are reported
/// as [`JobPhase::Idle`].
fn failure_from(site_code: &str, series: Series, error: Error) -> JobFailure {
    match error {
        Error::Job { phase, source, .. } => JobFailure {
            site_code: site_code.to_string(),
            series,
            phase,
            error: source.to_string(),
        },
        other => JobFailure {
            site_code: site_code.to_string(),
            series,
            phase: JobPhase::Idle,
            error: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockRemote, MockStore};
    use crate::retry::RetryConfig;
    use airq_types::{Classification, Reading, SiteMetadata, SiteStatus, Source};

    fn fixed_now() -> OffsetDateTime {
        datetime!(2022-01-01 3:00 UTC)
    }

    fn site(code: &str) -> SiteMetadata {
        SiteMetadata {
            site_code: code.to_string(),
            name: format!("Site {code}"),
            source: Source::BreatheLondon,
            status: SiteStatus::Healthy,
            classification: Classification::UrbanBackground,
            enabled: true,
            latitude: 51.518775939941406,
            longitude: -0.059463899582624435,
            photo_url: None,
            description: None,
            region: None,
            start_date: None,
            end_date: None,
        }
    }

    fn hours(values: &[f64]) -> Vec<Reading> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Reading::new(datetime!(2022-01-01 0:00 UTC) + Duration::hours(i as i64), *v))
            .collect()
    }

    async fn engine_with(codes: &[&str]) -> SyncEngine<Arc<MockRemote>, Arc<MockStore>> {
        let remote = Arc::new(MockRemote::new());
        let store = Arc::new(MockStore::new());
        remote.set_sites(codes.iter().map(|c| site(c)).collect()).await;
        let engine = SyncEngine::new(remote, store).with_clock(fixed_now);
        engine.sync_site_metadata().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_sync_site_metadata_preserves_ids() {
        let engine = engine_with(&["CLDP0001", "CLDP0002"]).await;
        let before = engine.store().get_site("CLDP0001").await.unwrap().unwrap();

        engine.sync_site_metadata().await.unwrap();
        let after = engine.store().get_site("CLDP0001").await.unwrap().unwrap();
        assert_eq!(before.site_id, after.site_id);
        assert_eq!(engine.store().list_sites().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sync_site_first_run_uses_sentinel() {
        let engine = engine_with(&["CLDP0001"]).await;
        engine
            .remote
            .set_readings("CLDP0001", Series::Pm25, hours(&[28.38500068664551, 33.7489998626709]))
            .await;

        let outcome = engine.sync_site("CLDP0001", Series::Pm25, false).await.unwrap();
        assert_eq!(outcome.fetched, 2);
        assert_eq!(outcome.written, 2);

        let window = outcome.window.unwrap();
        assert_eq!(window.start, datetime!(2000-01-01 1:00 UTC));
        assert_eq!(window.end, fixed_now());
    }

    #[tokio::test]
    async fn test_sync_site_advances_cursor() {
        let engine = engine_with(&["CLDP0001"]).await;
        engine
            .remote
            .set_readings("CLDP0001", Series::No2, hours(&[1.0, 2.0]))
            .await;
        engine.sync_site("CLDP0001", Series::No2, false).await.unwrap();

        let second = engine.sync_site("CLDP0001", Series::No2, false).await.unwrap();
        assert_eq!(second.window.unwrap().start, datetime!(2022-01-01 2:00 UTC));
        assert_eq!(second.fetched, 0);

        let requests = engine.remote.requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].2, datetime!(2022-01-01 2:00 UTC));
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let engine = engine_with(&["CLDP0001"]).await;
        engine
            .remote
            .set_readings("CLDP0001", Series::Pm25, hours(&[1.0, 2.0, 3.0]))
            .await;

        engine.sync_site("CLDP0001", Series::Pm25, false).await.unwrap();
        let snapshot = engine.store().readings("CLDP0001", Series::Pm25).await;
        engine.sync_site("CLDP0001", Series::Pm25, false).await.unwrap();

        assert_eq!(engine.store().readings("CLDP0001", Series::Pm25).await, snapshot);
    }

    #[tokio::test]
    async fn test_resync_replaces_series_only() {
        let engine = engine_with(&["CLDP0001"]).await;
        engine
            .remote
            .set_readings("CLDP0001", Series::Pm25, hours(&[1.0, 2.0, 3.0]))
            .await;
        engine
            .remote
            .set_readings("CLDP0001", Series::No2, hours(&[9.0]))
            .await;
        engine.sync_site("CLDP0001", Series::Pm25, false).await.unwrap();
        engine.sync_site("CLDP0001", Series::No2, false).await.unwrap();

        // Upstream revised its history.
        engine
            .remote
            .set_readings("CLDP0001", Series::Pm25, hours(&[5.0]))
            .await;
        let outcome = engine.sync_site("CLDP0001", Series::Pm25, true).await.unwrap();

        assert_eq!(outcome.deleted, 3);
        assert_eq!(outcome.window.unwrap().start, datetime!(2000-01-01 1:00 UTC));
        assert_eq!(
            engine.store().readings("CLDP0001", Series::Pm25).await,
            hours(&[5.0])
        );
        assert_eq!(
            engine.store().readings("CLDP0001", Series::No2).await,
            hours(&[9.0])
        );
    }

    #[tokio::test]
    async fn test_sync_site_unknown() {
        let engine = engine_with(&[]).await;
        let err = engine.sync_site("CLDP9999", Series::Pm25, false).await.unwrap_err();
        assert!(matches!(err, Error::SiteNotFound(code) if code == "CLDP9999"));
    }

    #[tokio::test]
    async fn test_sync_site_up_to_date_skips_fetch() {
        let engine = engine_with(&["CLDP0001"]).await;
        engine
            .remote
            .set_readings("CLDP0001", Series::Pm25, hours(&[1.0, 2.0, 3.0]))
            .await;
        engine.sync_site("CLDP0001", Series::Pm25, false).await.unwrap();

        // Latest is 02:00 and now is 03:00, so the next window would be empty.
        let outcome = engine.sync_site("CLDP0001", Series::Pm25, false).await.unwrap();
        assert_eq!(outcome.window, None);
        assert_eq!(outcome.fetched, 0);
        assert_eq!(engine.remote.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_has_job_context() {
        let engine = engine_with(&["CLDP0001"]).await;
        engine.remote.fail_with_contract_error(true);

        let err = engine.sync_site("CLDP0001", Series::No2, false).await.unwrap_err();
        match err {
            Error::Job {
                site_code,
                series,
                phase,
                ..
            } => {
                assert_eq!(site_code, "CLDP0001");
                assert_eq!(series, Series::No2);
                assert_eq!(phase, JobPhase::Fetching);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(engine.metrics().summary().fetch.failure_count, 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_terminal() {
        let engine = engine_with(&["CLDP0001"]).await;
        engine
            .remote
            .set_readings("CLDP0001", Series::Pm25, hours(&[1.0]))
            .await;
        engine.store().fail_writes(true);

        let err = engine.sync_site("CLDP0001", Series::Pm25, false).await.unwrap_err();
        assert!(matches!(err, Error::Job { phase: JobPhase::Writing, .. }));
        assert!(engine.store().readings("CLDP0001", Series::Pm25).await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_all_resumes_from_code() {
        let engine = engine_with(&["CLDP0003", "CLDP0001", "CLDP0002"]).await;
        let report = engine.sync_all(false, Some("CLDP0002")).await.unwrap();

        assert_eq!(report.skipped_sites, 1);
        let synced: Vec<_> = report
            .completed
            .iter()
            .map(|job| (job.site_code.as_str(), job.series))
            .collect();
        assert_eq!(
            synced,
            [
                ("CLDP0002", Series::Pm25),
                ("CLDP0002", Series::No2),
                ("CLDP0003", Series::Pm25),
                ("CLDP0003", Series::No2),
            ]
        );
    }

    #[tokio::test]
    async fn test_sync_all_continues_after_failure() {
        let engine = engine_with(&["CLDP0001", "CLDP0002"]).await;
        engine
            .remote
            .set_readings("CLDP0002", Series::Pm25, hours(&[7.0]))
            .await;
        engine.remote.fail_site("CLDP0001").await;

        let report = engine.sync_all(false, None).await.unwrap();
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed.iter().all(|f| f.site_code == "CLDP0001"));
        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.readings_written(), 1);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_sync_all_stop_on_error() {
        let engine = engine_with(&["CLDP0001", "CLDP0002"]).await.with_options(SyncOptions {
            concurrency: 1,
            stop_on_error: true,
        });
        engine.remote.fail_site("CLDP0001").await;

        let err = engine.sync_all(false, None).await.unwrap_err();
        assert!(matches!(err, Error::Job { ref site_code, .. } if site_code == "CLDP0001"));
        // CLDP0001/pm25 failed; nothing after it ran.
        assert_eq!(engine.remote.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_all_concurrent_matches_sequential() {
        let engine = engine_with(&["CLDP0001", "CLDP0002", "CLDP0003", "CLDP0004"])
            .await
            .with_options(SyncOptions {
                concurrency: 3,
                stop_on_error: false,
            });
        for code in ["CLDP0001", "CLDP0002", "CLDP0003", "CLDP0004"] {
            engine.remote.set_readings(code, Series::No2, hours(&[1.0, 2.0])).await;
        }

        let report = engine.sync_all(false, None).await.unwrap();
        assert_eq!(report.completed.len(), 8);
        assert_eq!(report.readings_written(), 8);
        assert_eq!(report.completed[0].site_code, "CLDP0001");
        assert_eq!(report.completed[7].site_code, "CLDP0004");
    }

    #[tokio::test]
    async fn test_sync_all_cancelled_before_start() {
        let token = CancellationToken::new();
        let engine = engine_with(&["CLDP0001", "CLDP0002"])
            .await
            .with_cancellation(token.clone());
        token.cancel();

        let report = engine.sync_all(false, None).await.unwrap();
        assert!(report.cancelled);
        assert!(report.completed.is_empty());
        assert!(engine.remote.requests().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_retry_is_not_a_failure() {
        let token = CancellationToken::new();
        let remote = Arc::new(
            MockRemote::new()
                .with_retry(RetryConfig::fixed(5, std::time::Duration::from_secs(1)))
                .with_cancellation(token.clone()),
        );
        remote.set_sites(vec![site("CLDP0001"), site("CLDP0002")]).await;
        let store = Arc::new(MockStore::new());
        let engine = SyncEngine::new(remote, store)
            .with_clock(fixed_now)
            .with_cancellation(token.clone());
        engine.sync_site_metadata().await.unwrap();

        engine.remote.set_transient_failures(10);
        let interrupt = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            interrupt.cancel();
        });

        let report = engine.sync_all(false, None).await.unwrap();
        assert!(report.cancelled);
        assert!(report.failed.is_empty(), "{:?}", report.failed);
        assert!(report.completed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_retry_returns_cancelled_unwrapped() {
        let token = CancellationToken::new();
        let remote = Arc::new(
            MockRemote::new()
                .with_retry(RetryConfig::fixed(5, std::time::Duration::from_secs(1)))
                .with_cancellation(token.clone()),
        );
        remote.set_sites(vec![site("CLDP0001")]).await;
        let engine = SyncEngine::new(remote, Arc::new(MockStore::new()))
            .with_clock(fixed_now)
            .with_options(SyncOptions {
                concurrency: 1,
                stop_on_error: true,
            })
            .with_cancellation(token.clone());
        engine.sync_site_metadata().await.unwrap();

        engine.remote.set_transient_failures(10);
        let interrupt = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            interrupt.cancel();
        });

        let result = engine.sync_site("CLDP0001", Series::Pm25, false).await;
        assert!(matches!(result, Err(Error::Cancelled)), "{result:?}");

        // stop_on_error does not turn an interrupt into an error
        let report = engine.sync_all(false, None).await.unwrap();
        assert!(report.cancelled);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_failure_outside_job_is_idle() {
        let failure = failure_from(
            "CLDP0404",
            Series::No2,
            Error::SiteNotFound("CLDP0404".to_string()),
        );
        assert_eq!(failure.phase, JobPhase::Idle);
        assert_eq!(failure.site_code, "CLDP0404");
    }
}

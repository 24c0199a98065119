//! Sync and analysis core for air-quality sensor networks.
//!
//! This crate pulls hourly readings from a remote sensor network into a
//! local store, one (site, series) job at a time, and turns scattered
//! outlier readings into day-aligned review windows.
//!
//! # Features
//!
//! - **Remote client**: Breathe London HTTP API with bounded retries
//! - **Incremental sync**: resume each series from its latest stored reading
//! - **Resync**: drop a series and re-pull it from scratch
//! - **Batch sync**: every site, optionally in parallel, resumable by site code
//! - **Outlier windows**: group, widen and merge outliers, then attach context
//! - **Metrics**: fetch and write timings across a run
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use airq_core::{BreatheLondon, RemoteConfig, SyncEngine};
//! use airq_store::Store;
//! use airq_types::Series;
//! use tokio::sync::Mutex;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let remote = BreatheLondon::new(RemoteConfig {
//!         api_key: Some("secret".to_string()),
//!         ..RemoteConfig::default()
//!     })?;
//!     let store = Arc::new(Mutex::new(Store::open_default()?));
//!
//!     let engine = SyncEngine::new(remote, store);
//!     engine.sync_site_metadata().await?;
//!
//!     let outcome = engine.sync_site("CLDP0001", Series::Pm25, false).await?;
//!     println!("Wrote {} readings", outcome.written);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod metrics;
pub mod mock;
pub mod outliers;
pub mod region;
pub mod remote;
pub mod retry;
pub mod sqlite;
pub mod sync;
pub mod traits;

pub use error::{Error, JobPhase, Result};
pub use metrics::{AtomicOperationMetrics, OperationMetrics, SyncMetrics, SyncMetricsSummary};
pub use mock::{MockRemote, MockStore};
pub use outliers::{OutlierWindower, THRESHOLD_METHOD, Thresholds};
pub use region::{FixedRegion, RegionResolver, UnresolvedRegion};
pub use remote::{BreatheLondon, DEFAULT_BASE_URL, RemoteConfig};
pub use retry::{RetryConfig, with_retry};
pub use sqlite::SharedStore;
pub use sync::{EPOCH_SENTINEL, JobFailure, JobOutcome, SyncEngine, SyncOptions, SyncReport};
pub use traits::{RemoteSource, SensorStore};

// Re-export from airq-types
pub use airq_types::{OutlierBlock, Reading, Series, SiteMetadata, Source, TimeRange};

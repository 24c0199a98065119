//! Local persistence for air-quality sites and hourly readings.
//!
//! This crate provides SQLite-based storage for site metadata and
//! per-series time series, with idempotent writes keyed on
//! `(site, series, timestamp)`.
//!
//! # Features
//!
//! - Upsert sites by their external code, keeping the local id stable
//! - Batch upsert of readings in a single transaction
//! - Latest-timestamp lookup for incremental sync
//! - Range, threshold and aggregate queries
//!
//! # Example
//!
//! ```no_run
//! use airq_store::{ReadingQuery, Store};
//! use airq_types::Series;
//!
//! let store = Store::open_default()?;
//!
//! let site = store.get_site("CLDP0001")?.expect("site imported");
//! let query = ReadingQuery::new()
//!     .site(site.site_id)
//!     .series(Series::Pm25)
//!     .limit(24);
//! let readings = store.query_readings(&query)?;
//! # Ok::<(), airq_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{
    AggregatePoint, BreachCount, HeatmapCell, SiteAverage, SiteRank, StoredReading, StoredSite,
};
pub use queries::{AggregateQuery, Bucket, ReadingQuery};
pub use store::Store;

pub use rusqlite;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/airq/data.db`
/// - macOS: `~/Library/Application Support/airq/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\airq\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("airq")
        .join("data.db")
}

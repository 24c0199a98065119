//! Command implementations for the CLI.
//!
//! Each command returns a serializable result; `main` prints it as JSON.

mod config;
mod outliers;
mod query;
mod site;
mod sync;
mod wrapped;

pub use config::cmd_config_init;

pub use outliers::cmd_outliers;
pub use query::{SeriesLatest, SiteLatest, cmd_breaches, cmd_last_time, cmd_read, cmd_site_average, cmd_sites};
pub use site::{SiteEdit, cmd_site};
pub use sync::{SyncAllOutput, cmd_sync, cmd_sync_all, cmd_sync_sites};
pub use wrapped::{SiteWrapped, cmd_wrapped, year_range};

use anyhow::{Context, Result};
use time::{Duration, OffsetDateTime};

use airq_types::TimeRange;

use crate::cli::RangeArgs;

/// Default lookback when `--since` is omitted.
pub const DEFAULT_LOOKBACK: Duration = Duration::days(30);

impl RangeArgs {
    /// Resolve to a concrete range, defaulting the end to `now`.
    pub fn resolve(&self, now: OffsetDateTime) -> Result<TimeRange> {
        let until = self.until.unwrap_or(now);
        let since = self.since.unwrap_or(until - DEFAULT_LOOKBACK);
        TimeRange::new(since, until).context("--since must not be after --until")
    }
}

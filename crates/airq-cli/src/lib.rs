//! Command-line sync and analysis for Breathe London air-quality data.
//!
//! The `airq` binary imports site metadata and hourly PM2.5/NO2 readings
//! into a local SQLite database, then answers questions about them:
//!
//! - `airq sync-sites` - import site metadata
//! - `airq sync CLDP0001 pm25 [--resync]` - sync one series of one site
//! - `airq sync-all [--resync] [--start CODE]` - sync every site
//! - `airq outliers pm25` - outliers in day-aligned context windows
//! - `airq sites`, `read`, `site-average`, `breaches`, `last-time` - queries
//! - `airq site CLDP0001 --disable --status offline` - local site edits
//! - `airq wrapped 2022` - year in review per enabled site
//! - `airq config init` - write the default configuration
//!
//! Results are printed to stdout as JSON; logs go to stderr.
//!
//! # Configuration
//!
//! The CLI reads configuration from `~/.config/airq/airq.toml`:
//!
//! ```toml
//! [remote]
//! base_url = "https://api.breathelondon.org/api"
//! api_key = "your-key"        # or BREATHE_LONDON_API_KEY
//! timeout_secs = 30
//! max_retries = 3
//! retry_pause_ms = 1000
//! exponential_backoff = false
//!
//! [storage]
//! path = "~/.local/share/airq/data.db"
//!
//! [sync]
//! concurrency = 1
//! stop_on_error = false
//!
//! [thresholds]
//! pm25 = 500.0
//! no2 = 500.0
//!
//! [limits]
//! pm25 = 15.0
//! no2 = 25.0
//! ```

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Commands, ConfigAction, RangeArgs};
pub use config::{
    Config, ConfigError, DailyLimits, RemoteSection, StorageConfig, SyncConfig, ValidationError,
};

//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use airq_store::Bucket;
use airq_types::{Classification, Series, SiteStatus, Source};

/// Sync and analyse Breathe London air-quality data.
#[derive(Debug, Parser)]
#[command(name = "airq")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Breathe London API key (overrides config)
    #[arg(long, global = true, env = "BREATHE_LONDON_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Print results as single-line JSON
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import site metadata from the remote API
    SyncSites,

    /// Sync one series of one site
    Sync {
        /// Site code, e.g. CLDP0001
        site: String,

        /// Series to sync (pm25, no2)
        series: Series,

        /// Delete stored readings and pull the full history again
        #[arg(long)]
        resync: bool,
    },

    /// Sync every series of every imported site
    SyncAll {
        /// Delete stored readings and pull the full history again
        #[arg(long)]
        resync: bool,

        /// Skip sites whose code sorts before this one
        #[arg(long, value_name = "SITE")]
        start: Option<String>,

        /// Sites to sync at once (overrides config)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Abort on the first failed job (overrides config)
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Show outliers grouped into day-aligned windows with context
    Outliers {
        /// Series to inspect (pm25, no2)
        series: Series,

        /// Outlier threshold (overrides config)
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// List imported sites
    Sites {
        /// Only sites from this source
        #[arg(long)]
        source: Option<Source>,
    },

    /// Average readings per hour or day
    Read {
        /// Series to read (pm25, no2)
        series: Series,

        /// Bucket size (hourly, daily)
        #[arg(short, long, default_value = "hourly")]
        bucket: Bucket,

        /// Only these sites (repeatable)
        #[arg(short, long = "site", value_name = "SITE")]
        sites: Vec<String>,

        /// Only sites with this classification (repeatable)
        #[arg(long = "classification", value_parser = parse_classification)]
        classifications: Vec<Classification>,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Mean value per site over a time range
    SiteAverage {
        /// Series to average (pm25, no2)
        series: Series,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Days per site whose mean exceeded the daily limit
    Breaches {
        /// Series to check (pm25, no2)
        series: Series,

        /// Daily limit (overrides config)
        #[arg(short, long)]
        limit: Option<f64>,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Latest stored reading time for a site
    LastTime {
        /// Site code, e.g. CLDP0001
        site: String,

        /// Only this series (default: all)
        series: Option<Series>,
    },

    /// Show a site, or include/exclude it from analyses and override its status
    Site {
        /// Site code, e.g. CLDP0001
        site: String,

        /// Include the site in per-site analyses
        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        /// Leave the site out of per-site analyses
        #[arg(long)]
        disable: bool,

        /// Override the published status (healthy, offline, coming_online, needs_attention)
        #[arg(long, value_parser = parse_status, conflicts_with = "clear_status")]
        status: Option<SiteStatus>,

        /// Go back to the published status
        #[arg(long)]
        clear_status: bool,
    },

    /// Year in review per enabled site: heatmap, limit breaches and rank
    Wrapped {
        /// Calendar year, UTC
        year: i32,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Write the default configuration to --config or the default path
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Reusable time range arguments
#[derive(Debug, Clone, Args)]
pub struct RangeArgs {
    /// Range start, RFC 3339 or YYYY-MM-DD (default: 30 days before --until)
    #[arg(long, value_parser = parse_time)]
    pub since: Option<OffsetDateTime>,

    /// Range end, exclusive, RFC 3339 or YYYY-MM-DD (default: now)
    #[arg(long, value_parser = parse_time)]
    pub until: Option<OffsetDateTime>,
}

/// Parse an RFC 3339 timestamp or a bare date (midnight UTC).
pub fn parse_time(s: &str) -> Result<OffsetDateTime, String> {
    if let Ok(at) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(at);
    }
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| format!("invalid time '{s}': expected RFC 3339 or YYYY-MM-DD"))
}

/// Parse a site classification such as "roadside" or "urban background".
pub fn parse_classification(s: &str) -> Result<Classification, String> {
    match Classification::from_remote(s) {
        Classification::Unknown if !s.eq_ignore_ascii_case("unknown") => Err(format!(
            "unknown classification '{s}': expected one of urban_background, suburban, kerbside, industrial, roadside, rural"
        )),
        classification => Ok(classification),
    }
}

/// Parse a site status override such as "offline" or "needs attention".
pub fn parse_status(s: &str) -> Result<SiteStatus, String> {
    match SiteStatus::from_remote(s) {
        SiteStatus::Unknown => Err(format!(
            "unknown status '{s}': expected one of healthy, offline, coming_online, needs_attention"
        )),
        status => Ok(status),
    }
}

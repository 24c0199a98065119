//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use airq_types::{Classification, Reading, Series, SiteMetadata, SiteStatus, Source};

/// A site stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSite {
    /// Local surrogate id, assigned on first import and never reassigned.
    pub site_id: i64,
    /// External site code.
    pub site_code: String,
    pub name: String,
    pub source: Source,
    /// Effective status: the local override if set, else the published one.
    pub status: SiteStatus,
    pub classification: Classification,
    /// Whether the site takes part in per-site analyses.
    pub enabled: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub photo_url: Option<String>,
    pub description: Option<String>,
    pub region: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    /// Last time the metadata was written.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Status set locally for a site known to be broken.
    pub status_override: Option<SiteStatus>,
}

impl StoredSite {
    /// Strip the local bookkeeping and return the published metadata.
    pub fn metadata(&self) -> SiteMetadata {
        SiteMetadata {
            site_code: self.site_code.clone(),
            name: self.name.clone(),
            source: self.source,
            status: self.status,
            classification: self.classification,
            enabled: self.enabled,
            latitude: self.latitude,
            longitude: self.longitude,
            photo_url: self.photo_url.clone(),
            description: self.description.clone(),
            region: self.region.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

/// A reading stored in the database.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    /// Owning site's local id.
    pub site_id: i64,
    pub series: Series,
    /// Start of the hourly interval.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub value: f64,
}

impl StoredReading {
    /// Attach a site and series to a bare reading.
    pub fn from_reading(site_id: i64, series: Series, reading: &Reading) -> Self {
        Self {
            site_id,
            series,
            timestamp: reading.timestamp,
            value: reading.value,
        }
    }

    /// Convert to a bare reading.
    pub fn to_reading(&self) -> Reading {
        Reading::new(self.timestamp, self.value)
    }
}

/// Mean value for one time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatePoint {
    /// Bucket start (top of the hour, or midnight UTC).
    #[serde(with = "time::serde::rfc3339")]
    pub bucket: OffsetDateTime,
    pub average: f64,
    /// Number of readings averaged.
    pub count: u64,
}

/// Mean value for one site over a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteAverage {
    pub site_code: String,
    pub name: String,
    pub average: f64,
    pub count: u64,
}

/// Daily-limit exceedances for one site over a range.
///
/// Every UTC day touched by the range falls in exactly one of
/// `breach_days`, `ok_days` and `no_data_days`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreachCount {
    pub site_code: String,
    pub name: String,
    /// UTC days whose mean exceeded the limit.
    pub breach_days: u64,
    /// UTC days with data whose mean stayed within the limit.
    pub ok_days: u64,
    /// UTC days in the range without any reading.
    pub no_data_days: u64,
}

impl BreachCount {
    /// UTC days with any data.
    pub fn days_with_data(&self) -> u64 {
        self.breach_days + self.ok_days
    }
}

/// A site's mean over a range and its position among all sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRank {
    pub site_code: String,
    /// 1 is the lowest mean. Equal means share a rank.
    pub rank: u32,
    pub average: f64,
}

/// Mean value for one hour of the week.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    /// Hour of day, 0-23 UTC.
    pub hour: u8,
    /// Day of week, 0 = Sunday.
    pub day: u8,
    pub value: f64,
}

//! Core types for air-quality sites and readings.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::{ParseError, ParseResult};

/// A measured quantity tracked independently per site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Series {
    /// Fine particulate matter (PM2.5), µg/m³.
    Pm25,
    /// Nitrogen dioxide, µg/m³.
    No2,
}

impl Series {
    /// Every known series, in sync order.
    pub const ALL: [Series; 2] = [Series::Pm25, Series::No2];

    /// Stable lower-case name, used as the storage key.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Series::Pm25 => "pm25",
            Series::No2 => "no2",
        }
    }

    /// Species code used in remote API paths (`IPM25`, `INO2`).
    #[must_use]
    pub fn remote_code(&self) -> &'static str {
        match self {
            Series::Pm25 => "IPM25",
            Series::No2 => "INO2",
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Series {
    type Err = ParseError;

    /// Parse a series name, ignoring case.
    ///
    /// ```
    /// use airq_types::Series;
    ///
    /// assert_eq!("PM25".parse::<Series>(), Ok(Series::Pm25));
    /// assert_eq!("no2".parse::<Series>(), Ok(Series::No2));
    /// assert!("o3".parse::<Series>().is_err());
    /// ```
    fn from_str(s: &str) -> ParseResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pm25" => Ok(Series::Pm25),
            "no2" => Ok(Series::No2),
            _ => Err(ParseError::UnknownSeries(s.to_string())),
        }
    }
}

/// Provider of site metadata and readings.
///
/// This enum is marked `#[non_exhaustive]` so further networks can be added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum Source {
    /// The Breathe London sensor network.
    BreatheLondon,
}

impl Source {
    /// Stable snake-case name, used as the storage key.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::BreatheLondon => "breathe_london",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        match fold_key(s).as_str() {
            "breathelondon" => Ok(Source::BreatheLondon),
            _ => Err(ParseError::UnknownSource(s.to_string())),
        }
    }
}

/// Lower-case a free-text label and drop whitespace, `_` and `-`.
///
/// Remote metadata uses inconsistent casing and spacing ("Coming Online",
/// "comingonline", "coming_online" all occur); folding them to one key lets
/// the lookups below stay simple tables.
fn fold_key(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Operational status of a monitoring site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SiteStatus {
    Healthy,
    Offline,
    ComingOnline,
    NeedsAttention,
    #[default]
    Unknown,
}

impl SiteStatus {
    /// Normalize a free-text status label.
    ///
    /// Matching ignores case, whitespace, `_` and `-`. Anything unrecognized
    /// maps to [`SiteStatus::Unknown`]; this never fails.
    ///
    /// ```
    /// use airq_types::SiteStatus;
    ///
    /// assert_eq!(SiteStatus::from_remote("Coming Online"), SiteStatus::ComingOnline);
    /// assert_eq!(SiteStatus::from_remote("NEEDS ATTENTION"), SiteStatus::NeedsAttention);
    /// assert_eq!(SiteStatus::from_remote("decommissioned"), SiteStatus::Unknown);
    /// ```
    #[must_use]
    pub fn from_remote(label: &str) -> Self {
        match fold_key(label).as_str() {
            "healthy" => SiteStatus::Healthy,
            "offline" => SiteStatus::Offline,
            "comingonline" => SiteStatus::ComingOnline,
            "needsattention" => SiteStatus::NeedsAttention,
            _ => SiteStatus::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Healthy => "healthy",
            SiteStatus::Offline => "offline",
            SiteStatus::ComingOnline => "coming_online",
            SiteStatus::NeedsAttention => "needs_attention",
            SiteStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment classification of a monitoring site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Classification {
    UrbanBackground,
    Suburban,
    Kerbside,
    Industrial,
    Roadside,
    Rural,
    #[default]
    Unknown,
}

impl Classification {
    /// Normalize a free-text classification label.
    ///
    /// Same folding rules as [`SiteStatus::from_remote`], with the same
    /// [`Classification::Unknown`] fallback.
    ///
    /// ```
    /// use airq_types::Classification;
    ///
    /// assert_eq!(Classification::from_remote("Urban Background"), Classification::UrbanBackground);
    /// assert_eq!(Classification::from_remote(" KERBSIDE "), Classification::Kerbside);
    /// assert_eq!(Classification::from_remote("airport"), Classification::Unknown);
    /// ```
    #[must_use]
    pub fn from_remote(label: &str) -> Self {
        match fold_key(label).as_str() {
            "urbanbackground" => Classification::UrbanBackground,
            "suburban" => Classification::Suburban,
            "kerbside" => Classification::Kerbside,
            "industrial" => Classification::Industrial,
            "roadside" => Classification::Roadside,
            "rural" => Classification::Rural,
            _ => Classification::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::UrbanBackground => "urban_background",
            Classification::Suburban => "suburban",
            Classification::Kerbside => "kerbside",
            Classification::Industrial => "industrial",
            Classification::Roadside => "roadside",
            Classification::Rural => "rural",
            Classification::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single timestamped value.
///
/// This is the shape the remote network returns and the shape used for
/// outlier and context data; site and series are carried by whatever
/// collection holds it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// Start of the hourly interval, UTC.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Measured value.
    pub value: f64,
}

impl Reading {
    #[must_use]
    pub fn new(timestamp: OffsetDateTime, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Half-open UTC interval `[start, end)`.
///
/// Deserializing goes through [`TimeRange::new`], so an inverted range is
/// rejected there too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "UncheckedRange"))]
pub struct TimeRange {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub start: OffsetDateTime,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub end: OffsetDateTime,
}

impl TimeRange {
    /// Create a range, rejecting `start > end`.
    ///
    /// ```
    /// use airq_types::TimeRange;
    /// use time::macros::datetime;
    ///
    /// let range = TimeRange::new(datetime!(2022-01-01 0:00 UTC), datetime!(2022-01-02 0:00 UTC)).unwrap();
    /// assert!(range.contains(datetime!(2022-01-01 23:00 UTC)));
    /// assert!(!range.contains(datetime!(2022-01-02 0:00 UTC)));
    /// ```
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> ParseResult<Self> {
        if start > end {
            return Err(ParseError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// A zero-length range at a single instant.
    #[must_use]
    pub fn instant(at: OffsetDateTime) -> Self {
        Self { start: at, end: at }
    }

    /// Whether `at` lies in `[start, end)`.
    #[must_use]
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.start <= at && at < self.end
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct UncheckedRange {
    #[serde(with = "time::serde::rfc3339")]
    start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    end: OffsetDateTime,
}

#[cfg(feature = "serde")]
impl TryFrom<UncheckedRange> for TimeRange {
    type Error = ParseError;

    fn try_from(range: UncheckedRange) -> ParseResult<Self> {
        TimeRange::new(range.start, range.end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Site metadata as published by a remote source.
///
/// This carries everything about a site except the local surrogate id,
/// which the store assigns on first import.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SiteMetadata {
    /// Stable external key, unique per network.
    pub site_code: String,
    pub name: String,
    pub source: Source,
    pub status: SiteStatus,
    pub classification: Classification,
    /// Whether the site should be included in analyses.
    pub enabled: bool,
    pub latitude: f64,
    pub longitude: f64,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub photo_url: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub description: Option<String>,
    /// Administrative region resolved from the coordinates, if known.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub region: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, with = "time::serde::rfc3339::option"))]
    pub start_date: Option<OffsetDateTime>,
    #[cfg_attr(feature = "serde", serde(default, with = "time::serde::rfc3339::option"))]
    pub end_date: Option<OffsetDateTime>,
}

/// Outlier points grouped into one review window, with surrounding data.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutlierBlock {
    /// Extended, midnight-aligned window.
    pub range: TimeRange,
    /// Every stored reading inside `range`, outliers included.
    pub context: Vec<Reading>,
    /// Outlier points per detection method, each list ascending by time.
    pub outliers: BTreeMap<String, Vec<Reading>>,
}

impl OutlierBlock {
    /// Create a block with no data attached yet.
    #[must_use]
    pub fn new(range: TimeRange) -> Self {
        Self {
            range,
            context: Vec::new(),
            outliers: BTreeMap::new(),
        }
    }

    /// Total outlier points across all methods.
    #[must_use]
    pub fn outlier_count(&self) -> usize {
        self.outliers.values().map(Vec::len).sum()
    }
}

//! Query builders for readings and aggregates.
//!
//! Both [`ReadingQuery`] and [`AggregateQuery`] follow the builder pattern.
//! Time filters are half-open: `since` is inclusive, `until` exclusive.
//!
//! # Example
//!
//! ```
//! use airq_store::{AggregateQuery, Bucket, ReadingQuery, Store};
//! use airq_types::Series;
//! use time::{Duration, OffsetDateTime};
//!
//! let store = Store::open_in_memory()?;
//! let yesterday = OffsetDateTime::now_utc() - Duration::hours(24);
//!
//! let query = ReadingQuery::new()
//!     .series(Series::Pm25)
//!     .since(yesterday)
//!     .oldest_first();
//! let readings = store.query_readings(&query)?;
//!
//! let daily = AggregateQuery::new(Series::No2)
//!     .bucket(Bucket::Daily)
//!     .site_code("CLDP0001");
//! let points = store.aggregate(&daily)?;
//! # Ok::<(), airq_store::Error>(())
//! ```

use airq_types::{Classification, Series};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Fluent query builder for stored readings.
///
/// By default, queries return results ordered by timestamp descending
/// (newest first).
#[derive(Debug, Default, Clone)]
pub struct ReadingQuery {
    /// Filter by site id.
    pub site_id: Option<i64>,
    /// Filter by series.
    pub series: Option<Series>,
    /// Include readings at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Include readings strictly before this time.
    pub until: Option<OffsetDateTime>,
    /// Include readings whose value is strictly greater than this.
    pub above: Option<f64>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    pub newest_first: bool,
}

impl ReadingQuery {
    /// Create a new query: no filters, no limit, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    pub fn site(mut self, site_id: i64) -> Self {
        self.site_id = Some(site_id);
        self
    }

    pub fn series(mut self, series: Series) -> Self {
        self.series = Some(series);
        self
    }

    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Keep only values strictly above `threshold`.
    pub fn above(mut self, threshold: f64) -> Self {
        self.above = Some(threshold);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results chronologically.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(site_id) = self.site_id {
            conditions.push("site_id = ?");
            params.push(Box::new(site_id));
        }

        if let Some(series) = self.series {
            conditions.push("series = ?");
            params.push(Box::new(series.as_str()));
        }

        if let Some(since) = self.since {
            conditions.push("timestamp >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }

        if let Some(until) = self.until {
            conditions.push("timestamp < ?");
            params.push(Box::new(until.unix_timestamp()));
        }

        if let Some(above) = self.above {
            conditions.push("value > ?");
            params.push(Box::new(above));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT site_id, series, timestamp, value \
             FROM readings {} ORDER BY timestamp {}, site_id",
            where_clause, order
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            // SQLite only accepts OFFSET after a LIMIT.
            if self.limit.is_none() {
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }
}

/// Bucket width for aggregate queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    #[default]
    Hourly,
    Daily,
}

impl Bucket {
    /// Bucket width in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Bucket::Hourly => 3_600,
            Bucket::Daily => 86_400,
        }
    }
}

impl std::str::FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hourly" | "hour" => Ok(Bucket::Hourly),
            "daily" | "day" => Ok(Bucket::Daily),
            other => Err(format!("unknown bucket '{other}', expected hourly or daily")),
        }
    }
}

/// Query builder for bucketed averages of one series.
///
/// Site-code and classification filters are combined with AND; within
/// each list, entries are alternatives.
#[derive(Debug, Clone)]
pub struct AggregateQuery {
    pub series: Series,
    pub bucket: Bucket,
    pub since: Option<OffsetDateTime>,
    pub until: Option<OffsetDateTime>,
    pub site_codes: Vec<String>,
    pub classifications: Vec<Classification>,
}

impl AggregateQuery {
    /// Hourly averages of `series` across every site.
    pub fn new(series: Series) -> Self {
        Self {
            series,
            bucket: Bucket::Hourly,
            since: None,
            until: None,
            site_codes: Vec::new(),
            classifications: Vec::new(),
        }
    }

    pub fn bucket(mut self, bucket: Bucket) -> Self {
        self.bucket = bucket;
        self
    }

    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Restrict to a site; may be called repeatedly.
    pub fn site_code(mut self, code: &str) -> Self {
        self.site_codes.push(code.to_string());
        self
    }

    /// Restrict to a classification; may be called repeatedly.
    pub fn classification(mut self, classification: Classification) -> Self {
        self.classifications.push(classification);
        self
    }

    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = vec!["r.series = ?".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(self.series.as_str())];

        if let Some(since) = self.since {
            conditions.push("r.timestamp >= ?".to_string());
            params.push(Box::new(since.unix_timestamp()));
        }

        if let Some(until) = self.until {
            conditions.push("r.timestamp < ?".to_string());
            params.push(Box::new(until.unix_timestamp()));
        }

        if !self.site_codes.is_empty() {
            conditions.push(format!("s.site_code IN ({})", placeholders(self.site_codes.len())));
            for code in &self.site_codes {
                params.push(Box::new(code.clone()));
            }
        }

        if !self.classifications.is_empty() {
            conditions.push(format!(
                "s.classification IN ({})",
                placeholders(self.classifications.len())
            ));
            for classification in &self.classifications {
                params.push(Box::new(classification.as_str()));
            }
        }

        (format!("WHERE {}", conditions.join(" AND ")), params)
    }

    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let width = self.bucket.seconds();
        format!(
            "SELECT (r.timestamp / {width}) * {width} AS bucket, AVG(r.value), COUNT(*) \
             FROM readings r JOIN sites s ON s.site_id = r.site_id \
             {where_clause} GROUP BY bucket ORDER BY bucket"
        )
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

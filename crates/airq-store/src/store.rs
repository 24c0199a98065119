//! Main store implementation.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;
use tracing::{debug, info};

use airq_types::{Classification, Reading, Series, SiteMetadata, SiteStatus, Source, TimeRange};

use crate::error::{Error, Result};
use crate::models::{
    AggregatePoint, BreachCount, HeatmapCell, SiteAverage, SiteRank, StoredReading, StoredSite,
};
use crate::queries::{AggregateQuery, ReadingQuery};
use crate::schema;

const SITE_COLUMNS: &str = "site_id, site_code, name, source, COALESCE(status_override, status), \
     classification, enabled, latitude, longitude, photo_url, description, region, start_date, \
     end_date, updated_at, status_override";

const SECONDS_PER_DAY: i64 = 86_400;

/// SQLite-based store for air-quality sites and readings.
///
/// A `Store` wraps a single connection and is not `Sync`; share it across
/// tasks behind a mutex.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Site operations
impl Store {
    /// Insert or update sites keyed by `site_code`.
    ///
    /// Existing rows keep their `site_id` and `enabled` flag. A `None`
    /// region does not clear a previously resolved one. Returns the number
    /// of sites written.
    pub fn upsert_sites(&self, sites: &[SiteMetadata]) -> Result<usize> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let tx = self.conn.unchecked_transaction()?;
        let mut written = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO sites (site_code, name, source, status, classification, enabled,
                    latitude, longitude, photo_url, description, region, start_date, end_date,
                    updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(site_code) DO UPDATE SET
                    name = excluded.name,
                    source = excluded.source,
                    status = excluded.status,
                    classification = excluded.classification,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    photo_url = excluded.photo_url,
                    description = excluded.description,
                    region = COALESCE(excluded.region, sites.region),
                    start_date = excluded.start_date,
                    end_date = excluded.end_date,
                    updated_at = excluded.updated_at",
            )?;

            for site in sites {
                written += stmt.execute(rusqlite::params![
                    site.site_code,
                    site.name,
                    site.source.as_str(),
                    site.status.as_str(),
                    site.classification.as_str(),
                    site.enabled,
                    site.latitude,
                    site.longitude,
                    site.photo_url,
                    site.description,
                    site.region,
                    site.start_date.map(OffsetDateTime::unix_timestamp),
                    site.end_date.map(OffsetDateTime::unix_timestamp),
                    now,
                ])?;
            }
        }

        tx.commit()?;
        info!("Upserted {} sites", written);
        Ok(written)
    }

    /// Get a site by its external code.
    pub fn get_site(&self, site_code: &str) -> Result<Option<StoredSite>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {SITE_COLUMNS} FROM sites WHERE site_code = ?"))?;

        let site = stmt.query_row([site_code], site_from_row).optional()?;
        Ok(site)
    }

    /// List sites ordered by code, optionally restricted to one source.
    pub fn list_sites(&self, source: Option<Source>) -> Result<Vec<StoredSite>> {
        let sites = match source {
            Some(source) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {SITE_COLUMNS} FROM sites WHERE source = ? ORDER BY site_code"
                ))?;
                stmt.query_map([source.as_str()], site_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("SELECT {SITE_COLUMNS} FROM sites ORDER BY site_code"))?;
                stmt.query_map([], site_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        Ok(sites)
    }

    /// Include or exclude a site from per-site analyses.
    pub fn set_site_enabled(&self, site_code: &str, enabled: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE sites SET enabled = ?2 WHERE site_code = ?1",
            rusqlite::params![site_code, enabled],
        )?;

        if changed == 0 {
            return Err(Error::SiteNotFound(site_code.to_string()));
        }
        info!("Site {} enabled = {}", site_code, enabled);
        Ok(())
    }

    /// Replace the published status of a site, or clear the override with
    /// `None`. Re-imports keep the override.
    pub fn set_status_override(&self, site_code: &str, status: Option<SiteStatus>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE sites SET status_override = ?2 WHERE site_code = ?1",
            rusqlite::params![site_code, status.map(|s| s.as_str())],
        )?;

        if changed == 0 {
            return Err(Error::SiteNotFound(site_code.to_string()));
        }
        info!("Site {} status override = {:?}", site_code, status);
        Ok(())
    }
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<StoredSite> {
    Ok(StoredSite {
        site_id: row.get(0)?,
        site_code: row.get(1)?,
        name: row.get(2)?,
        source: parse_column::<Source>(3, &row.get::<_, String>(3)?)?,
        status: SiteStatus::from_remote(&row.get::<_, String>(4)?),
        classification: Classification::from_remote(&row.get::<_, String>(5)?),
        enabled: row.get(6)?,
        latitude: row.get(7)?,
        longitude: row.get(8)?,
        photo_url: row.get(9)?,
        description: row.get(10)?,
        region: row.get(11)?,
        start_date: row
            .get::<_, Option<i64>>(12)?
            .map(|secs| from_unix(12, secs))
            .transpose()?,
        end_date: row
            .get::<_, Option<i64>>(13)?
            .map(|secs| from_unix(13, secs))
            .transpose()?,
        updated_at: from_unix(14, row.get(14)?)?,
        status_override: row
            .get::<_, Option<String>>(15)?
            .map(|s| SiteStatus::from_remote(&s)),
    })
}

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<StoredReading> {
    Ok(StoredReading {
        site_id: row.get(0)?,
        series: parse_column::<Series>(1, &row.get::<_, String>(1)?)?,
        timestamp: from_unix(2, row.get(2)?)?,
        value: row.get(3)?,
    })
}

fn from_unix(idx: usize, secs: i64) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn parse_column<T>(idx: usize, s: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    s.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// Reading operations
impl Store {
    /// Upsert a batch of readings in one transaction.
    ///
    /// Writing the same `(site, series, timestamp)` twice keeps one row with
    /// the latest value. Returns the number of rows written.
    pub fn write_readings(&self, readings: &[StoredReading]) -> Result<usize> {
        if readings.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut written = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO readings (site_id, series, timestamp, value)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(site_id, series, timestamp) DO UPDATE SET value = excluded.value",
            )?;

            for reading in readings {
                written += stmt.execute(rusqlite::params![
                    reading.site_id,
                    reading.series.as_str(),
                    reading.timestamp.unix_timestamp(),
                    reading.value,
                ])?;
            }
        }

        tx.commit()?;
        debug!("Wrote {} readings", written);
        Ok(written)
    }

    /// Delete every reading for a site and series.
    pub fn delete_readings(&self, site_id: i64, series: Series) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM readings WHERE site_id = ?1 AND series = ?2",
            rusqlite::params![site_id, series.as_str()],
        )?;

        info!("Deleted {} {} readings for site {}", deleted, series, site_id);
        Ok(deleted)
    }

    /// Most recent stored timestamp for a site and series.
    pub fn latest_timestamp(&self, site_id: i64, series: Series) -> Result<Option<OffsetDateTime>> {
        let latest: Option<i64> = self.conn.query_row(
            "SELECT MAX(timestamp) FROM readings WHERE site_id = ?1 AND series = ?2",
            rusqlite::params![site_id, series.as_str()],
            |row| row.get(0),
        )?;

        latest
            .map(|secs| {
                OffsetDateTime::from_unix_timestamp(secs).map_err(|_| Error::InvalidTimestamp(secs))
            })
            .transpose()
    }

    /// Query readings with filters.
    pub fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<StoredReading>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let readings = stmt
            .query_map(params_ref.as_slice(), reading_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(readings)
    }

    /// Readings for one site and series inside `range`, oldest first.
    pub fn query_range(&self, site_id: i64, series: Series, range: TimeRange) -> Result<Vec<Reading>> {
        let query = ReadingQuery::new()
            .site(site_id)
            .series(series)
            .since(range.start)
            .until(range.end)
            .oldest_first();

        Ok(self
            .query_readings(&query)?
            .iter()
            .map(StoredReading::to_reading)
            .collect())
    }

    /// Readings of `series` strictly above `threshold` across all sites,
    /// oldest first.
    pub fn query_above_threshold(&self, series: Series, threshold: f64) -> Result<Vec<StoredReading>> {
        let query = ReadingQuery::new()
            .series(series)
            .above(threshold)
            .oldest_first();
        self.query_readings(&query)
    }

    /// Count readings, optionally restricted to a site and/or series.
    pub fn count_readings(&self, site_id: Option<i64>, series: Option<Series>) -> Result<u64> {
        let mut query = ReadingQuery::new();
        query.site_id = site_id;
        query.series = series;
        let (where_clause, params) = query.build_where();
        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM readings {where_clause}"),
            params_ref.as_slice(),
            |row| row.get(0),
        )?;

        Ok(count as u64)
    }
}

// Aggregate operations
impl Store {
    /// Bucketed averages for one series.
    pub fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<AggregatePoint>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing aggregate: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let points = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(AggregatePoint {
                    bucket: from_unix(0, row.get(0)?)?,
                    average: row.get(1)?,
                    count: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(points)
    }

    /// Per-site mean of `series` over `range`, ordered by site code.
    ///
    /// Disabled sites and sites without readings in the range are omitted.
    pub fn site_averages(&self, series: Series, range: TimeRange) -> Result<Vec<SiteAverage>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.site_code, s.name, AVG(r.value), COUNT(*)
             FROM readings r JOIN sites s ON s.site_id = r.site_id
             WHERE r.series = ?1 AND r.timestamp >= ?2 AND r.timestamp < ?3 AND s.enabled = 1
             GROUP BY s.site_id
             ORDER BY s.site_code",
        )?;

        let averages = stmt
            .query_map(
                rusqlite::params![
                    series.as_str(),
                    range.start.unix_timestamp(),
                    range.end.unix_timestamp()
                ],
                |row| {
                    Ok(SiteAverage {
                        site_code: row.get(0)?,
                        name: row.get(1)?,
                        average: row.get(2)?,
                        count: row.get::<_, i64>(3)? as u64,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(averages)
    }

    /// Per-site count of UTC days whose mean of `series` exceeds `limit`.
    ///
    /// Only enabled sites with data in `range` are listed, ordered by site
    /// code. Days touched by `range` without a reading count as no-data days.
    pub fn breach_days(&self, series: Series, range: TimeRange, limit: f64) -> Result<Vec<BreachCount>> {
        let total_days = days_touched(range);
        let mut stmt = self.conn.prepare(
            "SELECT s.site_code, s.name,
                    SUM(CASE WHEN d.mean > ?4 THEN 1 ELSE 0 END),
                    COUNT(*)
             FROM (
                SELECT site_id, timestamp / 86400 AS day, AVG(value) AS mean
                FROM readings
                WHERE series = ?1 AND timestamp >= ?2 AND timestamp < ?3
                GROUP BY site_id, day
             ) d
             JOIN sites s ON s.site_id = d.site_id
             WHERE s.enabled = 1
             GROUP BY s.site_id
             ORDER BY s.site_code",
        )?;

        let counts = stmt
            .query_map(
                rusqlite::params![
                    series.as_str(),
                    range.start.unix_timestamp(),
                    range.end.unix_timestamp(),
                    limit
                ],
                |row| {
                    let breach_days = row.get::<_, i64>(2)? as u64;
                    let days_with_data = row.get::<_, i64>(3)? as u64;
                    Ok(BreachCount {
                        site_code: row.get(0)?,
                        name: row.get(1)?,
                        breach_days,
                        ok_days: days_with_data - breach_days,
                        no_data_days: total_days.saturating_sub(days_with_data),
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    /// Rank enabled sites by their mean of `series` over `range`.
    ///
    /// Rank 1 is the lowest mean; ties share a rank and the next rank is
    /// skipped. Ordered by rank, then site code.
    pub fn site_ranks(&self, series: Series, range: TimeRange) -> Result<Vec<SiteRank>> {
        let mut averages = self.site_averages(series, range)?;
        averages.sort_by(|a, b| {
            a.average
                .total_cmp(&b.average)
                .then_with(|| a.site_code.cmp(&b.site_code))
        });

        let mut ranks: Vec<SiteRank> = Vec::with_capacity(averages.len());
        for (i, avg) in averages.into_iter().enumerate() {
            let rank = match ranks.last() {
                Some(prev) if prev.average == avg.average => prev.rank,
                _ => i as u32 + 1,
            };
            ranks.push(SiteRank {
                site_code: avg.site_code,
                rank,
                average: avg.average,
            });
        }

        Ok(ranks)
    }

    /// Mean of `series` per hour of day and day of week, per enabled site.
    ///
    /// Cells without data are absent. Each site's cells are ordered by day,
    /// then hour.
    pub fn heatmap(&self, series: Series, range: TimeRange) -> Result<BTreeMap<String, Vec<HeatmapCell>>> {
        // 1970-01-01 was a Thursday, so day 0 of the epoch has weekday 4.
        let mut stmt = self.conn.prepare(
            "SELECT s.site_code,
                    (r.timestamp % 86400) / 3600 AS hour,
                    (r.timestamp / 86400 + 4) % 7 AS dow,
                    AVG(r.value)
             FROM readings r JOIN sites s ON s.site_id = r.site_id
             WHERE r.series = ?1 AND r.timestamp >= ?2 AND r.timestamp < ?3 AND s.enabled = 1
             GROUP BY s.site_id, hour, dow
             ORDER BY s.site_code, dow, hour",
        )?;

        let rows = stmt
            .query_map(
                rusqlite::params![
                    series.as_str(),
                    range.start.unix_timestamp(),
                    range.end.unix_timestamp()
                ],
                |row| {
                    let cell = HeatmapCell {
                        hour: row.get(1)?,
                        day: row.get(2)?,
                        value: row.get(3)?,
                    };
                    Ok((row.get::<_, String>(0)?, cell))
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut heatmap: BTreeMap<String, Vec<HeatmapCell>> = BTreeMap::new();
        for (site_code, cell) in rows {
            heatmap.entry(site_code).or_default().push(cell);
        }
        Ok(heatmap)
    }
}

/// Number of UTC days `range` touches.
fn days_touched(range: TimeRange) -> u64 {
    let first = range.start.unix_timestamp().div_euclid(SECONDS_PER_DAY);
    let last = (range.end.unix_timestamp() + SECONDS_PER_DAY - 1).div_euclid(SECONDS_PER_DAY);
    (last - first).max(0) as u64
}

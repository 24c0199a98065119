//! Outlier context windows.
//!
//! Scattered outlier points are grouped into blocks, widened to whole days,
//! merged, and then paired with every stored reading in the widened range so
//! a reviewer sees each anomaly against its surrounding signal.
//!
//! Input is keyed by detection method and then by site. Any number of
//! methods can be windowed together; blocks from different methods that
//! overlap end up in the same merged block, and every method key appears in
//! every block of that site even when it has no points there.
//!
//! # Example
//!
//! ```
//! use airq_core::outliers::{extend_blocks, get_block_ranges, merge_blocks};
//! use airq_types::Reading;
//! use time::macros::datetime;
//!
//! let points = [
//!     Reading::new(datetime!(2022-01-01 0:00 UTC), 900.0),
//!     Reading::new(datetime!(2022-01-01 5:00 UTC), 650.0),
//! ];
//! let merged = merge_blocks(extend_blocks(&get_block_ranges(&points)));
//! assert_eq!(merged.len(), 1);
//! assert_eq!(merged[0].start, datetime!(2021-12-31 0:00 UTC));
//! assert_eq!(merged[0].end, datetime!(2022-01-03 0:00 UTC));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, Time, UtcOffset};
use tracing::{debug, info};

use airq_types::{OutlierBlock, Reading, Series, TimeRange};

use crate::error::{Error, Result};
use crate::traits::SensorStore;

/// Method name for readings above a fixed per-series limit.
pub const THRESHOLD_METHOD: &str = "threshold";

/// Largest gap between consecutive outliers that keeps them in one block.
pub const BLOCK_GAP: Duration = Duration::DAY;

/// Outlier candidates keyed by detection method, then by site code.
pub type MethodOutliers = BTreeMap<String, BTreeMap<String, Vec<Reading>>>;

/// Outlier candidates keyed by site code, then by detection method.
pub type SiteOutliers = BTreeMap<String, BTreeMap<String, Vec<Reading>>>;

/// Per-series outlier limits, in µg/m³.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub pm25: f64,
    pub no2: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pm25: 500.0,
            no2: 500.0,
        }
    }
}

impl Thresholds {
    pub fn get(&self, series: Series) -> f64 {
        match series {
            Series::Pm25 => self.pm25,
            Series::No2 => self.no2,
        }
    }
}

/// Turn `method -> site -> points` into `site -> method -> points`.
///
/// Each point list is sorted ascending by timestamp on the way through.
pub fn reshape_by_site(input: MethodOutliers) -> SiteOutliers {
    let mut by_site = SiteOutliers::new();
    for (method, sites) in input {
        for (site_code, mut points) in sites {
            points.sort_by_key(|p| p.timestamp);
            by_site
                .entry(site_code)
                .or_default()
                .insert(method.clone(), points);
        }
    }
    by_site
}

/// Split an ascending point list into blocks wherever consecutive points are
/// more than [`BLOCK_GAP`] apart.
///
/// A block spans its first and last point, so an isolated point gives a
/// zero-length block.
pub fn get_block_ranges(points: &[Reading]) -> Vec<TimeRange> {
    let Some(first) = points.first() else {
        return Vec::new();
    };

    let mut blocks = Vec::new();
    let mut current = TimeRange::instant(first.timestamp);

    for point in &points[1..] {
        if point.timestamp - current.end > BLOCK_GAP {
            blocks.push(current);
            current = TimeRange::instant(point.timestamp);
        } else {
            current.end = point.timestamp;
        }
    }
    blocks.push(current);
    blocks
}

fn floor_day(at: OffsetDateTime) -> OffsetDateTime {
    at.to_offset(UtcOffset::UTC).replace_time(Time::MIDNIGHT)
}

/// Widen every block by a day on each side, aligned to UTC midnight.
///
/// The start moves to midnight of the day before it; the end moves to
/// midnight two days after the day it falls on.
pub fn extend_blocks(blocks: &[TimeRange]) -> Vec<TimeRange> {
    blocks
        .iter()
        .map(|block| TimeRange {
            start: floor_day(block.start - Duration::DAY),
            end: floor_day(block.end + Duration::DAY) + Duration::DAY,
        })
        .collect()
}

/// Sort blocks by start and merge any that overlap or touch.
///
/// The result is disjoint and ascending.
pub fn merge_blocks(mut blocks: Vec<TimeRange>) -> Vec<TimeRange> {
    blocks.sort_by_key(|block| (block.start, block.end));

    let mut merged: Vec<TimeRange> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match merged.last_mut() {
            Some(last) if last.start <= block.start && block.start <= last.end => {
                last.end = last.end.max(block.end);
            }
            _ => merged.push(block),
        }
    }
    merged
}

/// Build the merged blocks for one site and distribute its outliers.
///
/// Context readings are left empty. Each method's list must be ascending;
/// every point ends up in exactly one block.
pub fn assign_outliers(methods: &BTreeMap<String, Vec<Reading>>) -> Vec<OutlierBlock> {
    let extended: Vec<TimeRange> = methods
        .values()
        .flat_map(|points| extend_blocks(&get_block_ranges(points)))
        .collect();
    let merged = merge_blocks(extended);

    let mut cursors: BTreeMap<&str, usize> =
        methods.keys().map(|method| (method.as_str(), 0)).collect();

    merged
        .into_iter()
        .map(|range| {
            let mut block = OutlierBlock::new(range);
            for (method, points) in methods {
                let cursor = cursors.entry(method.as_str()).or_default();
                let first = *cursor;
                while *cursor < points.len() && points[*cursor].timestamp < range.end {
                    *cursor += 1;
                }
                block
                    .outliers
                    .insert(method.clone(), points[first..*cursor].to_vec());
            }
            block
        })
        .collect()
}

/// Finds outliers in the store and attaches surrounding readings.
pub struct OutlierWindower<S> {
    store: S,
    thresholds: Thresholds,
}

impl<S: SensorStore> OutlierWindower<S> {
    pub fn new(store: S, thresholds: Thresholds) -> Self {
        Self { store, thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Window every reading of `series` above its configured threshold.
    ///
    /// Returns blocks per site code; sites without outliers are absent.
    pub async fn outliers_in_context(
        &self,
        series: Series,
    ) -> Result<BTreeMap<String, Vec<OutlierBlock>>> {
        let threshold = self.thresholds.get(series);
        let candidates = self.store.query_above_threshold(series, threshold).await?;
        info!(
            "{} sites have {} readings above {}",
            candidates.len(),
            series,
            threshold
        );

        let mut input = MethodOutliers::new();
        input.insert(THRESHOLD_METHOD.to_string(), candidates);
        self.window(series, input).await
    }

    /// Window pre-computed outliers from any number of methods.
    pub async fn window(
        &self,
        series: Series,
        input: MethodOutliers,
    ) -> Result<BTreeMap<String, Vec<OutlierBlock>>> {
        let mut result = BTreeMap::new();

        for (site_code, methods) in reshape_by_site(input) {
            let mut blocks = assign_outliers(&methods);
            if blocks.is_empty() {
                continue;
            }

            let site = self
                .store
                .get_site(&site_code)
                .await?
                .ok_or_else(|| Error::SiteNotFound(site_code.clone()))?;

            for block in &mut blocks {
                block.context = self
                    .store
                    .query_range(site.site_id, series, block.range)
                    .await?;
            }

            debug!("{}: {} blocks", site_code, blocks.len());
            result.insert(site_code, blocks);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockStore;
    use airq_store::StoredReading;
    use airq_types::{Classification, SiteMetadata, SiteStatus, Source};
    use proptest::prelude::*;
    use std::sync::Arc;
    use time::macros::datetime;

    fn at(points: &[OffsetDateTime]) -> Vec<Reading> {
        points.iter().map(|t| Reading::new(*t, 900.0)).collect()
    }

    fn range(start: OffsetDateTime, end: OffsetDateTime) -> TimeRange {
        TimeRange::new(start, end).unwrap()
    }

    #[test]
    fn test_block_ranges_split_on_gap() {
        let points = at(&[
            datetime!(2022-01-01 0:00 UTC),
            datetime!(2022-01-01 1:00 UTC),
            datetime!(2022-01-01 2:00 UTC),
            datetime!(2022-01-03 0:00 UTC),
            datetime!(2022-01-05 0:00 UTC),
            datetime!(2022-01-07 0:00 UTC),
        ]);

        assert_eq!(
            get_block_ranges(&points),
            vec![
                range(datetime!(2022-01-01 0:00 UTC), datetime!(2022-01-01 2:00 UTC)),
                TimeRange::instant(datetime!(2022-01-03 0:00 UTC)),
                TimeRange::instant(datetime!(2022-01-05 0:00 UTC)),
                TimeRange::instant(datetime!(2022-01-07 0:00 UTC)),
            ]
        );
    }

    #[test]
    fn test_block_ranges_exact_day_gap_stays_joined() {
        let points = at(&[datetime!(2022-01-01 0:00 UTC), datetime!(2022-01-02 0:00 UTC)]);
        assert_eq!(get_block_ranges(&points).len(), 1);
        assert!(get_block_ranges(&[]).is_empty());
    }

    #[test]
    fn test_merge_blocks_scenario() {
        let blocks = vec![
            range(datetime!(2022-01-01 1:00 UTC), datetime!(2022-01-01 4:00 UTC)),
            range(datetime!(2022-01-01 6:00 UTC), datetime!(2022-01-01 8:00 UTC)),
            range(datetime!(2022-01-01 0:00 UTC), datetime!(2022-01-01 2:00 UTC)),
            range(datetime!(2022-01-01 1:00 UTC), datetime!(2022-01-01 3:00 UTC)),
        ];

        assert_eq!(
            merge_blocks(blocks),
            vec![
                range(datetime!(2022-01-01 0:00 UTC), datetime!(2022-01-01 4:00 UTC)),
                range(datetime!(2022-01-01 6:00 UTC), datetime!(2022-01-01 8:00 UTC)),
            ]
        );
    }

    #[test]
    fn test_merge_blocks_touching() {
        let blocks = vec![
            range(datetime!(2022-01-01 0:00 UTC), datetime!(2022-01-02 0:00 UTC)),
            range(datetime!(2022-01-02 0:00 UTC), datetime!(2022-01-03 0:00 UTC)),
        ];
        assert_eq!(
            merge_blocks(blocks),
            vec![range(datetime!(2022-01-01 0:00 UTC), datetime!(2022-01-03 0:00 UTC))]
        );
    }

    #[test]
    fn test_extend_singleton_spans_two_days() {
        let extended = extend_blocks(&[TimeRange::instant(datetime!(2022-01-05 13:00 UTC))]);
        assert_eq!(
            extended,
            vec![range(datetime!(2022-01-04 0:00 UTC), datetime!(2022-01-07 0:00 UTC))]
        );

        let midnight = extend_blocks(&[TimeRange::instant(datetime!(2022-01-05 0:00 UTC))]);
        assert_eq!(midnight[0].start, datetime!(2022-01-04 0:00 UTC));
        assert_eq!(midnight[0].end, datetime!(2022-01-07 0:00 UTC));
    }

    #[test]
    fn test_assign_keeps_every_method_key() {
        let mut methods = BTreeMap::new();
        methods.insert(
            "threshold".to_string(),
            at(&[datetime!(2022-01-01 0:00 UTC), datetime!(2022-01-10 0:00 UTC)]),
        );
        methods.insert("z_score".to_string(), at(&[datetime!(2022-01-10 6:00 UTC)]));

        let blocks = assign_outliers(&methods);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].outliers["threshold"].len(), 1);
        assert!(blocks[0].outliers["z_score"].is_empty());
        assert_eq!(blocks[1].outliers["threshold"].len(), 1);
        assert_eq!(blocks[1].outliers["z_score"].len(), 1);
    }

    #[test]
    fn test_reshape_sorts_points() {
        let mut sites = BTreeMap::new();
        sites.insert(
            "CLDP0001".to_string(),
            at(&[datetime!(2022-01-02 0:00 UTC), datetime!(2022-01-01 0:00 UTC)]),
        );
        let mut input = MethodOutliers::new();
        input.insert(THRESHOLD_METHOD.to_string(), sites);

        let by_site = reshape_by_site(input);
        let points = &by_site["CLDP0001"][THRESHOLD_METHOD];
        assert_eq!(points[0].timestamp, datetime!(2022-01-01 0:00 UTC));
    }

    #[tokio::test]
    async fn test_outliers_in_context_attaches_readings() {
        let store = Arc::new(MockStore::new());
        store
            .upsert_sites(&[SiteMetadata {
                site_code: "CLDP0001".to_string(),
                name: "Royal London University Hospital".to_string(),
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
            }])
            .await
            .unwrap();
        let site_id = store.get_site("CLDP0001").await.unwrap().unwrap().site_id;

        let values = [
            (datetime!(2021-12-30 12:00 UTC), 20.0),
            (datetime!(2022-01-01 0:00 UTC), 28.38500068664551),
            (datetime!(2022-01-01 1:00 UTC), 650.0),
            (datetime!(2022-01-01 2:00 UTC), 33.7489998626709),
            (datetime!(2022-01-02 23:00 UTC), 40.0),
        ];
        let batch: Vec<_> = values
            .iter()
            .map(|(t, v)| StoredReading::from_reading(site_id, Series::Pm25, &Reading::new(*t, *v)))
            .collect();
        store.write_readings(&batch).await.unwrap();

        let windower = OutlierWindower::new(Arc::clone(&store), Thresholds::default());
        let result = windower.outliers_in_context(Series::Pm25).await.unwrap();

        let blocks = &result["CLDP0001"];
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            blocks[0].range,
            range(datetime!(2021-12-31 0:00 UTC), datetime!(2022-01-03 0:00 UTC))
        );
        assert_eq!(blocks[0].context.len(), 4);
        assert_eq!(
            blocks[0].outliers[THRESHOLD_METHOD],
            vec![Reading::new(datetime!(2022-01-01 1:00 UTC), 650.0)]
        );

        assert!(windower.outliers_in_context(Series::No2).await.unwrap().is_empty());
    }

    fn hourly_points() -> impl Strategy<Value = Vec<Reading>> {
        prop::collection::btree_set(0i64..24 * 90, 0..40).prop_map(|hours| {
            hours
                .into_iter()
                .map(|h| Reading::new(datetime!(2022-01-01 0:00 UTC) + Duration::hours(h), 600.0))
                .collect()
        })
    }

    fn arbitrary_block() -> impl Strategy<Value = TimeRange> {
        (0i64..24 * 30, 0i64..72).prop_map(|(start, len)| {
            let start = datetime!(2022-01-01 0:00 UTC) + Duration::hours(start);
            TimeRange {
                start,
                end: start + Duration::hours(len),
            }
        })
    }

    proptest! {
        #[test]
        fn prop_merge_is_disjoint_sorted_and_covering(
            blocks in prop::collection::vec(arbitrary_block(), 0..20)
        ) {
            let merged = merge_blocks(blocks.clone());

            for pair in merged.windows(2) {
                prop_assert!(pair[0].end < pair[1].start);
            }
            for block in &blocks {
                prop_assert!(merged
                    .iter()
                    .any(|m| m.start <= block.start && block.end <= m.end));
            }
        }

        #[test]
        fn prop_extend_aligns_to_midnight(blocks in prop::collection::vec(arbitrary_block(), 0..20)) {
            for (original, extended) in blocks.iter().zip(extend_blocks(&blocks)) {
                prop_assert_eq!(extended.start.time(), Time::MIDNIGHT);
                prop_assert_eq!(extended.end.time(), Time::MIDNIGHT);
                prop_assert!(extended.start <= original.start - Duration::DAY);
                prop_assert!(extended.end > original.end + Duration::DAY);
                prop_assert!(extended.duration() >= Duration::days(2));
            }
        }

        #[test]
        fn prop_every_outlier_assigned_once(a in hourly_points(), b in hourly_points()) {
            let mut methods = BTreeMap::new();
            methods.insert("a".to_string(), a.clone());
            methods.insert("b".to_string(), b.clone());

            let blocks = assign_outliers(&methods);
            let assigned: usize = blocks.iter().map(OutlierBlock::outlier_count).sum();
            prop_assert_eq!(assigned, a.len() + b.len());

            for block in &blocks {
                prop_assert_eq!(block.outliers.len(), 2);
                for points in block.outliers.values() {
                    for point in points {
                        prop_assert!(block.range.contains(point.timestamp));
                    }
                }
            }
        }
    }
}

//! Outliers command - threshold outliers in day-aligned context windows.

use std::collections::BTreeMap;

use anyhow::{Context, Result, ensure};

use airq_core::{OutlierBlock, OutlierWindower, SensorStore, Thresholds};
use airq_types::Series;

/// Window every reading of `series` above its threshold.
///
/// `threshold` replaces the configured threshold for this series only.
pub async fn cmd_outliers<S: SensorStore>(
    store: S,
    thresholds: Thresholds,
    series: Series,
    threshold: Option<f64>,
) -> Result<BTreeMap<String, Vec<OutlierBlock>>> {
    let mut thresholds = thresholds;
    if let Some(value) = threshold {
        ensure!(
            value.is_finite() && value > 0.0,
            "threshold must be a positive number, got {value}"
        );
        match series {
            Series::Pm25 => thresholds.pm25 = value,
            Series::No2 => thresholds.no2 = value,
        }
    }

    OutlierWindower::new(store, thresholds)
        .outliers_in_context(series)
        .await
        .with_context(|| format!("Failed to find {series} outliers"))
}

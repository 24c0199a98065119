//! Year in review for every enabled site.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use time::{Date, Month};

use airq_core::SharedStore;
use airq_store::{BreachCount, HeatmapCell, SiteRank, StoredSite};
use airq_types::{Series, TimeRange};

use crate::config::DailyLimits;

/// One site's year: when it was worst, how often it breached the daily
/// limit and where it placed among the other sites.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteWrapped {
    pub details: StoredSite,
    pub heatmap: BTreeMap<Series, Vec<HeatmapCell>>,
    pub breach: BTreeMap<Series, BreachCount>,
    /// Absent for a series the site has no readings for.
    pub rank: BTreeMap<Series, SiteRank>,
}

/// The UTC calendar year `year` as a half-open range.
pub fn year_range(year: i32) -> Result<TimeRange> {
    let start = Date::from_calendar_date(year, Month::January, 1)
        .with_context(|| format!("Invalid year {year}"))?;
    let end = Date::from_calendar_date(year + 1, Month::January, 1)
        .with_context(|| format!("Invalid year {year}"))?;
    Ok(TimeRange::new(
        start.midnight().assume_utc(),
        end.midnight().assume_utc(),
    )?)
}

pub async fn cmd_wrapped(store: &SharedStore, year: i32, limits: &DailyLimits) -> Result<Vec<SiteWrapped>> {
    let range = year_range(year)?;
    let days = range.duration().whole_days() as u64;
    let store = store.lock().await;

    let mut heatmaps = BTreeMap::new();
    let mut breaches = BTreeMap::new();
    let mut ranks = BTreeMap::new();
    for series in Series::ALL {
        heatmaps.insert(series, store.heatmap(series, range)?);
        breaches.insert(series, store.breach_days(series, range, limits.get(series))?);
        ranks.insert(series, store.site_ranks(series, range)?);
    }

    let sites = store
        .list_sites(None)?
        .into_iter()
        .filter(|site| site.enabled)
        .map(|details| {
            let mut wrapped = SiteWrapped {
                details,
                heatmap: BTreeMap::new(),
                breach: BTreeMap::new(),
                rank: BTreeMap::new(),
            };
            let code = wrapped.details.site_code.as_str();

            for series in Series::ALL {
                let cells = heatmaps
                    .get(&series)
                    .and_then(|by_site| by_site.get(code))
                    .cloned()
                    .unwrap_or_default();
                wrapped.heatmap.insert(series, cells);

                let breach = breaches
                    .get(&series)
                    .and_then(|counts| counts.iter().find(|b| b.site_code == code))
                    .cloned()
                    .unwrap_or_else(|| BreachCount {
                        site_code: code.to_string(),
                        name: wrapped.details.name.clone(),
                        breach_days: 0,
                        ok_days: 0,
                        no_data_days: days,
                    });
                wrapped.breach.insert(series, breach);

                if let Some(rank) = ranks
                    .get(&series)
                    .and_then(|ranks| ranks.iter().find(|r| r.site_code == code))
                {
                    wrapped.rank.insert(series, rank.clone());
                }
            }
            wrapped
        })
        .collect();

    Ok(sites)
}

// src/shape.rs

use crate::aggregate::{StateYear, StateYearAggregate};
use crate::process::{utils::round2, PlanRecord};
use anyhow::{bail, Result};
use serde::Serialize;
use std::{collections::BTreeMap, str::FromStr};

pub const STATE_AVERAGE: &str = "State Average";

/// Bounds of the map color scale.
pub const CLAMP_MIN: f64 = 50.0;
pub const CLAMP_MAX: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    #[default]
    FundedRatio,
    AssumedReturn,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::FundedRatio, Metric::AssumedReturn];

    /// Dropdown label.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::FundedRatio => "Historical Funded Ratio",
            Metric::AssumedReturn => "Historical Annual Assumed Return",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Metric::FundedRatio => "funded-ratio",
            Metric::AssumedReturn => "assumed-return",
        }
    }

    /// Funded ratio cannot legitimately be zero or negative for an operating
    /// plan, so non-positive values there mean "not reported".
    pub fn drops_non_positive(&self) -> bool {
        matches!(self, Metric::FundedRatio)
    }

    fn of_aggregate(&self, agg: &StateYearAggregate) -> Option<f64> {
        match self {
            Metric::FundedRatio => agg.weighted_funded_ratio,
            Metric::AssumedReturn => agg.weighted_assumed_return,
        }
    }

    fn of_record(&self, r: &PlanRecord) -> Option<f64> {
        match self {
            Metric::FundedRatio => r.funded_ratio,
            Metric::AssumedReturn => r.assumed_return,
        }
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        for m in Metric::ALL {
            if s.eq_ignore_ascii_case(m.label()) || s.eq_ignore_ascii_case(m.slug()) {
                return Ok(m);
            }
        }
        bail!("unknown metric `{}`", s)
    }
}

/// Percentage scale, rounded for display.
fn scale(v: f64) -> f64 {
    round2(v * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapRow {
    pub fiscal_year: i32,
    pub state: String,
    /// Percentage, 2 decimals; 0 when the aggregate is undefined.
    pub display_value: f64,
    /// `display_value` clamped to the color range. Display only.
    pub clamped_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedSeriesRow {
    pub fiscal_year: i32,
    pub state: String,
    pub metric_value: Option<f64>,
    pub series_name: String,
    pub is_state_average: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricTables {
    pub map: Vec<MapRow>,
    pub combined: Vec<CombinedSeriesRow>,
}

pub fn map_table(
    aggregates: &BTreeMap<StateYear, StateYearAggregate>,
    metric: Metric,
) -> Vec<MapRow> {
    aggregates
        .iter()
        .map(|((fy, state), agg)| {
            let display_value = metric.of_aggregate(agg).map(scale).unwrap_or(0.0);
            MapRow {
                fiscal_year: *fy,
                state: state.clone(),
                display_value,
                clamped_value: display_value.clamp(CLAMP_MIN, CLAMP_MAX),
            }
        })
        .collect()
}

/// State averages plus every plan row, for multi-series charts.
///
/// For funded ratio, rows with a missing or non-positive value are left out.
/// Assumed return keeps them; a missing value stays `None` so charts can
/// draw a gap.
pub fn combined_table(
    aggregates: &BTreeMap<StateYear, StateYearAggregate>,
    records: &[PlanRecord],
    metric: Metric,
) -> Vec<CombinedSeriesRow> {
    let averages = aggregates.iter().map(|((fy, state), agg)| CombinedSeriesRow {
        fiscal_year: *fy,
        state: state.clone(),
        metric_value: metric.of_aggregate(agg).map(scale),
        series_name: STATE_AVERAGE.to_string(),
        is_state_average: true,
    });

    let plans = records.iter().map(|r| CombinedSeriesRow {
        fiscal_year: r.fiscal_year,
        state: r.state.clone(),
        metric_value: metric.of_record(r).map(scale),
        series_name: r.plan_name.clone(),
        is_state_average: false,
    });

    let mut rows: Vec<CombinedSeriesRow> = averages
        .chain(plans)
        .filter(|row| !metric.drops_non_positive() || row.metric_value.is_some_and(|v| v > 0.0))
        .collect();

    rows.sort_by(|a, b| {
        a.state
            .cmp(&b.state)
            .then(a.fiscal_year.cmp(&b.fiscal_year))
            .then(b.is_state_average.cmp(&a.is_state_average))
            .then(a.series_name.cmp(&b.series_name))
    });
    rows
}

pub fn metric_tables(
    aggregates: &BTreeMap<StateYear, StateYearAggregate>,
    records: &[PlanRecord],
    metric: Metric,
) -> MetricTables {
    MetricTables {
        map: map_table(aggregates, metric),
        combined: combined_table(aggregates, records, metric),
    }
}

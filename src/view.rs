//! Selection → chart.
//!
//! Every call is a filter over the context's prebuilt tables; nothing here
//! mutates them or can fail.

use crate::context::DashboardContext;
use crate::shape::{Metric, STATE_AVERAGE};
use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value;
use std::{collections::BTreeMap, str::FromStr};
use tracing::debug;

/// Shown until the first usable hover event.
pub const DEFAULT_STATE: &str = "CO";

pub const OVERVIEW: &str = "## Overview

This tool is meant to assist in quick analysis of trends in overall public pension funding. 📊

Unless otherwise notated, all data is sourced from the [Public Plans Database](https://publicplansdata.org), created by Boston College's Center for Retirement Research.

To get started, hover over a state in the below map.
Click on play button below map to see funded ratio over time.
";

pub const HOW_TO_USE: &str = "## How to Use

To use this tool, click on either the \"Data by State\" or \"Data by Plan\" tab.
Unless otherwise noted, data by state shows state averages for plans weighted by
plan size.

On the map to the left, hover over a state to see the corresponding data in charts
in the tabs on the right.
";

pub const PLAN_NOTE: &str = "Dashed lines represent individual pension plans.

Solid lines represent plan-weighted state average.
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tab {
    Summary,
    StateSummary,
    PlanSummary,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::Summary, Tab::StateSummary, Tab::PlanSummary];

    pub fn slug(&self) -> &'static str {
        match self {
            Tab::Summary => "summary",
            Tab::StateSummary => "state-summary",
            Tab::PlanSummary => "plan-summary",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tab::Summary => "Summary",
            Tab::StateSummary => "Data by State",
            Tab::PlanSummary => "Data by Plan",
        }
    }
}

impl FromStr for Tab {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match Tab::ALL.into_iter().find(|t| t.slug().eq_ignore_ascii_case(s)) {
            Some(t) => Ok(t),
            None => bail!("unknown tab `{}`", s),
        }
    }
}

/// State under the cursor, from a map hover payload.
///
/// Reads `points[0].location`; anything else, including the initial
/// `customdata`-only payload, resolves to [`DEFAULT_STATE`].
pub fn selected_state(hover: &Value) -> String {
    match hover
        .get("points")
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("location"))
        .and_then(Value::as_str)
        .map(str::trim)
    {
        Some(s) if !s.is_empty() => s.to_uppercase(),
        _ => {
            debug!("hover payload without a location, using {}", DEFAULT_STATE);
            DEFAULT_STATE.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    Solid,
    Dashed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub fiscal_year: i32,
    /// `None` draws a gap.
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub is_state_average: bool,
    pub line: LineStyle,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub title: String,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub show_legend: bool,
    pub note: Option<&'static str>,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ViewOutput {
    Help { markdown: &'static str },
    Chart(Chart),
}

/// Static parts of a tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabContent {
    pub tab: Tab,
    pub label: &'static str,
    pub markdown: Option<&'static str>,
    pub show_metric_dropdown: bool,
    pub show_chart: bool,
    pub metrics: Vec<&'static str>,
}

pub fn tab_content(tab: Tab) -> TabContent {
    let charted = tab != Tab::Summary;
    TabContent {
        tab,
        label: tab.label(),
        markdown: match tab {
            Tab::Summary => Some(HOW_TO_USE),
            Tab::StateSummary => None,
            Tab::PlanSummary => Some(PLAN_NOTE),
        },
        show_metric_dropdown: charted,
        show_chart: charted,
        metrics: Metric::ALL.iter().map(Metric::label).collect(),
    }
}

fn title(metric: Metric, state: &str) -> String {
    match metric {
        Metric::FundedRatio => format!("Historical Funded Ratio - {}", state),
        Metric::AssumedReturn => format!("Historical Assumed Investment Return - {}", state),
    }
}

fn y_label(metric: Metric, tab: Tab) -> &'static str {
    match (metric, tab) {
        (Metric::FundedRatio, _) => "Funded Ratio",
        (Metric::AssumedReturn, Tab::PlanSummary) => "% Assumed Return",
        (Metric::AssumedReturn, _) => "Annual Assumed Investment",
    }
}

fn keep(metric: Metric, value: Option<f64>) -> bool {
    !metric.drops_non_positive() || value.is_some_and(|v| v > 0.0)
}

/// State tab: the state's average from the map table, one solid line.
fn state_series(ctx: &DashboardContext, metric: Metric, state: &str) -> Vec<Series> {
    let mut points: Vec<Point> = ctx
        .tables(metric)
        .map
        .iter()
        .filter(|r| r.state == state)
        .map(|r| Point {
            fiscal_year: r.fiscal_year,
            value: Some(r.display_value),
        })
        .filter(|p| keep(metric, p.value))
        .collect();
    if points.is_empty() {
        return Vec::new();
    }
    points.sort_by_key(|p| p.fiscal_year);
    vec![Series {
        name: STATE_AVERAGE.to_string(),
        is_state_average: true,
        line: LineStyle::Solid,
        points,
    }]
}

/// Plan tab: the state average plus one dashed line per plan.
fn plan_series(ctx: &DashboardContext, metric: Metric, state: &str) -> Vec<Series> {
    // (not state average, name) puts the average first, then plans by name
    let mut grouped: BTreeMap<(bool, &str), Series> = BTreeMap::new();
    for row in ctx
        .tables(metric)
        .combined
        .iter()
        .filter(|r| r.state == state && keep(metric, r.metric_value))
    {
        grouped
            .entry((!row.is_state_average, row.series_name.as_str()))
            .or_insert_with(|| Series {
                name: row.series_name.clone(),
                is_state_average: row.is_state_average,
                line: if row.is_state_average {
                    LineStyle::Solid
                } else {
                    LineStyle::Dashed
                },
                points: Vec::new(),
            })
            .points
            .push(Point {
                fiscal_year: row.fiscal_year,
                value: row.metric_value,
            });
    }

    grouped
        .into_values()
        .map(|mut s| {
            s.points.sort_by_key(|p| p.fiscal_year);
            s
        })
        .collect()
}

/// Recompute the right-hand panel for one selection.
pub fn render(ctx: &DashboardContext, hover: &Value, metric: Metric, tab: Tab) -> ViewOutput {
    let state = selected_state(hover);
    let (series, show_legend, note) = match tab {
        Tab::Summary => {
            return ViewOutput::Help {
                markdown: HOW_TO_USE,
            }
        }
        Tab::StateSummary => (state_series(ctx, metric, &state), true, None),
        Tab::PlanSummary => (plan_series(ctx, metric, &state), false, Some(PLAN_NOTE)),
    };
    debug!(%state, ?metric, ?tab, series = series.len(), "rendered chart");

    ViewOutput::Chart(Chart {
        title: title(metric, &state),
        x_label: "Fiscal Year",
        y_label: y_label(metric, tab),
        show_legend,
        note,
        series,
    })
}

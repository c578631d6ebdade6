use crate::aggregate::aggregate_states;
use crate::config::Config;
use crate::process::{plan_records, to_record_batch, PlanRecord};
use crate::shape::{metric_tables, Metric, MetricTables};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, instrument};

/// Everything the view layer reads. Built once, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardContext {
    #[serde(skip)]
    pub records: Vec<PlanRecord>,
    pub funded_ratio: MetricTables,
    pub assumed_return: MetricTables,
    pub states: Vec<String>,
    pub fiscal_years: Option<(i32, i32)>,
    #[serde(skip)]
    pub loaded_at: DateTime<Utc>,
}

impl DashboardContext {
    /// Aggregate and shape both metrics from a record snapshot.
    #[instrument(level = "info", skip(records), fields(records = records.len()))]
    pub fn build(records: Vec<PlanRecord>) -> Self {
        let aggregates = aggregate_states(&records);
        let funded_ratio = metric_tables(&aggregates, &records, Metric::FundedRatio);
        let assumed_return = metric_tables(&aggregates, &records, Metric::AssumedReturn);

        let states: BTreeSet<&str> = aggregates.keys().map(|(_, s)| s.as_str()).collect();
        let states = states.into_iter().map(str::to_string).collect();
        let fiscal_years = aggregates
            .keys()
            .map(|(fy, _)| *fy)
            .min()
            .zip(aggregates.keys().map(|(fy, _)| *fy).max());

        info!(
            groups = aggregates.len(),
            funded_rows = funded_ratio.combined.len(),
            assumed_rows = assumed_return.combined.len(),
            "built dashboard tables"
        );

        Self {
            records,
            funded_ratio,
            assumed_return,
            states,
            fiscal_years,
            loaded_at: Utc::now(),
        }
    }

    pub fn tables(&self, metric: Metric) -> &MetricTables {
        match metric {
            Metric::FundedRatio => &self.funded_ratio,
            Metric::AssumedReturn => &self.assumed_return,
        }
    }
}

/// Load the configured source, normalize it and build the context.
///
/// Any failure here is fatal: there is nothing to serve without a snapshot.
#[instrument(level = "info", skip_all)]
pub async fn init(config: &Config, client: &Client) -> Result<DashboardContext> {
    let raw = config
        .source
        .load(client)
        .await
        .context("row source unavailable")?;
    let batch = to_record_batch(&raw)?;
    let (records, report) = plan_records(&batch)?;
    info!(
        rows = report.rows_in,
        records = report.records_out,
        dropped = report.dropped_missing_key,
        "normalized source rows"
    );
    Ok(DashboardContext::build(records))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::process::PlanRecord;

    pub fn rec(
        fy: i32,
        state: &str,
        plan: &str,
        membership: Option<f64>,
        funded: Option<f64>,
        assumed: Option<f64>,
    ) -> PlanRecord {
        PlanRecord {
            fiscal_year: fy,
            state: state.into(),
            plan_name: plan.into(),
            membership,
            funded_ratio: funded,
            assumed_return: assumed,
        }
    }

    /// Two Colorado plans over two years plus a Wyoming plan without membership.
    pub fn sample() -> Vec<PlanRecord> {
        vec![
            rec(2019, "CO", "Colorado PERA", Some(100.0), Some(0.80), Some(0.0725)),
            rec(2019, "CO", "Colorado FPPA", Some(300.0), Some(0.60), Some(0.07)),
            rec(2020, "CO", "Colorado PERA", Some(100.0), Some(0.82), Some(0.0725)),
            rec(2020, "CO", "Colorado FPPA", Some(300.0), None, None),
            rec(2020, "WY", "Wyoming RS", None, Some(0.90), Some(0.07)),
        ]
    }
}

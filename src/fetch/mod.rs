// src/fetch/mod.rs
//! Public Plans Database API client.
//!
//! The API answers `?q=QVariables&variables=...&format=json` with a JSON
//! array whose first element is metadata; every following element is one
//! plan-year row keyed by variable name.

use crate::process::RawTable;
use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "http://publicplansdata.org/api/";

/// Variables the dashboard needs.
pub const DASHBOARD_VARIABLES: &[&str] = &[
    "fy",
    "PlanName",
    "StateAbbrev",
    "ActFundedRatio_GASB",
    "InvestmentReturnAssumption_GASB",
    "TotMembership",
];

/// Everything the loader stores.
pub const LOADER_VARIABLES: &[&str] = &[
    "fy",
    "PlanName",
    "StateAbbrev",
    "ActFundedRatio_GASB",
    "PercentReqContPaid",
    "InvestmentReturnAssumption_GASB",
    "InvestmentReturn_1yr",
    "InvestmentReturn_5yr",
    "InvestmentReturn_10yr",
    "TotMembership",
    "StateName",
];

pub fn to_owned_list(vars: &[&str]) -> Vec<String> {
    vars.iter().map(|v| v.to_string()).collect()
}

/// Build the `QVariables` query URL for `variables`.
pub fn query_url(endpoint: &str, variables: &[String]) -> Result<Url> {
    let mut url =
        Url::parse(endpoint).with_context(|| format!("parsing API endpoint {}", endpoint))?;
    url.query_pairs_mut()
        .append_pair("q", "QVariables")
        .append_pair("variables", &variables.join(","))
        .append_pair("format", "json");
    Ok(url)
}

/// GET the variable list once and turn the body into a raw table.
#[instrument(level = "info", skip(client, variables), fields(vars = variables.len()))]
pub async fn fetch_plan_table(
    client: &Client,
    endpoint: &str,
    variables: &[String],
) -> Result<RawTable> {
    let url = query_url(endpoint, variables)?;
    debug!(%url, "requesting plan data");
    let body = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Non-success status {}", url))?
        .text()
        .await
        .with_context(|| format!("Reading body from {}", url))?;

    let table = parse_plan_body(&body).with_context(|| format!("parsing response from {}", url))?;
    info!(
        rows = table.rows.len(),
        columns = table.headers.len(),
        "fetched plan table"
    );
    Ok(table)
}

fn scalar_to_cell(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Drop the metadata element and lower-case every key.
pub fn parse_plan_body(body: &str) -> Result<RawTable> {
    let value: Value = serde_json::from_str(body).context("response is not JSON")?;
    let Value::Array(items) = value else {
        bail!("expected a JSON array from the API");
    };
    if items.is_empty() {
        warn!("API returned an empty array, not even metadata");
        return Ok(RawTable::default());
    }

    let mut table = RawTable::default();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (i, item) in items.iter().enumerate().skip(1) {
        let Value::Object(obj) = item else {
            bail!("row {} is not a JSON object", i);
        };
        let mut row: Vec<Option<String>> = vec![None; table.headers.len()];
        for (key, v) in obj {
            let key = key.to_lowercase();
            let pos = *positions.entry(key.clone()).or_insert_with(|| {
                table.headers.push(key);
                table.headers.len() - 1
            });
            if row.len() <= pos {
                row.resize(pos + 1, None);
            }
            row[pos] = scalar_to_cell(v);
        }
        table.rows.push(row);
    }
    Ok(table)
}

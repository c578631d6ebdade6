// src/process/mod.rs
pub mod convert;
pub mod utils;

use serde::Serialize;

pub use convert::{plan_records, to_record_batch, NormalizeReport};

pub const COL_FISCAL_YEAR: &str = "fy";
pub const COL_STATE: &str = "stateabbrev";
pub const COL_PLAN_NAME: &str = "planname";
pub const COL_MEMBERSHIP: &str = "totmembership";
pub const COL_FUNDED_RATIO: &str = "actfundedratio_gasb";
pub const COL_ASSUMED_RETURN: &str = "investmentreturnassumption_gasb";

/// Columns coerced to `Float64` by the normalizer.
pub const NUMERIC_COLUMNS: &[&str] = &[COL_MEMBERSHIP, COL_FUNDED_RATIO, COL_ASSUMED_RETURN];

/// Untyped table as handed over by a row source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Lower-cased column names, in first-seen order.
    pub headers: Vec<String>,
    /// One entry per header; `None` is a null or absent cell.
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at `row`/`col`, treating short rows as trailing nulls.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
    }
}

/// One plan observation for one fiscal year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRecord {
    pub fiscal_year: i32,
    pub state: String,
    pub plan_name: String,
    pub membership: Option<f64>,
    pub funded_ratio: Option<f64>,
    pub assumed_return: Option<f64>,
}

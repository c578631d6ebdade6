use crate::process::{
    utils, PlanRecord, RawTable, COL_ASSUMED_RETURN, COL_FISCAL_YEAR, COL_FUNDED_RATIO,
    COL_MEMBERSHIP, COL_PLAN_NAME, COL_STATE, NUMERIC_COLUMNS,
};
use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{
        Array, ArrayRef, Float64Array, Float64Builder, Int32Array, Int32Builder, StringArray,
        StringBuilder,
    },
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counts of rows the normalizer could not turn into records.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeReport {
    pub rows_in: usize,
    pub records_out: usize,
    pub dropped_missing_key: usize,
    pub negative_membership: usize,
}

/// Convert the string cells of a raw table into their final types.
///
/// `fy` becomes `Int32`, the numeric metric columns become `Float64`, and
/// everything else stays `Utf8`. Unparseable values become nulls.
pub fn to_record_batch(raw: &RawTable) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(raw.headers.len());
    let mut out: Vec<ArrayRef> = Vec::with_capacity(raw.headers.len());

    for (col, name) in raw.headers.iter().enumerate() {
        let cells = (0..raw.rows.len()).map(|row| raw.cell(row, col));

        if name == COL_FISCAL_YEAR {
            let mut b = Int32Builder::with_capacity(raw.rows.len());
            for opt in cells {
                b.append_option(opt.and_then(utils::parse_year));
            }
            fields.push(Field::new(name, DataType::Int32, true));
            out.push(Arc::new(b.finish()) as ArrayRef);
        } else if NUMERIC_COLUMNS.contains(&name.as_str()) {
            let mut b = Float64Builder::with_capacity(raw.rows.len());
            for opt in cells {
                b.append_option(opt.and_then(utils::parse_number));
            }
            fields.push(Field::new(name, DataType::Float64, true));
            out.push(Arc::new(b.finish()) as ArrayRef);
        } else {
            let mut b = StringBuilder::new();
            for opt in cells {
                let v = opt.map(utils::clean_str).filter(|s| !s.is_empty());
                b.append_option(v);
            }
            fields.push(Field::new(name, DataType::Utf8, true));
            out.push(Arc::new(b.finish()) as ArrayRef);
        }
    }

    let schema = Arc::new(Schema::new(fields));
    if out.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    RecordBatch::try_new(schema, out).context("building normalized record batch")
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    optional_column(batch, name)?.ok_or_else(|| anyhow!("source table has no `{}` column", name))
}

/// A column the source may leave out entirely; absent reads as all-null.
fn optional_column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<Option<&'a T>> {
    batch
        .column_by_name(name)
        .map(|col| {
            col.as_any()
                .downcast_ref::<T>()
                .ok_or_else(|| anyhow!("column `{}` has unexpected type", name))
        })
        .transpose()
}

/// Extract typed plan records from a normalized batch.
///
/// Rows without a fiscal year, state or plan name cannot be keyed and are
/// dropped. Negative membership is treated as missing. Only the key columns
/// are required; a missing metric column yields `None` for every record.
pub fn plan_records(batch: &RecordBatch) -> Result<(Vec<PlanRecord>, NormalizeReport)> {
    let mut report = NormalizeReport {
        rows_in: batch.num_rows(),
        ..Default::default()
    };
    if batch.num_rows() == 0 {
        return Ok((Vec::new(), report));
    }

    let fy = column::<Int32Array>(batch, COL_FISCAL_YEAR)?;
    let state = column::<StringArray>(batch, COL_STATE)?;
    let plan = column::<StringArray>(batch, COL_PLAN_NAME)?;
    let membership = optional_column::<Float64Array>(batch, COL_MEMBERSHIP)?;
    let funded = optional_column::<Float64Array>(batch, COL_FUNDED_RATIO)?;
    let assumed = optional_column::<Float64Array>(batch, COL_ASSUMED_RETURN)?;

    let get = |arr: Option<&Float64Array>, i: usize| {
        arr.filter(|a| !a.is_null(i)).map(|a| a.value(i))
    };

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if fy.is_null(i) || state.is_null(i) || plan.is_null(i) {
            report.dropped_missing_key += 1;
            continue;
        }

        let mut members = get(membership, i);
        if members.is_some_and(|m| m < 0.0) {
            report.negative_membership += 1;
            members = None;
        }

        records.push(PlanRecord {
            fiscal_year: fy.value(i),
            state: state.value(i).to_uppercase(),
            plan_name: plan.value(i).to_string(),
            membership: members,
            funded_ratio: get(funded, i),
            assumed_return: get(assumed, i),
        });
    }
    report.records_out = records.len();

    if report.dropped_missing_key > 0 {
        warn!(
            dropped = report.dropped_missing_key,
            "rows without fiscal year, state or plan name"
        );
    }
    debug!(?report, "normalized plan records");
    Ok((records, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(headers: &[&str], rows: Vec<Vec<Option<&str>>>) -> RawTable {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(|c| c.map(str::to_string)).collect())
                .collect(),
        }
    }

    const HEADERS: &[&str] = &[
        "fy",
        "stateabbrev",
        "planname",
        "totmembership",
        "actfundedratio_gasb",
        "investmentreturnassumption_gasb",
    ];

    #[test]
    fn numeric_text_becomes_float_and_garbage_becomes_null() -> Result<()> {
        let table = raw(
            HEADERS,
            vec![
                vec![Some("2020"), Some("CO"), Some("PERA"), Some("100"), Some("0.8"), Some("0.0725")],
                vec![Some("2020.0"), Some("CO"), Some("FPPA"), Some("n/a"), Some(""), None],
            ],
        );
        let batch = to_record_batch(&table)?;
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Int32);
        assert_eq!(batch.schema().field(3).data_type(), &DataType::Float64);
        assert_eq!(batch.schema().field(2).data_type(), &DataType::Utf8);

        let (records, report) = plan_records(&batch)?;
        assert_eq!(report.records_out, 2);
        assert_eq!(records[0].membership, Some(100.0));
        assert_eq!(records[0].assumed_return, Some(0.0725));
        assert_eq!(records[1].fiscal_year, 2020);
        assert_eq!(records[1].membership, None);
        assert_eq!(records[1].funded_ratio, None);
        assert_eq!(records[1].assumed_return, None);

        // source table untouched
        assert_eq!(table.cell(1, 3), Some("n/a"));
        Ok(())
    }

    #[test]
    fn rows_without_key_are_dropped_and_negative_membership_is_missing() -> Result<()> {
        let table = raw(
            HEADERS,
            vec![
                vec![None, Some("CO"), Some("PERA"), Some("1"), Some("0.8"), None],
                vec![Some("2020"), None, Some("PERA"), Some("1"), Some("0.8"), None],
                vec![Some("2020"), Some("co"), Some("PERA"), Some("-5"), Some("0.8"), None],
            ],
        );
        let (records, report) = plan_records(&to_record_batch(&table)?)?;
        assert_eq!(report.dropped_missing_key, 2);
        assert_eq!(report.negative_membership, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, "CO");
        assert_eq!(records[0].membership, None);
        Ok(())
    }

    #[test]
    fn short_rows_read_as_nulls() -> Result<()> {
        let table = raw(HEADERS, vec![vec![Some("2021"), Some("TX"), Some("TRS")]]);
        let (records, _) = plan_records(&to_record_batch(&table)?)?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].membership, None);
        assert_eq!(records[0].funded_ratio, None);
        Ok(())
    }

    #[test]
    fn missing_required_column_is_an_error() -> Result<()> {
        let table = raw(&["fy", "stateabbrev"], vec![vec![Some("2020"), Some("CO")]]);
        let err = plan_records(&to_record_batch(&table)?).unwrap_err();
        assert!(err.to_string().contains("planname"));
        Ok(())
    }

    #[test]
    fn absent_metric_key_reads_as_missing() -> Result<()> {
        let body = r#"[{"m":1},{"fy":2020,"PlanName":"A","StateAbbrev":"CO","TotMembership":100,"ActFundedRatio_GASB":0.8}]"#;
        let table = crate::fetch::parse_plan_body(body)?;
        let (records, report) = plan_records(&to_record_batch(&table)?)?;
        assert_eq!(report.records_out, 1);
        assert_eq!(records[0].membership, Some(100.0));
        assert_eq!(records[0].funded_ratio, Some(0.8));
        assert_eq!(records[0].assumed_return, None);
        Ok(())
    }

    #[test]
    fn key_columns_only_is_enough() -> Result<()> {
        let table = raw(
            &["fy", "stateabbrev", "planname"],
            vec![vec![Some("2020"), Some("CO"), Some("PERA")]],
        );
        let (records, _) = plan_records(&to_record_batch(&table)?)?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].membership, None);
        assert_eq!(records[0].funded_ratio, None);
        assert_eq!(records[0].assumed_return, None);
        Ok(())
    }

    #[test]
    fn empty_table_yields_no_records() -> Result<()> {
        let (records, report) = plan_records(&to_record_batch(&RawTable::default())?)?;
        assert!(records.is_empty());
        assert_eq!(report.rows_in, 0);
        Ok(())
    }
}

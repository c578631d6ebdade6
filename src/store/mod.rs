//! SQLite-backed `pensions` table.
//!
//! The loader writes whatever the API returned as text; typing happens in
//! the normalizer on the way out, same as for API data.

use crate::process::RawTable;
use anyhow::{Context, Result};
use rusqlite::{types::ValueRef, Connection, OpenFlags};
use std::path::Path;
use tracing::{debug, info};

/// Columns of the `pensions` table, matching the loader variable list.
pub const PENSION_COLUMNS: &[&str] = &[
    "fy",
    "planname",
    "stateabbrev",
    "actfundedratio_gasb",
    "percentreqcontpaid",
    "investmentreturnassumption_gasb",
    "investmentreturn_1yr",
    "investmentreturn_5yr",
    "investmentreturn_10yr",
    "totmembership",
    "statename",
];

const READ_QUERY: &str = "SELECT fy, stateabbrev, actfundedratio_gasb, planname, totmembership, \
     investmentreturnassumption_gasb FROM pensions";

pub struct PensionStore {
    conn: Connection,
}

impl PensionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .with_context(|| format!("opening database {}", path.display()))?;
        Ok(Self { conn })
    }

    /// Open an existing database without write access; the dashboard never writes.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("opening database {} read-only", path.display()))?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        let cols = PENSION_COLUMNS
            .iter()
            .map(|c| format!("{} TEXT", c))
            .collect::<Vec<_>>()
            .join(", ");
        self.conn
            .execute_batch(&format!("CREATE TABLE IF NOT EXISTS pensions ({});", cols))
            .context("creating pensions table")?;
        Ok(())
    }

    /// Replace the table contents with `table` in one transaction.
    ///
    /// Headers the table has no column for are ignored.
    pub fn replace_all(&mut self, table: &RawTable) -> Result<usize> {
        let known: Vec<(usize, &str)> = table
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| PENSION_COLUMNS.contains(&h.as_str()))
            .map(|(i, h)| (i, h.as_str()))
            .collect();
        let skipped: Vec<&String> = table
            .headers
            .iter()
            .filter(|h| !PENSION_COLUMNS.contains(&h.as_str()))
            .collect();
        if !skipped.is_empty() {
            debug!(?skipped, "columns without a pensions column");
        }

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM pensions", [])
            .context("clearing pensions table")?;
        if !known.is_empty() {
            let names = known.iter().map(|(_, h)| *h).collect::<Vec<_>>().join(", ");
            let slots = (1..=known.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!("INSERT INTO pensions ({}) VALUES ({})", names, slots);
            let mut stmt = tx.prepare(&sql)?;
            for row in 0..table.rows.len() {
                let values: Vec<Option<&str>> =
                    known.iter().map(|(col, _)| table.cell(row, *col)).collect();
                stmt.execute(rusqlite::params_from_iter(values))
                    .with_context(|| format!("inserting row {}", row))?;
            }
        }
        tx.commit().context("committing pensions load")?;
        info!(rows = table.rows.len(), "stored pension rows");
        Ok(table.rows.len())
    }

    /// Read the dashboard columns, stringifying whatever storage class each cell has.
    pub fn load_raw(&self) -> Result<RawTable> {
        let mut stmt = self
            .conn
            .prepare(READ_QUERY)
            .context("preparing pensions query")?;
        let mut table = RawTable::new(
            stmt.column_names()
                .into_iter()
                .map(|c| c.to_lowercase())
                .collect(),
        );
        let width = table.headers.len();

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                let cell = match row.get_ref(i)? {
                    ValueRef::Null => None,
                    ValueRef::Integer(n) => Some(n.to_string()),
                    ValueRef::Real(f) => Some(f.to_string()),
                    ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(_) => None,
                };
                cells.push(cell);
            }
            table.rows.push(cells);
        }
        debug!(rows = table.rows.len(), "read pensions table");
        Ok(table)
    }

    #[cfg(test)]
    fn execute(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{plan_records, to_record_batch};
    use tempfile::tempdir;

    fn loader_table() -> RawTable {
        RawTable {
            headers: vec![
                "fy".into(),
                "planname".into(),
                "stateabbrev".into(),
                "actfundedratio_gasb".into(),
                "totmembership".into(),
                "investmentreturnassumption_gasb".into(),
                "somethingnew".into(),
            ],
            rows: vec![
                vec![
                    Some("2020".into()),
                    Some("Colorado PERA".into()),
                    Some("CO".into()),
                    Some("0.61".into()),
                    Some("600000".into()),
                    Some("0.0725".into()),
                    Some("x".into()),
                ],
                vec![
                    Some("2020".into()),
                    Some("Colorado FPPA".into()),
                    Some("CO".into()),
                    None,
                    Some("30000".into()),
                    Some("0.07".into()),
                    None,
                ],
            ],
        }
    }

    #[test]
    fn round_trip_through_file_database() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("pensions.db");
        {
            let mut store = PensionStore::open(&path)?;
            store.migrate()?;
            assert_eq!(store.replace_all(&loader_table())?, 2);
            // a second load replaces rather than appends
            assert_eq!(store.replace_all(&loader_table())?, 2);
        }

        let store = PensionStore::open_read_only(&path)?;
        let raw = store.load_raw()?;
        assert_eq!(
            raw.headers,
            vec![
                "fy",
                "stateabbrev",
                "actfundedratio_gasb",
                "planname",
                "totmembership",
                "investmentreturnassumption_gasb"
            ]
        );
        assert_eq!(raw.rows.len(), 2);

        let (records, _) = plan_records(&to_record_batch(&raw)?)?;
        assert_eq!(records[0].plan_name, "Colorado PERA");
        assert_eq!(records[0].funded_ratio, Some(0.61));
        assert_eq!(records[1].funded_ratio, None);
        assert_eq!(records[1].membership, Some(30000.0));
        Ok(())
    }

    #[test]
    fn numeric_literals_in_text_columns_normalize() -> Result<()> {
        let store = PensionStore::in_memory()?;
        store.migrate()?;
        store.execute(
            "INSERT INTO pensions (fy, planname, stateabbrev, actfundedratio_gasb, totmembership)
             VALUES (2019, 'Utah RS', 'UT', 0.88, 200000);",
        )?;
        let (records, _) = plan_records(&to_record_batch(&store.load_raw()?)?)?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fiscal_year, 2019);
        assert_eq!(records[0].funded_ratio, Some(0.88));
        assert_eq!(records[0].membership, Some(200000.0));
        assert_eq!(records[0].assumed_return, None);
        Ok(())
    }

    #[test]
    fn read_only_open_of_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(PensionStore::open_read_only(dir.path().join("nope.db")).is_err());
    }
}

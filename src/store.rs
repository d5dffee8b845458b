use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::Result;
use crate::normalize::parse_iso_utc;

pub const ACCOUNTS_SHEET: &str = "Accounts";
pub const TXNS_SHEET: &str = "Transactions";
pub const CONTROL_SHEET: &str = "Control";

/// A spreadsheet-shaped store: named worksheets of string cells, read
/// whole and rewritten whole. There is no row-level update primitive;
/// the reconciler owns merge semantics.
pub trait TabularStore {
    /// All rows of a worksheet, first row = headers. A worksheet that
    /// does not exist yet reads as empty.
    fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>>;

    /// Replace the worksheet contents wholesale (header included).
    fn overwrite(&mut self, sheet: &str, rows: &[Vec<String>]) -> Result<()>;

    fn clear(&mut self, sheet: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Control worksheet (watermark)
// ---------------------------------------------------------------------------

/// Read the `last_run_utc` watermark from row 2 of the control sheet.
pub fn read_watermark(store: &dyn TabularStore) -> Result<Option<DateTime<Utc>>> {
    let rows = store.read_all(CONTROL_SHEET)?;
    if rows.len() < 2 || rows[1].len() < 2 {
        return Ok(None);
    }
    if !rows[1][0].eq_ignore_ascii_case("last_run_utc") {
        return Ok(None);
    }
    Ok(parse_iso_utc(&rows[1][1]))
}

pub fn write_watermark(store: &mut dyn TabularStore, ts: DateTime<Utc>) -> Result<()> {
    let rows = vec![
        vec!["key".to_string(), "value".to_string()],
        vec![
            "last_run_utc".to_string(),
            ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        ],
    ];
    store.overwrite(CONTROL_SHEET, &rows)
}

// ---------------------------------------------------------------------------
// CSV-directory backend
// ---------------------------------------------------------------------------

/// Local store: one `<Sheet>.csv` per worksheet under the data dir.
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf() }
    }

    fn sheet_path(&self, sheet: &str) -> PathBuf {
        self.dir.join(format!("{sheet}.csv"))
    }
}

impl TabularStore for CsvStore {
    fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>> {
        let path = self.sheet_path(sheet);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(std::io::BufReader::new(file));
        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            rows.push(record.iter().map(|f| f.to_string()).collect());
        }
        Ok(rows)
    }

    fn overwrite(&mut self, sheet: &str, rows: &[Vec<String>]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(self.sheet_path(sheet))?;
        for row in rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn clear(&mut self, sheet: &str) -> Result<()> {
        let path = self.sheet_path(sheet);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

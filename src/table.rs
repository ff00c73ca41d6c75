//! Tabular data as exchanged between the fetcher and the CSV files
//!
//! Every cell is kept as text: the grabber only reshapes and re-serializes
//! vendor data, it never computes on it.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use serde_json::Value;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Rows x named columns
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Text form of a JSON value as it should appear in a CSV cell
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

impl Table {
    /// Build a table; every row is padded or truncated to the column count
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Parse newline-delimited JSON records
    ///
    /// Columns are the union of all keys in order of first appearance. Lines that
    /// are blank are ignored, lines that are not JSON objects are skipped.
    pub fn from_ndjson(content: &str) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut records = Vec::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let obj = match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(obj)) => obj,
                Ok(_) => {
                    warn!("Line {} is not a JSON object, skipping", line_num + 1);
                    continue;
                }
                Err(e) => {
                    warn!("Line {} failed to parse as JSON ({}), skipping", line_num + 1, e);
                    continue;
                }
            };

            for key in obj.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
            records.push(obj);
        }

        let rows = records
            .iter()
            .map(|obj| {
                columns
                    .iter()
                    .map(|c| obj.get(c).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();

        debug!("Parsed {} NDJSON records with {} columns", records.len(), columns.len());
        Self { columns, rows }
    }

    /// Parse CSV with a header row
    ///
    /// Records with more fields than the header are skipped, shorter ones are
    /// padded with empty cells.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let mut columns: Vec<String> = rdr
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(str::to_string)
            .collect();
        if let Some(first) = columns.first_mut() {
            *first = first.trim_start_matches('\u{feff}').to_string();
        }

        let width = columns.len();
        let mut rows = Vec::new();
        let mut skipped = 0usize;

        for (idx, record) in rdr.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e).context("Failed to read CSV data"),
                Err(e) => {
                    warn!("CSV record {} is malformed ({}), skipping", idx + 1, e);
                    skipped += 1;
                    continue;
                }
            };
            if record.len() > width {
                warn!("CSV record {} has {} fields, expected {}, skipping", idx + 1, record.len(), width);
                skipped += 1;
                continue;
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        if skipped > 0 {
            info!("Skipped {} malformed CSV records", skipped);
        }
        Ok(Self::new(columns, rows))
    }

    /// Decompress and parse a gzipped CSV file
    pub fn from_gzip_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .context(format!("Failed to open {:?}", path))?;

        Self::from_csv_reader(GzDecoder::new(file))
            .context(format!("Failed to parse gzipped CSV {:?}", path))
    }

    /// Keep only the named columns that exist, in the given order
    pub fn project<S: AsRef<str>>(&self, ordered_columns: &[S]) -> Table {
        let mut picked: Vec<(String, usize)> = Vec::new();
        for name in ordered_columns {
            let name = name.as_ref();
            if picked.iter().any(|(n, _)| n == name) {
                continue;
            }
            if let Some(idx) = self.column_index(name) {
                picked.push((name.to_string(), idx));
            }
        }

        let rows = self
            .rows
            .iter()
            .map(|row| picked.iter().map(|(_, idx)| row[*idx].clone()).collect())
            .collect();

        Table {
            columns: picked.into_iter().map(|(name, _)| name).collect(),
            rows,
        }
    }

    /// Write header + rows to `path`, creating parent directories.
    /// A table without columns becomes an empty file.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {:?}", parent))?;
        }

        // Rows without columns carry no cells; the dataset still gets its file
        if self.columns.is_empty() {
            fs::write(path, "")
                .context(format!("Failed to create CSV file: {:?}", path))?;
            warn!("No columns left for {:?}, wrote an empty file ({} rows dropped)", path, self.rows.len());
            return Ok(());
        }

        let mut wtr = csv::Writer::from_path(path)
            .context(format!("Failed to create CSV file: {:?}", path))?;
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()
            .context(format!("Failed to flush CSV file: {:?}", path))?;

        info!("Saved {} rows to {:?}", self.rows.len(), path);
        Ok(())
    }
}

/// Column Projector: see [`Table::project`]
pub fn project<S: AsRef<str>>(table: &Table, ordered_columns: &[S]) -> Table {
    table.project(ordered_columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn sample() -> Table {
        Table::new(
            vec!["sku_id".into(), "extra".into(), "quantity".into()],
            vec![
                vec!["A1".into(), "x".into(), "2".into()],
                vec!["B2".into(), "y".into(), "5".into()],
            ],
        )
    }

    #[test]
    fn test_ndjson_union_of_columns() {
        let table = Table::from_ndjson("{\"a\":1,\"b\":2}\n\n{\"a\":3,\"c\":null,\"d\":{\"k\":true}}\n");
        assert_eq!(table.columns(), &["a", "b", "c", "d"]);
        assert_eq!(table.rows()[0], vec!["1", "2", "", ""]);
        assert_eq!(table.rows()[1], vec!["3", "", "", "{\"k\":true}"]);
    }

    #[test]
    fn test_ndjson_skips_garbage_lines() {
        let table = Table::from_ndjson("{\"a\":\"x\"}\nnot json\n[1,2]\n{\"a\":\"y\"}");
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1], vec!["y"]);
    }

    #[test]
    fn test_project_orders_and_filters() {
        let projected = sample().project(&["quantity", "missing", "sku_id"]);
        assert_eq!(projected.columns(), &["quantity", "sku_id"]);
        assert_eq!(projected.rows()[0], vec!["2", "A1"]);
        assert_eq!(projected.len(), 2);
    }

    #[test]
    fn test_project_is_idempotent() {
        let cols = ["quantity", "sku_id", "nope"];
        let once = project(&sample(), &cols);
        let twice = project(&once, &cols);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_project_nothing_matches() {
        let projected = sample().project(&["zzz"]);
        assert!(projected.columns().is_empty());
        assert_eq!(projected.len(), 2);
    }

    #[test]
    fn test_columnless_table_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("empty.csv");

        sample().project(&["zzz"]).write_csv(&out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "");

        let out = dir.path().join("braces.csv");
        let table = Table::from_ndjson("{}\n{}\n");
        assert!(table.columns().is_empty());
        table.write_csv(&out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "");
    }

    #[test]
    fn test_csv_reader_skips_long_records() {
        let data = "\u{feff}a,b\n1,2\n3,4,5\n6\n";
        let table = Table::from_csv_reader(data.as_bytes()).unwrap();
        assert_eq!(table.columns(), &["a", "b"]);
        assert_eq!(table.rows(), &[vec!["1".to_string(), "2".to_string()], vec!["6".to_string(), String::new()]]);
    }

    #[test]
    fn test_gzip_csv_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let gz_path = dir.path().join("in.csv.gz");
        let mut enc = GzEncoder::new(File::create(&gz_path).unwrap(), Compression::default());
        enc.write_all("sku_id,quantity\nA1,2\n".as_bytes()).unwrap();
        enc.finish().unwrap();

        let table = Table::from_gzip_csv(&gz_path).unwrap();
        assert_eq!(table.len(), 1);

        let out = dir.path().join("nested/dir/out.csv");
        table.write_csv(&out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "sku_id,quantity\nA1,2\n");
    }
}

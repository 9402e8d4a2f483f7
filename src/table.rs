// In-memory tables read from CSV or spreadsheet files.
//
// The first row is the header row. Cells keep the distinction between
// numbers and text that spreadsheets carry, so numeric columns don't make a
// round trip through strings.

use crate::error::{PriceError, Result};
use crate::util::parse_decimal;
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Textual form used for keys and passthrough columns.
    ///
    /// Whole numbers drop the trailing `.0` so that a material code stored as
    /// a number in one file matches the same code stored as text in another.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) => Some(number_to_text(*n)),
            Cell::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => parse_decimal(s),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Number(_) => false,
            Cell::Text(s) => s.trim().is_empty(),
        }
    }
}

fn number_to_text(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    #[cfg(test)]
    /// Build a table from string literals; numeric-looking cells stay text and
    /// are parsed on access.
    pub fn from_strings(headers: &[&str], rows: &[Vec<&str>]) -> Self {
        let mut table = Table::new(headers.iter().map(|h| h.to_string()).collect());
        for row in rows {
            table.push_row(row.iter().map(|v| text_cell(v)).collect());
        }
        table
    }

    /// Append a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.headers.len(), Cell::Empty);
        self.rows.push(row);
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

fn text_cell(s: &str) -> Cell {
    if s.trim().is_empty() {
        Cell::Empty
    } else {
        Cell::Text(s.to_string())
    }
}

/// Read a table, dispatching on the file extension.
pub fn read_table(path: &Path) -> Result<Table> {
    let ext = extension_of(path);
    let table = match ext.as_str() {
        "csv" => read_csv(path)?,
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_workbook(path)?,
        _ => {
            return Err(PriceError::UnsupportedFormat(format!(
                ".{} (supported: .csv, .xlsx, .xlsm, .xls, .xlsb, .ods)",
                ext
            )))
        }
    };
    debug!(
        path = %path.display(),
        columns = table.headers.len(),
        rows = table.len(),
        "table loaded"
    );
    Ok(table)
}

pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn read_csv(path: &Path) -> Result<Table> {
    let raw = std::fs::read(path)?;
    let delimiter = sniff_delimiter(&raw);
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(strip_bom(&raw));

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut table = Table::new(headers);
    for record in rdr.records() {
        let record = record?;
        let row: Vec<Cell> = record.iter().map(text_cell).collect();
        if row.iter().all(Cell::is_empty) {
            continue;
        }
        table.push_row(row);
    }
    Ok(table)
}

fn strip_bom(raw: &[u8]) -> &[u8] {
    raw.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(raw)
}

/// Pick `;` or `,` by counting them on the header line.
fn sniff_delimiter(raw: &[u8]) -> u8 {
    let first_line = raw.split(|b| *b == b'\n').next().unwrap_or(&[]);
    let semis = first_line.iter().filter(|b| **b == b';').count();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    if semis > commas {
        b';'
    } else {
        b','
    }
}

fn read_workbook(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range?,
        None => return Ok(Table::default()),
    };

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Table::default());
    };
    let headers: Vec<String> = header_row
        .iter()
        .map(|c| data_to_cell(c).as_text().unwrap_or_default())
        .collect();

    let mut table = Table::new(headers);
    for row in rows {
        let cells: Vec<Cell> = row.iter().map(data_to_cell).collect();
        if cells.iter().all(Cell::is_empty) {
            continue;
        }
        table.push_row(cells);
    }
    Ok(table)
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => text_cell(s),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(format!("#ERR:{:?}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn reads_semicolon_csv_with_decimal_commas() {
        let (_dir, path) = write_temp(
            "base.csv",
            "Equipamento;MAX_PU;MIN_PU\nM1;11,5;9\n;;\nM2;1.200,00;\n",
        );
        let table = read_table(&path).unwrap();
        assert_eq!(table.headers, vec!["Equipamento", "MAX_PU", "MIN_PU"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][1].as_number(), Some(11.5));
        assert_eq!(table.rows[1][1].as_number(), Some(1200.0));
        assert_eq!(table.rows[1][2], Cell::Empty);
    }

    #[test]
    fn reads_comma_csv_and_trims_headers() {
        let (_dir, path) = write_temp("t.csv", "\u{feff} Material ,Qtd\nA,1\n");
        let table = read_table(&path).unwrap();
        assert_eq!(table.headers, vec!["Material", "Qtd"]);
        assert_eq!(table.column("Qtd"), Some(1));
    }

    #[test]
    fn rejects_unknown_extension() {
        let (_dir, path) = write_temp("notes.txt", "a,b\n");
        assert!(matches!(
            read_table(&path),
            Err(PriceError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn numeric_codes_render_without_fraction() {
        assert_eq!(Cell::Number(12345.0).as_text().as_deref(), Some("12345"));
        assert_eq!(Cell::Number(9.5).as_text().as_deref(), Some("9.5"));
        assert_eq!(Cell::Text("  ".into()).as_text(), None);
        assert_eq!(Cell::Text(" M1 ".into()).as_text().as_deref(), Some("M1"));
    }

    #[test]
    fn short_rows_are_padded() {
        let table = Table::from_strings(&["a", "b", "c"], &[vec!["1"]]);
        assert_eq!(table.rows[0].len(), 3);
        assert!(table.rows[0][2].is_empty());
    }
}

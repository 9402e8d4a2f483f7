use crate::error::Result;
use crate::types::{PricedRecord, ResultRow};
use crate::util::{format_number, format_percent};
use chrono::NaiveDateTime;
use rust_xlsxwriter::{DocProperties, ExcelDateTime, Format, FormatAlign, FormatBorder, Workbook};
use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

pub const SHEET_NAME: &str = "Resultado";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub const RESULT_COLUMNS: [&str; 12] = [
    "Empresa",
    "Elemento PEP",
    "Material",
    "Descrição do Material",
    "Qtd.total entrada",
    "Valor/moeda objeto",
    "PU",
    "MAX_PU",
    "MIN_PU",
    "Desvio",
    "Desvio %",
    "Resultado",
];

const NUMBER_FORMAT: &str = "#,##0.00";
const MAX_COLUMN_WIDTH: usize = 60;

/// The downloadable workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportArtifact {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

/// `Resultado_20241031_142501.xlsx`, or `Resultado.xlsx` without a timestamp.
pub fn artifact_name(prefix: &str, timestamp: Option<NaiveDateTime>) -> String {
    match timestamp {
        Some(ts) => format!("{}_{}.xlsx", prefix, ts.format("%Y%m%d_%H%M%S")),
        None => format!("{}.xlsx", prefix),
    }
}

pub fn build_artifact(
    records: &[PricedRecord],
    prefix: &str,
    timestamp: Option<NaiveDateTime>,
) -> Result<ReportArtifact> {
    Ok(ReportArtifact {
        file_name: artifact_name(prefix, timestamp),
        mime_type: XLSX_MIME,
        bytes: render_xlsx(records)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderGroup {
    Identity,
    Maximum,
    Minimum,
    Outcome,
}

fn header_group(col: usize) -> HeaderGroup {
    match RESULT_COLUMNS[col] {
        "MAX_PU" => HeaderGroup::Maximum,
        "MIN_PU" => HeaderGroup::Minimum,
        "Desvio" | "Desvio %" | "Resultado" => HeaderGroup::Outcome,
        _ => HeaderGroup::Identity,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum CellValue {
    Text(String),
    Number(f64),
    Blank,
}

impl CellValue {
    fn text(s: Option<&str>) -> Self {
        match s {
            Some(s) if !s.is_empty() => CellValue::Text(s.to_string()),
            _ => CellValue::Blank,
        }
    }

    fn number(n: Option<f64>) -> Self {
        n.map_or(CellValue::Blank, CellValue::Number)
    }

    /// What the cell shows, used for column sizing and text exports.
    fn rendered(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n, 2),
            CellValue::Blank => String::new(),
        }
    }
}

/// Cell values of one record, in `RESULT_COLUMNS` order.
fn record_cells(r: &PricedRecord) -> [CellValue; 12] {
    let deviation = r.classification.deviation();
    [
        CellValue::text(Some(&r.company)),
        CellValue::text(Some(&r.project_element)),
        CellValue::text(Some(&r.material)),
        CellValue::text(r.description.as_deref()),
        CellValue::Number(r.quantity),
        CellValue::Number(r.value),
        CellValue::Number(r.unit_price),
        CellValue::number(r.max_pu),
        CellValue::number(r.min_pu),
        CellValue::number(deviation.map(|d| d.absolute)),
        CellValue::text(deviation.and_then(|d| d.percent).map(format_percent).as_deref()),
        CellValue::Text(r.classification.label().to_string()),
    ]
}

pub fn to_rows(records: &[PricedRecord]) -> Vec<ResultRow> {
    records
        .iter()
        .map(|r| {
            let [company, project_element, material, description, quantity, value, unit_price, max_pu, min_pu, deviation, deviation_pct, result] =
                record_cells(r).map(|c| c.rendered());
            ResultRow {
                company,
                project_element,
                material,
                description,
                quantity,
                value,
                unit_price,
                max_pu,
                min_pu,
                deviation,
                deviation_pct,
                result,
            }
        })
        .collect()
}

struct ReportFormats {
    identity_header: Format,
    maximum_header: Format,
    minimum_header: Format,
    outcome_header: Format,
    text: Format,
    number: Format,
    flagged: Format,
}

impl ReportFormats {
    fn new() -> Self {
        let header = |color: u32| {
            Format::new()
                .set_bold()
                .set_align(FormatAlign::Center)
                .set_background_color(color)
                .set_font_color(0xFFFFFF)
                .set_border(FormatBorder::Thin)
        };
        Self {
            identity_header: header(0x1F4E78),
            maximum_header: header(0xC00000),
            minimum_header: header(0x548235),
            outcome_header: header(0x7F6000),
            text: Format::new().set_border(FormatBorder::Thin),
            number: Format::new()
                .set_num_format(NUMBER_FORMAT)
                .set_border(FormatBorder::Thin),
            flagged: Format::new()
                .set_bold()
                .set_font_color(0xC00000)
                .set_border(FormatBorder::Thin),
        }
    }

    fn header(&self, group: HeaderGroup) -> &Format {
        match group {
            HeaderGroup::Identity => &self.identity_header,
            HeaderGroup::Maximum => &self.maximum_header,
            HeaderGroup::Minimum => &self.minimum_header,
            HeaderGroup::Outcome => &self.outcome_header,
        }
    }
}

/// Render the "Resultado" sheet.
///
/// The document creation date is pinned, so the same records always produce
/// the same bytes.
pub fn render_xlsx(records: &[PricedRecord]) -> Result<Vec<u8>> {
    let formats = ReportFormats::new();
    let mut workbook = Workbook::new();
    let properties = DocProperties::new().set_creation_datetime(&ExcelDateTime::from_ymd(2000, 1, 1)?);
    workbook.set_properties(&properties);

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let mut widths: Vec<usize> = RESULT_COLUMNS.iter().map(|h| h.chars().count()).collect();
    for (col, header) in RESULT_COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, formats.header(header_group(col)))?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        let out_of_range = record.classification.deviation().is_some();
        for (col, cell) in record_cells(record).iter().enumerate() {
            widths[col] = widths[col].max(cell.rendered().chars().count());
            let col = col as u16;
            match cell {
                CellValue::Text(s) if out_of_range && col as usize == RESULT_COLUMNS.len() - 1 => {
                    sheet.write_string_with_format(row, col, s, &formats.flagged)?;
                }
                CellValue::Text(s) => {
                    sheet.write_string_with_format(row, col, s, &formats.text)?;
                }
                CellValue::Number(n) => {
                    sheet.write_number_with_format(row, col, *n, &formats.number)?;
                }
                CellValue::Blank => {
                    sheet.write_blank(row, col, &formats.text)?;
                }
            }
        }
    }

    for (col, width) in widths.iter().enumerate() {
        sheet.set_column_width(col as u16, (*width).min(MAX_COLUMN_WIDTH) as f64 + 2.0)?;
    }
    sheet.autofilter(0, 0, records.len() as u32, (RESULT_COLUMNS.len() - 1) as u16)?;
    sheet.set_freeze_panes(1, 0)?;

    Ok(workbook.save_to_buffer()?)
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Classification, Deviation};
    use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
    use std::io::Cursor;

    fn record(material: &str, classification: Classification) -> PricedRecord {
        PricedRecord {
            company: "A".into(),
            project_element: "P1".into(),
            material: material.into(),
            description: Some("Cabo de cobre".into()),
            quantity: 1500.0,
            value: 15000.0,
            unit_price: 10.0,
            max_pu: Some(9.5),
            min_pu: Some(9.0),
            classification,
        }
    }

    fn sample() -> Vec<PricedRecord> {
        let mut missing = record("M2", Classification::ReferenceNotFound);
        missing.description = None;
        missing.max_pu = None;
        missing.min_pu = None;
        vec![
            record(
                "M1",
                Classification::AboveMaximum(Deviation {
                    absolute: 0.5,
                    percent: Some(5.0),
                }),
            ),
            missing,
        ]
    }

    fn read_back(bytes: Vec<u8>) -> (Vec<String>, calamine::Range<Data>) {
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        let names = workbook.sheet_names().to_vec();
        let range = workbook.worksheet_range(SHEET_NAME).unwrap();
        (names, range)
    }

    #[test]
    fn workbook_has_result_sheet_with_fixed_columns() {
        let bytes = render_xlsx(&sample()).unwrap();
        let (names, range) = read_back(bytes);
        assert_eq!(names, vec![SHEET_NAME.to_string()]);

        let header: Vec<String> = range.rows().next().unwrap().iter().map(|c| c.to_string()).collect();
        assert_eq!(header, RESULT_COLUMNS.map(String::from).to_vec());

        assert_eq!(range.get_value((1, 2)), Some(&Data::String("M1".into())));
        assert_eq!(range.get_value((1, 6)), Some(&Data::Float(10.0)));
        assert_eq!(range.get_value((1, 9)), Some(&Data::Float(0.5)));
        assert_eq!(range.get_value((1, 10)), Some(&Data::String("5.00%".into())));
        assert_eq!(
            range.get_value((1, 11)),
            Some(&Data::String("Acima do máximo".into()))
        );
    }

    #[test]
    fn missing_values_are_empty_cells() {
        let bytes = render_xlsx(&sample()).unwrap();
        let (_, range) = read_back(bytes);
        for col in [3u32, 7, 8, 9, 10] {
            let v = range.get_value((2, col)).cloned().unwrap_or(Data::Empty);
            assert_eq!(v, Data::Empty, "column {}", col);
        }
        assert_eq!(
            range.get_value((2, 11)),
            Some(&Data::String("Referência não encontrada".into()))
        );
    }

    #[test]
    fn same_records_give_identical_bytes() {
        let a = render_xlsx(&sample()).unwrap();
        let b = render_xlsx(&sample()).unwrap();
        assert!(a.starts_with(b"PK"));
        assert_eq!(a, b);
    }

    #[test]
    fn empty_result_still_renders_header() {
        let bytes = render_xlsx(&[]).unwrap();
        let (_, range) = read_back(bytes);
        assert_eq!(range.height(), 1);
    }

    #[test]
    fn rows_render_blanks_and_thousands_separators() {
        let rows = to_rows(&sample());
        assert_eq!(rows[0].quantity, "1,500.00");
        assert_eq!(rows[0].value, "15,000.00");
        assert_eq!(rows[0].deviation, "0.50");
        assert_eq!(rows[0].deviation_pct, "5.00%");
        assert_eq!(rows[1].max_pu, "");
        assert_eq!(rows[1].deviation, "");
        assert_eq!(rows[1].description, "");
    }

    #[test]
    fn artifact_carries_name_and_mime_type() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 10, 31)
            .unwrap()
            .and_hms_opt(14, 25, 1)
            .unwrap();
        assert_eq!(artifact_name("Resultado", Some(ts)), "Resultado_20241031_142501.xlsx");
        let artifact = build_artifact(&sample(), "Resultado", None).unwrap();
        assert_eq!(artifact.file_name, "Resultado.xlsx");
        assert_eq!(artifact.mime_type, XLSX_MIME);
        assert!(!artifact.bytes.is_empty());
    }

    #[test]
    fn csv_export_uses_report_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultado.csv");
        write_csv(&path, &to_rows(&sample())).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let first = content.lines().next().unwrap();
        assert_eq!(first, RESULT_COLUMNS.join(","));
    }
}

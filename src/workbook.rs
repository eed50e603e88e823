//! The `.xlsx` artifact: the `Wastage Data` sheet followed by one sheet per
//! analytics view.

use crate::analytics::{Analytics, View, ViewName};
use crate::error::ArtifactError;
use crate::model::{Report, TIMESTAMP_FORMAT, WastageRecord};
use calamine::{Data, DataType, Reader, Xlsx};
use chrono::NaiveDateTime;
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use std::io::Cursor;

pub const MAIN_SHEET: &str = "Wastage Data";

pub const COL_ENTRY_ID: &str = "Entry ID";
pub const COL_TIMESTAMP: &str = "Timestamp";
pub const COL_SUBMITTER: &str = "Submitter_Name";
pub const COL_DEPARTMENT: &str = "Department";
pub const COL_OUTLET: &str = "Outlet";
pub const COL_PRODUCT: &str = "Product Name";
pub const COL_AMOUNT: &str = "Amount Wasted";
pub const COL_NOTES: &str = "Notes";

pub const COLUMNS: [&str; 8] = [
    COL_ENTRY_ID,
    COL_TIMESTAMP,
    COL_SUBMITTER,
    COL_DEPARTMENT,
    COL_OUTLET,
    COL_PRODUCT,
    COL_AMOUNT,
    COL_NOTES,
];

// Older reports were written with `Username` instead of `Submitter_Name`.
const LEGACY_SUBMITTER: &str = "Username";

struct ReportFormats {
    header: Format,
    cell: Format,
    text: Format,
}

impl ReportFormats {
    fn new() -> Self {
        Self {
            header: Format::new()
                .set_bold()
                .set_border(FormatBorder::Thin)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_text_wrap(),
            cell: Format::new()
                .set_border(FormatBorder::Thin)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter),
            text: Format::new()
                .set_align(FormatAlign::Left)
                .set_border(FormatBorder::Thin)
                .set_text_wrap()
                .set_align(FormatAlign::VerticalCenter),
        }
    }
}

fn write_headers(ws: &mut Worksheet, headers: &[&str], fmt: &Format) -> Result<(), ArtifactError> {
    for (i, h) in headers.iter().enumerate() {
        ws.write_string_with_format(0, i as u16, *h, fmt)?;
    }
    ws.set_freeze_panes(1, 0)?;
    Ok(())
}

fn set_column_widths(ws: &mut Worksheet, widths: &[u16]) -> Result<(), ArtifactError> {
    for (col, w) in widths.iter().enumerate() {
        ws.set_column_width(col as u16, *w)?;
    }
    Ok(())
}

fn write_record(
    ws: &mut Worksheet,
    row: u32,
    r: &WastageRecord,
    fmt: &ReportFormats,
) -> Result<(), ArtifactError> {
    ws.write_number_with_format(row, 0, r.entry_id as f64, &fmt.cell)?;
    ws.write_string_with_format(row, 1, r.timestamp_text(), &fmt.cell)?;
    ws.write_string_with_format(row, 2, &r.submitter_name, &fmt.text)?;
    ws.write_string_with_format(row, 3, &r.department, &fmt.text)?;
    ws.write_string_with_format(row, 4, &r.outlet, &fmt.text)?;
    ws.write_string_with_format(row, 5, &r.product_name, &fmt.text)?;
    ws.write_string_with_format(row, 6, &r.amount_wasted, &fmt.cell)?;
    if r.notes.is_empty() {
        ws.write_blank(row, 7, &fmt.text)?;
    } else {
        ws.write_string_with_format(row, 7, &r.notes, &fmt.text)?;
    }
    Ok(())
}

fn write_records(
    ws: &mut Worksheet,
    records: &[WastageRecord],
    fmt: &ReportFormats,
) -> Result<(), ArtifactError> {
    ws.set_name(MAIN_SHEET)?;
    write_headers(ws, &COLUMNS, &fmt.header)?;
    for (i, r) in records.iter().enumerate() {
        write_record(ws, i as u32 + 1, r, fmt)?;
    }
    set_column_widths(ws, &[10, 20, 18, 14, 14, 24, 14, 30])
}

fn write_view(
    ws: &mut Worksheet,
    name: ViewName,
    view: View<'_>,
    fmt: &ReportFormats,
) -> Result<(), ArtifactError> {
    ws.set_name(name.sheet_name())?;
    write_headers(ws, name.headers(), &fmt.header)?;
    match view {
        View::Groups(groups) => {
            for (i, g) in groups.iter().enumerate() {
                let row = i as u32 + 1;
                ws.write_string_with_format(row, 0, &g.key, &fmt.text)?;
                ws.write_number_with_format(row, 1, g.incidents as f64, &fmt.cell)?;
                ws.write_number_with_format(row, 2, g.total_wastage, &fmt.cell)?;
            }
            set_column_widths(ws, &[24, 10, 14])
        }
        View::Daily(days) => {
            for (i, d) in days.iter().enumerate() {
                let row = i as u32 + 1;
                ws.write_string_with_format(row, 0, d.date.format("%Y-%m-%d").to_string(), &fmt.cell)?;
                ws.write_number_with_format(row, 1, d.amount_wasted, &fmt.cell)?;
            }
            set_column_widths(ws, &[14, 14])
        }
    }
}

/// Serializes the records and every analytics view into one workbook.
pub fn encode(report: &Report, analytics: &Analytics) -> Result<Vec<u8>, ArtifactError> {
    let fmt = ReportFormats::new();
    let mut workbook = Workbook::new();
    write_records(workbook.add_worksheet(), &report.records, &fmt)?;
    for (name, view) in analytics.views() {
        write_view(workbook.add_worksheet(), name, view, &fmt)?;
    }
    Ok(workbook.save_to_buffer()?)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_entry_id(cell: &Data) -> Option<u64> {
    match cell {
        Data::Int(v) => u64::try_from(*v).ok(),
        Data::Float(v) if v.fract() == 0.0 && *v >= 0.0 => Some(*v as u64),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_timestamp(cell: &Data) -> Option<NaiveDateTime> {
    match cell {
        Data::String(s) | Data::DateTimeIso(s) => {
            let s = s.trim();
            NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                .ok()
        }
        Data::DateTime(_) => cell.as_datetime(),
        _ => None,
    }
}

/// Column positions resolved from the header row.
struct ColumnMap {
    entry_id: usize,
    timestamp: usize,
    submitter: usize,
    department: usize,
    outlet: usize,
    product: usize,
    amount: usize,
    notes: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &[Data]) -> Result<Self, ArtifactError> {
        let names: Vec<String> = header.iter().map(|c| cell_text(c).trim().to_string()).collect();
        let find = |name: &str| names.iter().position(|n| n == name);
        let require = |name: &'static str| find(name).ok_or(ArtifactError::MissingColumn(name));
        Ok(Self {
            entry_id: require(COL_ENTRY_ID)?,
            timestamp: require(COL_TIMESTAMP)?,
            submitter: find(COL_SUBMITTER)
                .or_else(|| find(LEGACY_SUBMITTER))
                .ok_or(ArtifactError::MissingColumn(COL_SUBMITTER))?,
            department: require(COL_DEPARTMENT)?,
            outlet: require(COL_OUTLET)?,
            product: require(COL_PRODUCT)?,
            amount: require(COL_AMOUNT)?,
            notes: find(COL_NOTES),
        })
    }

    fn record(&self, row: &[Data], row_no: usize) -> Result<WastageRecord, ArtifactError> {
        let cell = |idx: usize| row.get(idx).unwrap_or(&Data::Empty);
        let text = |idx: usize| cell_text(cell(idx));
        let bad = |reason: String| ArtifactError::BadRow {
            row: row_no,
            reason,
        };

        let entry_id = parse_entry_id(cell(self.entry_id))
            .ok_or_else(|| bad(format!("invalid {COL_ENTRY_ID} `{}`", text(self.entry_id))))?;
        let timestamp = parse_timestamp(cell(self.timestamp))
            .ok_or_else(|| bad(format!("invalid {COL_TIMESTAMP} `{}`", text(self.timestamp))))?;
        Ok(WastageRecord {
            entry_id,
            timestamp,
            submitter_name: text(self.submitter),
            department: text(self.department),
            outlet: text(self.outlet),
            product_name: text(self.product),
            amount_wasted: text(self.amount),
            notes: self.notes.map(text).unwrap_or_default(),
        })
    }
}

/// Reads the records back from a stored workbook. The analytics sheets are
/// ignored; they are rebuilt on every write.
pub fn decode(blob: &[u8]) -> Result<Report, ArtifactError> {
    let mut book: Xlsx<_> = Xlsx::new(Cursor::new(blob))?;
    if !book.sheet_names().iter().any(|n| n == MAIN_SHEET) {
        return Err(ArtifactError::MissingSheet(MAIN_SHEET.to_string()));
    }
    let range = book.worksheet_range(MAIN_SHEET)?;
    let first_row = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Report::default());
    };
    let columns = ColumnMap::from_header(header)?;

    let mut records = Vec::new();
    for (i, row) in rows.enumerate() {
        if row.iter().all(|c| cell_text(c).trim().is_empty()) {
            continue;
        }
        records.push(columns.record(row, first_row + 1 + i)?);
    }
    Ok(Report::new(records))
}

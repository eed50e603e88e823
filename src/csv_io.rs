use crate::model::{NewItem, Report};
use crate::workbook::COLUMNS;
use anyhow::Result;
use csv::{ReaderBuilder, Writer};
use serde::Deserialize;
use std::{
    fs::File,
    path::{Path, PathBuf},
};

/// Appends `.csv` unless the name already ends with it.
pub fn csv_path(filename: &Path) -> PathBuf {
    if filename.extension().is_some_and(|ext| ext == "csv") {
        filename.to_path_buf()
    } else {
        let mut name = filename.as_os_str().to_owned();
        name.push(".csv");
        PathBuf::from(name)
    }
}

// A short row leaves trailing fields out entirely, so `Notes` has to be an
// `Option` for `flexible` reading to accept it.
#[derive(Debug, Deserialize)]
struct ItemRow {
    #[serde(rename = "Product Name")]
    product_name: String,
    #[serde(rename = "Amount Wasted")]
    amount_wasted: String,
    #[serde(rename = "Notes")]
    notes: Option<String>,
}

impl From<ItemRow> for NewItem {
    fn from(row: ItemRow) -> Self {
        NewItem::new(row.product_name, row.amount_wasted).with_notes(row.notes.unwrap_or_default())
    }
}

/// Reads batch items from a `Product Name,Amount Wasted[,Notes]` table.
pub fn load_items<P: AsRef<Path>>(path: P) -> Result<Vec<NewItem>> {
    let file = File::open(path)?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);
    let mut items = Vec::new();
    for result in rdr.deserialize() {
        let row: ItemRow = result?;
        items.push(row.into());
    }
    Ok(items)
}

/// Writes the `Wastage Data` table as CSV, same columns and order as the
/// workbook. Returns the path actually written.
pub fn export_records(report: &Report, filename: &Path) -> Result<PathBuf> {
    let csv_filename = csv_path(filename);
    let mut wtr = Writer::from_path(&csv_filename)?;
    wtr.write_record(COLUMNS)?;
    for r in &report.records {
        wtr.write_record([
            r.entry_id.to_string(),
            r.timestamp_text(),
            r.submitter_name.clone(),
            r.department.clone(),
            r.outlet.clone(),
            r.product_name.clone(),
            r.amount_wasted.clone(),
            r.notes.clone(),
        ])?;
    }
    wtr.flush()?;
    Ok(csv_filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WastageRecord;
    use chrono::NaiveDate;
    use std::fs;

    #[test]
    fn csv_extension_is_added_once() {
        assert_eq!(csv_path(Path::new("out")), PathBuf::from("out.csv"));
        assert_eq!(csv_path(Path::new("out.csv")), PathBuf::from("out.csv"));
        assert_eq!(csv_path(Path::new("out.xlsx")), PathBuf::from("out.xlsx.csv"));
    }

    #[test]
    fn items_with_and_without_notes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.csv");
        fs::write(
            &path,
            "Product Name,Amount Wasted,Notes\nBread, 3 ,stale\nMilk,2\n",
        )
        .unwrap();
        let items = load_items(&path).unwrap();
        assert_eq!(
            items,
            [
                NewItem::new("Bread", "3").with_notes("stale"),
                NewItem::new("Milk", "2"),
            ]
        );
    }

    #[test]
    fn items_without_notes_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.csv");
        fs::write(&path, "Product Name,Amount Wasted\nLemons,7.5\n").unwrap();
        assert_eq!(load_items(&path).unwrap(), [NewItem::new("Lemons", "7.5")]);
    }

    #[test]
    fn export_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let report = Report::new(vec![WastageRecord {
            entry_id: 1,
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            submitter_name: "Alice".into(),
            department: "Bakery".into(),
            outlet: "Main Counter".into(),
            product_name: "Bread".into(),
            amount_wasted: "3".into(),
            notes: "end of day, unsold".into(),
        }]);
        let written = export_records(&report, &dir.path().join("data")).unwrap();
        assert_eq!(written, dir.path().join("data.csv"));
        assert_eq!(
            fs::read_to_string(written).unwrap(),
            "Entry ID,Timestamp,Submitter_Name,Department,Outlet,Product Name,Amount Wasted,Notes\n\
             1,2024-03-01 08:00:00,Alice,Bakery,Main Counter,Bread,3,\"end of day, unsold\"\n"
        );
    }
}

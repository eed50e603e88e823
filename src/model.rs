use chrono::NaiveDateTime;
use serde::Deserialize;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One wasted item as it is stored in the `Wastage Data` sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct WastageRecord {
    pub entry_id: u64,
    pub timestamp: NaiveDateTime,
    pub submitter_name: String,
    pub department: String,
    pub outlet: String,
    pub product_name: String,
    /// Kept exactly as entered; analytics coerce it to a number on the fly.
    pub amount_wasted: String,
    pub notes: String,
}

impl WastageRecord {
    pub fn timestamp_text(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// A single item row supplied by the form layer.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub product_name: String,
    pub amount_wasted: String,
    pub notes: String,
}

impl NewItem {
    pub fn new(product_name: impl Into<String>, amount_wasted: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            amount_wasted: amount_wasted.into(),
            notes: String::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// Everything one "Submit Report" action hands over to the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub submitter_name: String,
    pub department: String,
    pub outlet: String,
    pub items: Vec<NewItem>,
}

impl Submission {
    pub fn new(
        submitter_name: impl Into<String>,
        department: impl Into<String>,
        outlet: impl Into<String>,
        items: Vec<NewItem>,
    ) -> Self {
        Self {
            submitter_name: submitter_name.into(),
            department: department.into(),
            outlet: outlet.into(),
            items,
        }
    }
}

/// The full record sequence in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub records: Vec<WastageRecord>,
}

impl Report {
    pub fn new(records: Vec<WastageRecord>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn next_entry_id(&self) -> u64 {
        self.records.iter().map(|r| r.entry_id).max().unwrap_or(0) + 1
    }
}

#[derive(Debug, Deserialize)]
pub struct TaxonomyRecord {
    #[serde(rename = "Department")]
    pub department: String,
    #[serde(rename = "Outlet")]
    pub outlet: String,
}

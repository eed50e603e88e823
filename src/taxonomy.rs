use crate::error::ValidationError;
use crate::model::TaxonomyRecord;
use anyhow::Result;
use csv::ReaderBuilder;
use std::{fs::File, path::Path};

pub const DEPARTMENTS: [&str; 4] = ["Bakery", "Kitchen", "Bar", "Other"];
pub const OUTLETS: [&str; 4] = ["Main Counter", "Kiosk 1", "Kiosk 2", "Mobile Unit"];

/// Departments and the outlets each of them may report for, in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct Taxonomy {
    departments: Vec<(String, Vec<String>)>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        let outlets: Vec<String> = OUTLETS.iter().map(|o| o.to_string()).collect();
        Self {
            departments: DEPARTMENTS
                .iter()
                .map(|d| (d.to_string(), outlets.clone()))
                .collect(),
        }
    }
}

impl Taxonomy {
    pub fn from_pairs<I, D, O>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (D, O)>,
        D: Into<String>,
        O: Into<String>,
    {
        let mut taxonomy = Self {
            departments: Vec::new(),
        };
        for (department, outlet) in pairs {
            taxonomy.insert(department.into(), outlet.into());
        }
        taxonomy
    }

    /// Reads a `Department,Outlet` table, one allowed pair per row.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);
        let mut taxonomy = Self {
            departments: Vec::new(),
        };
        for result in rdr.deserialize() {
            let r: TaxonomyRecord = result?;
            taxonomy.insert(r.department, r.outlet);
        }
        anyhow::ensure!(
            !taxonomy.departments.is_empty(),
            "taxonomy table has no department/outlet rows"
        );
        Ok(taxonomy)
    }

    fn insert(&mut self, department: String, outlet: String) {
        match self.departments.iter_mut().find(|(d, _)| *d == department) {
            Some((_, outlets)) => {
                if !outlets.contains(&outlet) {
                    outlets.push(outlet);
                }
            }
            None => self.departments.push((department, vec![outlet])),
        }
    }

    pub fn departments(&self) -> impl Iterator<Item = &str> {
        self.departments.iter().map(|(d, _)| d.as_str())
    }

    pub fn outlets_for(&self, department: &str) -> Option<&[String]> {
        self.departments
            .iter()
            .find(|(d, _)| d == department)
            .map(|(_, outlets)| outlets.as_slice())
    }

    pub fn check(&self, department: &str, outlet: &str) -> Result<(), ValidationError> {
        let outlets = self
            .outlets_for(department)
            .ok_or_else(|| ValidationError::UnknownDepartment(department.to_string()))?;
        if outlets.iter().any(|o| o == outlet) {
            Ok(())
        } else {
            Err(ValidationError::OutletNotInDepartment {
                outlet: outlet.to_string(),
                department: department.to_string(),
            })
        }
    }
}

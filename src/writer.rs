//! Fetch, merge, rebuild analytics, write back.
//!
//! Each call does one linear round trip against the store. There is no cache
//! between calls, so every submission merges onto the freshest artifact the
//! store hands out.

use crate::analytics::AnalyticsBuilder;
use crate::error::{StoreError, ValidationError, WriteError};
use crate::model::{Report, Submission, WastageRecord};
use crate::store::{PutCondition, ReportStore};
use crate::taxonomy::Taxonomy;
use crate::workbook;
use chrono::{Local, NaiveDateTime, SubsecRound};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyMode {
    /// Put only if the object is still the revision that was fetched.
    #[default]
    Optimistic,
    /// Unconditional put; a concurrent submission can be overwritten.
    LastWriterWins,
}

/// What the store held when the current round trip started.
enum Base {
    Absent,
    Present { version: Option<String> },
}

impl Base {
    fn condition(&self, mode: ConcurrencyMode) -> PutCondition<'_> {
        match (mode, self) {
            (ConcurrencyMode::LastWriterWins, _) => PutCondition::Always,
            (ConcurrencyMode::Optimistic, Base::Absent) => PutCondition::IfAbsent,
            (ConcurrencyMode::Optimistic, Base::Present { version: Some(v) }) => {
                PutCondition::IfMatch(v)
            }
            // The backend does not hand out versions; nothing to check against.
            (ConcurrencyMode::Optimistic, Base::Present { version: None }) => PutCondition::Always,
        }
    }
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub struct ReportWriter<S> {
    store: S,
    taxonomy: Taxonomy,
    concurrency: ConcurrencyMode,
    clock: Clock,
}

impl<S: ReportStore> ReportWriter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            taxonomy: Taxonomy::default(),
            concurrency: ConcurrencyMode::default(),
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    pub fn with_taxonomy(mut self, taxonomy: Taxonomy) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyMode) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDateTime + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Checks a submission against the field rules. Does no I/O.
    pub fn validate(&self, submission: &Submission) -> Result<(), ValidationError> {
        if submission.submitter_name.trim().is_empty() {
            return Err(ValidationError::EmptySubmitter);
        }
        self.taxonomy
            .check(submission.department.trim(), submission.outlet.trim())?;
        for (i, item) in submission.items.iter().enumerate() {
            let index = i + 1;
            if item.product_name.trim().is_empty() {
                return Err(ValidationError::EmptyProduct { index });
            }
            if item.amount_wasted.trim().is_empty() {
                return Err(ValidationError::EmptyAmount { index });
            }
        }
        Ok(())
    }

    fn fetch_current(&self) -> Result<(Report, Base), WriteError> {
        let key = self.store.key();
        let fetch_failed = |source: StoreError| WriteError::FetchFailed {
            key: key.to_string(),
            source,
        };
        match self.store.fetch().map_err(fetch_failed)? {
            None => Ok((Report::default(), Base::Absent)),
            Some(snapshot) => {
                let report = workbook::decode(&snapshot.blob)
                    .map_err(|e| fetch_failed(StoreError::Corrupt(e)))?;
                debug!(key, records = report.len(), version = ?snapshot.version, "fetched report");
                Ok((
                    report,
                    Base::Present {
                        version: snapshot.version,
                    },
                ))
            }
        }
    }

    fn persist(&self, report: &Report, condition: PutCondition<'_>) -> Result<(), WriteError> {
        let analytics = AnalyticsBuilder::build(&report.records);
        let blob = workbook::encode(report, &analytics).map_err(WriteError::EncodeFailed)?;
        self.store
            .put(&blob, condition)
            .map_err(|source| WriteError::PersistFailed {
                key: self.store.key().to_string(),
                source,
            })
    }

    /// Current records; an absent report reads as empty.
    pub fn load(&self) -> Result<Report, WriteError> {
        self.fetch_current().map(|(report, _)| report)
    }

    /// Creates an empty report unless one already exists. Returns whether a
    /// new report was written.
    pub fn init(&self) -> Result<bool, WriteError> {
        let (_, base) = self.fetch_current()?;
        if let Base::Present { .. } = base {
            return Ok(false);
        }
        self.persist(&Report::default(), PutCondition::IfAbsent)?;
        info!(key = self.store.key(), "created empty report");
        Ok(true)
    }

    /// Appends the submission's items to the stored report and rewrites it.
    /// Returns the number of rows written.
    pub fn submit(&self, submission: &Submission) -> Result<usize, WriteError> {
        if submission.items.is_empty() {
            debug!("empty submission, nothing to write");
            return Ok(0);
        }
        self.validate(submission)?;

        let (mut report, base) = self.fetch_current()?;

        let timestamp = (self.clock)().trunc_subsecs(0);
        let first_id = report.next_entry_id();
        let submitter_name = submission.submitter_name.trim();
        let department = submission.department.trim();
        let outlet = submission.outlet.trim();
        report
            .records
            .extend(
                submission
                    .items
                    .iter()
                    .zip(first_id..)
                    .map(|(item, entry_id)| WastageRecord {
                        entry_id,
                        timestamp,
                        submitter_name: submitter_name.to_string(),
                        department: department.to_string(),
                        outlet: outlet.to_string(),
                        product_name: item.product_name.trim().to_string(),
                        amount_wasted: item.amount_wasted.trim().to_string(),
                        notes: item.notes.trim().to_string(),
                    }),
            );

        self.persist(&report, base.condition(self.concurrency))?;

        let count = submission.items.len();
        info!(
            key = self.store.key(),
            count,
            first_id,
            last_id = first_id + count as u64 - 1,
            total = report.len(),
            "appended wastage records"
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewItem;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(12, 0, 0, 750)
            .unwrap()
    }

    fn writer(store: MemoryStore) -> ReportWriter<MemoryStore> {
        ReportWriter::new(store).with_clock(noon)
    }

    fn bakery(items: Vec<NewItem>) -> Submission {
        Submission::new("Alice", "Bakery", "Main Counter", items)
    }

    #[test]
    fn condition_follows_base_and_mode() {
        let absent = Base::Absent;
        let versioned = Base::Present {
            version: Some("3".into()),
        };
        let unversioned = Base::Present { version: None };
        assert_eq!(absent.condition(ConcurrencyMode::Optimistic), PutCondition::IfAbsent);
        assert_eq!(
            versioned.condition(ConcurrencyMode::Optimistic),
            PutCondition::IfMatch("3")
        );
        assert_eq!(unversioned.condition(ConcurrencyMode::Optimistic), PutCondition::Always);
        assert_eq!(versioned.condition(ConcurrencyMode::LastWriterWins), PutCondition::Always);
    }

    #[test]
    fn fields_are_trimmed_and_timestamp_truncated() {
        let w = writer(MemoryStore::new("r.xlsx"));
        let submission = Submission::new(
            "  Alice ",
            "Bakery",
            " Main Counter",
            vec![NewItem::new(" Bread ", " 3 ").with_notes(" stale ")],
        );
        assert_eq!(w.submit(&submission).unwrap(), 1);

        let r = &w.load().unwrap().records[0];
        assert_eq!(r.submitter_name, "Alice");
        assert_eq!(r.outlet, "Main Counter");
        assert_eq!(r.product_name, "Bread");
        assert_eq!(r.amount_wasted, "3");
        assert_eq!(r.notes, "stale");
        assert_eq!(r.timestamp_text(), "2024-03-01 12:00:00");
    }

    #[test]
    fn validation_reports_first_bad_item() {
        let w = writer(MemoryStore::new("r.xlsx"));
        let submission = bakery(vec![
            NewItem::new("Bread", "3"),
            NewItem::new("Milk", "  "),
            NewItem::new("", "1"),
        ]);
        assert_eq!(
            w.validate(&submission),
            Err(ValidationError::EmptyAmount { index: 2 })
        );
    }

    #[test]
    fn empty_submitter_is_rejected() {
        let w = writer(MemoryStore::new("r.xlsx"));
        let submission = Submission::new(" ", "Bakery", "Main Counter", vec![NewItem::new("Bread", "1")]);
        assert_eq!(w.validate(&submission), Err(ValidationError::EmptySubmitter));
    }

    #[test]
    fn init_creates_once() {
        let w = writer(MemoryStore::new("r.xlsx"));
        assert!(w.init().unwrap());
        assert!(!w.init().unwrap());
        assert_eq!(w.store().put_count(), 1);
        assert!(w.load().unwrap().is_empty());
    }

    #[test]
    fn init_does_not_touch_existing_report() {
        let w = writer(MemoryStore::new("r.xlsx"));
        w.submit(&bakery(vec![NewItem::new("Bread", "3")])).unwrap();
        let before = w.store().blob();
        assert!(!w.init().unwrap());
        assert_eq!(w.store().blob(), before);
    }
}

//! Food-waste incident reports kept as a single `.xlsx` workbook in a blob
//! store.
//!
//! [`ReportWriter::submit`] fetches the current workbook, appends a batch of
//! [`NewItem`]s with fresh entry ids, rebuilds the analytics sheets and puts
//! the whole workbook back.

pub mod analytics;
pub mod config;
pub mod csv_io;
pub mod error;
pub mod model;
pub mod store;
pub mod taxonomy;
pub mod workbook;
pub mod writer;

pub use analytics::{Analytics, AnalyticsBuilder, ViewName};
pub use config::{Backend, StoreArgs, StoreConfig};
pub use error::{ArtifactError, StoreError, ValidationError, WriteError};
pub use model::{NewItem, Report, Submission, WastageRecord};
pub use store::{FsStore, HttpStore, MemoryStore, PutCondition, ReportStore, Snapshot};
pub use taxonomy::Taxonomy;
pub use writer::{ConcurrencyMode, ReportWriter};

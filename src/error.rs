use std::{fmt, time::Duration};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Fetch,
    Put,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "fetch",
            Self::Put => "put",
        })
    }
}

/// Failures of the blob store itself. `NotFound` is the only one the writer
/// does not treat as fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,
    #[error("object was modified since it was fetched")]
    Conflict,
    #[error("{op} timed out after {after:?}")]
    Timeout { op: StoreOp, after: Duration },
    #[error("{op} returned HTTP status {status}")]
    Status { op: StoreOp, status: u16 },
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("HTTP transport error")]
    Http(#[source] reqwest::Error),
    #[error("stored report is unreadable")]
    Corrupt(#[from] ArtifactError),
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to encode workbook")]
    Encode(#[from] rust_xlsxwriter::XlsxError),
    #[error("failed to decode workbook")]
    Decode(#[from] calamine::XlsxError),
    #[error("sheet `{0}` is missing")]
    MissingSheet(String),
    #[error("column `{0}` is missing")]
    MissingColumn(&'static str),
    #[error("row {row}: {reason}")]
    BadRow { row: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("submitter name is empty")]
    EmptySubmitter,
    #[error("unknown department `{0}`")]
    UnknownDepartment(String),
    #[error("outlet `{outlet}` does not belong to department `{department}`")]
    OutletNotInDepartment { outlet: String, department: String },
    #[error("item #{index}: product name is empty")]
    EmptyProduct { index: usize },
    #[error("item #{index}: amount wasted is empty")]
    EmptyAmount { index: usize },
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("submission rejected")]
    ValidationFailed(#[from] ValidationError),
    #[error("could not fetch report `{key}`")]
    FetchFailed {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("could not encode report")]
    EncodeFailed(#[source] ArtifactError),
    #[error("could not persist report `{key}`")]
    PersistFailed {
        key: String,
        #[source]
        source: StoreError,
    },
}

impl WriteError {
    /// True when the put lost an optimistic-concurrency race; resubmitting
    /// the same batch is safe.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::PersistFailed {
                source: StoreError::Conflict,
                ..
            }
        )
    }
}

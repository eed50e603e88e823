//! Whole-object persistence of the report artifact.
//!
//! A store knows exactly one object (the well-known report key). It offers
//! get and put, nothing finer grained, and may attach an opaque version token
//! to what it returns so a later put can be made conditional.

use crate::error::StoreError;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

mod fs;
mod http;

pub use fs::FsStore;
pub use http::HttpStore;

/// The raw bytes of the stored artifact as of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub blob: Vec<u8>,
    pub version: Option<String>,
}

/// Precondition attached to a put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition<'a> {
    Always,
    /// Only create; fail with `Conflict` if the object exists.
    IfAbsent,
    /// Only replace the revision identified by the token.
    IfMatch(&'a str),
}

pub trait ReportStore {
    /// Name of the object, used in error context and logs.
    fn key(&self) -> &str;

    /// Reads the object. Backends return `StoreError::NotFound` when it does
    /// not exist.
    fn get(&self) -> Result<Snapshot, StoreError>;

    /// Replaces the object in one step.
    fn put(&self, blob: &[u8], condition: PutCondition<'_>) -> Result<(), StoreError>;

    /// Like `get`, but an absent object is `Ok(None)`. Every other failure
    /// is still an error.
    fn fetch(&self) -> Result<Option<Snapshot>, StoreError> {
        match self.get() {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(StoreError::NotFound) => {
                debug!(key = self.key(), "report object does not exist yet");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl<S: ReportStore + ?Sized> ReportStore for &S {
    fn key(&self) -> &str {
        (**self).key()
    }

    fn get(&self) -> Result<Snapshot, StoreError> {
        (**self).get()
    }

    fn put(&self, blob: &[u8], condition: PutCondition<'_>) -> Result<(), StoreError> {
        (**self).put(blob, condition)
    }
}

impl<S: ReportStore + ?Sized> ReportStore for Box<S> {
    fn key(&self) -> &str {
        (**self).key()
    }

    fn get(&self) -> Result<Snapshot, StoreError> {
        (**self).get()
    }

    fn put(&self, blob: &[u8], condition: PutCondition<'_>) -> Result<(), StoreError> {
        (**self).put(blob, condition)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    object: Option<(Vec<u8>, u64)>,
    revision: u64,
    fetches: usize,
    puts: usize,
}

/// Process-local store. Versions are a revision counter, and every call is
/// counted so callers can assert on I/O.
#[derive(Debug)]
pub struct MemoryStore {
    key: String,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn with_blob(key: impl Into<String>, blob: Vec<u8>) -> Self {
        let store = Self::new(key);
        {
            let mut state = store.lock();
            state.revision = 1;
            state.object = Some((blob, 1));
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave a half-written object.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn blob(&self) -> Option<Vec<u8>> {
        self.lock().object.as_ref().map(|(blob, _)| blob.clone())
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    pub fn put_count(&self) -> usize {
        self.lock().puts
    }
}

impl ReportStore for MemoryStore {
    fn key(&self) -> &str {
        &self.key
    }

    fn get(&self) -> Result<Snapshot, StoreError> {
        let mut state = self.lock();
        state.fetches += 1;
        match &state.object {
            Some((blob, revision)) => Ok(Snapshot {
                blob: blob.clone(),
                version: Some(revision.to_string()),
            }),
            None => Err(StoreError::NotFound),
        }
    }

    fn put(&self, blob: &[u8], condition: PutCondition<'_>) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.puts += 1;
        let current = state.object.as_ref().map(|(_, rev)| rev.to_string());
        let allowed = match condition {
            PutCondition::Always => true,
            PutCondition::IfAbsent => current.is_none(),
            PutCondition::IfMatch(token) => current.as_deref() == Some(token),
        };
        if !allowed {
            return Err(StoreError::Conflict);
        }
        state.revision += 1;
        let revision = state.revision;
        state.object = Some((blob.to_vec(), revision));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_object_fetches_as_none() {
        let store = MemoryStore::new("report.xlsx");
        assert!(matches!(store.get(), Err(StoreError::NotFound)));
        assert_eq!(store.fetch().unwrap(), None);
        assert_eq!(store.fetch_count(), 2);
    }

    #[test]
    fn put_bumps_version() {
        let store = MemoryStore::new("report.xlsx");
        store.put(b"one", PutCondition::IfAbsent).unwrap();
        let first = store.fetch().unwrap().unwrap();
        store.put(b"two", PutCondition::Always).unwrap();
        let second = store.fetch().unwrap().unwrap();
        assert_eq!(second.blob, b"two");
        assert_ne!(first.version, second.version);
    }

    #[test]
    fn stale_token_conflicts_and_keeps_object() {
        let store = MemoryStore::with_blob("report.xlsx", b"base".to_vec());
        let seen = store.fetch().unwrap().unwrap();
        let token = seen.version.as_deref().unwrap();

        store.put(b"first", PutCondition::IfMatch(token)).unwrap();
        let err = store.put(b"second", PutCondition::IfMatch(token)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        assert_eq!(store.blob().unwrap(), b"first");
    }

    #[test]
    fn if_absent_refuses_to_overwrite() {
        let store = MemoryStore::with_blob("report.xlsx", b"base".to_vec());
        assert!(matches!(
            store.put(b"new", PutCondition::IfAbsent),
            Err(StoreError::Conflict)
        ));
        assert_eq!(store.put_count(), 1);
    }
}

use super::{PutCondition, ReportStore, Snapshot};
use crate::error::{StoreError, StoreOp};
use std::{
    fs::{self, File, Metadata},
    io::{self, Read, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::{Duration, UNIX_EPOCH},
};
use tempfile::NamedTempFile;
use tracing::debug;

/// Keeps the report as a file inside a directory. Puts go through a temp
/// file in the same directory and a rename, so readers see either the old
/// or the new workbook.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
    key: String,
    timeout: Option<Duration>,
}

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            key: key.into(),
            timeout: None,
        }
    }

    /// Bounds every fetch and put. The file operation runs on its own thread;
    /// when the bound expires the caller gets `StoreError::Timeout` and the
    /// thread is left to finish or hang on its own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.key)
    }

    fn bounded<T, F>(&self, op: StoreOp, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    {
        let Some(after) = self.timeout else {
            return f();
        };
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(f());
        });
        match rx.recv_timeout(after) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(StoreError::Timeout { op, after }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(io::Error::other(format!("{op} of {} aborted", self.key)).into())
            }
        }
    }
}

// Modification time, size and inode. Every put renames a fresh file into
// place, so the inode changes even when time and size collide, unless the
// filesystem hands a just-freed inode straight back.
fn stamp(meta: &Metadata) -> String {
    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{modified}-{}-{}", meta.len(), inode(meta))
}

#[cfg(unix)]
fn inode(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode(_meta: &Metadata) -> u64 {
    0
}

fn metadata_if_present(path: &Path) -> Result<Option<Metadata>, StoreError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// A first write gets the same mode `File::create` would give (0666 less the
// umask) instead of tempfile's private 0600.
#[cfg(unix)]
fn temp_file_in(dir: &Path) -> io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;
    tempfile::Builder::new()
        .permissions(fs::Permissions::from_mode(0o666))
        .tempfile_in(dir)
}

#[cfg(not(unix))]
fn temp_file_in(dir: &Path) -> io::Result<NamedTempFile> {
    NamedTempFile::new_in(dir)
}

fn read_file(path: &Path) -> Result<Snapshot, StoreError> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound),
        Err(e) => return Err(e.into()),
    };
    let version = stamp(&file.metadata()?);
    let mut blob = Vec::new();
    file.read_to_end(&mut blob)?;
    debug!(path = %path.display(), bytes = blob.len(), "read report file");
    Ok(Snapshot {
        blob,
        version: Some(version),
    })
}

/// `None` writes unconditionally; `Some(expected)` requires the current
/// stamp (or absence) to match.
fn replace_file(
    dir: &Path,
    path: &Path,
    blob: &[u8],
    expected: Option<Option<String>>,
) -> Result<(), StoreError> {
    // Check-then-rename is not atomic across processes; it narrows the race
    // window, it does not close it.
    let current = metadata_if_present(path)?;
    if let Some(expected) = expected {
        if current.as_ref().map(stamp) != expected {
            return Err(StoreError::Conflict);
        }
    }

    let mut tmp = temp_file_in(dir)?;
    if let Some(meta) = &current {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    tmp.write_all(blob)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    debug!(path = %path.display(), bytes = blob.len(), "replaced report file");
    Ok(())
}

impl ReportStore for FsStore {
    fn key(&self) -> &str {
        &self.key
    }

    fn get(&self) -> Result<Snapshot, StoreError> {
        let path = self.path();
        self.bounded(StoreOp::Fetch, move || read_file(&path))
    }

    fn put(&self, blob: &[u8], condition: PutCondition<'_>) -> Result<(), StoreError> {
        let expected = match condition {
            PutCondition::Always => None,
            PutCondition::IfAbsent => Some(None),
            PutCondition::IfMatch(token) => Some(Some(token.to_owned())),
        };
        let (dir, path, blob) = (self.dir.clone(), self.path(), blob.to_vec());
        self.bounded(StoreOp::Put, move || {
            replace_file(&dir, &path, &blob, expected)
        })
    }
}

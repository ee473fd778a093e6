//! Storage for the annotation snapshot, injected into the session.

use std::path::{Path, PathBuf};

use crate::snapshot::{Snapshot, STORE_KEY};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Read/write access to the single snapshot entry.
///
/// `write` replaces the whole entry; there are no partial updates.
pub trait SnapshotStore {
    /// `Ok(None)` when nothing has been stored yet.
    fn read(&self) -> Result<Option<Snapshot>, StoreError>;
    fn write(&mut self, snapshot: &Snapshot) -> Result<(), StoreError>;
    fn erase(&mut self) -> Result<(), StoreError>;
}

fn decode(raw: &str) -> Result<Snapshot, StoreError> {
    Ok(serde_json::from_str::<Snapshot>(raw)?)
}

/// In-process store holding the raw JSON text, as a browser key-value store would.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    raw: Option<String>,
    fail_writes: bool,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with arbitrary stored text, valid or not.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
            ..Self::default()
        }
    }

    /// Makes every following write fail as if the store were full.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl SnapshotStore for MemoryStore {
    fn read(&self) -> Result<Option<Snapshot>, StoreError> {
        self.raw.as_deref().map(decode).transpose()
    }

    fn write(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("quota exceeded".into()));
        }
        self.raw = Some(serde_json::to_string(snapshot)?);
        self.writes += 1;
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StoreError> {
        self.raw = None;
        Ok(())
    }
}

/// One JSON file per key inside a directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self::with_key(dir, STORE_KEY)
    }

    pub fn with_key(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{key}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileStore {
    fn read(&self) -> Result<Option<Snapshot>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => decode(&data).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_string_pretty(snapshot)?;
        // Readers never see a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

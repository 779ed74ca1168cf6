//! File-backed engine: one JSON document per store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<host>/<user>/<name>.json
//! ```
//!
//! where `host` and `user` are `current` or `any`. Documents are replaced
//! atomically on commit (write to a temporary file in the same directory,
//! then rename over the original).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::domain::{Domain, PendingOp};
use crate::engine::{CachedStore, DurableBackend};
use crate::error::{StoreError, StoreResult};
use crate::scope::StoreId;

/// Durable storage in a directory of JSON documents.
#[derive(Clone, Debug)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the document for `id`.
    pub fn document_path(&self, id: &StoreId) -> StoreResult<PathBuf> {
        validate_name(&id.name)?;
        Ok(self
            .root
            .join(id.host.as_str())
            .join(id.user.as_str())
            .join(format!("{}.json", id.name)))
    }

    fn read_document(path: &Path) -> StoreResult<Domain> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Domain::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map_err(|e| StoreError::CorruptDocument {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    let reason = if name.is_empty() {
        "empty"
    } else if name.contains(['/', '\\']) {
        "contains a path separator"
    } else if name.starts_with('.') {
        "starts with '.'"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

impl DurableBackend for FileBackend {
    fn load(&self, id: &StoreId) -> StoreResult<Domain> {
        Self::read_document(&self.document_path(id)?)
    }

    fn persist(&self, id: &StoreId, ops: &[PendingOp]) -> StoreResult<()> {
        let path = self.document_path(id)?;
        if ops.is_empty() {
            return Ok(());
        }

        let mut document = Self::read_document(&path)?;
        document.apply_all(ops);

        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        let encoded = serde_json::to_vec_pretty(&document).map_err(|e| {
            StoreError::CorruptDocument {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        tmp.write_all(&encoded)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(store = %id, path = %path.display(), ops = ops.len(), "document written");
        Ok(())
    }
}

/// Engine whose durable storage is a directory of JSON documents.
pub type FileNativeStore = CachedStore<FileBackend>;

impl CachedStore<FileBackend> {
    /// Open an engine rooted at `root`. The directory is created on first
    /// commit if it does not exist.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::with_backend(FileBackend::new(root))
    }

    pub fn root(&self) -> &Path {
        self.backend().root()
    }
}

//! Pluggable repository storage.
//!
//! Every higher layer (objects, refs, index, wire handlers) talks to a
//! repository through the [`Storage`] trait: a forward-slash keyed byte store
//! with a directory-like listing surface. Three backends are provided:
//!
//! - [`MemoryStorage`]: shared in-memory map, cheap to clone, used by tests
//!   and embedded servers.
//! - [`LocalStorage`]: plain files under a root directory.
//! - [`KvStorage`]: directory semantics synthesized over any flat key→bytes
//!   bucket (the shape an object-store + metadata-DB deployment provides).

mod abort;
mod kv;
mod local;
mod memory;

pub use abort::AbortSignal;
pub use kv::{Bucket, BucketEntry, KvStorage, MemoryBucket};
pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// Errors produced by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("storage not initialized: call init() with a repository name first")]
    NotInitialized,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// True if this error means the path simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Size and modification time of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// File size in bytes.
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch.
    pub modified: u64,
}

/// Uniform key→bytes and directory-like surface over a repository.
///
/// Paths are forward-slash separated and rooted at the repository selected by
/// [`init`](Storage::init). Directories may be implicit: `list_directory`
/// must return the immediate-children names of any path that has at least one
/// descendant file, and writes auto-materialize missing parents.
pub trait Storage: Send {
    /// Set the active repository scope. All other methods operate relative
    /// to the most recently initialized repository.
    fn init(&mut self, repo: &str) -> Result<(), StorageError>;

    /// Whether a file (or any descendant of an implicit directory) exists.
    fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Read a file's full contents.
    fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a file, creating any missing parent directories.
    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a file. Deleting a missing file fails with `NotFound`.
    fn delete_file(&mut self, path: &str) -> Result<(), StorageError>;

    /// Create a directory (and parents). May be a no-op for backends with
    /// implicit directories.
    fn create_directory(&mut self, path: &str) -> Result<(), StorageError>;

    /// List the immediate child names (files and subdirectories) of a path.
    fn list_directory(&self, path: &str) -> Result<Vec<String>, StorageError>;

    /// Recursively delete a directory and everything beneath it.
    fn delete_directory(&mut self, path: &str) -> Result<(), StorageError>;

    /// Size and modification time of a file.
    fn file_info(&self, path: &str) -> Result<FileInfo, StorageError>;
}

/// Milliseconds since the Unix epoch, for backends that stamp writes.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Reject empty, absolute, and parent-escaping paths.
pub(crate) fn validate_path(path: &str) -> Result<(), StorageError> {
    if path.is_empty() {
        return Err(StorageError::InvalidPath("empty path".into()));
    }
    if path.starts_with('/') {
        return Err(StorageError::InvalidPath(format!(
            "absolute path not allowed: {path}"
        )));
    }
    if path.split('/').any(|seg| seg == "..") {
        return Err(StorageError::InvalidPath(format!(
            "path escapes repository: {path}"
        )));
    }
    Ok(())
}

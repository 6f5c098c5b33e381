//! The staging area: a binary DIRC file persisted through [`harbor_storage`].
//!
//! Entries are kept sorted by path with unique paths; every mutation is
//! followed by an explicit [`Index::save`]. A missing index file is
//! equivalent to an empty index.

mod read;
mod write;

use bstr::{BStr, BString, ByteSlice};
use harbor_hash::{HashError, Oid};
use harbor_object::{store, FileMode, ObjectError, Tree};
use harbor_storage::{Storage, StorageError};

/// Repository-relative location of the index file.
pub(crate) const INDEX_PATH: &str = ".git/index";

/// Magic bytes at the start of the index file.
pub(crate) const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";

/// The only version written (and accepted).
pub(crate) const INDEX_VERSION: u32 = 2;

/// Errors produced by index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid index header: {0}")]
    InvalidHeader(String),

    #[error("unsupported index version: {0}")]
    UnsupportedVersion(u32),

    #[error("invalid index entry at offset {offset}: {reason}")]
    InvalidEntry { offset: usize, reason: String },

    #[error("index checksum mismatch")]
    ChecksumMismatch,

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A single staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Repository-relative path, `/`-separated.
    pub path: BString,
    /// Blob OID of the staged content.
    pub oid: Oid,
    pub mode: FileMode,
    /// Staged file size in bytes.
    pub size: u32,
    /// Modification time in milliseconds since the Unix epoch.
    pub mtime_ms: u64,
}

/// The in-memory index: a sorted, unique-by-path entry list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the index from storage. A missing file yields an empty index.
    pub fn load<S: Storage>(storage: &S) -> Result<Self, IndexError> {
        match storage.read_file(INDEX_PATH) {
            Ok(data) => read::parse(&data),
            Err(e) if e.is_not_found() => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Serialize and persist the index.
    pub fn save<S: Storage>(&self, storage: &mut S) -> Result<(), IndexError> {
        storage.write_file(INDEX_PATH, &write::serialize(self))?;
        Ok(())
    }

    /// Insert or replace the entry for a path, keeping the list sorted.
    pub fn add_entry(&mut self, entry: IndexEntry) {
        match self
            .entries
            .binary_search_by(|e| e.path.cmp(&entry.path))
        {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    /// Remove the entry for a path. Returns whether one existed.
    pub fn remove_entry(&mut self, path: &BStr) -> bool {
        match self
            .entries
            .binary_search_by(|e| e.path.as_bstr().cmp(path))
        {
            Ok(i) => {
                self.entries.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    /// Look up an entry by path.
    pub fn get(&self, path: &BStr) -> Option<&IndexEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_bstr().cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Entries in sorted order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replace the contents with a depth-first walk of a tree.
    ///
    /// One entry per non-directory leaf, full path joined by `/`, mode
    /// copied verbatim. Sizes come from the blob payloads; mtimes are zeroed
    /// (the working tree is not consulted).
    pub fn update_from_tree<S: Storage>(
        &mut self,
        storage: &S,
        tree_oid: &Oid,
    ) -> Result<(), IndexError> {
        self.entries.clear();
        self.walk_tree(storage, tree_oid, b"")?;
        self.entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(())
    }

    fn walk_tree<S: Storage>(
        &mut self,
        storage: &S,
        tree_oid: &Oid,
        prefix: &[u8],
    ) -> Result<(), IndexError> {
        let (_, payload) = store::read_object(storage, tree_oid)?;
        let tree = Tree::parse(&payload)?;
        for entry in &tree.entries {
            let mut path = BString::from(prefix);
            if !path.is_empty() {
                path.push(b'/');
            }
            path.extend_from_slice(&entry.name);

            if entry.mode.is_tree() {
                self.walk_tree(storage, &entry.oid, &path)?;
            } else {
                let (_, blob) = store::read_object(storage, &entry.oid)?;
                self.entries.push(IndexEntry {
                    path,
                    oid: entry.oid,
                    mode: entry.mode,
                    size: blob.len() as u32,
                    mtime_ms: 0,
                });
            }
        }
        Ok(())
    }
}

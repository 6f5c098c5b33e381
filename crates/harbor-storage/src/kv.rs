use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::{now_millis, validate_path, FileInfo, Storage, StorageError};

/// A stored bucket value with its upload timestamp.
#[derive(Debug, Clone)]
pub struct BucketEntry {
    pub data: Vec<u8>,
    /// Milliseconds since the Unix epoch.
    pub modified: u64,
}

/// A flat key→bytes blob store, the surface an object-store deployment
/// (bucket for blobs, metadata table for listings) exposes.
///
/// Keys are opaque strings; `keys` returns every key with the given prefix.
pub trait Bucket: Send {
    fn get(&self, key: &str) -> Result<Option<BucketEntry>, StorageError>;
    fn put(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError>;
    fn delete(&mut self, key: &str) -> Result<bool, StorageError>;
    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// In-memory [`Bucket`] used by tests and as a reference implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryBucket {
    entries: Arc<Mutex<BTreeMap<String, BucketEntry>>>,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Bucket for MemoryBucket {
    fn get(&self, key: &str) -> Result<Option<BucketEntry>, StorageError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn put(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            BucketEntry {
                data: data.to_vec(),
                modified: now_millis(),
            },
        );
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// Directory semantics synthesized over a flat [`Bucket`].
///
/// Directories are implicit (a prefix with at least one descendant key);
/// `create_directory` only validates, and listings derive child names from
/// key prefixes.
#[derive(Debug, Clone)]
pub struct KvStorage<B> {
    bucket: B,
    repo: Option<String>,
}

impl<B: Bucket> KvStorage<B> {
    pub fn new(bucket: B) -> Self {
        Self { bucket, repo: None }
    }

    fn key(&self, path: &str) -> Result<String, StorageError> {
        validate_path(path)?;
        let repo = self.repo.as_deref().ok_or(StorageError::NotInitialized)?;
        Ok(format!("{repo}/{path}"))
    }
}

impl<B: Bucket> Storage for KvStorage<B> {
    fn init(&mut self, repo: &str) -> Result<(), StorageError> {
        if repo.is_empty() {
            return Err(StorageError::InvalidPath("empty repository name".into()));
        }
        self.repo = Some(repo.to_string());
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let key = self.key(path)?;
        if self.bucket.get(&key)?.is_some() {
            return Ok(true);
        }
        Ok(!self.bucket.keys(&format!("{key}/"))?.is_empty())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let key = self.key(path)?;
        self.bucket
            .get(&key)?
            .map(|entry| entry.data)
            .ok_or_else(|| StorageError::NotFound { path: path.into() })
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let key = self.key(path)?;
        self.bucket.put(&key, data)
    }

    fn delete_file(&mut self, path: &str) -> Result<(), StorageError> {
        let key = self.key(path)?;
        if self.bucket.delete(&key)? {
            Ok(())
        } else {
            Err(StorageError::NotFound { path: path.into() })
        }
    }

    fn create_directory(&mut self, path: &str) -> Result<(), StorageError> {
        self.key(path).map(|_| ())
    }

    fn list_directory(&self, path: &str) -> Result<Vec<String>, StorageError> {
        let key = self.key(path)?;
        let prefix = format!("{key}/");
        let mut names: Vec<String> = Vec::new();
        for k in self.bucket.keys(&prefix)? {
            let rest = &k[prefix.len()..];
            let name = match rest.find('/') {
                Some(pos) => &rest[..pos],
                None => rest,
            };
            if names.last().map(String::as_str) != Some(name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn delete_directory(&mut self, path: &str) -> Result<(), StorageError> {
        let key = self.key(path)?;
        for k in self.bucket.keys(&format!("{key}/"))? {
            self.bucket.delete(&k)?;
        }
        Ok(())
    }

    fn file_info(&self, path: &str) -> Result<FileInfo, StorageError> {
        let key = self.key(path)?;
        self.bucket
            .get(&key)?
            .map(|entry| FileInfo {
                size: entry.data.len() as u64,
                modified: entry.modified,
            })
            .ok_or_else(|| StorageError::NotFound { path: path.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> KvStorage<MemoryBucket> {
        let mut s = KvStorage::new(MemoryBucket::new());
        s.init("repo").unwrap();
        s
    }

    #[test]
    fn roundtrip_through_bucket() {
        let mut s = storage();
        s.write_file(".git/HEAD", b"ref: refs/heads/main\n").unwrap();
        assert_eq!(s.read_file(".git/HEAD").unwrap(), b"ref: refs/heads/main\n");
    }

    #[test]
    fn listing_derives_children_from_keys() {
        let mut s = storage();
        s.write_file(".git/objects/ab/cd", b"1").unwrap();
        s.write_file(".git/objects/ab/ef", b"2").unwrap();
        s.write_file(".git/objects/ff/00", b"3").unwrap();
        assert_eq!(s.list_directory(".git/objects").unwrap(), ["ab", "ff"]);
        assert_eq!(s.list_directory(".git/objects/ab").unwrap(), ["cd", "ef"]);
    }

    #[test]
    fn delete_directory_sweeps_prefix() {
        let mut s = storage();
        s.write_file("a/b", b"1").unwrap();
        s.write_file("a/c/d", b"2").unwrap();
        s.delete_directory("a").unwrap();
        assert!(!s.exists("a").unwrap());
    }

    #[test]
    fn missing_file_is_not_found() {
        let s = storage();
        assert!(s.read_file("nope").unwrap_err().is_not_found());
    }
}

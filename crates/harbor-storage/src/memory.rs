use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::{now_millis, validate_path, FileInfo, Storage, StorageError};

#[derive(Debug, Clone)]
struct FileRecord {
    data: Vec<u8>,
    modified: u64,
}

/// In-memory storage backed by a shared ordered map.
///
/// Clones share the same underlying map, so a server and several repository
/// handles can operate on one state. Directories are implicit: a directory
/// exists exactly when at least one file lives beneath it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<BTreeMap<String, FileRecord>>>,
    repo: Option<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full key for a repository-relative path.
    fn key(&self, path: &str) -> Result<String, StorageError> {
        validate_path(path)?;
        let repo = self.repo.as_deref().ok_or(StorageError::NotInitialized)?;
        Ok(format!("{repo}/{path}"))
    }
}

impl Storage for MemoryStorage {
    fn init(&mut self, repo: &str) -> Result<(), StorageError> {
        if repo.is_empty() {
            return Err(StorageError::InvalidPath("empty repository name".into()));
        }
        self.repo = Some(repo.to_string());
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let key = self.key(path)?;
        let files = self.files.lock().unwrap();
        if files.contains_key(&key) {
            return Ok(true);
        }
        let prefix = format!("{key}/");
        Ok(files.range(prefix.clone()..).next().is_some_and(|(k, _)| k.starts_with(&prefix)))
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let key = self.key(path)?;
        let files = self.files.lock().unwrap();
        files
            .get(&key)
            .map(|rec| rec.data.clone())
            .ok_or_else(|| StorageError::NotFound { path: path.into() })
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let key = self.key(path)?;
        let mut files = self.files.lock().unwrap();
        files.insert(
            key,
            FileRecord {
                data: data.to_vec(),
                modified: now_millis(),
            },
        );
        Ok(())
    }

    fn delete_file(&mut self, path: &str) -> Result<(), StorageError> {
        let key = self.key(path)?;
        let mut files = self.files.lock().unwrap();
        files
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound { path: path.into() })
    }

    fn create_directory(&mut self, path: &str) -> Result<(), StorageError> {
        // Directories are implicit; validate the path and scope only.
        self.key(path).map(|_| ())
    }

    fn list_directory(&self, path: &str) -> Result<Vec<String>, StorageError> {
        let key = self.key(path)?;
        let prefix = format!("{key}/");
        let files = self.files.lock().unwrap();

        let mut names: Vec<String> = Vec::new();
        for (k, _) in files.range(prefix.clone()..) {
            let Some(rest) = k.strip_prefix(&prefix) else {
                break;
            };
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
        let prefix = format!("{key}/");
        let mut files = self.files.lock().unwrap();
        let doomed: Vec<String> = files
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for k in doomed {
            files.remove(&k);
        }
        Ok(())
    }

    fn file_info(&self, path: &str) -> Result<FileInfo, StorageError> {
        let key = self.key(path)?;
        let files = self.files.lock().unwrap();
        files
            .get(&key)
            .map(|rec| FileInfo {
                size: rec.data.len() as u64,
                modified: rec.modified,
            })
            .ok_or_else(|| StorageError::NotFound { path: path.into() })
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use crate::{validate_path, FileInfo, Storage, StorageError};

/// Storage over a local filesystem directory.
///
/// Each repository occupies `<root>/<repo>/`; repository-relative paths map
/// directly onto the filesystem. Writes create missing parent directories.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    repo: Option<String>,
}

impl LocalStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            repo: None,
        }
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_path(path)?;
        let repo = self.repo.as_deref().ok_or(StorageError::NotInitialized)?;
        let mut full = self.root.join(repo);
        for seg in path.split('/') {
            full.push(seg);
        }
        Ok(full)
    }

    fn map_io(path: &str, err: std::io::Error) -> StorageError {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound { path: path.into() }
        } else {
            StorageError::Io(err)
        }
    }
}

impl Storage for LocalStorage {
    fn init(&mut self, repo: &str) -> Result<(), StorageError> {
        if repo.is_empty() {
            return Err(StorageError::InvalidPath("empty repository name".into()));
        }
        self.repo = Some(repo.to_string());
        fs::create_dir_all(self.root.join(repo))?;
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.full_path(path)?.exists())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.full_path(path)?;
        fs::read(&full).map_err(|e| Self::map_io(path, e))
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let full = self.full_path(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, data)?;
        Ok(())
    }

    fn delete_file(&mut self, path: &str) -> Result<(), StorageError> {
        let full = self.full_path(path)?;
        fs::remove_file(&full).map_err(|e| Self::map_io(path, e))
    }

    fn create_directory(&mut self, path: &str) -> Result<(), StorageError> {
        let full = self.full_path(path)?;
        fs::create_dir_all(&full)?;
        Ok(())
    }

    fn list_directory(&self, path: &str) -> Result<Vec<String>, StorageError> {
        let full = self.full_path(path)?;
        let entries = fs::read_dir(&full).map_err(|e| Self::map_io(path, e))?;
        let mut names = Vec::new();
        for entry in entries {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn delete_directory(&mut self, path: &str) -> Result<(), StorageError> {
        let full = self.full_path(path)?;
        match fs::remove_dir_all(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn file_info(&self, path: &str) -> Result<FileInfo, StorageError> {
        let full = self.full_path(path)?;
        let meta = fs::metadata(&full).map_err(|e| Self::map_io(path, e))?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(FileInfo {
            size: meta.len(),
            modified,
        })
    }
}

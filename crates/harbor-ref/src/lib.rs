//! Hierarchical reference storage.
//!
//! Each ref is a file under `.git/` containing `<oid>\n`; names are
//! path-like strings rooted at `refs/` (`refs/heads/<b>`, `refs/tags/<t>`,
//! `refs/remotes/<r>/<b>`). HEAD is special: either symbolic
//! (`ref: refs/heads/<b>\n`) or a detached OID.

use harbor_hash::{HashError, Oid};
use harbor_storage::{Storage, StorageError};

/// Errors produced by ref operations.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("invalid ref name: {0}")]
    InvalidName(String),

    #[error("corrupt ref {name}: {reason}")]
    CorruptRef { name: String, reason: String },

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The content of HEAD: a symbolic pointer or a detached OID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// `ref: refs/heads/<branch>`
    Symbolic(String),
    /// Detached at an OID.
    Detached(Oid),
}

impl Head {
    /// The branch ref name if symbolic.
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::Symbolic(name) => Some(name),
            Self::Detached(_) => None,
        }
    }

    /// Serialize to the HEAD file content.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Symbolic(name) => format!("ref: {name}\n").into_bytes(),
            Self::Detached(oid) => format!("{oid}\n").into_bytes(),
        }
    }
}

fn ref_path(name: &str) -> Result<String, RefError> {
    if name.is_empty() || name.starts_with('/') || name.ends_with('/') || name.contains("..") {
        return Err(RefError::InvalidName(name.to_string()));
    }
    Ok(format!(".git/{name}"))
}

/// Read a ref. Returns `None` if it does not exist.
pub fn read_ref<S: Storage>(storage: &S, name: &str) -> Result<Option<Oid>, RefError> {
    let path = ref_path(name)?;
    let content = match storage.read_file(&path) {
        Ok(content) => content,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let text = std::str::from_utf8(&content)
        .map_err(|_| RefError::CorruptRef {
            name: name.to_string(),
            reason: "non-UTF8 content".into(),
        })?
        .trim();
    Oid::from_hex(text).map(Some).map_err(|_| RefError::CorruptRef {
        name: name.to_string(),
        reason: format!("not an OID: {text:?}"),
    })
}

/// Write a ref (last writer wins).
pub fn write_ref<S: Storage>(storage: &mut S, name: &str, oid: &Oid) -> Result<(), RefError> {
    let path = ref_path(name)?;
    storage.write_file(&path, format!("{oid}\n").as_bytes())?;
    Ok(())
}

/// Delete a ref. Deleting a missing ref fails with `RefNotFound`.
pub fn delete_ref<S: Storage>(storage: &mut S, name: &str) -> Result<(), RefError> {
    let path = ref_path(name)?;
    storage.delete_file(&path).map_err(|e| {
        if e.is_not_found() {
            RefError::RefNotFound(name.to_string())
        } else {
            e.into()
        }
    })
}

/// List every ref under `refs/`, flattened and sorted by name.
pub fn list_refs<S: Storage>(storage: &S) -> Result<Vec<(String, Oid)>, RefError> {
    let mut out = Vec::new();
    collect(storage, "refs", &mut out)?;
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

fn collect<S: Storage>(
    storage: &S,
    prefix: &str,
    out: &mut Vec<(String, Oid)>,
) -> Result<(), RefError> {
    let dir = format!(".git/{prefix}");
    let names = match storage.list_directory(&dir) {
        Ok(names) => names,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for name in names {
        let child = format!("{prefix}/{name}");
        match read_ref(storage, &child) {
            Ok(Some(oid)) => out.push((child, oid)),
            // No file at this path: recurse into it as a directory.
            Ok(None) => collect(storage, &child, out)?,
            // Filesystem backends answer "is a directory" with an I/O
            // error; a real fault resurfaces from the nested listing.
            Err(RefError::Storage(StorageError::Io(_))) => collect(storage, &child, out)?,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Read HEAD. Missing HEAD means the repository is not initialized.
pub fn read_head<S: Storage>(storage: &S) -> Result<Head, RefError> {
    let content = storage.read_file(".git/HEAD").map_err(|e| {
        if e.is_not_found() {
            RefError::RefNotFound("HEAD".into())
        } else {
            e.into()
        }
    })?;
    let text = std::str::from_utf8(&content)
        .map_err(|_| RefError::CorruptRef {
            name: "HEAD".into(),
            reason: "non-UTF8 content".into(),
        })?
        .trim();

    if let Some(target) = text.strip_prefix("ref: ") {
        Ok(Head::Symbolic(target.trim().to_string()))
    } else {
        Oid::from_hex(text)
            .map(Head::Detached)
            .map_err(|_| RefError::CorruptRef {
                name: "HEAD".into(),
                reason: format!("neither symbolic nor OID: {text:?}"),
            })
    }
}

/// Write HEAD.
pub fn write_head<S: Storage>(storage: &mut S, head: &Head) -> Result<(), RefError> {
    storage.write_file(".git/HEAD", &head.to_bytes())?;
    Ok(())
}

/// Resolve HEAD to an OID, following the symbolic pointer.
///
/// Returns `None` for a symbolic HEAD whose branch has no commits yet.
pub fn resolve_head<S: Storage>(storage: &S) -> Result<Option<Oid>, RefError> {
    match read_head(storage)? {
        Head::Detached(oid) => Ok(Some(oid)),
        Head::Symbolic(name) => read_ref(storage, &name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_storage::MemoryStorage;

    fn storage() -> MemoryStorage {
        let mut s = MemoryStorage::new();
        s.init("repo").unwrap();
        s
    }

    fn oid(n: u8) -> Oid {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Oid::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn write_read_roundtrip() {
        let mut s = storage();
        write_ref(&mut s, "refs/heads/main", &oid(1)).unwrap();
        assert_eq!(read_ref(&s, "refs/heads/main").unwrap(), Some(oid(1)));
    }

    #[test]
    fn missing_ref_is_none() {
        let s = storage();
        assert_eq!(read_ref(&s, "refs/heads/nope").unwrap(), None);
    }

    #[test]
    fn delete_ref_removes() {
        let mut s = storage();
        write_ref(&mut s, "refs/heads/dev", &oid(2)).unwrap();
        delete_ref(&mut s, "refs/heads/dev").unwrap();
        assert_eq!(read_ref(&s, "refs/heads/dev").unwrap(), None);
        assert!(matches!(
            delete_ref(&mut s, "refs/heads/dev"),
            Err(RefError::RefNotFound(_))
        ));
    }

    #[test]
    fn list_walks_hierarchy() {
        let mut s = storage();
        write_ref(&mut s, "refs/heads/main", &oid(1)).unwrap();
        write_ref(&mut s, "refs/heads/dev", &oid(2)).unwrap();
        write_ref(&mut s, "refs/tags/v1", &oid(3)).unwrap();
        write_ref(&mut s, "refs/remotes/origin/main", &oid(4)).unwrap();

        let refs = list_refs(&s).unwrap();
        let names: Vec<&str> = refs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            [
                "refs/heads/dev",
                "refs/heads/main",
                "refs/remotes/origin/main",
                "refs/tags/v1"
            ]
        );
    }

    #[test]
    fn list_empty_repo() {
        let s = storage();
        assert!(list_refs(&s).unwrap().is_empty());
    }

    #[test]
    fn head_symbolic_roundtrip() {
        let mut s = storage();
        write_head(&mut s, &Head::Symbolic("refs/heads/main".into())).unwrap();
        let head = read_head(&s).unwrap();
        assert_eq!(head, Head::Symbolic("refs/heads/main".into()));
        assert_eq!(head.branch(), Some("refs/heads/main"));

        // Branch has no commits yet.
        assert_eq!(resolve_head(&s).unwrap(), None);

        write_ref(&mut s, "refs/heads/main", &oid(9)).unwrap();
        assert_eq!(resolve_head(&s).unwrap(), Some(oid(9)));
    }

    #[test]
    fn head_detached() {
        let mut s = storage();
        write_head(&mut s, &Head::Detached(oid(5))).unwrap();
        assert_eq!(read_head(&s).unwrap(), Head::Detached(oid(5)));
        assert_eq!(resolve_head(&s).unwrap(), Some(oid(5)));
    }

    #[test]
    fn corrupt_head_detected() {
        let mut s = storage();
        s.write_file(".git/HEAD", b"gibberish\n").unwrap();
        assert!(matches!(
            read_head(&s),
            Err(RefError::CorruptRef { .. })
        ));
    }

    #[test]
    fn invalid_names_rejected() {
        let mut s = storage();
        assert!(matches!(
            write_ref(&mut s, "refs/../escape", &oid(1)),
            Err(RefError::InvalidName(_))
        ));
        assert!(matches!(
            write_ref(&mut s, "", &oid(1)),
            Err(RefError::InvalidName(_))
        ));
    }
}

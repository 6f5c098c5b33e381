//! Merge engine: three-way tree merge, line-level content merge, and
//! rename detection.
//!
//! The tree merge enumerates the union of paths across base, ours, and
//! theirs, classifies each path, and rebuilds nested trees recursively.
//! Overlapping blob edits fall through to the line-level content merge
//! (under the default strategy); anything unresolvable surfaces as a
//! [`MergeConflict`].

pub mod content;
pub mod rename;
mod tree;

pub use rename::{detect_renames, Rename};
pub use tree::merge_trees;

use bstr::BString;
use harbor_hash::{HashError, Oid};
use harbor_object::ObjectError;
use harbor_storage::StorageError;

/// Errors produced by merge operations.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("octopus merge needs at least 3 trees, got {0}")]
    TooFewTrees(usize),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Merge strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Structural rules plus line-level content merge (default).
    #[default]
    Recursive,
    /// Structural rules only; any both-modified path conflicts.
    Resolve,
    /// Take our tree unchanged.
    Ours,
    /// Take their tree unchanged.
    Theirs,
}

impl Strategy {
    /// Parse a strategy name as used by `merge -s <strategy>`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "recursive" => Some(Self::Recursive),
            "resolve" => Some(Self::Resolve),
            "ours" => Some(Self::Ours),
            "theirs" => Some(Self::Theirs),
            _ => None,
        }
    }
}

/// A single unmergeable path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    /// `.`-joined path of the conflicting entry.
    pub path: BString,
    pub reason: String,
}

/// Result of a tree merge: a new tree, or a non-empty conflict list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Clean(Oid),
    Conflicted(Vec<MergeConflict>),
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean(_))
    }

    pub fn tree(&self) -> Option<&Oid> {
        match self {
            Self::Clean(oid) => Some(oid),
            Self::Conflicted(_) => None,
        }
    }
}

/// Octopus merge: fold the default strategy left-to-right over N ≥ 3 trees,
/// with the first tree as the shared base. Stops at the first conflict.
pub fn merge_octopus<S: harbor_storage::Storage>(
    storage: &mut S,
    trees: &[Oid],
) -> Result<MergeOutcome, MergeError> {
    if trees.len() < 3 {
        return Err(MergeError::TooFewTrees(trees.len()));
    }
    let base = trees[0];
    let mut acc = trees[1];
    for next in &trees[2..] {
        match merge_trees(storage, &base, &acc, next, Strategy::Recursive)? {
            MergeOutcome::Clean(tree) => acc = tree,
            conflicted => return Ok(conflicted),
        }
    }
    Ok(MergeOutcome::Clean(acc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_object::{store, FileMode, ObjectType, Tree, TreeEntry};
    use harbor_storage::{MemoryStorage, Storage as _};

    fn tree_of(s: &mut MemoryStorage, files: &[(&str, &[u8])]) -> Oid {
        let mut tree = Tree::new();
        for (name, content) in files {
            let oid = store::write_object(s, ObjectType::Blob, content).unwrap();
            tree.entries.push(TreeEntry {
                mode: FileMode::Regular,
                name: BString::from(*name),
                oid,
            });
        }
        store::write_object(s, ObjectType::Tree, &tree.serialize()).unwrap()
    }

    #[test]
    fn strategy_names() {
        assert_eq!(Strategy::from_name("recursive"), Some(Strategy::Recursive));
        assert_eq!(Strategy::from_name("resolve"), Some(Strategy::Resolve));
        assert_eq!(Strategy::from_name("ours"), Some(Strategy::Ours));
        assert_eq!(Strategy::from_name("theirs"), Some(Strategy::Theirs));
        assert_eq!(Strategy::from_name("patience"), None);
    }

    #[test]
    fn octopus_rejects_too_few() {
        let mut s = MemoryStorage::new();
        s.init("repo").unwrap();
        assert!(matches!(
            merge_octopus(&mut s, &[Oid::ZERO, Oid::ZERO]),
            Err(MergeError::TooFewTrees(2))
        ));
    }

    #[test]
    fn octopus_folds_left_to_right() {
        let mut s = MemoryStorage::new();
        s.init("repo").unwrap();

        let base = tree_of(&mut s, &[("shared", b"x")]);
        let one = tree_of(&mut s, &[("shared", b"x"), ("one", b"1")]);
        let two = tree_of(&mut s, &[("shared", b"x"), ("two", b"2")]);
        let three = tree_of(&mut s, &[("shared", b"x"), ("three", b"3")]);

        let outcome = merge_octopus(&mut s, &[base, one, two, three]).unwrap();
        let merged = outcome.tree().expect("clean octopus merge");

        let names: Vec<String> = store::read_tree(&s, merged)
            .unwrap()
            .entries
            .iter()
            .map(|e| e.name.to_string())
            .collect();
        assert_eq!(names, ["one", "shared", "three", "two"]);
    }

    #[test]
    fn octopus_stops_on_conflict() {
        let mut s = MemoryStorage::new();
        s.init("repo").unwrap();

        let base = tree_of(&mut s, &[("f", b"base")]);
        let one = tree_of(&mut s, &[("f", b"one")]);
        let two = tree_of(&mut s, &[("f", b"two")]);

        let outcome = merge_octopus(&mut s, &[base, one, two]).unwrap();
        assert!(!outcome.is_clean());
    }
}

//! Building tree objects from the index.

use bstr::{BString, ByteSlice};
use harbor_hash::Oid;
use harbor_index::Index;
use harbor_object::{store, FileMode, ObjectType, Tree, TreeEntry};
use harbor_storage::Storage;

use crate::RepoError;

/// Write the tree (and nested subtrees) described by the index.
///
/// Entries are grouped by leading path segment; each directory becomes its
/// own tree object, built depth first so child OIDs exist before parents.
/// An empty index produces the empty tree.
pub fn write_tree_from_index<S: Storage>(
    storage: &mut S,
    index: &Index,
) -> Result<Oid, RepoError> {
    let items: Vec<(Vec<&[u8]>, FileMode, Oid)> = index
        .entries()
        .iter()
        .map(|e| (e.path.split_str("/").collect(), e.mode, e.oid))
        .collect();
    build_level(storage, &items, 0)
}

fn build_level<S: Storage>(
    storage: &mut S,
    items: &[(Vec<&[u8]>, FileMode, Oid)],
    depth: usize,
) -> Result<Oid, RepoError> {
    let mut tree = Tree::new();
    let mut i = 0;

    while i < items.len() {
        let (segments, mode, oid) = &items[i];
        let name = segments[depth];

        if segments.len() == depth + 1 {
            tree.entries.push(TreeEntry {
                mode: *mode,
                name: BString::from(name),
                oid: *oid,
            });
            i += 1;
        } else {
            // Consecutive entries sharing this directory prefix (the index
            // is sorted, so the group is contiguous).
            let start = i;
            while i < items.len()
                && items[i].0.len() > depth + 1
                && items[i].0[depth] == name
            {
                i += 1;
            }
            let subtree = build_level(storage, &items[start..i], depth + 1)?;
            tree.entries.push(TreeEntry {
                mode: FileMode::Tree,
                name: BString::from(name),
                oid: subtree,
            });
        }
    }

    Ok(store::write_object(storage, ObjectType::Tree, &tree.serialize())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_index::IndexEntry;
    use harbor_storage::{MemoryStorage, Storage as _};

    fn storage() -> MemoryStorage {
        let mut s = MemoryStorage::new();
        s.init("repo").unwrap();
        s
    }

    fn add(s: &mut MemoryStorage, index: &mut Index, path: &str, content: &[u8]) {
        let oid = store::write_object(s, ObjectType::Blob, content).unwrap();
        index.add_entry(IndexEntry {
            path: BString::from(path),
            oid,
            mode: FileMode::Regular,
            size: content.len() as u32,
            mtime_ms: 0,
        });
    }

    #[test]
    fn empty_index_is_empty_tree() {
        let mut s = storage();
        let oid = write_tree_from_index(&mut s, &Index::new()).unwrap();
        assert_eq!(oid.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn nested_paths_become_subtrees() {
        let mut s = storage();
        let mut index = Index::new();
        add(&mut s, &mut index, "README.md", b"readme");
        add(&mut s, &mut index, "src/lib.rs", b"lib");
        add(&mut s, &mut index, "src/nested/mod.rs", b"mod");

        let root = write_tree_from_index(&mut s, &index).unwrap();
        let flat = store::flatten_tree(&s, &root).unwrap();
        let paths: Vec<_> = flat.iter().map(|(p, _, _)| p.to_string()).collect();
        assert_eq!(paths, ["README.md", "src/lib.rs", "src/nested/mod.rs"]);
    }

    #[test]
    fn tree_oid_is_deterministic() {
        let mut s = storage();
        let mut index = Index::new();
        add(&mut s, &mut index, "b", b"2");
        add(&mut s, &mut index, "a", b"1");

        let first = write_tree_from_index(&mut s, &index).unwrap();
        let second = write_tree_from_index(&mut s, &index).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn sibling_directories_group_correctly() {
        let mut s = storage();
        let mut index = Index::new();
        add(&mut s, &mut index, "a/x", b"1");
        add(&mut s, &mut index, "a/y", b"2");
        add(&mut s, &mut index, "b/z", b"3");

        let root = write_tree_from_index(&mut s, &index).unwrap();
        let tree = store::read_tree(&s, &root).unwrap();
        let names: Vec<_> = tree.entries.iter().map(|e| e.name.to_string()).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(tree.entries.iter().all(|e| e.mode.is_tree()));
    }
}

//! Three-way tree merge.

use std::collections::BTreeSet;

use bstr::BString;
use harbor_hash::Oid;
use harbor_object::{store, ObjectType, Tree, TreeEntry};
use harbor_storage::Storage;

use crate::content::{is_binary, merge_content};
use crate::{MergeConflict, MergeError, MergeOutcome, Strategy};

/// Merge `ours` and `theirs` against their common ancestor `base`.
///
/// On success the merged tree (with nested subtrees rebuilt) is written to
/// the object store. All conflicts are collected before reporting, so a
/// conflicted outcome lists every unmergeable path.
pub fn merge_trees<S: Storage>(
    storage: &mut S,
    base: &Oid,
    ours: &Oid,
    theirs: &Oid,
    strategy: Strategy,
) -> Result<MergeOutcome, MergeError> {
    match strategy {
        Strategy::Ours => return Ok(MergeOutcome::Clean(*ours)),
        Strategy::Theirs => return Ok(MergeOutcome::Clean(*theirs)),
        Strategy::Recursive | Strategy::Resolve => {}
    }

    let mut conflicts = Vec::new();
    let merged = merge_level(
        storage,
        Some(*base),
        Some(*ours),
        Some(*theirs),
        b"",
        strategy,
        &mut conflicts,
    )?;

    if !conflicts.is_empty() {
        return Ok(MergeOutcome::Conflicted(conflicts));
    }
    let oid = store::write_object(storage, ObjectType::Tree, &merged.serialize())?;
    Ok(MergeOutcome::Clean(oid))
}

/// Merge one directory level. `None` trees read as empty.
fn merge_level<S: Storage>(
    storage: &mut S,
    base: Option<Oid>,
    ours: Option<Oid>,
    theirs: Option<Oid>,
    prefix: &[u8],
    strategy: Strategy,
    conflicts: &mut Vec<MergeConflict>,
) -> Result<Tree, MergeError> {
    let base_tree = load(storage, base)?;
    let our_tree = load(storage, ours)?;
    let their_tree = load(storage, theirs)?;

    let mut names: BTreeSet<&BString> = BTreeSet::new();
    for tree in [&base_tree, &our_tree, &their_tree] {
        names.extend(tree.entries.iter().map(|e| &e.name));
    }

    let mut merged = Tree::new();
    for name in names {
        let b = base_tree.find(name.as_ref());
        let o = our_tree.find(name.as_ref());
        let t = their_tree.find(name.as_ref());

        let path = join_path(prefix, name);
        if let Some(entry) = merge_entry(storage, path, b, o, t, strategy, conflicts)? {
            merged.entries.push(entry);
        }
    }
    merged.sort();
    Ok(merged)
}

fn load<S: Storage>(storage: &S, oid: Option<Oid>) -> Result<Tree, MergeError> {
    match oid {
        Some(oid) => Ok(store::read_tree(storage, &oid)?),
        None => Ok(Tree::new()),
    }
}

fn join_path(prefix: &[u8], name: &BString) -> BString {
    let mut path = BString::from(prefix);
    if !path.is_empty() {
        path.push(b'.');
    }
    path.extend_from_slice(name);
    path
}

fn same(a: Option<&TreeEntry>, b: Option<&TreeEntry>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.mode == b.mode && a.oid == b.oid,
        (None, None) => true,
        _ => false,
    }
}

/// Classify one path across base/ours/theirs.
fn merge_entry<S: Storage>(
    storage: &mut S,
    path: BString,
    base: Option<&TreeEntry>,
    ours: Option<&TreeEntry>,
    theirs: Option<&TreeEntry>,
    strategy: Strategy,
    conflicts: &mut Vec<MergeConflict>,
) -> Result<Option<TreeEntry>, MergeError> {
    match (ours, theirs) {
        // Gone from both sides.
        (None, None) => Ok(None),

        // Present on one side only: keep it if that side changed it,
        // otherwise the other side's deletion wins.
        (Some(o), None) => {
            if same(base, Some(o)) {
                Ok(None)
            } else {
                Ok(Some(o.clone()))
            }
        }
        (None, Some(t)) => {
            if same(base, Some(t)) {
                Ok(None)
            } else {
                Ok(Some(t.clone()))
            }
        }

        (Some(o), Some(t)) => {
            // Identical on both sides.
            if o.mode == t.mode && o.oid == t.oid {
                return Ok(Some(o.clone()));
            }

            // Both directories: recurse, rebuilding the subtree.
            if o.mode.is_tree() && t.mode.is_tree() {
                let base_sub = base.filter(|b| b.mode.is_tree()).map(|b| b.oid);
                let sub = merge_level(
                    storage,
                    base_sub,
                    Some(o.oid),
                    Some(t.oid),
                    &path,
                    strategy,
                    conflicts,
                )?;
                if sub.is_empty() {
                    return Ok(None);
                }
                let oid = store::write_object(storage, ObjectType::Tree, &sub.serialize())?;
                return Ok(Some(TreeEntry {
                    mode: o.mode,
                    name: o.name.clone(),
                    oid,
                }));
            }

            // One side untouched: take the other.
            if same(base, Some(o)) {
                return Ok(Some(t.clone()));
            }
            if same(base, Some(t)) {
                return Ok(Some(o.clone()));
            }

            // Added differently on both sides, or a file/directory split.
            if base.is_none() || o.mode.is_tree() != t.mode.is_tree() {
                conflicts.push(MergeConflict {
                    path,
                    reason: "both sides added different content".into(),
                });
                return Ok(Some(o.clone()));
            }

            // Both modified the same base entry.
            attempt_content_merge(storage, path, base.expect("checked"), o, t, strategy, conflicts)
        }
    }
}

/// Both sides modified the same blob: merge the contents line by line under
/// the default strategy, conflict otherwise.
fn attempt_content_merge<S: Storage>(
    storage: &mut S,
    path: BString,
    base: &TreeEntry,
    ours: &TreeEntry,
    theirs: &TreeEntry,
    strategy: Strategy,
    conflicts: &mut Vec<MergeConflict>,
) -> Result<Option<TreeEntry>, MergeError> {
    if strategy == Strategy::Resolve || base.mode.is_tree() {
        conflicts.push(MergeConflict {
            path,
            reason: "both sides modified".into(),
        });
        return Ok(Some(ours.clone()));
    }

    let (_, base_data) = store::read_object(storage, &base.oid)?;
    let (_, our_data) = store::read_object(storage, &ours.oid)?;
    let (_, their_data) = store::read_object(storage, &theirs.oid)?;

    if is_binary(&base_data) || is_binary(&our_data) || is_binary(&their_data) {
        conflicts.push(MergeConflict {
            path,
            reason: "binary content modified on both sides".into(),
        });
        return Ok(Some(ours.clone()));
    }

    let merged = merge_content(&base_data, &our_data, &their_data);
    if !merged.is_clean() {
        conflicts.push(MergeConflict {
            path,
            reason: "overlapping edits".into(),
        });
        return Ok(Some(ours.clone()));
    }

    let oid = store::write_object(storage, ObjectType::Blob, &merged.bytes)?;
    Ok(Some(TreeEntry {
        mode: ours.mode,
        name: ours.name.clone(),
        oid,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_object::FileMode;
    use harbor_storage::MemoryStorage;

    fn storage() -> MemoryStorage {
        use harbor_storage::Storage;
        let mut s = MemoryStorage::new();
        s.init("repo").unwrap();
        s
    }

    /// Build a flat tree from `(name, content)` pairs.
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

    fn entries(s: &MemoryStorage, oid: &Oid) -> Vec<(BString, Oid)> {
        store::read_tree(s, oid)
            .unwrap()
            .entries
            .iter()
            .map(|e| (e.name.clone(), e.oid))
            .collect()
    }

    #[test]
    fn merge_is_idempotent() {
        let mut s = storage();
        let t = tree_of(&mut s, &[("a", b"x")]);
        let outcome = merge_trees(&mut s, &t, &t, &t, Strategy::Recursive).unwrap();
        assert_eq!(outcome, MergeOutcome::Clean(t));
    }

    #[test]
    fn base_unchanged_takes_either_side() {
        let mut s = storage();
        let base = tree_of(&mut s, &[("a", b"x")]);
        let changed = tree_of(&mut s, &[("a", b"y")]);

        let outcome = merge_trees(&mut s, &base, &base, &changed, Strategy::Recursive).unwrap();
        assert_eq!(outcome, MergeOutcome::Clean(changed));

        let outcome = merge_trees(&mut s, &base, &changed, &base, Strategy::Recursive).unwrap();
        assert_eq!(outcome, MergeOutcome::Clean(changed));
    }

    #[test]
    fn disjoint_additions_combine() {
        let mut s = storage();
        let base = tree_of(&mut s, &[("a", b"x")]);
        let ours = tree_of(&mut s, &[("a", b"x"), ("b", b"1")]);
        let theirs = tree_of(&mut s, &[("a", b"x"), ("c", b"2")]);

        let outcome = merge_trees(&mut s, &base, &ours, &theirs, Strategy::Recursive).unwrap();
        let merged = outcome.tree().expect("clean merge");

        let names: Vec<_> = entries(&s, merged).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["a", "b", "c"]);

        // Original blob OIDs survive untouched.
        let a_blob = store::write_object(&mut s, ObjectType::Blob, b"x").unwrap();
        assert!(entries(&s, merged).iter().any(|(_, o)| *o == a_blob));
    }

    #[test]
    fn both_modified_same_line_conflicts() {
        let mut s = storage();
        let base = tree_of(&mut s, &[("a", b"original")]);
        let ours = tree_of(&mut s, &[("a", b"our")]);
        let theirs = tree_of(&mut s, &[("a", b"their")]);

        let outcome = merge_trees(&mut s, &base, &ours, &theirs, Strategy::Recursive).unwrap();
        match outcome {
            MergeOutcome::Conflicted(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].path, "a");
            }
            MergeOutcome::Clean(_) => panic!("expected a conflict"),
        }
    }

    #[test]
    fn disjoint_line_edits_content_merge() {
        let mut s = storage();
        let base = tree_of(&mut s, &[("f", b"1\n2\n3\n")]);
        let ours = tree_of(&mut s, &[("f", b"ONE\n2\n3\n")]);
        let theirs = tree_of(&mut s, &[("f", b"1\n2\nTHREE\n")]);

        let outcome = merge_trees(&mut s, &base, &ours, &theirs, Strategy::Recursive).unwrap();
        let merged = outcome.tree().expect("clean merge");
        let (_, blob) = entries(&s, merged).into_iter().next().unwrap();
        assert_eq!(store::read_object(&s, &blob).unwrap().1, b"ONE\n2\nTHREE\n");
    }

    #[test]
    fn resolve_strategy_skips_content_merge() {
        let mut s = storage();
        let base = tree_of(&mut s, &[("f", b"1\n2\n3\n")]);
        let ours = tree_of(&mut s, &[("f", b"ONE\n2\n3\n")]);
        let theirs = tree_of(&mut s, &[("f", b"1\n2\nTHREE\n")]);

        let outcome = merge_trees(&mut s, &base, &ours, &theirs, Strategy::Resolve).unwrap();
        assert!(!outcome.is_clean());
    }

    #[test]
    fn deletion_wins_over_unchanged() {
        let mut s = storage();
        let base = tree_of(&mut s, &[("keep", b"k"), ("drop", b"d")]);
        let ours = tree_of(&mut s, &[("keep", b"k")]);
        let theirs = base;

        let outcome = merge_trees(&mut s, &base, &ours, &theirs, Strategy::Recursive).unwrap();
        let merged = outcome.tree().expect("clean merge");
        let names: Vec<_> = entries(&s, merged).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["keep"]);
    }

    #[test]
    fn modified_survives_other_sides_deletion() {
        let mut s = storage();
        let base = tree_of(&mut s, &[("f", b"old")]);
        let ours = tree_of(&mut s, &[("f", b"new")]);
        let theirs = tree_of(&mut s, &[] as &[(&str, &[u8])]);

        let outcome = merge_trees(&mut s, &base, &ours, &theirs, Strategy::Recursive).unwrap();
        let merged = outcome.tree().expect("clean merge");
        let names: Vec<_> = entries(&s, merged).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["f"]);
    }

    #[test]
    fn both_added_different_content_conflicts() {
        let mut s = storage();
        let base = tree_of(&mut s, &[] as &[(&str, &[u8])]);
        let ours = tree_of(&mut s, &[("new", b"ours")]);
        let theirs = tree_of(&mut s, &[("new", b"theirs")]);

        let outcome = merge_trees(&mut s, &base, &ours, &theirs, Strategy::Recursive).unwrap();
        assert!(!outcome.is_clean());
    }

    #[test]
    fn binary_conflict_not_line_merged() {
        let mut s = storage();
        let base = tree_of(&mut s, &[("bin", b"\x00base")]);
        let ours = tree_of(&mut s, &[("bin", b"\x00ours")]);
        let theirs = tree_of(&mut s, &[("bin", b"\x00theirs")]);

        let outcome = merge_trees(&mut s, &base, &ours, &theirs, Strategy::Recursive).unwrap();
        assert!(!outcome.is_clean());
    }

    #[test]
    fn ours_and_theirs_strategies_short_circuit() {
        let mut s = storage();
        let base = tree_of(&mut s, &[("a", b"x")]);
        let ours = tree_of(&mut s, &[("a", b"our")]);
        let theirs = tree_of(&mut s, &[("a", b"their")]);

        assert_eq!(
            merge_trees(&mut s, &base, &ours, &theirs, Strategy::Ours).unwrap(),
            MergeOutcome::Clean(ours)
        );
        assert_eq!(
            merge_trees(&mut s, &base, &ours, &theirs, Strategy::Theirs).unwrap(),
            MergeOutcome::Clean(theirs)
        );
    }

    #[test]
    fn nested_conflict_paths_are_dot_joined() {
        let mut s = storage();

        let nested = |s: &mut MemoryStorage, content: &[u8]| {
            let sub = tree_of(s, &[("file.txt", content)]);
            let mut root = Tree::new();
            root.entries.push(TreeEntry {
                mode: FileMode::Tree,
                name: BString::from("dir"),
                oid: sub,
            });
            store::write_object(s, ObjectType::Tree, &root.serialize()).unwrap()
        };

        let base = nested(&mut s, b"original");
        let ours = nested(&mut s, b"our");
        let theirs = nested(&mut s, b"their");

        let outcome = merge_trees(&mut s, &base, &ours, &theirs, Strategy::Recursive).unwrap();
        match outcome {
            MergeOutcome::Conflicted(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].path, "dir.file.txt");
            }
            MergeOutcome::Clean(_) => panic!("expected a conflict"),
        }
    }

    #[test]
    fn nested_trees_rebuild() {
        let mut s = storage();

        let make = |s: &mut MemoryStorage, inner: &[(&str, &[u8])], top: &[(&str, &[u8])]| {
            let sub = tree_of(s, inner);
            let top_oid = tree_of(s, top);
            let mut tree = store::read_tree(s, &top_oid).unwrap();
            tree.entries.push(TreeEntry {
                mode: FileMode::Tree,
                name: BString::from("dir"),
                oid: sub,
            });
            store::write_object(s, ObjectType::Tree, &tree.serialize()).unwrap()
        };

        let base = make(&mut s, &[("inner", b"i")], &[("top", b"t")]);
        let ours = make(&mut s, &[("inner", b"i-ours")], &[("top", b"t")]);
        let theirs = make(&mut s, &[("inner", b"i")], &[("top", b"t-theirs")]);

        let outcome = merge_trees(&mut s, &base, &ours, &theirs, Strategy::Recursive).unwrap();
        let merged = outcome.tree().expect("clean merge");

        let flat = store::flatten_tree(&s, merged).unwrap();
        let paths: Vec<_> = flat.iter().map(|(p, _, _)| p.clone()).collect();
        assert_eq!(paths, ["dir/inner", "top"]);

        let inner_oid = flat[0].2;
        assert_eq!(store::read_object(&s, &inner_oid).unwrap().1, b"i-ours");
    }
}

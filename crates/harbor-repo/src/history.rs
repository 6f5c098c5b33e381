//! Commit graph walking.
//!
//! Commit relationships are OID-keyed; every traversal uses an explicit
//! work list with a visited set, never references between commit values.

use std::collections::{HashSet, VecDeque};

use harbor_hash::Oid;
use harbor_object::{store, Commit, Object, Tag};
use harbor_storage::Storage;

use crate::RepoError;

/// Read a commit, peeling annotated tags along the way.
pub fn read_commit<S: Storage>(storage: &S, oid: &Oid) -> Result<Commit, RepoError> {
    let mut oid = *oid;
    loop {
        match store::read_parsed(storage, &oid)? {
            Object::Commit(commit) => return Ok(commit),
            Object::Tag(Tag { object, .. }) => oid = object,
            other => {
                return Err(RepoError::Corrupt(format!(
                    "expected commit at {oid}, found {}",
                    other.object_type()
                )))
            }
        }
    }
}

/// Every commit reachable from `from`, including `from` itself, walking all
/// parents.
pub fn ancestors<S: Storage>(storage: &S, from: &Oid) -> Result<HashSet<Oid>, RepoError> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([*from]);
    while let Some(oid) = queue.pop_front() {
        if !seen.insert(oid) {
            continue;
        }
        let commit = read_commit(storage, &oid)?;
        queue.extend(commit.parents);
    }
    Ok(seen)
}

/// Whether `ancestor` is reachable from `descendant` (inclusive).
pub fn is_ancestor<S: Storage>(
    storage: &S,
    ancestor: &Oid,
    descendant: &Oid,
) -> Result<bool, RepoError> {
    Ok(ancestors(storage, descendant)?.contains(ancestor))
}

/// One common ancestor of `a` and `b`: the first commit reachable from `b`
/// (breadth first over all parents) that is also an ancestor of `a`.
pub fn merge_base<S: Storage>(
    storage: &S,
    a: &Oid,
    b: &Oid,
) -> Result<Option<Oid>, RepoError> {
    let reachable_from_a = ancestors(storage, a)?;
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([*b]);
    while let Some(oid) = queue.pop_front() {
        if !seen.insert(oid) {
            continue;
        }
        if reachable_from_a.contains(&oid) {
            return Ok(Some(oid));
        }
        let commit = read_commit(storage, &oid)?;
        queue.extend(commit.parents);
    }
    Ok(None)
}

/// First-parent chain from `from` back to (but excluding) `stop`.
///
/// Ordered newest first; reverse it to replay oldest first.
pub fn first_parent_chain<S: Storage>(
    storage: &S,
    from: &Oid,
    stop: Option<&Oid>,
) -> Result<Vec<Oid>, RepoError> {
    let mut chain = Vec::new();
    let mut cursor = Some(*from);
    while let Some(oid) = cursor {
        if stop == Some(&oid) {
            break;
        }
        chain.push(oid);
        cursor = read_commit(storage, &oid)?.first_parent().copied();
    }
    Ok(chain)
}

/// Transitive object closure for a set of wanted commits.
///
/// Breadth-first over the commit graph from `wants`, stopping at `haves`
/// and already-visited commits; each commit contributes itself, then its
/// tree closure (every subtree and blob), then enqueues its parents.
pub fn collect_closure<S: Storage>(
    storage: &S,
    wants: &[Oid],
    haves: &HashSet<Oid>,
) -> Result<Vec<Oid>, RepoError> {
    let mut out = Vec::new();
    let mut seen: HashSet<Oid> = HashSet::new();
    let mut queue: VecDeque<Oid> = wants.iter().copied().collect();

    while let Some(oid) = queue.pop_front() {
        if haves.contains(&oid) || seen.contains(&oid) {
            continue;
        }

        match store::read_parsed(storage, &oid).map_err(|e| match e {
            harbor_object::ObjectError::ObjectNotFound(hex) => {
                RepoError::Corrupt(format!("closure references missing object {hex}"))
            }
            other => RepoError::Object(other),
        })? {
            Object::Commit(commit) => {
                seen.insert(oid);
                out.push(oid);
                tree_closure(storage, &commit.tree, &mut seen, &mut out)?;
                queue.extend(commit.parents);
            }
            Object::Tag(tag) => {
                seen.insert(oid);
                out.push(oid);
                queue.push_back(tag.object);
            }
            Object::Tree(_) => tree_closure(storage, &oid, &mut seen, &mut out)?,
            Object::Blob(_) => {
                seen.insert(oid);
                out.push(oid);
            }
        }
    }

    Ok(out)
}

/// Append a tree and everything beneath it to `out`, deduplicated by `seen`.
fn tree_closure<S: Storage>(
    storage: &S,
    tree_oid: &Oid,
    seen: &mut HashSet<Oid>,
    out: &mut Vec<Oid>,
) -> Result<(), RepoError> {
    if !seen.insert(*tree_oid) {
        return Ok(());
    }
    out.push(*tree_oid);

    let tree = store::read_tree(storage, tree_oid)?;
    for entry in &tree.entries {
        if entry.mode.is_tree() {
            tree_closure(storage, &entry.oid, seen, out)?;
        } else if seen.insert(entry.oid) {
            out.push(entry.oid);
        }
    }
    Ok(())
}


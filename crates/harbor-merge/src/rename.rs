//! Rename detection between two trees.
//!
//! Pairs deleted paths with added paths by content similarity (Jaccard index
//! over unique lines), emitting the best matches above a threshold with each
//! path used at most once.

use std::collections::{HashMap, HashSet};

use bstr::BString;
use harbor_hash::Oid;
use harbor_object::store;
use harbor_storage::Storage;

use crate::MergeError;

/// A detected rename.
#[derive(Debug, Clone, PartialEq)]
pub struct Rename {
    pub from: BString,
    pub to: BString,
    /// Jaccard similarity in `[0, 1]`.
    pub similarity: f64,
}

/// Detect renames between `old_tree` and `new_tree`.
///
/// Deleted paths (present only in the old tree) are compared against added
/// paths (present only in the new tree); pairs scoring at least `threshold`
/// are emitted in order of descending similarity, greedily keeping each
/// path unique.
pub fn detect_renames<S: Storage>(
    storage: &S,
    old_tree: &Oid,
    new_tree: &Oid,
    threshold: f64,
) -> Result<Vec<Rename>, MergeError> {
    let old: HashMap<BString, Oid> = store::flatten_tree(storage, old_tree)?
        .into_iter()
        .map(|(path, _, oid)| (path, oid))
        .collect();
    let new: HashMap<BString, Oid> = store::flatten_tree(storage, new_tree)?
        .into_iter()
        .map(|(path, _, oid)| (path, oid))
        .collect();

    let deleted: Vec<&BString> = old.keys().filter(|p| !new.contains_key(*p)).collect();
    let added: Vec<&BString> = new.keys().filter(|p| !old.contains_key(*p)).collect();
    if deleted.is_empty() || added.is_empty() {
        return Ok(Vec::new());
    }

    let mut candidates: Vec<Rename> = Vec::new();
    for from in &deleted {
        let (_, old_data) = store::read_object(storage, &old[*from])?;
        let old_lines = unique_lines(&old_data);
        for to in &added {
            let (_, new_data) = store::read_object(storage, &new[*to])?;
            let similarity = jaccard(&old_lines, &unique_lines(&new_data));
            if similarity >= threshold {
                candidates.push(Rename {
                    from: (**from).clone(),
                    to: (**to).clone(),
                    similarity,
                });
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.from.cmp(&b.from))
    });

    // Greedy unique pairing: best score claims both paths.
    let mut used_from: HashSet<&BString> = HashSet::new();
    let mut used_to: HashSet<&BString> = HashSet::new();
    let mut renames = Vec::new();
    for candidate in &candidates {
        if used_from.contains(&candidate.from) || used_to.contains(&candidate.to) {
            continue;
        }
        used_from.insert(&candidate.from);
        used_to.insert(&candidate.to);
        renames.push(candidate.clone());
    }
    Ok(renames)
}

fn unique_lines(data: &[u8]) -> HashSet<Vec<u8>> {
    data.split(|&b| b == b'\n').map(|l| l.to_vec()).collect()
}

fn jaccard(a: &HashSet<Vec<u8>>, b: &HashSet<Vec<u8>>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

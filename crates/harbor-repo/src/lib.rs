//! The repository façade.
//!
//! [`Repository`] ties the object store, refs, index, and merge engine
//! together over one [`Storage`] backend and exposes the local workflows:
//! init, staging, commit, branch/tag bookkeeping, status, reset, merge, and
//! rebase. Remote workflows (clone/fetch/push/pull) live in the client
//! crate; the history utilities they need are in [`history`].

pub mod history;
mod tree_builder;

pub use tree_builder::write_tree_from_index;

use bstr::{BStr, BString};
use harbor_hash::{HashError, Oid};
use harbor_index::{Index, IndexEntry, IndexError};
use harbor_merge::{MergeConflict, MergeError, MergeOutcome, Strategy};
use harbor_object::{
    store, Commit, FileMode, ObjectError, ObjectType, Signature, Tag,
};
use harbor_ref::{Head, RefError};
use harbor_storage::{Storage, StorageError};

/// Errors produced by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("repository is not initialized")]
    NotInitialized,

    #[error("{0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("corrupt repository: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Ref(#[from] RefError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Options for repository initialization.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Name of the branch HEAD points at, without the `refs/heads/` prefix.
    pub initial_branch: String,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            initial_branch: "main".into(),
        }
    }
}

/// Simplified status report: the index is the staging truth; working-tree
/// diffing is a host concern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// Current branch name (None when HEAD is detached).
    pub branch: Option<String>,
    pub staged: Vec<BString>,
    pub modified: Vec<BString>,
    pub untracked: Vec<BString>,
}

/// Outcome of [`Repository::merge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeSummary {
    /// The other ref is already reachable from HEAD.
    UpToDate,
    /// HEAD was behind; the branch ref moved forward without a new commit.
    FastForward(Oid),
    /// A merge commit was created.
    Merged(Oid),
    /// The merge stopped on conflicts; no refs were touched.
    Conflicted(Vec<MergeConflict>),
}

/// A repository bound to one storage scope.
pub struct Repository<S: Storage> {
    storage: S,
}

impl<S: Storage> Repository<S> {
    /// Bind to an existing repository scope without touching its state.
    pub fn open(mut storage: S, name: &str) -> Result<Self, RepoError> {
        storage.init(name)?;
        Ok(Self { storage })
    }

    /// Initialize the standard layout and bind to it. Re-initializing an
    /// existing repository is a safe no-op.
    pub fn init(mut storage: S, name: &str, options: &InitOptions) -> Result<Self, RepoError> {
        storage.init(name)?;
        Self::init_in_place(&mut storage, options)?;
        Ok(Self { storage })
    }

    /// Initialize the layout on an already-scoped storage handle.
    /// A safe no-op when HEAD already exists.
    pub fn init_in_place(storage: &mut S, options: &InitOptions) -> Result<(), RepoError> {
        if storage.exists(".git/HEAD")? {
            return Ok(());
        }

        for dir in [
            ".git/hooks",
            ".git/info",
            ".git/objects/info",
            ".git/objects/pack",
            ".git/refs/heads",
            ".git/refs/tags",
        ] {
            storage.create_directory(dir)?;
        }

        harbor_ref::write_head(
            storage,
            &Head::Symbolic(format!("refs/heads/{}", options.initial_branch)),
        )?;
        storage.write_file(
            ".git/config",
            b"[core]\n\trepositoryformatversion = 0\n\tfilemode = false\n\tbare = true\n",
        )?;
        Index::new().save(storage)?;
        Ok(())
    }

    /// Whether the layout exists (HEAD is present).
    pub fn is_initialized(&self) -> Result<bool, RepoError> {
        Ok(self.storage.exists(".git/HEAD")?)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    // ------------------------------------------------------------------
    // Staging
    // ------------------------------------------------------------------

    /// Stage file content at a path. Writes the blob and upserts the index.
    pub fn add(&mut self, path: &str, bytes: &[u8]) -> Result<Oid, RepoError> {
        let oid = store::write_object(&mut self.storage, ObjectType::Blob, bytes)?;
        let mut index = Index::load(&self.storage)?;
        index.add_entry(IndexEntry {
            path: BString::from(path),
            oid,
            mode: FileMode::Regular,
            size: bytes.len() as u32,
            mtime_ms: now_millis(),
        });
        index.save(&mut self.storage)?;
        Ok(oid)
    }

    /// Unstage (and forget) a path.
    pub fn remove(&mut self, path: &str) -> Result<(), RepoError> {
        let mut index = Index::load(&self.storage)?;
        if !index.remove_entry(BStr::new(path)) {
            return Err(RepoError::NotFound(format!(
                "pathspec '{path}' did not match any staged files"
            )));
        }
        index.save(&mut self.storage)?;
        Ok(())
    }

    /// Stage a path under a new name and drop the old one.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), RepoError> {
        let mut index = Index::load(&self.storage)?;
        let Some(entry) = index.get(BStr::new(from)).cloned() else {
            return Err(RepoError::NotFound(format!(
                "pathspec '{from}' did not match any staged files"
            )));
        };
        index.remove_entry(BStr::new(from));
        index.add_entry(IndexEntry {
            path: BString::from(to),
            ..entry
        });
        index.save(&mut self.storage)?;
        Ok(())
    }

    /// Read a staged file's content by path.
    pub fn read_staged(&self, path: &str) -> Result<Vec<u8>, RepoError> {
        let index = Index::load(&self.storage)?;
        let entry = index.get(BStr::new(path)).ok_or_else(|| {
            RepoError::NotFound(format!("pathspec '{path}' did not match any staged files"))
        })?;
        Ok(store::read_object(&self.storage, &entry.oid)?.1)
    }

    // ------------------------------------------------------------------
    // Commits and history
    // ------------------------------------------------------------------

    /// Commit the index. Parent is the current HEAD commit, if any; the
    /// branch HEAD names moves to the new commit.
    pub fn commit(&mut self, message: &str, author: &Signature) -> Result<Oid, RepoError> {
        let index = Index::load(&self.storage)?;
        let tree = tree_builder::write_tree_from_index(&mut self.storage, &index)?;

        let parents = self.head_commit()?.into_iter().collect();
        self.write_commit(tree, parents, author, author, message)
    }

    fn write_commit(
        &mut self,
        tree: Oid,
        parents: Vec<Oid>,
        author: &Signature,
        committer: &Signature,
        message: &str,
    ) -> Result<Oid, RepoError> {
        let commit = Commit {
            tree,
            parents,
            author: author.clone(),
            committer: committer.clone(),
            extra_headers: Vec::new(),
            message: BString::from(ensure_trailing_newline(message)),
        };
        let oid = store::write_object(&mut self.storage, ObjectType::Commit, &commit.serialize())?;
        self.advance_head(&oid)?;
        Ok(oid)
    }

    /// Move the ref HEAD names (or HEAD itself when detached) to `oid`.
    fn advance_head(&mut self, oid: &Oid) -> Result<(), RepoError> {
        match harbor_ref::read_head(&self.storage)? {
            Head::Symbolic(branch) => harbor_ref::write_ref(&mut self.storage, &branch, oid)?,
            Head::Detached(_) => {
                harbor_ref::write_head(&mut self.storage, &Head::Detached(*oid))?
            }
        }
        Ok(())
    }

    /// The OID HEAD resolves to, if the current branch has commits.
    pub fn head_commit(&self) -> Result<Option<Oid>, RepoError> {
        match harbor_ref::resolve_head(&self.storage) {
            Ok(oid) => Ok(oid),
            Err(RefError::RefNotFound(_)) => Err(RepoError::NotInitialized),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a revision string: `HEAD`, a full OID, a full ref name, or a
    /// short branch/tag/remote name.
    pub fn resolve_revision(&self, revision: &str) -> Result<Oid, RepoError> {
        if revision == "HEAD" {
            return self
                .head_commit()?
                .ok_or_else(|| RepoError::NotFound("HEAD does not point at any commit".into()));
        }
        if revision.len() == 40 {
            if let Ok(oid) = Oid::from_hex(revision) {
                if store::has_object(&self.storage, &oid)? {
                    return Ok(oid);
                }
                return Err(RepoError::NotFound(format!("object {revision} not found")));
            }
        }

        let candidates: Vec<String> = if revision.starts_with("refs/") {
            vec![revision.to_string()]
        } else {
            vec![
                format!("refs/heads/{revision}"),
                format!("refs/tags/{revision}"),
                format!("refs/remotes/{revision}"),
            ]
        };
        for name in &candidates {
            if let Some(oid) = harbor_ref::read_ref(&self.storage, name)? {
                return Ok(oid);
            }
        }
        Err(RepoError::NotFound(format!(
            "revision '{revision}' not found"
        )))
    }

    /// First-parent history from HEAD, newest first.
    pub fn log(&self, limit: Option<usize>) -> Result<Vec<(Oid, Commit)>, RepoError> {
        let Some(head) = self.head_commit()? else {
            return Ok(Vec::new());
        };
        let chain = history::first_parent_chain(&self.storage, &head, None)?;
        let mut out = Vec::new();
        for oid in chain.into_iter().take(limit.unwrap_or(usize::MAX)) {
            out.push((oid, history::read_commit(&self.storage, &oid)?));
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Branches and tags
    // ------------------------------------------------------------------

    pub fn create_branch(&mut self, name: &str, at: &Oid) -> Result<(), RepoError> {
        Ok(harbor_ref::write_ref(
            &mut self.storage,
            &format!("refs/heads/{name}"),
            at,
        )?)
    }

    pub fn delete_branch(&mut self, name: &str) -> Result<(), RepoError> {
        harbor_ref::delete_ref(&mut self.storage, &format!("refs/heads/{name}")).map_err(|e| {
            match e {
                RefError::RefNotFound(_) => {
                    RepoError::NotFound(format!("branch '{name}' not found"))
                }
                other => other.into(),
            }
        })
    }

    /// `(name, oid)` for every local branch, sorted.
    pub fn list_branches(&self) -> Result<Vec<(String, Oid)>, RepoError> {
        Ok(harbor_ref::list_refs(&self.storage)?
            .into_iter()
            .filter_map(|(name, oid)| {
                name.strip_prefix("refs/heads/")
                    .map(|short| (short.to_string(), oid))
            })
            .collect())
    }

    /// Point HEAD at a branch and load its tree into the index.
    pub fn switch(&mut self, branch: &str) -> Result<(), RepoError> {
        let ref_name = format!("refs/heads/{branch}");
        let target = harbor_ref::read_ref(&self.storage, &ref_name)?
            .ok_or_else(|| RepoError::NotFound(format!("branch '{branch}' not found")))?;

        harbor_ref::write_head(&mut self.storage, &Head::Symbolic(ref_name))?;
        self.load_index_from_commit(&target)
    }

    /// Lightweight tag: a ref straight at the target.
    pub fn tag(&mut self, name: &str, target: &Oid) -> Result<(), RepoError> {
        Ok(harbor_ref::write_ref(
            &mut self.storage,
            &format!("refs/tags/{name}"),
            target,
        )?)
    }

    /// Annotated tag: a tag object plus the ref pointing at it.
    pub fn tag_annotated(
        &mut self,
        name: &str,
        target: &Oid,
        tagger: &Signature,
        message: &str,
    ) -> Result<Oid, RepoError> {
        let (kind, _) = store::read_object(&self.storage, target)?;
        let tag = Tag {
            object: *target,
            target_type: kind,
            name: BString::from(name),
            tagger: Some(tagger.clone()),
            message: BString::from(ensure_trailing_newline(message)),
        };
        let oid = store::write_object(&mut self.storage, ObjectType::Tag, &tag.serialize())?;
        harbor_ref::write_ref(&mut self.storage, &format!("refs/tags/{name}"), &oid)?;
        Ok(oid)
    }

    // ------------------------------------------------------------------
    // Status and reset
    // ------------------------------------------------------------------

    /// Simplified status: every index path counts as staged; working-tree
    /// comparison is left to the host.
    pub fn status(&self) -> Result<Status, RepoError> {
        let head = harbor_ref::read_head(&self.storage).map_err(|e| match e {
            RefError::RefNotFound(_) => RepoError::NotInitialized,
            other => RepoError::Ref(other),
        })?;
        let index = Index::load(&self.storage)?;
        Ok(Status {
            branch: head
                .branch()
                .and_then(|r| r.strip_prefix("refs/heads/"))
                .map(str::to_string),
            staged: index.entries().iter().map(|e| e.path.clone()).collect(),
            modified: Vec::new(),
            untracked: Vec::new(),
        })
    }

    /// Reset to a revision: always reload the index from its tree; with
    /// `hard`, also move the ref HEAD names.
    pub fn reset(&mut self, hard: bool, revision: &str) -> Result<(), RepoError> {
        let target = self.resolve_revision(revision)?;
        history::read_commit(&self.storage, &target)?;
        if hard {
            self.advance_head(&target)?;
        }
        self.load_index_from_commit(&target)
    }

    /// Replace the index with a commit's tree contents.
    pub fn load_index_from_commit(&mut self, commit: &Oid) -> Result<(), RepoError> {
        let tree = history::read_commit(&self.storage, commit)?.tree;
        let mut index = Index::load(&self.storage)?;
        index.update_from_tree(&self.storage, &tree)?;
        index.save(&mut self.storage)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Merge and rebase
    // ------------------------------------------------------------------

    /// Merge another revision into the current branch.
    pub fn merge(&mut self, other: &str, author: &Signature) -> Result<MergeSummary, RepoError> {
        let our = self
            .head_commit()?
            .ok_or_else(|| RepoError::NotFound("HEAD does not point at any commit".into()))?;
        let their = self.resolve_revision(other)?;

        let base = history::merge_base(&self.storage, &our, &their)?.ok_or_else(|| {
            RepoError::Conflict(format!("no common ancestor with '{other}'"))
        })?;

        if base == their {
            return Ok(MergeSummary::UpToDate);
        }
        if base == our {
            self.advance_head(&their)?;
            self.load_index_from_commit(&their)?;
            return Ok(MergeSummary::FastForward(their));
        }

        let base_tree = history::read_commit(&self.storage, &base)?.tree;
        let our_tree = history::read_commit(&self.storage, &our)?.tree;
        let their_tree = history::read_commit(&self.storage, &their)?.tree;

        match harbor_merge::merge_trees(
            &mut self.storage,
            &base_tree,
            &our_tree,
            &their_tree,
            Strategy::Recursive,
        )? {
            MergeOutcome::Conflicted(conflicts) => Ok(MergeSummary::Conflicted(conflicts)),
            MergeOutcome::Clean(tree) => {
                let branch = self.current_branch_name()?;
                let message = format!("Merge branch '{other}' into {branch}");
                let oid = self.write_commit(tree, vec![our, their], author, author, &message)?;
                self.load_index_from_commit(&oid)?;
                Ok(MergeSummary::Merged(oid))
            }
        }
    }

    /// Replay the current branch onto another revision.
    ///
    /// Original author identities and dates are preserved; the committer
    /// is re-stamped at replay time.
    pub fn rebase(&mut self, onto: &str) -> Result<Oid, RepoError> {
        let head = self
            .head_commit()?
            .ok_or_else(|| RepoError::NotFound("HEAD does not point at any commit".into()))?;
        let onto_oid = self.resolve_revision(onto)?;

        let fork = history::merge_base(&self.storage, &head, &onto_oid)?.ok_or_else(|| {
            RepoError::Conflict(format!("no common ancestor with '{onto}'"))
        })?;

        if fork == onto_oid {
            // Nothing to move onto; already based there.
            return Ok(head);
        }

        let mut to_replay = history::first_parent_chain(&self.storage, &head, Some(&fork))?;
        to_replay.reverse();

        let mut new_parent = onto_oid;
        for old_oid in to_replay {
            let old = history::read_commit(&self.storage, &old_oid)?;
            let old_parent_tree = match old.first_parent() {
                Some(parent) => history::read_commit(&self.storage, parent)?.tree,
                None => empty_tree(&mut self.storage)?,
            };
            let new_parent_tree = history::read_commit(&self.storage, &new_parent)?.tree;

            let outcome = harbor_merge::merge_trees(
                &mut self.storage,
                &old_parent_tree,
                &new_parent_tree,
                &old.tree,
                Strategy::Recursive,
            )?;
            let tree = match outcome {
                MergeOutcome::Clean(tree) => tree,
                MergeOutcome::Conflicted(conflicts) => {
                    return Err(RepoError::Conflict(format!(
                        "could not replay {}: {} conflicting paths",
                        old_oid,
                        conflicts.len()
                    )))
                }
            };

            let committer = Signature::now(old.committer.name.clone(), old.committer.email.clone());
            let commit = Commit {
                tree,
                parents: vec![new_parent],
                author: old.author.clone(),
                committer,
                extra_headers: Vec::new(),
                message: old.message.clone(),
            };
            new_parent =
                store::write_object(&mut self.storage, ObjectType::Commit, &commit.serialize())?;
        }

        self.advance_head(&new_parent)?;
        self.load_index_from_commit(&new_parent)?;
        Ok(new_parent)
    }

    /// The short name of the branch HEAD points at, or `"HEAD"` detached.
    pub fn current_branch_name(&self) -> Result<String, RepoError> {
        Ok(harbor_ref::read_head(&self.storage)?
            .branch()
            .and_then(|r| r.strip_prefix("refs/heads/"))
            .unwrap_or("HEAD")
            .to_string())
    }
}

fn empty_tree<S: Storage>(storage: &mut S) -> Result<Oid, RepoError> {
    Ok(store::write_object(storage, ObjectType::Tree, b"")?)
}

fn ensure_trailing_newline(message: &str) -> String {
    if message.ends_with('\n') {
        message.to_string()
    } else {
        format!("{message}\n")
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

//! The high-level client façade.
//!
//! [`Client`] wraps a [`Repository`] and adds the remote workflows —
//! clone, fetch, push, pull — over any [`SmartRemote`], plus thin
//! pass-throughs for the local porcelain operations so an external CLI can
//! map subcommands onto it 1:1.

pub mod remote;

pub use remote::{
    parse_advertisement, parse_http_url, HttpRemote, LocalRemote, RefAdvertisement, SmartRemote,
};

use std::collections::HashSet;

use harbor_hash::{HashError, Oid};
use harbor_object::{ObjectError, Signature};
use harbor_pack::PackError;
use harbor_ref::{Head, RefError};
use harbor_repo::{history, InitOptions, MergeSummary, RepoError, Repository, Status};
use harbor_storage::{AbortSignal, Storage, StorageError};
use harbor_wire::pktline::{Pkt, PktReader, PktWriter};
use harbor_wire::sideband::read_band_data;
use harbor_wire::{Service, WireError};

/// Errors produced by client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("remote repository not found: {0}")]
    RemoteNotFound(String),

    #[error("remote '{0}' is not configured")]
    UnknownRemote(String),

    #[error("remote repository is empty")]
    EmptyRemote,

    #[error("non-fast-forward update to '{reference}' rejected; fetch first or force")]
    NonFastForward { reference: String },

    #[error("remote rejected the request: {0}")]
    Rejected(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Pack(#[from] PackError),

    #[error(transparent)]
    Ref(#[from] RefError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What a fetch brought in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    /// `(branch, oid)` for each updated remote-tracking ref.
    pub updated: Vec<(String, Oid)>,
    /// Number of objects received in the pack.
    pub objects: usize,
}

/// A repository plus its configured remotes.
pub struct Client<S: Storage> {
    repo: Repository<S>,
}

impl<S: Storage> Client<S> {
    /// Bind to an existing repository.
    pub fn open(storage: S, name: &str) -> Result<Self, ClientError> {
        Ok(Self {
            repo: Repository::open(storage, name)?,
        })
    }

    /// Initialize a fresh repository.
    pub fn init(storage: S, name: &str, options: &InitOptions) -> Result<Self, ClientError> {
        Ok(Self {
            repo: Repository::init(storage, name, options)?,
        })
    }

    /// Clone over HTTP: discovers the remote, fetches one pack, writes the
    /// advertised refs, and checks out HEAD's branch.
    pub fn clone(storage: S, url: &str) -> Result<Self, ClientError> {
        let (base, name) = parse_http_url(url)?;
        let mut remote = HttpRemote::new(base);
        let mut client = Self::clone_with(storage, &name, &mut remote, "origin")?;
        client.set_remote_url("origin", url)?;
        Ok(client)
    }

    /// Clone through any [`SmartRemote`].
    pub fn clone_with<R: SmartRemote>(
        storage: S,
        name: &str,
        remote: &mut R,
        remote_name: &str,
    ) -> Result<Self, ClientError> {
        let adv = remote.discover_refs(Service::UploadPack)?;
        let head_oid = adv
            .head
            .or_else(|| adv.refs.first().map(|(_, oid)| *oid))
            .ok_or(ClientError::EmptyRemote)?;

        let mut repo = Repository::init(storage, name, &InitOptions::default())?;

        let pack = request_pack(remote, &[head_oid], &[])?;
        let summary =
            harbor_pack::parse_pack(repo.storage_mut(), &pack, &AbortSignal::new())?;
        tracing::debug!(objects = summary.objects.len(), "clone pack ingested");

        let mut head_branch: Option<String> = None;
        for (ref_name, oid) in &adv.refs {
            harbor_ref::write_ref(repo.storage_mut(), ref_name, oid)?;
            if let Some(short) = ref_name.strip_prefix("refs/heads/") {
                harbor_ref::write_ref(
                    repo.storage_mut(),
                    &format!("refs/remotes/{remote_name}/{short}"),
                    oid,
                )?;
                // HEAD's branch: the one whose tip is the advertised HEAD.
                let prefer = head_branch.is_none() || short == "main";
                if *oid == head_oid && prefer {
                    head_branch = Some(short.to_string());
                }
            }
        }

        match head_branch {
            Some(branch) => {
                harbor_ref::write_head(
                    repo.storage_mut(),
                    &Head::Symbolic(format!("refs/heads/{branch}")),
                )?;
            }
            None => {
                harbor_ref::write_head(repo.storage_mut(), &Head::Detached(head_oid))?;
            }
        }
        repo.load_index_from_commit(&head_oid)?;

        Ok(Self { repo })
    }

    /// Fetch from a configured remote by name.
    pub fn fetch(&mut self, remote_name: &str) -> Result<FetchResult, ClientError> {
        let url = self.remote_url(remote_name)?;
        let (base, _) = parse_http_url(&url)?;
        let mut remote = HttpRemote::new(base);
        self.fetch_with(remote_name, &mut remote)
    }

    /// Fetch through any [`SmartRemote`]: want every advertised head whose
    /// OID differs from our mirror (tags excluded), then update the
    /// remote-tracking refs.
    pub fn fetch_with<R: SmartRemote>(
        &mut self,
        remote_name: &str,
        remote: &mut R,
    ) -> Result<FetchResult, ClientError> {
        let adv = remote.discover_refs(Service::UploadPack)?;

        let mut wants = Vec::new();
        let mut updates = Vec::new();
        let mut haves = Vec::new();

        for (ref_name, oid) in &adv.refs {
            let Some(short) = ref_name.strip_prefix("refs/heads/") else {
                continue; // tags and other namespaces are not mirrored
            };
            let mirror_name = format!("refs/remotes/{remote_name}/{short}");
            let mirrored = harbor_ref::read_ref(self.repo.storage(), &mirror_name)?;
            if let Some(mirrored) = mirrored {
                haves.push(mirrored);
            }
            if mirrored != Some(*oid) {
                wants.push(*oid);
                updates.push((short.to_string(), *oid));
            }
        }

        let mut result = FetchResult::default();
        if wants.is_empty() {
            return Ok(result);
        }

        let pack = request_pack(remote, &wants, &haves)?;
        let summary =
            harbor_pack::parse_pack(self.repo.storage_mut(), &pack, &AbortSignal::new())?;
        result.objects = summary.objects.len();

        for (short, oid) in &updates {
            harbor_ref::write_ref(
                self.repo.storage_mut(),
                &format!("refs/remotes/{remote_name}/{short}"),
                oid,
            )?;
        }
        result.updated = updates;
        tracing::debug!(
            remote = remote_name,
            refs = result.updated.len(),
            objects = result.objects,
            "fetch complete"
        );
        Ok(result)
    }

    /// Push a branch to a configured remote by name.
    pub fn push(&mut self, remote_name: &str, branch: &str, force: bool) -> Result<(), ClientError> {
        let url = self.remote_url(remote_name)?;
        let (base, _) = parse_http_url(&url)?;
        let mut remote = HttpRemote::new(base);
        self.push_with(remote_name, branch, force, &mut remote)
    }

    /// Push through any [`SmartRemote`].
    ///
    /// The update command carries `old` = our remote-tracking value (zero if
    /// none); when the remote advertises a different value and `force` is
    /// off, the push fails before any data moves.
    pub fn push_with<R: SmartRemote>(
        &mut self,
        remote_name: &str,
        branch: &str,
        force: bool,
        remote: &mut R,
    ) -> Result<(), ClientError> {
        let ref_name = format!("refs/heads/{branch}");
        let local = harbor_ref::read_ref(self.repo.storage(), &ref_name)?
            .ok_or_else(|| ClientError::Repo(RepoError::NotFound(format!(
                "branch '{branch}' not found"
            ))))?;

        let adv = remote.discover_refs(Service::ReceivePack)?;
        let advertised = adv.find(&ref_name).unwrap_or(Oid::ZERO);

        let tracking_name = format!("refs/remotes/{remote_name}/{branch}");
        let old = harbor_ref::read_ref(self.repo.storage(), &tracking_name)?.unwrap_or(Oid::ZERO);

        if advertised != old && !force {
            return Err(ClientError::NonFastForward {
                reference: ref_name,
            });
        }

        let closure =
            history::collect_closure(self.repo.storage(), &[local], &HashSet::new())?;
        let pack = harbor_pack::write_pack(self.repo.storage(), &closure)?;
        tracing::debug!(
            remote = remote_name,
            branch,
            objects = closure.len(),
            "pushing pack"
        );

        let mut writer = PktWriter::new();
        writer.write_text(&format!("{old} {local} {ref_name}\0report-status"))?;
        writer.write_flush();
        writer.write_raw(&pack);

        let response = remote.receive_pack(&writer.into_bytes())?;
        check_push_report(&response)?;

        harbor_ref::write_ref(self.repo.storage_mut(), &tracking_name, &local)?;
        Ok(())
    }

    /// Fetch, then merge the remote-tracking ref of the current branch.
    pub fn pull(&mut self, remote_name: &str, author: &Signature) -> Result<MergeSummary, ClientError> {
        let url = self.remote_url(remote_name)?;
        let (base, _) = parse_http_url(&url)?;
        let mut remote = HttpRemote::new(base);
        self.pull_with(remote_name, author, &mut remote)
    }

    /// Pull through any [`SmartRemote`].
    pub fn pull_with<R: SmartRemote>(
        &mut self,
        remote_name: &str,
        author: &Signature,
        remote: &mut R,
    ) -> Result<MergeSummary, ClientError> {
        self.fetch_with(remote_name, remote)?;
        let branch = self.repo.current_branch_name()?;
        Ok(self
            .repo
            .merge(&format!("refs/remotes/{remote_name}/{branch}"), author)?)
    }

    // ------------------------------------------------------------------
    // Remote bookkeeping
    // ------------------------------------------------------------------

    /// Record a remote's URL under `.git/remotes/<name>`.
    pub fn set_remote_url(&mut self, name: &str, url: &str) -> Result<(), ClientError> {
        self.repo
            .storage_mut()
            .write_file(&format!(".git/remotes/{name}"), format!("{url}\n").as_bytes())?;
        Ok(())
    }

    /// Look up a configured remote's URL.
    pub fn remote_url(&self, name: &str) -> Result<String, ClientError> {
        match self.repo.storage().read_file(&format!(".git/remotes/{name}")) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).trim().to_string()),
            Err(e) if e.is_not_found() => Err(ClientError::UnknownRemote(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of configured remotes.
    pub fn remotes(&self) -> Result<Vec<String>, ClientError> {
        match self.repo.storage().list_directory(".git/remotes") {
            Ok(names) => Ok(names),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    // ------------------------------------------------------------------
    // Porcelain pass-throughs
    // ------------------------------------------------------------------

    pub fn repo(&self) -> &Repository<S> {
        &self.repo
    }

    pub fn repo_mut(&mut self) -> &mut Repository<S> {
        &mut self.repo
    }

    pub fn add(&mut self, path: &str, bytes: &[u8]) -> Result<Oid, ClientError> {
        Ok(self.repo.add(path, bytes)?)
    }

    pub fn commit(&mut self, message: &str, author: &Signature) -> Result<Oid, ClientError> {
        Ok(self.repo.commit(message, author)?)
    }

    pub fn log(&self, limit: Option<usize>) -> Result<Vec<(Oid, harbor_object::Commit)>, ClientError> {
        Ok(self.repo.log(limit)?)
    }

    pub fn status(&self) -> Result<Status, ClientError> {
        Ok(self.repo.status()?)
    }

    pub fn switch(&mut self, branch: &str) -> Result<(), ClientError> {
        Ok(self.repo.switch(branch)?)
    }

    pub fn merge(&mut self, other: &str, author: &Signature) -> Result<MergeSummary, ClientError> {
        Ok(self.repo.merge(other, author)?)
    }

    pub fn rebase(&mut self, onto: &str) -> Result<Oid, ClientError> {
        Ok(self.repo.rebase(onto)?)
    }
}

/// Build a want/have/done request and unwrap the NAK + side-band response
/// into raw pack bytes.
fn request_pack<R: SmartRemote>(
    remote: &mut R,
    wants: &[Oid],
    haves: &[Oid],
) -> Result<Vec<u8>, ClientError> {
    let mut writer = PktWriter::new();
    for (i, want) in wants.iter().enumerate() {
        if i == 0 {
            writer.write_text(&format!("want {want} side-band-64k ofs-delta"))?;
        } else {
            writer.write_text(&format!("want {want}"))?;
        }
    }
    writer.write_flush();
    for have in haves {
        writer.write_text(&format!("have {have}"))?;
    }
    writer.write_text("done")?;

    let response = remote.upload_pack(&writer.into_bytes())?;
    let mut reader = PktReader::new(&response);

    // ACK/NAK section precedes the side-band pack data.
    loop {
        match reader.read_pkt().map_err(ClientError::Wire)? {
            Pkt::Data(line) if line.starts_with(b"NAK") || line.starts_with(b"ACK") => break,
            Pkt::Data(other) => {
                return Err(ClientError::Protocol(format!(
                    "expected ACK/NAK, got {:?}",
                    String::from_utf8_lossy(other)
                )))
            }
            Pkt::Flush => continue,
            Pkt::End => return Err(ClientError::Protocol("empty upload-pack response".into())),
        }
    }

    let pack = read_band_data(&mut reader, |progress| {
        tracing::debug!(message = %String::from_utf8_lossy(progress).trim_end(), "remote progress");
    })?;
    if pack.is_empty() {
        return Err(ClientError::Protocol("upload-pack sent no pack data".into()));
    }
    Ok(pack)
}

/// Validate the receive-pack report: `unpack ok` then `ok <ref>` per ref.
fn check_push_report(response: &[u8]) -> Result<(), ClientError> {
    let mut reader = PktReader::new(response);
    let lines = reader.read_until_flush().map_err(ClientError::Wire)?;

    let mut lines = lines.iter();
    match lines.next() {
        Some(first) if first.starts_with(b"unpack ok") => {}
        Some(first) => {
            return Err(ClientError::Rejected(
                String::from_utf8_lossy(first).trim_end().to_string(),
            ))
        }
        None => return Err(ClientError::Protocol("empty receive-pack response".into())),
    }
    for line in lines {
        if !line.starts_with(b"ok ") {
            return Err(ClientError::Rejected(
                String::from_utf8_lossy(line).trim_end().to_string(),
            ));
        }
    }
    Ok(())
}

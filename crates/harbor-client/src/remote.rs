//! Smart-HTTP remotes.
//!
//! [`SmartRemote`] models the three stateless exchanges of the smart-HTTP
//! protocol. [`HttpRemote`] speaks to a real server over HTTP;
//! [`LocalRemote`] drives the same wire handlers in-process, which is what
//! embedded hosts and the test suite use.

use harbor_hash::Oid;
use harbor_repo::{InitOptions, Repository};
use harbor_storage::{AbortSignal, Storage};
use harbor_wire::pktline::{Pkt, PktReader};
use harbor_wire::{advertise, receive_pack, upload_pack, Service};

use crate::ClientError;

/// Parsed `info/refs` advertisement.
#[derive(Debug, Clone, Default)]
pub struct RefAdvertisement {
    /// Advertised refs in server order, `HEAD` excluded.
    pub refs: Vec<(String, Oid)>,
    /// The OID `HEAD` resolves to, when advertised.
    pub head: Option<Oid>,
    /// Capabilities from the first ref line.
    pub capabilities: Vec<String>,
}

impl RefAdvertisement {
    pub fn find(&self, name: &str) -> Option<Oid> {
        self.refs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, oid)| *oid)
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty() && self.head.is_none()
    }
}

/// The client side of the smart-HTTP protocol.
pub trait SmartRemote {
    /// `GET /info/refs?service=<svc>`.
    fn discover_refs(&mut self, service: Service) -> Result<RefAdvertisement, ClientError>;

    /// `POST /git-upload-pack` with a want/have/done body.
    fn upload_pack(&mut self, request: &[u8]) -> Result<Vec<u8>, ClientError>;

    /// `POST /git-receive-pack` with commands + pack.
    fn receive_pack(&mut self, request: &[u8]) -> Result<Vec<u8>, ClientError>;
}

/// Parse a service advertisement body.
pub fn parse_advertisement(body: &[u8]) -> Result<RefAdvertisement, ClientError> {
    let mut reader = PktReader::new(body);
    let mut adv = RefAdvertisement::default();
    let mut saw_caps = false;

    loop {
        let line = match reader.read_pkt().map_err(ClientError::Wire)? {
            Pkt::Data(payload) => payload,
            Pkt::Flush => continue,
            Pkt::End => break,
        };
        let line = match line.last() {
            Some(b'\n') => &line[..line.len() - 1],
            _ => line,
        };
        // Service banner ("# service=...") and blank lines are framing.
        if line.is_empty() || line.starts_with(b"#") {
            continue;
        }

        let (ref_part, caps) = match line.iter().position(|&b| b == 0) {
            Some(nul) => (&line[..nul], Some(&line[nul + 1..])),
            None => (line, None),
        };
        if let Some(caps) = caps {
            if !saw_caps {
                saw_caps = true;
                adv.capabilities = String::from_utf8_lossy(caps)
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
            }
        }

        let text = std::str::from_utf8(ref_part)
            .map_err(|_| ClientError::Protocol("non-UTF8 ref line".into()))?;
        let Some((oid_hex, name)) = text.split_once(' ') else {
            return Err(ClientError::Protocol(format!("malformed ref line: {text:?}")));
        };
        let oid = Oid::from_hex(oid_hex)
            .map_err(|e| ClientError::Protocol(format!("bad OID in advertisement: {e}")))?;

        match name {
            // The null-OID capabilities placeholder of an empty repository.
            "capabilities^{}" => {}
            "HEAD" => adv.head = Some(oid),
            _ => adv.refs.push((name.to_string(), oid)),
        }
    }

    Ok(adv)
}

/// Parse an `http(s)://host[:port]/path/<repo>[.git]` URL into the
/// repository base URL and the repository name.
pub fn parse_http_url(url: &str) -> Result<(String, String), ClientError> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| ClientError::InvalidUrl(format!("unsupported URL scheme: {url}")))?;

    let base = url.trim_end_matches('/');
    let name = rest
        .trim_end_matches('/')
        .split('/')
        .skip(1) // the authority (host[:port]) is not a repository name
        .last()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ClientError::InvalidUrl(format!("no repository in URL: {url}")))?;

    Ok((
        base.to_string(),
        name.strip_suffix(".git").unwrap_or(name).to_string(),
    ))
}

/// A remote repository behind a real HTTP server.
pub struct HttpRemote {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::blocking::Client::new(),
        }
    }

    fn post(&self, endpoint: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()?;
        check_status(&url, response.status())?;
        Ok(response.bytes()?.to_vec())
    }
}

fn check_status(url: &str, status: reqwest::StatusCode) -> Result<(), ClientError> {
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ClientError::RemoteNotFound(url.to_string()));
    }
    if !status.is_success() {
        return Err(ClientError::Rejected(format!(
            "{url} answered HTTP {status}"
        )));
    }
    Ok(())
}

impl SmartRemote for HttpRemote {
    fn discover_refs(&mut self, service: Service) -> Result<RefAdvertisement, ClientError> {
        let url = format!(
            "{}/info/refs?service={}",
            self.base_url,
            service.as_str()
        );
        let response = self.http.get(&url).send()?;
        check_status(&url, response.status())?;
        let body = response.bytes()?;
        tracing::debug!(url, bytes = body.len(), "discovered refs");
        parse_advertisement(&body)
    }

    fn upload_pack(&mut self, request: &[u8]) -> Result<Vec<u8>, ClientError> {
        self.post(
            "git-upload-pack",
            "application/x-git-upload-pack-request",
            request.to_vec(),
        )
    }

    fn receive_pack(&mut self, request: &[u8]) -> Result<Vec<u8>, ClientError> {
        self.post(
            "git-receive-pack",
            "application/x-git-receive-pack-request",
            request.to_vec(),
        )
    }
}

/// A remote driven in-process against the wire handlers.
///
/// Shares server state through a cloneable storage backend; every call is
/// scoped to `repo` first, mirroring the server's per-request behavior.
pub struct LocalRemote<S> {
    storage: S,
    repo: String,
}

impl<S: Storage + Clone> LocalRemote<S> {
    pub fn new(storage: S, repo: impl Into<String>) -> Self {
        Self {
            storage,
            repo: repo.into(),
        }
    }

    fn scoped(&self) -> Result<S, ClientError> {
        let mut storage = self.storage.clone();
        storage.init(&self.repo).map_err(harbor_wire::WireError::Storage)?;
        Ok(storage)
    }
}

impl<S: Storage + Clone> SmartRemote for LocalRemote<S> {
    fn discover_refs(&mut self, service: Service) -> Result<RefAdvertisement, ClientError> {
        let mut storage = self.scoped()?;
        if service == Service::ReceivePack {
            Repository::init_in_place(&mut storage, &InitOptions::default())
                .map_err(harbor_wire::WireError::Repo)?;
        } else if !storage.exists(".git/HEAD").map_err(harbor_wire::WireError::Storage)? {
            return Err(ClientError::RemoteNotFound(self.repo.clone()));
        }
        let body = advertise::advertise_refs(&storage, service)?;
        parse_advertisement(&body)
    }

    fn upload_pack(&mut self, request: &[u8]) -> Result<Vec<u8>, ClientError> {
        let mut storage = self.scoped()?;
        Ok(upload_pack::upload_pack(
            &mut storage,
            request,
            &AbortSignal::new(),
        )?)
    }

    fn receive_pack(&mut self, request: &[u8]) -> Result<Vec<u8>, ClientError> {
        let mut storage = self.scoped()?;
        Repository::init_in_place(&mut storage, &InitOptions::default())
            .map_err(harbor_wire::WireError::Repo)?;
        Ok(receive_pack::receive_pack(
            &mut storage,
            request,
            &AbortSignal::new(),
        )?)
    }
}

//! The smart-HTTP wire protocol, both halves of the server side:
//! pkt-line framing, side-band multiplexing, service advertisement, and the
//! `git-upload-pack` / `git-receive-pack` request handlers, plus the axum
//! server that routes them per repository.
//!
//! The handlers themselves are synchronous functions over a [`Storage`]
//! scope; [`server`] adds the per-repository actor serialization and the
//! HTTP error translation on top.

pub mod advertise;
pub mod pktline;
pub mod receive_pack;
pub mod server;
pub mod sideband;
pub mod upload_pack;

use harbor_hash::HashError;
use harbor_object::ObjectError;
use harbor_pack::PackError;
use harbor_ref::RefError;
use harbor_repo::RepoError;
use harbor_storage::StorageError;

/// The two smart-HTTP services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    UploadPack,
    ReceivePack,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "git-upload-pack" => Some(Self::UploadPack),
            "git-receive-pack" => Some(Self::ReceivePack),
            _ => None,
        }
    }

    /// Capabilities advertised for this service.
    pub fn capabilities(&self) -> &'static str {
        match self {
            Self::UploadPack => "multi_ack_detailed side-band-64k thin-pack ofs-delta",
            Self::ReceivePack => "report-status delete-refs ofs-delta",
        }
    }
}

/// Errors produced by the wire layer.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("repository not found")]
    RepoNotFound,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("request aborted")]
    Aborted,

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Ref(#[from] RefError),

    #[error(transparent)]
    Pack(#[from] PackError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl WireError {
    /// Whether this error (at any wrapping level) is a cancellation.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted | Self::Pack(PackError::Aborted))
    }
}

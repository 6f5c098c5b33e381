//! Packfile codec: the PACK v2 container and the delta instruction stream.
//!
//! A pack is `"PACK" | version(=2) | object-count`, then one entry per
//! object (a size/type varint header, delta base information for OFS/REF
//! deltas, and zlib-compressed bytes), then a 20-byte SHA-1 trailer over
//! everything preceding.

pub mod cache;
pub mod delta;
pub mod entry;
mod parse;
mod write;

pub use cache::DeltaCache;
pub use parse::{parse_pack, PackSummary, PackedObject};
pub use write::write_pack;

use harbor_hash::HashError;
use harbor_object::ObjectError;
use harbor_storage::StorageError;

/// Pack file magic.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";

/// The only supported pack version.
pub const PACK_VERSION: u32 = 2;

/// Size of the pack header (signature + version + count).
pub const PACK_HEADER_SIZE: usize = 12;

/// Upper bound on delta resolution passes before giving up.
pub const MAX_RESOLVE_PASSES: usize = 10;

/// Errors produced by pack parsing, writing, and delta application.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("invalid pack header: {0}")]
    InvalidHeader(String),

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt varint at offset {offset}: {reason}")]
    InvalidVarint { offset: usize, reason: String },

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: usize, reason: String },

    #[error("invalid delta at offset {offset}: {reason}")]
    InvalidDelta { offset: usize, reason: String },

    #[error("{remaining} deltas left unresolved after {passes} passes")]
    UnresolvedDelta { remaining: usize, passes: usize },

    #[error("pack operation aborted")]
    Aborted,

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

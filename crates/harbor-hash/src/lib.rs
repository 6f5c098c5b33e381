//! Object identity for githarbor.
//!
//! Provides [`Oid`] (a 20-byte SHA-1 digest), the hex codec used for its
//! 40-character text form, and a streaming [`Hasher`] that computes object
//! IDs from canonical `"<kind> <len>\0"`-prefixed payloads.

pub mod hex;
mod hasher;
mod oid;

pub use hasher::Hasher;
pub use oid::Oid;

/// Errors produced by hash and OID operations.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hex character at position {position}: '{character}'")]
    InvalidHex { position: usize, character: char },

    #[error("invalid hex length: expected {expected}, got {actual}")]
    InvalidHexLength { expected: usize, actual: usize },

    #[error("invalid digest length: expected {expected} bytes, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },
}

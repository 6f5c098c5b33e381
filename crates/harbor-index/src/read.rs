//! Index file parsing.
//!
//! The entry padding is a function of the cumulative offset within the
//! entries section (the bytes after the 12-byte header), so the parser
//! threads that offset through every entry rather than assuming entries
//! start 8-aligned.

use bstr::BString;
use harbor_hash::{Hasher, Oid};
use harbor_object::FileMode;

use crate::{Index, IndexEntry, IndexError, INDEX_SIGNATURE, INDEX_VERSION};

pub(crate) fn parse(data: &[u8]) -> Result<Index, IndexError> {
    if data.len() < 12 + 20 {
        return Err(IndexError::InvalidHeader("index file too short".into()));
    }

    // Trailer: SHA-1 of everything preceding.
    let content_end = data.len() - 20;
    let expected = Oid::from_bytes(&data[content_end..])?;
    if Hasher::digest(&data[..content_end]) != expected {
        return Err(IndexError::ChecksumMismatch);
    }

    if &data[..4] != INDEX_SIGNATURE {
        return Err(IndexError::InvalidHeader(format!(
            "bad signature: {:?}",
            &data[..4]
        )));
    }
    let version = read_u32(data, 4);
    if version != INDEX_VERSION {
        return Err(IndexError::UnsupportedVersion(version));
    }
    let entry_count = read_u32(data, 8) as usize;

    let mut entries = Vec::with_capacity(entry_count);
    // Offset within the entries section; padding depends on it.
    let mut section = 0usize;

    for _ in 0..entry_count {
        let start = 12 + section;
        if start + 62 > content_end {
            return Err(IndexError::InvalidEntry {
                offset: start,
                reason: "entry extends past index content".into(),
            });
        }

        let mtime_secs = read_u32(data, start + 8) as u64;
        let mtime_nsecs = read_u32(data, start + 12) as u64;
        let mode_raw = read_u32(data, start + 24);
        let size = read_u32(data, start + 36);
        let oid = Oid::from_bytes(&data[start + 40..start + 60])?;
        let flags = u16::from_be_bytes([data[start + 60], data[start + 61]]);
        let name_len = (flags & 0x0fff) as usize;

        let name_start = start + 62;
        if name_start + name_len > content_end {
            return Err(IndexError::InvalidEntry {
                offset: name_start,
                reason: "entry name extends past index content".into(),
            });
        }
        let path = BString::from(&data[name_start..name_start + name_len]);

        let mode = FileMode::from_raw(mode_raw).map_err(|_| IndexError::InvalidEntry {
            offset: start + 24,
            reason: format!("bad mode {mode_raw:o}"),
        })?;

        entries.push(IndexEntry {
            path,
            oid,
            mode,
            size,
            mtime_ms: mtime_secs * 1000 + mtime_nsecs / 1_000_000,
        });

        section += 62 + name_len;
        section += section % 8; // NUL padding width
    }

    Ok(Index { entries })
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

//! Index file serialization.

use harbor_hash::Hasher;

use crate::{Index, IndexEntry, INDEX_SIGNATURE, INDEX_VERSION};

pub(crate) fn serialize(index: &Index) -> Vec<u8> {
    let mut buf = Vec::new();

    buf.extend_from_slice(INDEX_SIGNATURE);
    buf.extend_from_slice(&INDEX_VERSION.to_be_bytes());
    buf.extend_from_slice(&(index.entries().len() as u32).to_be_bytes());

    // Offset within the entries section; the padding width depends on it.
    let mut section = 0usize;
    for entry in index.entries() {
        section += write_entry(&mut buf, entry, section);
    }

    let checksum = Hasher::digest(&buf);
    buf.extend_from_slice(checksum.as_bytes());
    buf
}

/// Write one entry; returns the number of bytes appended (including padding).
fn write_entry(buf: &mut Vec<u8>, entry: &IndexEntry, section: usize) -> usize {
    let mtime_secs = (entry.mtime_ms / 1000) as u32;
    let mtime_nsecs = ((entry.mtime_ms % 1000) * 1_000_000) as u32;

    // ctime mirrors mtime; dev/ino/uid/gid are not tracked by this system.
    buf.extend_from_slice(&mtime_secs.to_be_bytes());
    buf.extend_from_slice(&mtime_nsecs.to_be_bytes());
    buf.extend_from_slice(&mtime_secs.to_be_bytes());
    buf.extend_from_slice(&mtime_nsecs.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes()); // dev
    buf.extend_from_slice(&0u32.to_be_bytes()); // ino
    buf.extend_from_slice(&entry.mode.raw().to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes()); // uid
    buf.extend_from_slice(&0u32.to_be_bytes()); // gid
    buf.extend_from_slice(&entry.size.to_be_bytes());

    buf.extend_from_slice(entry.oid.as_bytes());

    let flags = entry.path.len().min(0x0fff) as u16;
    buf.extend_from_slice(&flags.to_be_bytes());

    buf.extend_from_slice(&entry.path);

    let written = 62 + entry.path.len();
    let padding = (section + written) % 8;
    buf.resize(buf.len() + padding, 0);

    written + padding
}

//! Pack parsing: index every entry, then resolve deltas to a fixed point.
//!
//! The parser makes two passes over a complete pack byte stream. The first
//! walks the entries, inflating each one with a streaming decompressor so
//! the exact compressed length is known without scanning for the next
//! header. The second pass writes plain objects to the object store and
//! iterates over the remaining deltas until every one has found its base,
//! bounded by [`MAX_RESOLVE_PASSES`](crate::MAX_RESOLVE_PASSES).

use std::collections::HashMap;

use flate2::{Decompress, FlushDecompress, Status};
use harbor_hash::{Hasher, Oid};
use harbor_object::{store, ObjectType};
use harbor_storage::{AbortSignal, Storage};

use crate::delta::apply_delta;
use crate::entry::{
    object_type, parse_base_oid, parse_entry_header, parse_ofs_offset, TYPE_OFS_DELTA,
    TYPE_REF_DELTA,
};
use crate::{PackError, MAX_RESOLVE_PASSES, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};

/// Where a delta entry finds its base.
#[derive(Debug)]
enum BaseRef {
    /// Not a delta.
    None,
    /// OFS delta: base lives at `entry_offset - back`.
    Back(u64),
    /// REF delta: base named by OID, in-pack or already in the store.
    Oid(Oid),
}

#[derive(Debug)]
struct RawEntry {
    offset: u64,
    code: u8,
    base: BaseRef,
    /// Inflated payload (object bytes, or the delta stream).
    data: Vec<u8>,
    crc32: u32,
}

/// One materialized object from a parsed pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedObject {
    pub oid: Oid,
    /// Offset of the entry within the pack stream.
    pub offset: u64,
    /// CRC32 of the raw entry bytes (header + compressed data).
    pub crc32: u32,
}

/// Outcome of a successful pack ingestion.
#[derive(Debug)]
pub struct PackSummary {
    /// Every materialized object, in pack entry order.
    pub objects: Vec<PackedObject>,
    /// Whether the SHA-1 trailer matched. A mismatch is tolerated but logged.
    pub checksum_ok: bool,
}

/// Parse a complete pack stream, materializing every object into the store.
pub fn parse_pack<S: Storage>(
    storage: &mut S,
    data: &[u8],
    abort: &AbortSignal,
) -> Result<PackSummary, PackError> {
    let count = parse_header(data)?;
    let mut entries = Vec::with_capacity(count as usize);

    let mut pos = PACK_HEADER_SIZE;
    for _ in 0..count {
        if abort.is_aborted() {
            return Err(PackError::Aborted);
        }
        let (next, entry) = parse_entry(data, pos)?;
        entries.push(entry);
        pos = next;
    }

    // Trailer: SHA-1 of all preceding bytes. A mismatch is logged, not fatal.
    let checksum_ok = match data.len().checked_sub(pos) {
        Some(20) => {
            let expected = Oid::from_bytes(&data[pos..])?;
            let actual = Hasher::digest(&data[..pos]);
            if actual != expected {
                tracing::warn!(%expected, %actual, "pack trailer checksum mismatch");
            }
            actual == expected
        }
        _ => {
            return Err(PackError::CorruptEntry {
                offset: pos,
                reason: format!(
                    "expected 20-byte trailer, found {} trailing bytes",
                    data.len().saturating_sub(pos)
                ),
            });
        }
    };

    let objects = resolve(storage, entries, abort)?;
    Ok(PackSummary {
        objects,
        checksum_ok,
    })
}

fn parse_header(data: &[u8]) -> Result<u32, PackError> {
    if data.len() < PACK_HEADER_SIZE + 20 {
        return Err(PackError::InvalidHeader("pack stream too short".into()));
    }
    if &data[..4] != PACK_SIGNATURE {
        return Err(PackError::InvalidHeader("bad PACK signature".into()));
    }
    let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if version != PACK_VERSION {
        return Err(PackError::UnsupportedVersion(version));
    }
    Ok(u32::from_be_bytes([data[8], data[9], data[10], data[11]]))
}

/// Parse one entry starting at `pos`. Returns `(next_pos, entry)`.
fn parse_entry(data: &[u8], pos: usize) -> Result<(usize, RawEntry), PackError> {
    let entry_start = pos;
    let (code, size, consumed) = parse_entry_header(data, pos)?;
    let mut cursor = pos + consumed;

    let base = match code {
        TYPE_OFS_DELTA => {
            let (back, consumed) = parse_ofs_offset(data, cursor)?;
            cursor += consumed;
            BaseRef::Back(back)
        }
        TYPE_REF_DELTA => {
            let oid = parse_base_oid(data, cursor)?;
            cursor += 20;
            BaseRef::Oid(oid)
        }
        _ => BaseRef::None,
    };

    let (inflated, compressed_len) = inflate_at(data, cursor, size)?;
    if inflated.len() as u64 != size {
        return Err(PackError::CorruptEntry {
            offset: entry_start,
            reason: format!(
                "entry declares {size} bytes but inflates to {}",
                inflated.len()
            ),
        });
    }
    let end = cursor + compressed_len;

    let mut crc = crc32fast::Hasher::new();
    crc.update(&data[entry_start..end]);

    Ok((
        end,
        RawEntry {
            offset: entry_start as u64,
            code,
            base,
            data: inflated,
            crc32: crc.finalize(),
        },
    ))
}

/// Inflate one zlib stream at `at`, reporting the compressed length consumed.
fn inflate_at(data: &[u8], at: usize, expected: u64) -> Result<(Vec<u8>, usize), PackError> {
    let mut z = Decompress::new(true);
    let mut out: Vec<u8> = Vec::with_capacity(expected as usize + 1);

    loop {
        if out.capacity() == out.len() {
            out.reserve(1024);
        }
        let in_before = z.total_in();
        let out_before = z.total_out();
        let input = data.get(at + in_before as usize..).unwrap_or(&[]);
        let status = z
            .decompress_vec(input, &mut out, FlushDecompress::None)
            .map_err(|e| PackError::CorruptEntry {
                offset: at,
                reason: format!("zlib error: {e}"),
            })?;

        match status {
            Status::StreamEnd => return Ok((out, z.total_in() as usize)),
            Status::Ok | Status::BufError => {
                // No forward progress on either side means the stream can
                // never finish: the input was truncated.
                if z.total_in() == in_before && z.total_out() == out_before {
                    return Err(PackError::CorruptEntry {
                        offset: at,
                        reason: "truncated compressed data".into(),
                    });
                }
            }
        }
    }
}

/// Materialize entries into the store, resolving deltas iteratively.
fn resolve<S: Storage>(
    storage: &mut S,
    entries: Vec<RawEntry>,
    abort: &AbortSignal,
) -> Result<Vec<PackedObject>, PackError> {
    // Payloads resolved so far, keyed by pack offset, plus the OID index
    // that lets later REF deltas target objects from this same pack.
    let mut resolved: HashMap<u64, (ObjectType, Vec<u8>)> = HashMap::new();
    let mut offset_of: HashMap<Oid, u64> = HashMap::new();
    let mut oid_at: HashMap<u64, Oid> = HashMap::new();

    let mut pending: Vec<&RawEntry> = Vec::new();
    for entry in &entries {
        match entry.base {
            BaseRef::None => {
                let kind = object_type(entry.code).expect("non-delta entry code");
                let oid = store::write_object(storage, kind, &entry.data)?;
                resolved.insert(entry.offset, (kind, entry.data.clone()));
                offset_of.insert(oid, entry.offset);
                oid_at.insert(entry.offset, oid);
            }
            _ => pending.push(entry),
        }
    }

    let mut passes = 0;
    while !pending.is_empty() && passes < MAX_RESOLVE_PASSES {
        if abort.is_aborted() {
            return Err(PackError::Aborted);
        }
        passes += 1;
        let before = pending.len();

        let mut still_pending = Vec::with_capacity(pending.len());
        for entry in pending {
            let base = match entry.base {
                BaseRef::Back(back) => {
                    let base_offset = entry.offset.checked_sub(back).ok_or_else(|| {
                        PackError::CorruptEntry {
                            offset: entry.offset as usize,
                            reason: format!("ofs-delta base offset {back} underflows"),
                        }
                    })?;
                    resolved.get(&base_offset).cloned()
                }
                BaseRef::Oid(ref oid) => match offset_of.get(oid) {
                    Some(offset) => resolved.get(offset).cloned(),
                    None => match store::has_object(storage, oid)? {
                        true => Some(store::read_object(storage, oid)?),
                        false => None,
                    },
                },
                BaseRef::None => unreachable!("plain entries resolved up front"),
            };

            let Some((kind, base_data)) = base else {
                still_pending.push(entry);
                continue;
            };

            let target = apply_delta(&base_data, &entry.data)?;
            let oid = store::write_object(storage, kind, &target)?;
            resolved.insert(entry.offset, (kind, target));
            offset_of.insert(oid, entry.offset);
            oid_at.insert(entry.offset, oid);
        }

        let progressed = still_pending.len() < before;
        pending = still_pending;
        if !progressed {
            break;
        }
    }

    if !pending.is_empty() {
        return Err(PackError::UnresolvedDelta {
            remaining: pending.len(),
            passes,
        });
    }

    let mut objects = Vec::with_capacity(entries.len());
    for entry in &entries {
        objects.push(PackedObject {
            oid: oid_at[&entry.offset],
            offset: entry.offset,
            crc32: entry.crc32,
        });
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::compute_delta;
    use crate::entry::{encode_entry_header, encode_ofs_offset, type_code, TYPE_REF_DELTA};
    use harbor_object::zlib;
    use harbor_storage::MemoryStorage;

    fn storage() -> MemoryStorage {
        let mut s = MemoryStorage::new();
        s.init("repo").unwrap();
        s
    }

    struct PackBuilder {
        data: Vec<u8>,
        count: u32,
    }

    impl PackBuilder {
        fn new() -> Self {
            Self {
                data: Vec::new(),
                count: 0,
            }
        }

        fn plain(&mut self, kind: ObjectType, payload: &[u8]) -> u64 {
            let offset = PACK_HEADER_SIZE as u64 + self.data.len() as u64;
            self.data
                .extend_from_slice(&encode_entry_header(type_code(kind), payload.len() as u64));
            self.data.extend_from_slice(&zlib::compress(payload));
            self.count += 1;
            offset
        }

        fn ofs_delta(&mut self, base_offset: u64, delta: &[u8]) -> u64 {
            let offset = PACK_HEADER_SIZE as u64 + self.data.len() as u64;
            self.data
                .extend_from_slice(&encode_entry_header(TYPE_OFS_DELTA, delta.len() as u64));
            self.data
                .extend_from_slice(&encode_ofs_offset(offset - base_offset));
            self.data.extend_from_slice(&zlib::compress(delta));
            self.count += 1;
            offset
        }

        fn ref_delta(&mut self, base: &Oid, delta: &[u8]) -> u64 {
            let offset = PACK_HEADER_SIZE as u64 + self.data.len() as u64;
            self.data
                .extend_from_slice(&encode_entry_header(TYPE_REF_DELTA, delta.len() as u64));
            self.data.extend_from_slice(base.as_bytes());
            self.data.extend_from_slice(&zlib::compress(delta));
            self.count += 1;
            offset
        }

        fn finish(self) -> Vec<u8> {
            let mut out = Vec::new();
            out.extend_from_slice(PACK_SIGNATURE);
            out.extend_from_slice(&PACK_VERSION.to_be_bytes());
            out.extend_from_slice(&self.count.to_be_bytes());
            out.extend_from_slice(&self.data);
            let checksum = Hasher::digest(&out);
            out.extend_from_slice(checksum.as_bytes());
            out
        }
    }

    #[test]
    fn single_blob() {
        let mut s = storage();
        let mut pack = PackBuilder::new();
        pack.plain(ObjectType::Blob, b"Hello, packfile!");
        let summary = parse_pack(&mut s, &pack.finish(), &AbortSignal::new()).unwrap();

        assert!(summary.checksum_ok);
        assert_eq!(summary.objects.len(), 1);
        let oid = summary.objects[0].oid;
        let (kind, payload) = store::read_object(&s, &oid).unwrap();
        assert_eq!(kind, ObjectType::Blob);
        assert_eq!(payload, b"Hello, packfile!");
    }

    #[test]
    fn ofs_delta_resolves_against_in_pack_base() {
        let mut s = storage();
        let base = b"the base object content for delta resolution tests";
        let target = b"the MODIFIED object content for delta resolution tests";

        let mut pack = PackBuilder::new();
        let base_offset = pack.plain(ObjectType::Blob, base);
        pack.ofs_delta(base_offset, &compute_delta(base, target));

        let summary = parse_pack(&mut s, &pack.finish(), &AbortSignal::new()).unwrap();
        assert_eq!(summary.objects.len(), 2);

        let expected = Hasher::hash_object("blob", target);
        let (kind, payload) = store::read_object(&s, &expected).unwrap();
        assert_eq!(kind, ObjectType::Blob);
        assert_eq!(payload, target);
    }

    #[test]
    fn ref_delta_resolves_against_store_object() {
        let mut s = storage();
        let base = b"already present in the destination object store";
        let base_oid = store::write_object(&mut s, ObjectType::Blob, base).unwrap();
        let target = b"already present in the destination object store, amended";

        let mut pack = PackBuilder::new();
        pack.ref_delta(&base_oid, &compute_delta(base, target));

        parse_pack(&mut s, &pack.finish(), &AbortSignal::new()).unwrap();
        let expected = Hasher::hash_object("blob", target);
        assert_eq!(store::read_object(&s, &expected).unwrap().1, target);
    }

    #[test]
    fn ref_delta_resolves_against_later_in_pack_base() {
        // The delta appears before its base; a second resolution pass
        // succeeds after the base entry has been materialized.
        let mut s = storage();
        let base = b"chunky base payload appearing after the delta entry!";
        let target = b"chunky TARGET payload appearing after the delta entry!";
        let base_oid = Hasher::hash_object("blob", base);

        let mut pack = PackBuilder::new();
        pack.ref_delta(&base_oid, &compute_delta(base, target));
        pack.plain(ObjectType::Blob, base);

        let summary = parse_pack(&mut s, &pack.finish(), &AbortSignal::new()).unwrap();
        assert_eq!(summary.objects.len(), 2);
        let expected = Hasher::hash_object("blob", target);
        assert_eq!(store::read_object(&s, &expected).unwrap().1, target);
    }

    #[test]
    fn unresolvable_delta_fails() {
        let mut s = storage();
        let missing = Hasher::hash_object("blob", b"never stored anywhere");

        let mut pack = PackBuilder::new();
        pack.ref_delta(&missing, &compute_delta(b"never stored anywhere", b"target"));

        assert!(matches!(
            parse_pack(&mut s, &pack.finish(), &AbortSignal::new()),
            Err(PackError::UnresolvedDelta { .. })
        ));
    }

    #[test]
    fn checksum_mismatch_is_tolerated() {
        let mut s = storage();
        let mut pack = PackBuilder::new();
        pack.plain(ObjectType::Blob, b"content");
        let mut bytes = pack.finish();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let summary = parse_pack(&mut s, &bytes, &AbortSignal::new()).unwrap();
        assert!(!summary.checksum_ok);
        assert_eq!(summary.objects.len(), 1);
    }

    #[test]
    fn bad_signature_rejected() {
        let mut s = storage();
        let err = parse_pack(&mut s, &[0u8; 40], &AbortSignal::new()).unwrap_err();
        assert!(matches!(err, PackError::InvalidHeader(_)));
    }

    #[test]
    fn wrong_version_rejected() {
        let mut s = storage();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(PACK_SIGNATURE);
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 20]);
        assert!(matches!(
            parse_pack(&mut s, &bytes, &AbortSignal::new()),
            Err(PackError::UnsupportedVersion(3))
        ));
    }

    #[test]
    fn abort_short_circuits() {
        let mut s = storage();
        let mut pack = PackBuilder::new();
        pack.plain(ObjectType::Blob, b"content");
        let signal = AbortSignal::new();
        signal.abort();
        assert!(matches!(
            parse_pack(&mut s, &pack.finish(), &signal),
            Err(PackError::Aborted)
        ));
    }

    #[test]
    fn truncated_compressed_data_rejected() {
        let mut s = storage();
        let mut pack = PackBuilder::new();
        pack.plain(ObjectType::Blob, b"some content long enough to truncate");
        let bytes = pack.finish();
        // Chop out the middle of the compressed stream.
        let truncated: Vec<u8> = bytes[..bytes.len() - 30].to_vec();
        assert!(parse_pack(&mut s, &truncated, &AbortSignal::new()).is_err());
    }
}

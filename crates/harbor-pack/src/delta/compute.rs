//! Delta computation.
//!
//! Indexes the source in fixed 16-byte chunks, then greedily scans the
//! target: a chunk hit is extended as far as it matches and becomes a COPY;
//! everything else accumulates into INSERT runs of at most 127 bytes.

use std::collections::HashMap;

use super::{encode_copy, encode_insert, write_varint, MAX_INSERT};

/// Chunk window for the source index.
const CHUNK: usize = 16;

/// Compute a delta that rebuilds `target` from `source`.
pub fn compute_delta(source: &[u8], target: &[u8]) -> Vec<u8> {
    let mut delta = Vec::new();
    delta.extend_from_slice(&write_varint(source.len() as u64));
    delta.extend_from_slice(&write_varint(target.len() as u64));

    if target.is_empty() {
        return delta;
    }

    let index = chunk_index(source);

    let mut pos = 0;
    let mut pending: Vec<u8> = Vec::new();

    while pos < target.len() {
        if target.len() - pos >= CHUNK {
            if let Some(&src_off) = index.get(&target[pos..pos + CHUNK]) {
                let len = extend_match(source, src_off, target, pos);
                flush_inserts(&mut delta, &mut pending);
                emit_copies(&mut delta, src_off, len);
                pos += len;
                continue;
            }
        }

        pending.push(target[pos]);
        pos += 1;
        if pending.len() == MAX_INSERT {
            flush_inserts(&mut delta, &mut pending);
        }
    }

    flush_inserts(&mut delta, &mut pending);
    delta
}

/// Map each non-overlapping 16-byte source chunk to its first offset.
fn chunk_index(source: &[u8]) -> HashMap<&[u8], usize> {
    let mut index = HashMap::new();
    if source.len() >= CHUNK {
        for offset in (0..=source.len() - CHUNK).step_by(CHUNK) {
            index.entry(&source[offset..offset + CHUNK]).or_insert(offset);
        }
    }
    index
}

/// Extend a chunk match as far as source and target keep agreeing.
fn extend_match(source: &[u8], src_off: usize, target: &[u8], tgt_off: usize) -> usize {
    let max = (source.len() - src_off).min(target.len() - tgt_off);
    let mut len = CHUNK;
    while len < max && source[src_off + len] == target[tgt_off + len] {
        len += 1;
    }
    len
}

fn flush_inserts(delta: &mut Vec<u8>, pending: &mut Vec<u8>) {
    for chunk in pending.chunks(MAX_INSERT) {
        delta.extend_from_slice(&encode_insert(chunk));
    }
    pending.clear();
}

/// Emit COPY instructions, splitting at the 24-bit size ceiling.
fn emit_copies(delta: &mut Vec<u8>, mut offset: usize, mut size: usize) {
    while size > 0 {
        let step = size.min(0x00ff_ffff);
        delta.extend_from_slice(&encode_copy(offset as u32, step));
        offset += step;
        size -= step;
    }
}

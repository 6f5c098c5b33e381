use super::read_varint;
use crate::PackError;

/// Apply a delta stream to a base object, producing the target bytes.
///
/// Validates that the declared source size matches the base length and that
/// the emitted output matches the declared target size; every COPY is bounds
/// checked against the base.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let (source_size, consumed) = read_varint(delta)?;
    let mut pos = consumed;
    let (target_size, consumed) = read_varint(&delta[pos..])?;
    pos += consumed;

    if source_size as usize != base.len() {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!(
                "source size mismatch: delta says {source_size}, base is {}",
                base.len()
            ),
        });
    }

    let mut out = Vec::with_capacity(target_size as usize);

    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;

        if cmd & 0x80 != 0 {
            let (offset, size, consumed) = decode_copy_operands(cmd, &delta[pos..], pos)?;
            pos += consumed;

            if offset + size > base.len() {
                return Err(PackError::InvalidDelta {
                    offset: pos,
                    reason: format!(
                        "copy out of bounds: offset={offset} size={size} base_len={}",
                        base.len()
                    ),
                });
            }
            out.extend_from_slice(&base[offset..offset + size]);
        } else if cmd != 0 {
            let n = cmd as usize;
            if pos + n > delta.len() {
                return Err(PackError::InvalidDelta {
                    offset: pos,
                    reason: "truncated insert data".into(),
                });
            }
            out.extend_from_slice(&delta[pos..pos + n]);
            pos += n;
        } else {
            return Err(PackError::InvalidDelta {
                offset: pos - 1,
                reason: "reserved delta opcode 0".into(),
            });
        }
    }

    if out.len() != target_size as usize {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!(
                "target size mismatch: delta says {target_size}, got {}",
                out.len()
            ),
        });
    }

    Ok(out)
}

/// Decode the optional operand bytes of a COPY instruction.
///
/// The low seven bits of `cmd` select which of 4 offset and 3 size bytes
/// follow, least significant first; absent bytes read as zero. A decoded
/// size of zero means 0x10000.
fn decode_copy_operands(
    cmd: u8,
    operands: &[u8],
    at: usize,
) -> Result<(usize, usize, usize), PackError> {
    let mut pos = 0;
    let mut take = |label: &str| -> Result<usize, PackError> {
        let Some(&byte) = operands.get(pos) else {
            return Err(PackError::InvalidDelta {
                offset: at + pos,
                reason: format!("truncated copy {label}"),
            });
        };
        pos += 1;
        Ok(byte as usize)
    };

    let mut offset = 0usize;
    for shift in 0..4u32 {
        if cmd & (1 << shift) != 0 {
            offset |= take("offset")? << (8 * shift);
        }
    }

    let mut size = 0usize;
    for shift in 0..3u32 {
        if cmd & (0x10 << shift) != 0 {
            size |= take("size")? << (8 * shift);
        }
    }
    if size == 0 {
        size = 0x10000;
    }

    Ok((offset, size, pos))
}

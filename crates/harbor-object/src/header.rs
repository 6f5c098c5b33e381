//! Object header codec: `"<kind> <len>\0"`.

use crate::{ObjectError, ObjectType};

/// Serialize an object header.
pub fn write_header(kind: ObjectType, payload_len: usize) -> Vec<u8> {
    format!("{} {}\0", kind.as_str(), payload_len).into_bytes()
}

/// Parse an object header from the start of `data`.
///
/// Returns `(kind, payload_len, header_len)`.
pub fn parse_header(data: &[u8]) -> Result<(ObjectType, usize, usize), ObjectError> {
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ObjectError::CorruptObject("missing NUL in object header".into()))?;
    let header = &data[..nul];

    let space = header
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ObjectError::CorruptObject("missing space in object header".into()))?;

    let kind = ObjectType::from_bytes(&header[..space])?;

    let len_str = std::str::from_utf8(&header[space + 1..])
        .map_err(|_| ObjectError::CorruptObject("non-ASCII length in object header".into()))?;
    let payload_len: usize = len_str
        .parse()
        .map_err(|_| ObjectError::CorruptObject(format!("bad length in object header: {len_str:?}")))?;

    Ok((kind, payload_len, nul + 1))
}

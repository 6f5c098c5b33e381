//! Pack writing.
//!
//! The writer emits every object as a full entry (no delta search), which
//! keeps its output a deterministic function of the input OID list.

use harbor_hash::{Hasher, Oid};
use harbor_object::{store, zlib};
use harbor_storage::Storage;

use crate::entry::{encode_entry_header, type_code};
use crate::{PackError, PACK_SIGNATURE, PACK_VERSION};

/// Build a pack stream containing the given objects, in order.
pub fn write_pack<S: Storage>(storage: &S, oids: &[Oid]) -> Result<Vec<u8>, PackError> {
    let mut out = Vec::new();
    out.extend_from_slice(PACK_SIGNATURE);
    out.extend_from_slice(&PACK_VERSION.to_be_bytes());
    out.extend_from_slice(&(oids.len() as u32).to_be_bytes());

    for oid in oids {
        let (kind, payload) = store::read_object(storage, oid)?;
        out.extend_from_slice(&encode_entry_header(type_code(kind), payload.len() as u64));
        out.extend_from_slice(&zlib::compress(&payload));
    }

    let checksum = Hasher::digest(&out);
    out.extend_from_slice(checksum.as_bytes());
    Ok(out)
}

//! Loose object storage over the [`Storage`] trait.
//!
//! Write: build `"<kind> <len>\0" ++ payload`, hash it, zlib-compress the
//! whole, and store at `objects/<xx>/<38>` iff absent (content-addressed
//! idempotency). Read: inflate, split the header, return the payload.

use harbor_hash::{Hasher, Oid};
use harbor_storage::Storage;

use crate::{header, zlib, Object, ObjectError, ObjectType};

fn object_path(oid: &Oid) -> String {
    format!(".git/objects/{}", oid.loose_path())
}

/// Write an object; returns its OID. A no-op if the object already exists.
pub fn write_object<S: Storage>(
    storage: &mut S,
    kind: ObjectType,
    payload: &[u8],
) -> Result<Oid, ObjectError> {
    let hdr = header::write_header(kind, payload.len());
    let mut full = Vec::with_capacity(hdr.len() + payload.len());
    full.extend_from_slice(&hdr);
    full.extend_from_slice(payload);

    let oid = Hasher::digest(&full);
    let path = object_path(&oid);
    if !storage.exists(&path)? {
        storage.write_file(&path, &zlib::compress(&full))?;
    }
    Ok(oid)
}

/// Read an object's kind and payload.
pub fn read_object<S: Storage>(storage: &S, oid: &Oid) -> Result<(ObjectType, Vec<u8>), ObjectError> {
    let path = object_path(oid);
    let compressed = storage.read_file(&path).map_err(|e| {
        if e.is_not_found() {
            ObjectError::ObjectNotFound(oid.to_hex())
        } else {
            ObjectError::Storage(e)
        }
    })?;

    let full = zlib::decompress(&compressed)
        .map_err(|e| ObjectError::CorruptObject(format!("object {oid}: {e}")))?;

    let (kind, payload_len, header_len) = header::parse_header(&full)?;
    let payload = &full[header_len..];
    if payload.len() != payload_len {
        return Err(ObjectError::Truncated {
            expected: payload_len,
            actual: payload.len(),
        });
    }
    Ok((kind, payload.to_vec()))
}

/// Read an object by OID given as hex; rejects malformed OIDs up front.
pub fn read_object_hex<S: Storage>(
    storage: &S,
    hex: &str,
) -> Result<(ObjectType, Vec<u8>), ObjectError> {
    let oid = Oid::from_hex(hex).map_err(|_| ObjectError::ObjectNotFound(hex.to_string()))?;
    read_object(storage, &oid)
}

/// Whether an object is present.
pub fn has_object<S: Storage>(storage: &S, oid: &Oid) -> Result<bool, ObjectError> {
    Ok(storage.exists(&object_path(oid))?)
}

/// Read and parse an object into its typed form.
pub fn read_parsed<S: Storage>(storage: &S, oid: &Oid) -> Result<Object, ObjectError> {
    let (kind, payload) = read_object(storage, oid)?;
    Object::parse(kind, &payload)
}

/// Read an object that must be a tree.
pub fn read_tree<S: Storage>(storage: &S, oid: &Oid) -> Result<crate::Tree, ObjectError> {
    let (kind, payload) = read_object(storage, oid)?;
    if kind != ObjectType::Tree {
        return Err(ObjectError::CorruptObject(format!(
            "expected tree, found {kind} at {oid}"
        )));
    }
    crate::Tree::parse(&payload)
}

/// Flatten a tree into `(path, mode, oid)` leaves, depth first, with paths
/// joined by `/`. Subtree entries themselves are not listed.
pub fn flatten_tree<S: Storage>(
    storage: &S,
    oid: &Oid,
) -> Result<Vec<(bstr::BString, crate::FileMode, Oid)>, ObjectError> {
    let mut out = Vec::new();
    flatten_into(storage, oid, b"", &mut out)?;
    Ok(out)
}

fn flatten_into<S: Storage>(
    storage: &S,
    oid: &Oid,
    prefix: &[u8],
    out: &mut Vec<(bstr::BString, crate::FileMode, Oid)>,
) -> Result<(), ObjectError> {
    let tree = read_tree(storage, oid)?;
    for entry in &tree.entries {
        let mut path = bstr::BString::from(prefix);
        if !path.is_empty() {
            path.push(b'/');
        }
        path.extend_from_slice(&entry.name);
        if entry.mode.is_tree() {
            flatten_into(storage, &entry.oid, &path, out)?;
        } else {
            out.push((path, entry.mode, entry.oid));
        }
    }
    Ok(())
}

/// Write a typed object; returns its OID.
pub fn write_parsed<S: Storage>(storage: &mut S, object: &Object) -> Result<Oid, ObjectError> {
    write_object(storage, object.object_type(), &object.serialize())
}

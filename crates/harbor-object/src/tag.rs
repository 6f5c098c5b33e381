use bstr::{BStr, BString, ByteSlice};
use harbor_hash::Oid;

use crate::{ObjectError, ObjectType, Signature};

/// An annotated tag object referencing another object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// The tagged object.
    pub object: Oid,
    /// Type of the tagged object.
    pub target_type: ObjectType,
    /// Tag name (e.g. `v1.0`).
    pub name: BString,
    /// Optional tagger identity.
    pub tagger: Option<Signature>,
    pub message: BString,
}

impl Tag {
    /// Parse tag payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut object: Option<Oid> = None;
        let mut target_type: Option<ObjectType> = None;
        let mut name: Option<BString> = None;
        let mut tagger: Option<Signature> = None;

        let mut pos = 0;
        while pos < payload.len() {
            if payload[pos] == b'\n' {
                pos += 1;
                break;
            }
            let line_end = payload[pos..]
                .find_byte(b'\n')
                .map(|p| p + pos)
                .unwrap_or(payload.len());
            let line = &payload[pos..line_end];
            pos = line_end + 1;

            let Some(space) = line.find_byte(b' ') else {
                continue;
            };
            let (key, value) = (&line[..space], &line[space + 1..]);
            match key {
                b"object" => {
                    let hex = std::str::from_utf8(value)
                        .map_err(|_| ObjectError::CorruptObject("non-UTF8 object OID".into()))?;
                    object = Some(Oid::from_hex(hex)?);
                }
                b"type" => target_type = Some(ObjectType::from_bytes(value)?),
                b"tag" => name = Some(BString::from(value)),
                b"tagger" => tagger = Some(Signature::parse(BStr::new(value))?),
                _ => {}
            }
        }

        Ok(Self {
            object: object.ok_or(ObjectError::MissingField {
                kind: "tag",
                field: "object",
            })?,
            target_type: target_type.ok_or(ObjectError::MissingField {
                kind: "tag",
                field: "type",
            })?,
            name: name.ok_or(ObjectError::MissingField {
                kind: "tag",
                field: "tag",
            })?,
            tagger,
            message: BString::from(&payload[pos.min(payload.len())..]),
        })
    }

    /// Serialize to payload bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"object ");
        out.extend_from_slice(self.object.to_hex().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"type ");
        out.extend_from_slice(self.target_type.as_str().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"tag ");
        out.extend_from_slice(&self.name);
        out.push(b'\n');
        if let Some(ref tagger) = self.tagger {
            out.extend_from_slice(b"tagger ");
            out.extend_from_slice(&tagger.to_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }
}

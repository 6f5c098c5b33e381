use bstr::{BStr, BString, ByteSlice};
use harbor_hash::Oid;

use crate::{ObjectError, Signature};

/// A commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// OID of the root tree.
    pub tree: Oid,
    /// Parent commit OIDs (empty for a root commit).
    pub parents: Vec<Oid>,
    pub author: Signature,
    pub committer: Signature,
    /// Unrecognized headers, preserved for round-trip.
    pub extra_headers: Vec<(BString, BString)>,
    /// Everything after the blank line.
    pub message: BString,
}

impl Commit {
    /// Parse commit payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut tree: Option<Oid> = None;
        let mut parents = Vec::new();
        let mut author: Option<Signature> = None;
        let mut committer: Option<Signature> = None;
        let mut extra_headers: Vec<(BString, BString)> = Vec::new();

        let mut pos = 0;
        while pos < payload.len() {
            // A blank line separates headers from the message.
            if payload[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = payload[pos..]
                .find_byte(b'\n')
                .map(|p| p + pos)
                .unwrap_or(payload.len());
            let line = &payload[pos..line_end];

            let space = line.find_byte(b' ').unwrap_or(line.len());
            let (key, value) = (&line[..space], line.get(space + 1..).unwrap_or(b""));

            match key {
                b"tree" => tree = Some(parse_oid_value(value, "tree")?),
                b"parent" => parents.push(parse_oid_value(value, "parent")?),
                b"author" => author = Some(Signature::parse(BStr::new(value))?),
                b"committer" => committer = Some(Signature::parse(BStr::new(value))?),
                _ => {
                    // Multi-line headers continue with a leading space.
                    let mut val = Vec::from(value);
                    let mut next = line_end + 1;
                    while next < payload.len() && payload[next] == b' ' {
                        let cont_end = payload[next..]
                            .find_byte(b'\n')
                            .map(|p| p + next)
                            .unwrap_or(payload.len());
                        val.push(b'\n');
                        val.extend_from_slice(&payload[next + 1..cont_end]);
                        next = cont_end + 1;
                    }
                    extra_headers.push((BString::from(key), BString::from(val)));
                    pos = next;
                    continue;
                }
            }

            pos = line_end + 1;
        }

        let tree = tree.ok_or(ObjectError::MissingField {
            kind: "commit",
            field: "tree",
        })?;
        let author = author.ok_or(ObjectError::MissingField {
            kind: "commit",
            field: "author",
        })?;
        let committer = committer.ok_or(ObjectError::MissingField {
            kind: "commit",
            field: "committer",
        })?;

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            extra_headers,
            message: BString::from(&payload[pos.min(payload.len())..]),
        })
    }

    /// Serialize to payload bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(b"tree ");
        out.extend_from_slice(self.tree.to_hex().as_bytes());
        out.push(b'\n');

        for parent in &self.parents {
            out.extend_from_slice(b"parent ");
            out.extend_from_slice(parent.to_hex().as_bytes());
            out.push(b'\n');
        }

        out.extend_from_slice(b"author ");
        out.extend_from_slice(&self.author.to_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"committer ");
        out.extend_from_slice(&self.committer.to_bytes());
        out.push(b'\n');

        for (key, val) in &self.extra_headers {
            out.extend_from_slice(key);
            out.push(b' ');
            for (i, line) in val.split(|&b| b == b'\n').enumerate() {
                if i > 0 {
                    out.extend_from_slice(b"\n ");
                }
                out.extend_from_slice(line);
            }
            out.push(b'\n');
        }

        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    pub fn first_parent(&self) -> Option<&Oid> {
        self.parents.first()
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// The first line of the message.
    pub fn summary(&self) -> &BStr {
        match self.message.find_byte(b'\n') {
            Some(pos) => BStr::new(&self.message[..pos]),
            None => self.message.as_bstr(),
        }
    }
}

fn parse_oid_value(value: &[u8], field: &'static str) -> Result<Oid, ObjectError> {
    let hex = std::str::from_utf8(value)
        .map_err(|_| ObjectError::CorruptObject(format!("non-UTF8 {field} OID")))?;
    Oid::from_hex(hex).map_err(ObjectError::Hash)
}

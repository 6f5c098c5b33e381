//! The `git-upload-pack` service: serve a pack for a want/have request.

use std::collections::HashSet;

use harbor_hash::Oid;
use harbor_repo::history;
use harbor_storage::{AbortSignal, Storage};

use crate::pktline::{Pkt, PktReader, PktWriter};
use crate::sideband::{write_band, Band};
use crate::WireError;

/// Parsed upload-pack request: wants, haves, and the `done` terminator.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub wants: Vec<Oid>,
    pub haves: Vec<Oid>,
    pub done: bool,
}

/// Parse the request body: pkt-lines of `want <oid>[ <caps>]`, `have <oid>`,
/// and `done`, with flushes separating the sections.
pub fn parse_request(body: &[u8], abort: &AbortSignal) -> Result<UploadRequest, WireError> {
    let mut request = UploadRequest::default();
    let mut reader = PktReader::new(body);

    loop {
        if abort.is_aborted() {
            return Err(WireError::Aborted);
        }
        let line = match reader.read_pkt()? {
            Pkt::Data(payload) => payload,
            Pkt::Flush => continue,
            Pkt::End => break,
        };
        let line = trim_newline(line);

        if let Some(rest) = line.strip_prefix(b"want ") {
            request.wants.push(parse_oid_prefix(rest)?);
        } else if let Some(rest) = line.strip_prefix(b"have ") {
            request.haves.push(parse_oid_prefix(rest)?);
        } else if line == b"done" {
            request.done = true;
            break;
        } else if !line.is_empty() {
            return Err(WireError::Protocol(format!(
                "unexpected upload-pack line: {}",
                String::from_utf8_lossy(line)
            )));
        }
    }

    Ok(request)
}

/// Handle a complete upload-pack request body, producing the response body:
/// `NAK`, then the pack wrapped in side-band channel 1, then a flush.
pub fn upload_pack<S: Storage>(
    storage: &mut S,
    body: &[u8],
    abort: &AbortSignal,
) -> Result<Vec<u8>, WireError> {
    let request = parse_request(body, abort)?;
    if request.wants.is_empty() {
        return Err(WireError::Protocol("no wants in upload-pack request".into()));
    }

    let haves: HashSet<Oid> = request.haves.iter().copied().collect();
    let closure = history::collect_closure(storage, &request.wants, &haves)?;
    tracing::debug!(
        wants = request.wants.len(),
        haves = haves.len(),
        objects = closure.len(),
        "serving upload-pack"
    );

    if abort.is_aborted() {
        return Err(WireError::Aborted);
    }
    let pack = harbor_pack::write_pack(storage, &closure)?;

    let mut writer = PktWriter::new();
    writer.write_text("NAK")?;
    write_band(&mut writer, Band::Data, &pack)?;
    writer.write_flush();
    Ok(writer.into_bytes())
}

fn trim_newline(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\n') => &line[..line.len() - 1],
        _ => line,
    }
}

/// Parse the leading 40-hex OID, ignoring capability text after it.
fn parse_oid_prefix(data: &[u8]) -> Result<Oid, WireError> {
    if data.len() < 40 {
        return Err(WireError::Protocol(format!(
            "truncated OID: {}",
            String::from_utf8_lossy(data)
        )));
    }
    let hex = std::str::from_utf8(&data[..40])
        .map_err(|_| WireError::Protocol("non-ASCII OID".into()))?;
    Oid::from_hex(hex).map_err(|e| WireError::Protocol(format!("bad OID {hex:?}: {e}")))
}

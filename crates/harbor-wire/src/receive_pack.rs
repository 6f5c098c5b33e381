//! The `git-receive-pack` service: ingest a pack and apply ref updates.

use harbor_hash::Oid;
use harbor_storage::{AbortSignal, Storage};

use crate::pktline::{Pkt, PktReader, PktWriter};
use crate::WireError;

/// One ref update command from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefCommand {
    pub old: Oid,
    pub new: Oid,
    pub name: String,
}

impl RefCommand {
    /// An all-zeros new OID deletes the ref.
    pub fn is_delete(&self) -> bool {
        self.new.is_zero()
    }
}

/// Parse the command section. Returns the commands and the raw pack bytes
/// that follow the flush.
pub fn parse_request<'a>(
    body: &'a [u8],
    abort: &AbortSignal,
) -> Result<(Vec<RefCommand>, &'a [u8]), WireError> {
    let mut reader = PktReader::new(body);
    let mut commands = Vec::new();

    loop {
        if abort.is_aborted() {
            return Err(WireError::Aborted);
        }
        match reader.read_pkt()? {
            Pkt::Flush | Pkt::End => break,
            Pkt::Data(payload) => commands.push(parse_command(payload)?),
        }
    }

    Ok((commands, reader.remainder()))
}

/// Parse `<old-oid> <new-oid> <ref>[\0<caps>]`.
fn parse_command(line: &[u8]) -> Result<RefCommand, WireError> {
    let line = match line.iter().position(|&b| b == 0) {
        Some(nul) => &line[..nul],
        None => line,
    };
    let line = match line.last() {
        Some(b'\n') => &line[..line.len() - 1],
        _ => line,
    };

    let text = std::str::from_utf8(line)
        .map_err(|_| WireError::Protocol("non-UTF8 ref-update command".into()))?;
    let mut parts = text.splitn(3, ' ');
    let (Some(old), Some(new), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(WireError::Protocol(format!(
            "malformed ref-update command: {text:?}"
        )));
    };
    if name.is_empty() {
        return Err(WireError::Protocol("empty ref name in command".into()));
    }

    Ok(RefCommand {
        old: Oid::from_hex(old)
            .map_err(|e| WireError::Protocol(format!("bad old OID {old:?}: {e}")))?,
        new: Oid::from_hex(new)
            .map_err(|e| WireError::Protocol(format!("bad new OID {new:?}: {e}")))?,
        name: name.to_string(),
    })
}

/// Handle a complete receive-pack request body.
///
/// The pack is fully parsed and materialized before any ref is touched, so
/// a failed pack leaves every ref unchanged. The response reports
/// `unpack ok` followed by one `ok <ref>` per command.
pub fn receive_pack<S: Storage>(
    storage: &mut S,
    body: &[u8],
    abort: &AbortSignal,
) -> Result<Vec<u8>, WireError> {
    let (commands, pack) = parse_request(body, abort)?;

    if !pack.is_empty() {
        let summary = harbor_pack::parse_pack(storage, pack, abort)?;
        tracing::debug!(
            objects = summary.objects.len(),
            checksum_ok = summary.checksum_ok,
            "pack ingested"
        );
    }

    if abort.is_aborted() {
        return Err(WireError::Aborted);
    }

    for command in &commands {
        if command.is_delete() {
            match harbor_ref::delete_ref(storage, &command.name) {
                Ok(()) | Err(harbor_ref::RefError::RefNotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
            tracing::debug!(name = %command.name, "ref deleted");
        } else {
            harbor_ref::write_ref(storage, &command.name, &command.new)?;
            tracing::debug!(name = %command.name, oid = %command.new, "ref updated");
        }
    }

    let mut writer = PktWriter::new();
    writer.write_text("unpack ok")?;
    for command in &commands {
        writer.write_text(&format!("ok {}", command.name))?;
    }
    writer.write_flush();
    Ok(writer.into_bytes())
}

//! Service advertisement (`GET /<repo>/info/refs?service=...`).

use harbor_hash::Oid;
use harbor_ref::Head;
use harbor_storage::Storage;

use crate::pktline::PktWriter;
use crate::{Service, WireError};

/// Build the advertisement body:
///
/// 1. `# service=<svc>\n` packet, then a flush.
/// 2. The first ref line carries capabilities after a NUL (HEAD preferred);
///    an empty repository under receive-pack advertises the null OID with
///    `capabilities^{}` so a client can create the first ref.
/// 3. Remaining refs, one per line, then a flush.
pub fn advertise_refs<S: Storage>(storage: &S, service: Service) -> Result<Vec<u8>, WireError> {
    let mut writer = PktWriter::new();
    writer.write_text(&format!("# service={}\n", service.as_str()))?;
    writer.write_flush();

    let mut refs: Vec<(String, Oid)> = Vec::new();
    if let Ok(Some(head)) = harbor_ref::resolve_head(storage) {
        refs.push(("HEAD".to_string(), head));
    }
    refs.extend(harbor_ref::list_refs(storage)?);

    if refs.is_empty() {
        if service == Service::ReceivePack {
            writer.write_text(&format!(
                "{} capabilities^{{}}\0{}",
                Oid::ZERO,
                service.capabilities()
            ))?;
        }
        writer.write_flush();
        return Ok(writer.into_bytes());
    }

    for (i, (name, oid)) in refs.iter().enumerate() {
        if i == 0 {
            writer.write_text(&format!("{oid} {name}\0{}", service.capabilities()))?;
        } else {
            writer.write_text(&format!("{oid} {name}"))?;
        }
    }
    writer.write_flush();
    Ok(writer.into_bytes())
}

/// Content of the dumb `GET /<repo>/HEAD` endpoint.
///
/// Falls back to the default branch pointer for repositories that have no
/// HEAD file yet.
pub fn head_content<S: Storage>(storage: &S) -> Result<Vec<u8>, WireError> {
    match harbor_ref::read_head(storage) {
        Ok(head) => Ok(head.to_bytes()),
        Err(harbor_ref::RefError::RefNotFound(_)) => {
            Ok(Head::Symbolic("refs/heads/main".into()).to_bytes())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pktline::{Pkt, PktReader};
    use harbor_storage::{MemoryStorage, Storage as _};

    fn oid(n: u8) -> Oid {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Oid::from_bytes(&bytes).unwrap()
    }

    fn storage() -> MemoryStorage {
        let mut s = MemoryStorage::new();
        s.init("repo").unwrap();
        s
    }

    fn lines(bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut reader = PktReader::new(bytes);
        let mut out = Vec::new();
        loop {
            match reader.read_pkt().unwrap() {
                Pkt::Data(payload) => out.push(payload.to_vec()),
                Pkt::Flush => out.push(b"<flush>".to_vec()),
                Pkt::End => return out,
            }
        }
    }

    #[test]
    fn advertisement_structure() {
        let mut s = storage();
        harbor_ref::write_head(&mut s, &Head::Symbolic("refs/heads/main".into())).unwrap();
        harbor_ref::write_ref(&mut s, "refs/heads/main", &oid(1)).unwrap();
        harbor_ref::write_ref(&mut s, "refs/tags/v1", &oid(2)).unwrap();

        let body = advertise_refs(&s, Service::UploadPack).unwrap();
        let lines = lines(&body);

        assert_eq!(lines[0], b"# service=git-upload-pack\n");
        assert_eq!(lines[1], b"<flush>");
        // HEAD first, with capabilities after NUL.
        assert!(lines[2].starts_with(format!("{} HEAD\0", oid(1)).as_bytes()));
        assert!(String::from_utf8_lossy(&lines[2]).contains("side-band-64k"));
        assert_eq!(lines[3], format!("{} refs/heads/main\n", oid(1)).into_bytes());
        assert_eq!(lines[4], format!("{} refs/tags/v1\n", oid(2)).into_bytes());
        assert_eq!(lines[5], b"<flush>");
    }

    #[test]
    fn empty_repo_receive_pack_advertises_null_capabilities() {
        let mut s = storage();
        harbor_ref::write_head(&mut s, &Head::Symbolic("refs/heads/main".into())).unwrap();

        let body = advertise_refs(&s, Service::ReceivePack).unwrap();
        let lines = lines(&body);
        let cap_line = String::from_utf8_lossy(&lines[2]);
        assert!(cap_line.starts_with(&format!("{} capabilities^{{}}", Oid::ZERO)));
        assert!(cap_line.contains("report-status"));
        assert!(cap_line.contains("delete-refs"));
    }

    #[test]
    fn empty_repo_upload_pack_advertises_nothing() {
        let mut s = storage();
        harbor_ref::write_head(&mut s, &Head::Symbolic("refs/heads/main".into())).unwrap();

        let body = advertise_refs(&s, Service::UploadPack).unwrap();
        let lines = lines(&body);
        assert_eq!(lines.len(), 3); // service header, flush, flush
    }

    #[test]
    fn head_content_symbolic_and_fallback() {
        let mut s = storage();
        assert_eq!(head_content(&s).unwrap(), b"ref: refs/heads/main\n");

        harbor_ref::write_head(&mut s, &Head::Symbolic("refs/heads/dev".into())).unwrap();
        assert_eq!(head_content(&s).unwrap(), b"ref: refs/heads/dev\n");

        harbor_ref::write_head(&mut s, &Head::Detached(oid(9))).unwrap();
        assert_eq!(head_content(&s).unwrap(), format!("{}\n", oid(9)).into_bytes());
    }
}

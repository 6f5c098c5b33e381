//! Side-band-64k multiplexing.
//!
//! Each payload packet leads with a channel byte: 1 carries pack data,
//! 2 progress text, 3 a fatal error message.

use crate::pktline::{Pkt, PktReader, PktWriter, MAX_PKT_DATA_LEN};
use crate::WireError;

/// Side-band channel identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Data = 1,
    Progress = 2,
    Error = 3,
}

/// Largest chunk that fits one side-band packet after the channel byte.
pub const MAX_SIDEBAND_CHUNK: usize = MAX_PKT_DATA_LEN - 1;

/// Write `data` as a sequence of band-tagged packets.
pub fn write_band(writer: &mut PktWriter, band: Band, data: &[u8]) -> Result<(), WireError> {
    for chunk in data.chunks(MAX_SIDEBAND_CHUNK) {
        let mut pkt = Vec::with_capacity(1 + chunk.len());
        pkt.push(band as u8);
        pkt.extend_from_slice(chunk);
        writer.write_pkt(&pkt)?;
    }
    Ok(())
}

/// Demultiplex a side-band stream, concatenating band-1 data.
///
/// Progress messages are handed to `on_progress`; a band-3 message aborts
/// with the server's error text.
pub fn read_band_data(
    reader: &mut PktReader<'_>,
    mut on_progress: impl FnMut(&[u8]),
) -> Result<Vec<u8>, WireError> {
    let mut data = Vec::new();
    loop {
        match reader.read_pkt()? {
            Pkt::Flush | Pkt::End => return Ok(data),
            Pkt::Data(payload) => {
                let Some((&band, rest)) = payload.split_first() else {
                    return Ok(data);
                };
                match band {
                    1 => data.extend_from_slice(rest),
                    2 => on_progress(rest),
                    3 => {
                        return Err(WireError::Protocol(format!(
                            "remote error: {}",
                            String::from_utf8_lossy(rest)
                        )))
                    }
                    other => {
                        return Err(WireError::Protocol(format!(
                            "unknown side-band channel {other}"
                        )))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demux(bytes: &[u8]) -> Result<(Vec<u8>, Vec<Vec<u8>>), WireError> {
        let mut progress = Vec::new();
        let mut reader = PktReader::new(bytes);
        let data = read_band_data(&mut reader, |msg| progress.push(msg.to_vec()))?;
        Ok((data, progress))
    }

    #[test]
    fn data_band_roundtrip() {
        let mut w = PktWriter::new();
        write_band(&mut w, Band::Data, b"pack bytes").unwrap();
        w.write_flush();

        let (data, progress) = demux(&w.into_bytes()).unwrap();
        assert_eq!(data, b"pack bytes");
        assert!(progress.is_empty());
    }

    #[test]
    fn large_payload_splits_into_chunks() {
        let payload = vec![0x42u8; MAX_SIDEBAND_CHUNK * 2 + 10];
        let mut w = PktWriter::new();
        write_band(&mut w, Band::Data, &payload).unwrap();
        w.write_flush();

        let (data, _) = demux(&w.into_bytes()).unwrap();
        assert_eq!(data, payload);
    }

    #[test]
    fn progress_is_dispatched_not_collected() {
        let mut w = PktWriter::new();
        write_band(&mut w, Band::Progress, b"Counting objects: 3\n").unwrap();
        write_band(&mut w, Band::Data, b"real data").unwrap();
        w.write_flush();

        let (data, progress) = demux(&w.into_bytes()).unwrap();
        assert_eq!(data, b"real data");
        assert_eq!(progress, [b"Counting objects: 3\n".to_vec()]);
    }

    #[test]
    fn error_band_fails() {
        let mut w = PktWriter::new();
        write_band(&mut w, Band::Error, b"repository exploded").unwrap();
        w.write_flush();

        let err = demux(&w.into_bytes()).unwrap_err();
        assert!(err.to_string().contains("repository exploded"));
    }

    #[test]
    fn unknown_band_rejected() {
        let mut w = PktWriter::new();
        w.write_pkt(&[9u8, b'x']).unwrap();
        w.write_flush();
        assert!(demux(&w.into_bytes()).is_err());
    }
}

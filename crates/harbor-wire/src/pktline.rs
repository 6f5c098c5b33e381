//! Pkt-line framing.
//!
//! Every packet is `XXXX<payload>` where `XXXX` is the lowercase-hex length
//! of the whole packet, payload included. `0000` is the flush packet that
//! ends a stream section. Smart-HTTP bodies are finite buffers, so both the
//! reader and writer work over byte slices rather than streams.

use crate::WireError;

/// Maximum whole-packet length.
pub const MAX_PKT_LEN: usize = 65520;

/// Maximum payload per packet (the 4-byte length header is part of the cap).
pub const MAX_PKT_DATA_LEN: usize = MAX_PKT_LEN - 4;

/// One parsed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pkt<'a> {
    /// A data packet's payload.
    Data(&'a [u8]),
    /// The `0000` flush packet.
    Flush,
    /// The input buffer is exhausted.
    End,
}

/// Cursor-based pkt-line reader over a request body.
#[derive(Debug)]
pub struct PktReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PktReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed (e.g. the raw pack after the command section).
    pub fn remainder(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Read the next packet.
    pub fn read_pkt(&mut self) -> Result<Pkt<'a>, WireError> {
        if self.pos == self.data.len() {
            return Ok(Pkt::End);
        }
        if self.pos + 4 > self.data.len() {
            return Err(WireError::Protocol(
                "truncated pkt-line length header".into(),
            ));
        }

        let header = &self.data[self.pos..self.pos + 4];
        let header_str = std::str::from_utf8(header)
            .map_err(|_| WireError::Protocol(format!("non-ASCII pkt-line length: {header:?}")))?;
        let len = usize::from_str_radix(header_str, 16)
            .map_err(|_| WireError::Protocol(format!("bad pkt-line length: {header_str:?}")))?;

        if len == 0 {
            self.pos += 4;
            return Ok(Pkt::Flush);
        }
        if len < 4 {
            return Err(WireError::Protocol(format!(
                "pkt-line length {len} is reserved"
            )));
        }
        if len > MAX_PKT_LEN {
            return Err(WireError::Protocol(format!(
                "pkt-line length {len} exceeds the maximum"
            )));
        }
        if self.pos + len > self.data.len() {
            return Err(WireError::Protocol("truncated pkt-line payload".into()));
        }

        let payload = &self.data[self.pos + 4..self.pos + len];
        self.pos += len;
        Ok(Pkt::Data(payload))
    }

    /// Read data packets until a flush (or the end of input).
    pub fn read_until_flush(&mut self) -> Result<Vec<&'a [u8]>, WireError> {
        let mut lines = Vec::new();
        loop {
            match self.read_pkt()? {
                Pkt::Data(payload) => lines.push(payload),
                Pkt::Flush | Pkt::End => return Ok(lines),
            }
        }
    }
}

/// Pkt-line writer accumulating into a buffer.
#[derive(Debug, Default)]
pub struct PktWriter {
    buf: Vec<u8>,
}

impl PktWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame a data packet.
    pub fn write_pkt(&mut self, payload: &[u8]) -> Result<(), WireError> {
        if payload.len() > MAX_PKT_DATA_LEN {
            return Err(WireError::Protocol(format!(
                "payload of {} bytes exceeds pkt-line maximum",
                payload.len()
            )));
        }
        let len = payload.len() + 4;
        self.buf
            .extend_from_slice(format!("{len:04x}").as_bytes());
        self.buf.extend_from_slice(payload);
        Ok(())
    }

    /// Frame a text line, appending `\n` if absent.
    pub fn write_text(&mut self, text: &str) -> Result<(), WireError> {
        if text.ends_with('\n') {
            self.write_pkt(text.as_bytes())
        } else {
            let mut line = Vec::with_capacity(text.len() + 1);
            line.extend_from_slice(text.as_bytes());
            line.push(b'\n');
            self.write_pkt(&line)
        }
    }

    /// Emit the `0000` flush packet.
    pub fn write_flush(&mut self) {
        self.buf.extend_from_slice(b"0000");
    }

    /// Append raw, unframed bytes.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

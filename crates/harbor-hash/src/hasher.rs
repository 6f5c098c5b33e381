use sha1::{Digest, Sha1};

use crate::Oid;

/// Streaming SHA-1 computation.
///
/// Data can be fed incrementally with [`update`](Hasher::update) or through
/// the [`std::io::Write`] implementation (the pack writer checksums while it
/// streams), then finalized into an [`Oid`].
#[derive(Default)]
pub struct Hasher {
    inner: Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the Oid.
    pub fn finalize(self) -> Oid {
        let digest = self.inner.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        Oid::from_bytes(&bytes).expect("SHA-1 digest is 20 bytes")
    }

    /// Hash data in one call.
    pub fn digest(data: &[u8]) -> Oid {
        let mut h = Self::new();
        h.update(data);
        h.finalize()
    }

    /// Hash a git object: `"<kind> <len>\0<payload>"`.
    pub fn hash_object(kind: &str, payload: &[u8]) -> Oid {
        let mut h = Self::new();
        h.update(kind.as_bytes());
        h.update(b" ");
        h.update(payload.len().to_string().as_bytes());
        h.update(b"\0");
        h.update(payload);
        h.finalize()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

use bstr::{BStr, BString, ByteSlice};

use crate::ObjectError;

/// An author or committer identity with its timestamp.
///
/// Serialized as `Name <email> <unix-seconds> <tz>` where `<tz>` is the
/// zone offset exactly as written (e.g. `+0000`, `-0530`). The offset is
/// kept as raw bytes so foreign commits round-trip byte-exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Zone offset text, e.g. `+0000`.
    pub tz: BString,
}

impl Signature {
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            timestamp,
            tz: BString::from("+0000"),
        }
    }

    /// Identity with the current wall-clock time (UTC).
    pub fn now(name: impl Into<BString>, email: impl Into<BString>) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self::new(name, email, timestamp)
    }

    /// Parse `Name <email> <unix> <tz>`.
    pub fn parse(data: &BStr) -> Result<Self, ObjectError> {
        let open = data
            .find_byte(b'<')
            .ok_or_else(|| ObjectError::InvalidSignature("missing '<'".into()))?;
        let close = data
            .find_byte(b'>')
            .ok_or_else(|| ObjectError::InvalidSignature("missing '>'".into()))?;
        if close < open {
            return Err(ObjectError::InvalidSignature("'>' before '<'".into()));
        }

        let name = BString::from(data[..open].trim_end());
        let email = BString::from(&data[open + 1..close]);

        let rest = data[close + 1..].trim();
        let mut parts = rest.splitn_str(2, b" ");
        let ts_part = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ObjectError::InvalidSignature("missing timestamp".into()))?;
        let tz_part = parts
            .next()
            .ok_or_else(|| ObjectError::InvalidSignature("missing timezone".into()))?;

        let timestamp: i64 = std::str::from_utf8(ts_part)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                ObjectError::InvalidSignature(format!(
                    "bad timestamp: {}",
                    String::from_utf8_lossy(ts_part)
                ))
            })?;

        Ok(Self {
            name,
            email,
            timestamp,
            tz: BString::from(tz_part),
        })
    }

    /// Serialize to `Name <email> <unix> <tz>`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.name.len() + self.email.len() + 24);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b"> ");
        out.extend_from_slice(self.timestamp.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(&self.tz);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic() {
        let sig = Signature::parse(BStr::new(b"Test <t@t.com> 0 +0000")).unwrap();
        assert_eq!(sig.name, "Test");
        assert_eq!(sig.email, "t@t.com");
        assert_eq!(sig.timestamp, 0);
        assert_eq!(sig.tz, "+0000");
    }

    #[test]
    fn parse_negative_offset() {
        let sig =
            Signature::parse(BStr::new(b"Jane Doe <jane@example.com> 1700000000 -0530")).unwrap();
        assert_eq!(sig.name, "Jane Doe");
        assert_eq!(sig.timestamp, 1_700_000_000);
        assert_eq!(sig.tz, "-0530");
    }

    #[test]
    fn serialize_roundtrip() {
        let raw: &[u8] = b"John Doe <john@example.com> 1234567890 +0200";
        let sig = Signature::parse(BStr::new(raw)).unwrap();
        assert_eq!(sig.to_bytes(), raw);
    }

    #[test]
    fn missing_email_brackets_rejected() {
        assert!(Signature::parse(BStr::new(b"Nobody 0 +0000")).is_err());
    }

    #[test]
    fn missing_timestamp_rejected() {
        assert!(Signature::parse(BStr::new(b"A <a@b.c>")).is_err());
    }
}

//! Lowercase hex encoding and decoding.

use crate::HashError;

/// Lookup table: ASCII byte → nibble value (255 = invalid).
const DECODE: [u8; 256] = {
    let mut table = [255u8; 256];
    let mut i = 0u8;
    loop {
        match i {
            b'0'..=b'9' => table[i as usize] = i - b'0',
            b'a'..=b'f' => table[i as usize] = i - b'a' + 10,
            b'A'..=b'F' => table[i as usize] = i - b'A' + 10,
            _ => {}
        }
        if i == 255 {
            break;
        }
        i += 1;
    }
    table
};

const ENCODE: &[u8; 16] = b"0123456789abcdef";

/// Encode bytes as a lowercase hex string.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(ENCODE[(b >> 4) as usize]);
        out.push(ENCODE[(b & 0x0f) as usize]);
    }
    // Only ASCII hex digits were pushed.
    unsafe { String::from_utf8_unchecked(out) }
}

/// Decode an even-length hex string to bytes. Accepts either case.
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, HashError> {
    let raw = hex.as_bytes();
    if raw.len() % 2 != 0 {
        return Err(HashError::InvalidHexLength {
            expected: raw.len() + 1,
            actual: raw.len(),
        });
    }
    let mut out = Vec::with_capacity(raw.len() / 2);
    for (i, pair) in raw.chunks_exact(2).enumerate() {
        let hi = DECODE[pair[0] as usize];
        let lo = DECODE[pair[1] as usize];
        if hi == 255 {
            return Err(HashError::InvalidHex {
                position: i * 2,
                character: pair[0] as char,
            });
        }
        if lo == 255 {
            return Err(HashError::InvalidHex {
                position: i * 2 + 1,
                character: pair[1] as char,
            });
        }
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

/// Whether a string is even-length hex.
pub fn is_hex(s: &str) -> bool {
    s.len() % 2 == 0 && s.bytes().all(|b| DECODE[b as usize] != 255)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn roundtrip() {
        let bytes = [0xde, 0xad, 0xbe, 0xef, 0x00, 0xff];
        let hex = bytes_to_hex(&bytes);
        assert_eq!(hex, "deadbeef00ff");
        assert_eq!(hex_to_bytes(&hex).unwrap(), bytes);
    }

    #[test]
    fn mixed_case_decodes() {
        assert_eq!(hex_to_bytes("DeAdBeEf").unwrap(), [0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn invalid_character_reports_position() {
        match hex_to_bytes("deadgoof").unwrap_err() {
            HashError::InvalidHex {
                position: 4,
                character: 'g',
            } => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn odd_length_rejected() {
        assert!(matches!(
            hex_to_bytes("abc"),
            Err(HashError::InvalidHexLength { .. })
        ));
    }

    #[test]
    fn is_hex_checks() {
        assert!(is_hex("deadbeef"));
        assert!(is_hex(""));
        assert!(!is_hex("abc"));
        assert!(!is_hex("xyzw"));
    }

    proptest! {
        #[test]
        fn encode_decode_identity(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let hex = bytes_to_hex(&bytes);
            prop_assert_eq!(hex_to_bytes(&hex).unwrap(), bytes);
        }

        #[test]
        fn decode_encode_lowercases(hex in "[0-9a-fA-F]{0,64}") {
            prop_assume!(hex.len() % 2 == 0);
            let bytes = hex_to_bytes(&hex).unwrap();
            prop_assert_eq!(bytes_to_hex(&bytes), hex.to_ascii_lowercase());
        }
    }
}

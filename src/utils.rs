use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use byteorder::{ByteOrder, LE};
use sha2::{Digest, Sha256};

/// Decodes a bsdiff sign-magnitude integer.
#[inline]
pub fn decode_int(b: &[u8]) -> i64 {
    let x = LE::read_u64(b);
    if x >> 63 == 0 || x == 0x8000000000000000 {
        x as i64
    } else {
        ((x & 0x7fffffffffffffff) as i64).wrapping_neg()
    }
}

/// Base64 encoded SHA-256 of the bytes, as reported for a patched file.
pub fn digest(bytes: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_magnitude() {
        assert_eq!(decode_int(&[5, 0, 0, 0, 0, 0, 0, 0]), 5);
        assert_eq!(decode_int(&[5, 0, 0, 0, 0, 0, 0, 0x80]), -5);
        assert_eq!(decode_int(&[0, 0, 0, 0, 0, 0, 0, 0x80]), i64::MIN);
    }

    #[test]
    fn empty_digest() {
        assert_eq!(
            digest(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }
}

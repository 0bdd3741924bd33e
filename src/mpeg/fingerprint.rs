//! Content fingerprint: SHA-1 of the concatenated MPEG frame byte spans.

use sha1::{Digest, Sha1};
use std::fmt;

/// 40 lowercase hex characters; tag-independent, depends only on the byte
/// spans of frames with a decoded header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            Some(Fingerprint(hex.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes of the fingerprint (20 bytes), used when building the album id.
    pub fn as_bytes(&self) -> Vec<u8> {
        (0..self.0.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&self.0[i..i + 2], 16).expect("validated hex"))
            .collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incrementally hashes frame byte spans; call `update` once per decoded
/// frame (never for junk spans) and `finish` once the file is exhausted.
#[derive(Default)]
pub struct FingerprintBuilder {
    hasher: Sha1,
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        FingerprintBuilder {
            hasher: Sha1::new(),
        }
    }

    pub fn update(&mut self, frame_bytes: &[u8]) {
        self.hasher.update(frame_bytes);
    }

    pub fn finish(self) -> Fingerprint {
        let digest = self.hasher.finalize();
        Fingerprint(hex_lower(&digest))
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_content_addressed() {
        let mut a = FingerprintBuilder::new();
        a.update(b"frame one");
        a.update(b"frame two");
        let fp_a = a.finish();

        let mut b = FingerprintBuilder::new();
        b.update(b"frame one");
        b.update(b"frame two");
        let fp_b = b.finish();

        assert_eq!(fp_a, fp_b);
        assert_eq!(fp_a.as_str().len(), 40);
    }

    #[test]
    fn from_hex_rejects_uppercase_and_wrong_length() {
        assert!(Fingerprint::from_hex(&"a".repeat(40)).is_some());
        assert!(Fingerprint::from_hex(&"A".repeat(40)).is_none());
        assert!(Fingerprint::from_hex(&"a".repeat(39)).is_none());
    }
}

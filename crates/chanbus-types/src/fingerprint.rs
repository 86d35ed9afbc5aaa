use std::fmt;

use serde::{Deserialize, Serialize};

/// Width of the fingerprint prefix on typed payloads.
pub const FINGERPRINT_SIZE: usize = 8;

/// 64-bit type identifier carried big-endian in the first 8 payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Read the fingerprint prefix of `payload`, if it is long enough.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let prefix: [u8; FINGERPRINT_SIZE] = payload.get(..FINGERPRINT_SIZE)?.try_into().ok()?;
        Some(Self(u64::from_be_bytes(prefix)))
    }

    pub fn to_bytes(self) -> [u8; FINGERPRINT_SIZE] {
        self.0.to_be_bytes()
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for Fingerprint {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_prefix() {
        let payload = [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF, 0xFF];
        let fp = Fingerprint::from_payload(&payload).unwrap();
        assert_eq!(fp.as_u64(), 0x0123_4567_89AB_CDEF);
        assert_eq!(fp.to_bytes(), payload[..8]);
    }

    #[test]
    fn short_payload_has_no_fingerprint() {
        assert!(Fingerprint::from_payload(&[]).is_none());
        assert!(Fingerprint::from_payload(&[0u8; 7]).is_none());
        assert!(Fingerprint::from_payload(&[0u8; 8]).is_some());
    }

    #[test]
    fn displays_as_fixed_width_hex() {
        assert_eq!(Fingerprint(0xBEEF).to_string(), "000000000000beef");
    }
}

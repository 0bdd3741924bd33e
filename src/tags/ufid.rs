//! UFID text form: `vol<VV>/<YYYYMMDD-HHMMSS>/<fingerprint>`, stored as the
//! identifier bytes of an owner-scoped `UFID` frame.

use thiserror::Error;

use crate::mpeg::Fingerprint;
use crate::paths::{ImportTimestamp, TimestampError, Volume};

#[derive(Debug, Error)]
pub enum UfidError {
    #[error("UFID string {0:?} is not of the form vol<VV>/<timestamp>/<fingerprint>")]
    Malformed(String),
    #[error("UFID volume {0:?} is not two hex digits")]
    BadVolume(String),
    #[error(transparent)]
    BadTimestamp(#[from] TimestampError),
    #[error("UFID fingerprint {0:?} is not 40 lowercase hex characters")]
    BadFingerprint(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ufid {
    pub volume: Volume,
    pub timestamp: ImportTimestamp,
    pub fingerprint: Fingerprint,
}

impl Ufid {
    pub fn to_text(&self) -> String {
        format!(
            "vol{}/{}/{}",
            self.volume.as_hex(),
            self.timestamp.to_human(),
            self.fingerprint
        )
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_text().into_bytes()
    }

    pub fn parse(text: &str) -> Result<Self, UfidError> {
        let parts: Vec<&str> = text.split('/').collect();
        let [vol_part, ts_part, fp_part] = parts[..] else {
            return Err(UfidError::Malformed(text.to_string()));
        };
        let vol_hex = vol_part
            .strip_prefix("vol")
            .ok_or_else(|| UfidError::Malformed(text.to_string()))?;
        let volume = Volume::from_hex(vol_hex).ok_or_else(|| UfidError::BadVolume(vol_hex.to_string()))?;
        let timestamp = ImportTimestamp::from_human(ts_part)?;
        let fingerprint = Fingerprint::from_hex(fp_part)
            .ok_or_else(|| UfidError::BadFingerprint(fp_part.to_string()))?;
        Ok(Ufid {
            volume,
            timestamp,
            fingerprint,
        })
    }

    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, UfidError> {
        let text = String::from_utf8_lossy(bytes);
        Self::parse(&text)
    }
}

//! ID3v2.4 tag model: a closed sum type over frame kinds, standardization
//! rules, and the whitelist of frames an archived file is allowed to carry.
//!
//! The on-wire format is hand-rolled (see [`codec`]) rather than delegated
//! to a general multi-format tagging crate: the archive needs exact control
//! over frame ordering, the UFID owner-scoped identifier, and the
//! TXXX-with-description subkeys the catalog keys tag history on, which a
//! generic abstraction would paper over. The design mirrors
//! `OxygenCobalt-musikr-old`'s frame-oriented ID3v2 model: a flat collection of
//! typed frames keyed by id, not a struct-of-fields.

pub mod codec;
pub mod standardize;
pub mod ufid;

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

pub use ufid::Ufid;

/// Station owner string written into every archived file's `TOWN` frame.
pub const STATION_OWNER: &str = "The Chicago Independent Radio Project";
/// `TFLT` value for every archived file: MPEG Audio Layer III.
pub const FILE_TYPE: &str = "MPG/3";
/// Owner string (also the UFID frame's effective namespace key) for the
/// archive's unique file identifier.
pub const UFID_OWNER: &str = "http://chirpradio.org/_ufid/1";

pub const TXXX_ALBUM_ID: &str = "CHIRP Album ID";
pub const TXXX_FRAME_COUNT: &str = "Frame Count";
pub const TXXX_FRAME_SIZE: &str = "Frame Size";

/// Frames that must be present on every archived file, identifiable by id
/// alone. The UFID and the three required `TXXX` entries (album id, frame
/// count, frame size) are also required but are checked separately by
/// owner/description, since frame id alone doesn't distinguish them.
pub const REQUIRED_FRAMES: &[&str] = &["TIT2", "TPE1", "TALB", "TRCK", "TLEN", "TOWN", "TFLT"];

/// Every text frame id the archive will preserve from a source file, beyond
/// the always-rewritten required set. Anything else is dropped on import.
pub const WHITELISTED_TEXT_FRAMES: &[&str] = &[
    "TPE1", "TPE2", "TPE3", "TPE4", "TIT1", "TIT2", "TALB", "TRCK", "TPOS", "TBPM", "TCOM", "TCON",
    "TCOP", "TDRC", "TDTG", "TENC", "TEXT", "TKEY", "TLAN", "TMED", "TOAL", "TOLY", "TOPE", "TPUB",
    "TRSN", "TRSO", "TSOA", "TSOP", "TSOT", "TSRC", "TSSE",
];

#[derive(Debug, Error)]
pub enum TagError {
    #[error("malformed ID3v2 header")]
    MalformedHeader,
    #[error("unsupported ID3 major version {0}")]
    UnsupportedVersion(u8),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed UFID frame body")]
    MalformedUfid,
    #[error(transparent)]
    Ufid(#[from] ufid::UfidError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameValue {
    /// A plain text-information frame body (encoding byte implied UTF-8).
    Text(String),
    /// `TXXX`: a user-defined text frame, keyed by `description`.
    ExtendedText { description: String, value: String },
    /// `UFID`: owner-scoped unique file identifier.
    Ufid { owner: String, identifier: Vec<u8> },
    /// A frame id this archive doesn't interpret, kept only so it can be
    /// recognized (and dropped) by the whitelist filter.
    Unknown(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: String,
    pub value: FrameValue,
}

impl Frame {
    pub fn text(id: &str, value: impl Into<String>) -> Self {
        Frame {
            id: id.to_string(),
            value: FrameValue::Text(value.into()),
        }
    }

    pub fn txxx(description: &str, value: impl Into<String>) -> Self {
        Frame {
            id: "TXXX".to_string(),
            value: FrameValue::ExtendedText {
                description: description.to_string(),
                value: value.into(),
            },
        }
    }

    pub fn ufid(owner: &str, identifier: Vec<u8>) -> Self {
        Frame {
            id: "UFID".to_string(),
            value: FrameValue::Ufid {
                owner: owner.to_string(),
                identifier,
            },
        }
    }

    /// The key this frame occupies in the logical (frame-id -> value) set:
    /// the frame id itself, except `TXXX` entries which are keyed by their
    /// description (`TXXX:<description>`).
    pub fn key(&self) -> String {
        match &self.value {
            FrameValue::ExtendedText { description, .. } => format!("TXXX:{}", description),
            _ => self.id.clone(),
        }
    }

    pub fn text_value(&self) -> Option<&str> {
        match &self.value {
            FrameValue::Text(s) => Some(s),
            FrameValue::ExtendedText { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// An ordered collection of frames, logically a set keyed by [`Frame::key`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    frames: Vec<Frame>,
}

impl TagSet {
    pub fn new() -> Self {
        TagSet { frames: Vec::new() }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    pub fn from_frames(frames: Vec<Frame>) -> Self {
        TagSet { frames }
    }

    /// The set of logical keys present (frame ids, or `TXXX:<description>`).
    pub fn key_set(&self) -> HashSet<String> {
        self.frames.iter().map(Frame::key).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Frame> {
        self.frames.iter().find(|f| f.id == id)
    }

    pub fn get_text(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(Frame::text_value)
    }

    pub fn get_txxx(&self, description: &str) -> Option<&str> {
        self.frames.iter().find_map(|f| match &f.value {
            FrameValue::ExtendedText { description: d, value } if d == description => {
                Some(value.as_str())
            }
            _ => None,
        })
    }

    pub fn get_ufid(&self, owner: &str) -> Option<&[u8]> {
        self.frames.iter().find_map(|f| match &f.value {
            FrameValue::Ufid { owner: o, identifier } if o == owner => Some(identifier.as_slice()),
            _ => None,
        })
    }

    /// Replace (or insert) the single frame carrying this id.
    pub fn set_text(&mut self, id: &str, value: impl Into<String>) {
        self.remove(id);
        self.frames.push(Frame::text(id, value));
    }

    pub fn set_txxx(&mut self, description: &str, value: impl Into<String>) {
        self.frames
            .retain(|f| f.key() != format!("TXXX:{}", description));
        self.frames.push(Frame::txxx(description, value));
    }

    pub fn set_ufid(&mut self, owner: &str, identifier: Vec<u8>) {
        self.frames.retain(|f| f.id != "UFID");
        self.frames.push(Frame::ufid(owner, identifier));
    }

    pub fn remove(&mut self, id: &str) {
        self.frames.retain(|f| f.id != id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.frames.iter().any(|f| f.id == id)
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Read an ID3v2 tag from the start of a file. Legacy versions and
    /// broken tag blocks are tolerated by returning `Ok(None)` rather than
    /// an error — callers treat a file with no readable tags the same as a
    /// file with an empty tag set.
    pub fn read_from_path(path: &Path) -> Result<Option<TagSet>, TagError> {
        let bytes = std::fs::read(path)?;
        Ok(codec::decode(&bytes).ok())
    }

    /// Encode as a full ID3v2.4 tag block, ready to be prepended to the
    /// MPEG payload.
    pub fn encode(&self) -> Vec<u8> {
        codec::encode(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txxx_entries_are_keyed_by_description() {
        let mut tags = TagSet::new();
        tags.set_txxx(TXXX_ALBUM_ID, "12345");
        tags.set_txxx(TXXX_FRAME_COUNT, "200");
        assert_eq!(tags.get_txxx(TXXX_ALBUM_ID), Some("12345"));
        assert_eq!(tags.get_txxx(TXXX_FRAME_COUNT), Some("200"));
        assert!(tags.key_set().contains(&format!("TXXX:{}", TXXX_ALBUM_ID)));
    }

    #[test]
    fn set_text_replaces_rather_than_duplicates() {
        let mut tags = TagSet::new();
        tags.set_text("TIT2", "First");
        tags.set_text("TIT2", "Second");
        assert_eq!(tags.get_text("TIT2"), Some("Second"));
        assert_eq!(tags.frames().len(), 1);
    }
}

//! MPEG audio framing, fingerprinting, and per-file statistics.

pub mod analyzer;
pub mod fingerprint;
pub mod header;
pub mod scanner;

pub use analyzer::{AudioStats, Analyzer};
pub use fingerprint::Fingerprint;
pub use header::{ChannelMode, HeaderTemplate, MpegHeader};
pub use scanner::{Scanner, Span};

use thiserror::Error;

/// Minimum number of valid frames for a file to be accepted (~2.6s of audio).
pub const MIN_FRAME_COUNT: usize = 100;

pub const MIN_SAMPLE_FILE_BYTES: u64 = 100 * 1024;
pub const MAX_SAMPLE_FILE_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum MpegError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("fewer than {min} valid MPEG frames found ({found})")]
    TooFewFrames { found: usize, min: usize },
    #[error("frame header does not match the file's own template (sampling rate or channel mode changed mid-file)")]
    InconsistentHeader,
    #[error("header does not match the expected template")]
    TemplateMismatch,
    #[error("no valid MPEG header found in file")]
    NoValidHeader,
    #[error("sample file size {size} bytes is outside the accepted [{min}, {max}] range")]
    SampleSizeOutOfRange { size: u64, min: u64, max: u64 },
}

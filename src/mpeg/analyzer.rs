//! Consumes a frame scanner and accumulates fingerprint + audio statistics.

use std::io::Read;
use std::path::Path;

use log::warn;

use super::fingerprint::{Fingerprint, FingerprintBuilder};
use super::header::{ChannelMode, HeaderTemplate, MpegHeader};
use super::scanner::{Scanner, Span};
use super::{MpegError, MAX_SAMPLE_FILE_BYTES, MIN_FRAME_COUNT, MIN_SAMPLE_FILE_BYTES};

/// Per-file audio statistics measured from the MPEG frame stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStats {
    pub sampling_rate_hz: u32,
    pub bit_rate_kbps: u16,
    pub channels: ChannelMode,
    pub frame_count: u32,
    pub frame_size: u64,
    pub duration_ms: u64,
    pub is_vbr: bool,
}

pub struct Analyzer {
    keep_payload: bool,
    template: Option<HeaderTemplate>,
    first_bitrate: Option<u16>,
    frame_count: u32,
    frame_size_total: u64,
    duration_total: u64,
    bitrate_sum: u64,
    is_vbr: bool,
    sampling_rate_hz: Option<u32>,
    channels: Option<ChannelMode>,
    fingerprint: FingerprintBuilder,
    payload: Vec<u8>,
}

pub struct AnalyzeResult {
    pub fingerprint: Fingerprint,
    pub stats: AudioStats,
    pub payload: Option<Vec<u8>>,
}

impl Analyzer {
    pub fn new(keep_payload: bool) -> Self {
        Analyzer {
            keep_payload,
            template: None,
            first_bitrate: None,
            frame_count: 0,
            frame_size_total: 0,
            duration_total: 0,
            bitrate_sum: 0,
            is_vbr: false,
            sampling_rate_hz: None,
            channels: None,
            fingerprint: FingerprintBuilder::new(),
            payload: Vec::new(),
        }
    }

    fn observe_frame(&mut self, header: &MpegHeader, bytes: &[u8]) -> Result<(), MpegError> {
        match &self.template {
            None => {
                self.template = Some(HeaderTemplate::latch(header));
                self.sampling_rate_hz = Some(header.sampling_rate_hz);
                self.channels = Some(header.channel_mode);
                self.first_bitrate = Some(header.bitrate_kbps);
            }
            Some(t) => {
                if !t.matches(header) {
                    return Err(MpegError::InconsistentHeader);
                }
            }
        }

        if Some(header.bitrate_kbps) != self.first_bitrate {
            self.is_vbr = true;
        }

        self.frame_count += 1;
        self.frame_size_total += bytes.len() as u64;
        self.duration_total += header.duration_ms() as u64;
        self.bitrate_sum += header.bitrate_kbps as u64;
        self.fingerprint.update(bytes);
        if self.keep_payload {
            self.payload.extend_from_slice(bytes);
        }
        Ok(())
    }

    /// Run the analyzer over every span the scanner yields.
    pub fn analyze<R: Read>(mut self, mut scanner: Scanner<R>) -> Result<AnalyzeResult, MpegError> {
        while let Some(span) = scanner.next_span() {
            match span? {
                Span::Frame { header, bytes } => self.observe_frame(&header, &bytes)?,
                Span::Junk(bytes) => {
                    if !bytes.is_empty() && self.frame_count > 0 {
                        warn!(
                            "skipped {} bytes of junk mid-stream after {} frames",
                            bytes.len(),
                            self.frame_count
                        );
                    }
                }
            }
        }

        if (self.frame_count as usize) < MIN_FRAME_COUNT {
            return Err(MpegError::TooFewFrames {
                found: self.frame_count as usize,
                min: MIN_FRAME_COUNT,
            });
        }

        let bit_rate_kbps = (self.bitrate_sum / self.frame_count as u64) as u16;
        let stats = AudioStats {
            sampling_rate_hz: self.sampling_rate_hz.expect("frame_count > 0 implies this is set"),
            bit_rate_kbps,
            channels: self.channels.expect("frame_count > 0 implies this is set"),
            frame_count: self.frame_count,
            frame_size: self.frame_size_total,
            duration_ms: self.duration_total,
            is_vbr: self.is_vbr,
        };

        Ok(AnalyzeResult {
            fingerprint: self.fingerprint.finish(),
            stats,
            payload: if self.keep_payload {
                Some(self.payload)
            } else {
                None
            },
        })
    }
}

/// Analyze a file on disk, keeping its full decoded payload in memory.
pub fn analyze_file(path: &Path) -> Result<AnalyzeResult, MpegError> {
    let file = std::fs::File::open(path)?;
    let scanner = Scanner::new(std::io::BufReader::new(file));
    Analyzer::new(true).analyze(scanner)
}

/// Pick the median-sized file among `paths`, reject it if its size falls
/// outside the accepted sample range, and return only its template header
/// (sampling rate + channel mode), without a full frame-by-frame analysis.
pub fn sample_and_analyze(paths: &[std::path::PathBuf]) -> Result<HeaderTemplate, MpegError> {
    let mut sized: Vec<(u64, &std::path::PathBuf)> = paths
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok().map(|m| (m.len(), p)))
        .collect();
    sized.sort_by_key(|(size, _)| *size);
    let (size, median_path) = sized
        .get(sized.len() / 2)
        .copied()
        .ok_or(MpegError::NoValidHeader)?;

    if !(MIN_SAMPLE_FILE_BYTES..=MAX_SAMPLE_FILE_BYTES).contains(&size) {
        return Err(MpegError::SampleSizeOutOfRange {
            size,
            min: MIN_SAMPLE_FILE_BYTES,
            max: MAX_SAMPLE_FILE_BYTES,
        });
    }

    let file = std::fs::File::open(median_path)?;
    let mut scanner = Scanner::new(std::io::BufReader::new(file));
    loop {
        match scanner.next_span() {
            Some(Ok(Span::Frame { header, .. })) => return Ok(HeaderTemplate::latch(&header)),
            Some(Ok(Span::Junk(_))) => continue,
            Some(Err(e)) => return Err(MpegError::Io(e)),
            None => return Err(MpegError::NoValidHeader),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpeg::header::MpegHeader;

    fn frame_bytes(bitrate_index: u8) -> Vec<u8> {
        let mut header = [0xFFu8, 0xFB, 0x00, 0x00];
        header[2] = bitrate_index << 4;
        let decoded = MpegHeader::decode(&header).unwrap();
        let mut frame = header.to_vec();
        frame.resize(decoded.frame_size(), 0xAB);
        frame
    }

    #[test]
    fn rejects_files_with_too_few_frames() {
        let mut data = Vec::new();
        for _ in 0..5 {
            data.extend(frame_bytes(9));
        }
        let scanner = Scanner::new(std::io::Cursor::new(data));
        let err = Analyzer::new(false).analyze(scanner).unwrap_err();
        assert!(matches!(err, MpegError::TooFewFrames { found: 5, .. }));
    }

    #[test]
    fn detects_vbr_when_bitrate_varies() {
        let mut data = Vec::new();
        for i in 0..MIN_FRAME_COUNT {
            data.extend(frame_bytes(if i % 2 == 0 { 9 } else { 11 }));
        }
        let scanner = Scanner::new(std::io::Cursor::new(data));
        let result = Analyzer::new(false).analyze(scanner).unwrap();
        assert!(result.stats.is_vbr);
        assert_eq!(result.stats.frame_count as usize, MIN_FRAME_COUNT);
    }

    #[test]
    fn constant_bitrate_is_not_flagged_vbr() {
        let mut data = Vec::new();
        for _ in 0..MIN_FRAME_COUNT {
            data.extend(frame_bytes(9));
        }
        let scanner = Scanner::new(std::io::Cursor::new(data));
        let result = Analyzer::new(false).analyze(scanner).unwrap();
        assert!(!result.stats.is_vbr);
        assert_eq!(result.stats.bit_rate_kbps, 128);
    }
}

//! MPEG-1 Layer III frame header decoding.
//!
//! Only the subset of the format this archive cares about: MPEG version 1,
//! layer III, the bitrate/sampling-rate tables used in practice by the
//! station's encoders. Anything else is rejected rather than decoded.

use thiserror::Error;

pub const HEADER_LEN: usize = 4;

const BITRATES_KBPS: [Option<u16>; 16] = [
    None,
    Some(32),
    Some(40),
    Some(48),
    Some(56),
    Some(64),
    Some(80),
    Some(96),
    Some(112),
    Some(128),
    Some(160),
    Some(192),
    Some(224),
    Some(256),
    Some(320),
    None,
];

const SAMPLE_RATES_HZ: [Option<u32>; 4] = [Some(44100), Some(48000), Some(32000), None];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("buffer too short for a header")]
    TooShort,
    #[error("synch pattern not found")]
    NoSynch,
    #[error("not an MPEG version 1 layer III frame")]
    WrongVersionOrLayer,
    #[error("reserved bitrate index")]
    BadBitrate,
    #[error("reserved sampling rate index")]
    BadSampleRate,
    #[error("header does not match the expected template")]
    TemplateMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualMono,
    Mono,
}

impl ChannelMode {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0b00 => ChannelMode::Stereo,
            0b01 => ChannelMode::JointStereo,
            0b10 => ChannelMode::DualMono,
            0b11 => ChannelMode::Mono,
            _ => unreachable!("channel mode is only ever 2 bits"),
        }
    }
}

/// A decoded MPEG-1 Layer III frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpegHeader {
    pub bitrate_kbps: u16,
    pub sampling_rate_hz: u32,
    pub padding: bool,
    pub protected: bool,
    pub channel_mode: ChannelMode,
}

impl MpegHeader {
    /// Frame size in bytes, header included.
    pub fn frame_size(&self) -> usize {
        let size = 144_000 * self.bitrate_kbps as u64 / self.sampling_rate_hz as u64;
        size as usize + if self.padding { 1 } else { 0 }
    }

    /// Duration of one frame's worth of audio, in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        (1152 * 1000 / self.sampling_rate_hz) as u32
    }

    /// Decode a header from the first 4 bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < HEADER_LEN {
            return Err(HeaderError::TooShort);
        }
        if buf[0] != 0xFF || (buf[1] & 0xE0) != 0xE0 {
            return Err(HeaderError::NoSynch);
        }
        // bits 12-13 = version, bits 14-15 = layer (both within buf[1] low bits).
        let version_layer = buf[1] & 0x1E;
        // MPEG version 1 = 11, layer III = 01 -> combined nibble 1101 = 0x1A (shifted into bits 1-4 of the byte).
        if version_layer != 0x1A {
            return Err(HeaderError::WrongVersionOrLayer);
        }
        let protected = (buf[1] & 0x01) != 0;

        let bitrate_index = (buf[2] >> 4) & 0x0F;
        let bitrate_kbps = BITRATES_KBPS[bitrate_index as usize].ok_or(HeaderError::BadBitrate)?;

        let sample_rate_index = (buf[2] >> 2) & 0x03;
        let sampling_rate_hz =
            SAMPLE_RATES_HZ[sample_rate_index as usize].ok_or(HeaderError::BadSampleRate)?;

        let padding = (buf[2] & 0x02) != 0;

        let channel_mode = ChannelMode::from_bits((buf[3] >> 6) & 0x03);

        Ok(MpegHeader {
            bitrate_kbps,
            sampling_rate_hz,
            padding,
            protected,
            channel_mode,
        })
    }
}

/// A header with some fields blanked out, used to lock frame acceptance to
/// an expected encoding (the stream pipeline's use case) or to a template
/// latched from the first frame in a file (the analyzer's use case).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderTemplate {
    pub bitrate_kbps: Option<u16>,
    pub sampling_rate_hz: Option<u32>,
    pub padding: Option<bool>,
    pub protected: Option<bool>,
    pub channel_mode: Option<ChannelMode>,
}

impl HeaderTemplate {
    /// A template that blanks the fields the base spec says may legitimately
    /// vary frame-to-frame (bitrate, padding, protection), keeping sampling
    /// rate and channel mode fixed to `header`'s values.
    pub fn latch(header: &MpegHeader) -> Self {
        HeaderTemplate {
            bitrate_kbps: None,
            sampling_rate_hz: Some(header.sampling_rate_hz),
            padding: None,
            protected: None,
            channel_mode: Some(header.channel_mode),
        }
    }

    pub fn matches(&self, header: &MpegHeader) -> bool {
        self.bitrate_kbps.is_none_or(|b| b == header.bitrate_kbps)
            && self
                .sampling_rate_hz
                .is_none_or(|s| s == header.sampling_rate_hz)
            && self.padding.is_none_or(|p| p == header.padding)
            && self.protected.is_none_or(|p| p == header.protected)
            && self
                .channel_mode
                .is_none_or(|c| c == header.channel_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_header_bytes(bitrate_index: u8, sample_rate_index: u8, padding: bool) -> [u8; 4] {
        let mut buf = [0xFFu8, 0xFB, 0x00, 0x00];
        buf[2] = (bitrate_index << 4) | (sample_rate_index << 2) | if padding { 0x02 } else { 0 };
        buf[3] = 0b00 << 6; // stereo
        buf
    }

    #[test]
    fn decodes_a_128kbps_44100hz_frame() {
        let buf = frame_header_bytes(9, 0, false);
        let h = MpegHeader::decode(&buf).unwrap();
        assert_eq!(h.bitrate_kbps, 128);
        assert_eq!(h.sampling_rate_hz, 44100);
        assert!(!h.padding);
        assert_eq!(h.channel_mode, ChannelMode::Stereo);
    }

    #[test]
    fn frame_size_matches_the_mp3_formula() {
        let buf = frame_header_bytes(9, 0, false);
        let h = MpegHeader::decode(&buf).unwrap();
        assert_eq!(h.frame_size(), 144_000 * 128 / 44100);
    }

    #[test]
    fn padding_adds_one_byte() {
        let buf = frame_header_bytes(9, 0, true);
        let h = MpegHeader::decode(&buf).unwrap();
        assert_eq!(h.frame_size(), 144_000 * 128 / 44100 + 1);
    }

    #[test]
    fn rejects_reserved_bitrate_index() {
        let buf = frame_header_bytes(0, 0, false);
        assert_eq!(MpegHeader::decode(&buf), Err(HeaderError::BadBitrate));
        let buf = frame_header_bytes(15, 0, false);
        assert_eq!(MpegHeader::decode(&buf), Err(HeaderError::BadBitrate));
    }

    #[test]
    fn rejects_reserved_sample_rate_index() {
        let buf = frame_header_bytes(9, 3, false);
        assert_eq!(MpegHeader::decode(&buf), Err(HeaderError::BadSampleRate));
    }

    #[test]
    fn rejects_missing_synch() {
        let buf = [0x00, 0xFB, 0x90, 0x00];
        assert_eq!(MpegHeader::decode(&buf), Err(HeaderError::NoSynch));
    }

    #[test]
    fn template_latched_from_first_header_blanks_variable_fields() {
        let first = MpegHeader::decode(&frame_header_bytes(9, 0, false)).unwrap();
        let template = HeaderTemplate::latch(&first);
        let vbr_frame = MpegHeader::decode(&frame_header_bytes(11, 0, true)).unwrap();
        assert!(template.matches(&vbr_frame));

        let wrong_rate = MpegHeader::decode(&frame_header_bytes(9, 1, false)).unwrap();
        assert!(!template.matches(&wrong_rate));
    }
}

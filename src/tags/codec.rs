//! Raw ID3v2.3/2.4 tag block encode/decode.
//!
//! Writing always produces an ID3v2.4 block (UTF-8 text frames, syncsafe
//! frame sizes). Reading tolerates the more common legacy text encodings
//! (Latin-1, UTF-16) so files dropped into the inbox from elsewhere don't
//! get rejected outright — the caller standardizes everything to UTF-8
//! afterwards.

use super::{Frame, FrameValue, TagError, TagSet};

const HEADER_LEN: usize = 10;

pub fn encode_syncsafe(mut value: u32) -> [u8; 4] {
    let mut out = [0u8; 4];
    for i in (0..4).rev() {
        out[i] = (value & 0x7F) as u8;
        value >>= 7;
    }
    out
}

pub fn decode_syncsafe(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 7) | (*b as u32 & 0x7F))
}

/// Encode `tags` as a complete ID3v2.4 tag block (header + frames), ready
/// to be prepended to an MPEG payload.
pub fn encode(tags: &TagSet) -> Vec<u8> {
    let mut body = Vec::new();
    for frame in tags.frames() {
        body.extend(encode_frame(frame));
    }

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend(b"ID3");
    out.extend([0x04, 0x00]); // version 2.4.0
    out.push(0x00); // flags
    out.extend(encode_syncsafe(body.len() as u32));
    out.extend(body);
    out
}

fn encode_frame(frame: &Frame) -> Vec<u8> {
    let id_bytes = frame_id_bytes(&frame.id);
    let body = encode_frame_body(&frame.value);

    let mut out = Vec::with_capacity(10 + body.len());
    out.extend(id_bytes);
    out.extend(encode_syncsafe(body.len() as u32));
    out.extend([0x00, 0x00]); // flags
    out.extend(body);
    out
}

fn frame_id_bytes(id: &str) -> [u8; 4] {
    let mut out = [b' '; 4];
    for (i, b) in id.bytes().take(4).enumerate() {
        out[i] = b;
    }
    out
}

fn encode_frame_body(value: &FrameValue) -> Vec<u8> {
    match value {
        FrameValue::Text(s) => {
            let mut body = vec![0x03u8]; // UTF-8
            body.extend(s.as_bytes());
            body.push(0x00);
            body
        }
        FrameValue::ExtendedText { description, value } => {
            let mut body = vec![0x03u8];
            body.extend(description.as_bytes());
            body.push(0x00);
            body.extend(value.as_bytes());
            body
        }
        FrameValue::Ufid { owner, identifier } => {
            let mut body = Vec::with_capacity(owner.len() + 1 + identifier.len());
            body.extend(owner.as_bytes());
            body.push(0x00);
            body.extend(identifier);
            body
        }
        FrameValue::Unknown(bytes) => bytes.clone(),
    }
}

/// Decode an ID3v2 tag block from the start of `bytes`. Returns an error
/// (never panics) on anything unreadable; callers that want "no tags" on
/// failure should map the error to `None`.
pub fn decode(bytes: &[u8]) -> Result<TagSet, TagError> {
    if bytes.len() < HEADER_LEN || &bytes[0..3] != b"ID3" {
        return Err(TagError::MalformedHeader);
    }
    let major = bytes[3];
    if major != 3 && major != 4 {
        return Err(TagError::UnsupportedVersion(major));
    }
    let flags = bytes[5];
    if flags & 0x40 != 0 {
        // Extended header present; not supported, treat as unreadable.
        return Err(TagError::MalformedHeader);
    }
    let total_size = decode_syncsafe(&bytes[6..10]) as usize;
    let end = HEADER_LEN + total_size;
    if end > bytes.len() {
        return Err(TagError::MalformedHeader);
    }

    let mut frames = Vec::new();
    let mut offset = HEADER_LEN;
    while offset + 10 <= end {
        let id_bytes = &bytes[offset..offset + 4];
        if id_bytes[0] == 0 {
            break; // padding
        }
        if !id_bytes.iter().all(|b| b.is_ascii_alphanumeric()) {
            break;
        }
        let id = String::from_utf8_lossy(id_bytes).to_string();
        let size = if major >= 4 {
            decode_syncsafe(&bytes[offset + 4..offset + 8]) as usize
        } else {
            u32::from_be_bytes(bytes[offset + 4..offset + 8].try_into().unwrap()) as usize
        };
        let frame_start = offset + 10;
        let frame_end = frame_start + size;
        if frame_end > end {
            break;
        }
        let body = &bytes[frame_start..frame_end];
        if let Some(value) = decode_frame_body(&id, body) {
            frames.push(Frame { id, value });
        }
        offset = frame_end;
    }

    Ok(TagSet::from_frames(frames))
}

fn decode_frame_body(id: &str, body: &[u8]) -> Option<FrameValue> {
    if id == "UFID" {
        let split = body.iter().position(|b| *b == 0)?;
        let owner = String::from_utf8_lossy(&body[..split]).to_string();
        let identifier = body[split + 1..].to_vec();
        return Some(FrameValue::Ufid { owner, identifier });
    }

    if id == "TXXX" {
        if body.is_empty() {
            return None;
        }
        let encoding = body[0];
        let rest = &body[1..];
        let wide = matches!(encoding, 1 | 2);
        let (desc_bytes, value_bytes) = split_terminator(rest, wide)?;
        let description = decode_text(encoding, desc_bytes);
        let value = decode_text(encoding, value_bytes);
        return Some(FrameValue::ExtendedText { description, value });
    }

    if id.starts_with('T') && id.len() == 4 {
        if body.is_empty() {
            return None;
        }
        let encoding = body[0];
        let mut rest = &body[1..];
        // Trim a single trailing terminator if present.
        let wide = matches!(encoding, 1 | 2);
        if wide && rest.len() >= 2 && rest[rest.len() - 2..] == [0, 0] {
            rest = &rest[..rest.len() - 2];
        } else if !wide && rest.last() == Some(&0) {
            rest = &rest[..rest.len() - 1];
        }
        return Some(FrameValue::Text(decode_text(encoding, rest)));
    }

    Some(FrameValue::Unknown(body.to_vec()))
}

fn split_terminator(bytes: &[u8], wide: bool) -> Option<(&[u8], &[u8])> {
    if wide {
        let mut i = 0;
        while i + 1 < bytes.len() {
            if bytes[i] == 0 && bytes[i + 1] == 0 {
                return Some((&bytes[..i], &bytes[i + 2..]));
            }
            i += 2;
        }
        None
    } else {
        let i = bytes.iter().position(|b| *b == 0)?;
        Some((&bytes[..i], &bytes[i + 1..]))
    }
}

fn decode_text(encoding: u8, bytes: &[u8]) -> String {
    match encoding {
        0 => bytes.iter().map(|&b| b as char).collect(),
        1 => decode_utf16_with_bom(bytes),
        2 => decode_utf16(bytes, false),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn decode_utf16_with_bom(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == 0xFE {
        decode_utf16(&bytes[2..], true)
    } else if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        decode_utf16(&bytes[2..], false)
    } else {
        decode_utf16(bytes, true)
    }
}

fn decode_utf16(bytes: &[u8], little_endian: bool) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| {
            if little_endian {
                u16::from_le_bytes([c[0], c[1]])
            } else {
                u16::from_be_bytes([c[0], c[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}

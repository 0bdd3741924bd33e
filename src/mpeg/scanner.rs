//! Splits a byte stream into MPEG frame spans and junk spans.
//!
//! Junk covers leading noise and embedded ID3v2 containers (whose payload
//! may itself contain byte sequences that look like a frame synch — they
//! must be skipped wholesale, not scanned into).

use std::io::Read;

use super::header::{HeaderTemplate, MpegHeader};

/// Refill threshold: the scanner keeps at least this many bytes buffered
/// (unless the stream has ended) so header/ID3 lookahead never straddles a
/// short read.
const MIN_BUF: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    Frame { header: MpegHeader, bytes: Vec<u8> },
    Junk(Vec<u8>),
}

pub struct Scanner<R> {
    reader: R,
    buf: Vec<u8>,
    eof: bool,
    template: Option<HeaderTemplate>,
}

impl<R: Read> Scanner<R> {
    pub fn new(reader: R) -> Self {
        Scanner {
            reader,
            buf: Vec::new(),
            eof: false,
            template: None,
        }
    }

    /// Only accept frame headers matching `template`'s non-`None` fields.
    /// Used by the stream pipeline to lock onto the broadcaster's encoding.
    pub fn with_template(reader: R, template: HeaderTemplate) -> Self {
        let mut scanner = Scanner::new(reader);
        scanner.template = Some(template);
        scanner
    }

    fn fill(&mut self) -> std::io::Result<()> {
        while !self.eof && self.buf.len() < MIN_BUF {
            let mut chunk = [0u8; MIN_BUF];
            let n = self.reader.read(&mut chunk)?;
            if n == 0 {
                self.eof = true;
            } else {
                self.buf.extend_from_slice(&chunk[..n]);
            }
        }
        Ok(())
    }

    /// Next `(offset, id3_total_size)` of an ID3v2 container in the buffer, if any.
    fn find_id3(&self) -> Option<(usize, usize)> {
        let buf = &self.buf;
        let mut i = 0;
        while i + 10 <= buf.len() {
            if &buf[i..i + 3] == b"ID3" && buf[i + 3] >= 2 && buf[i + 3] <= 4 {
                let size_bytes = &buf[i + 6..i + 10];
                if size_bytes.iter().all(|b| *b & 0x80 == 0) {
                    let syncsafe = size_bytes
                        .iter()
                        .fold(0u32, |acc, b| (acc << 7) | (*b as u32));
                    let footer = buf[i + 5] & 0x10 != 0;
                    let total = 10 + syncsafe as usize + if footer { 10 } else { 0 };
                    return Some((i, total));
                }
            }
            i += 1;
        }
        None
    }

    /// Next `(offset, header)` of a valid MPEG frame header in the buffer, if any.
    fn find_header(&self) -> Option<(usize, MpegHeader)> {
        let buf = &self.buf;
        let mut i = 0;
        while i + 4 <= buf.len() {
            if buf[i] == 0xFF {
                if let Ok(header) = MpegHeader::decode(&buf[i..]) {
                    let accepted = match &self.template {
                        Some(t) => t.matches(&header),
                        None => true,
                    };
                    if accepted {
                        return Some((i, header));
                    }
                }
            }
            i += 1;
        }
        None
    }

    /// Produce the next span, or `None` once the stream is fully consumed.
    pub fn next_span(&mut self) -> Option<std::io::Result<Span>> {
        loop {
            if let Err(e) = self.fill() {
                return Some(Err(e));
            }
            if self.buf.is_empty() {
                return None;
            }

            let id3 = self.find_id3();
            let header = self.find_header();

            match (id3, header) {
                (Some((id3_off, id3_total)), Some((hdr_off, _))) if id3_off < hdr_off => {
                    if !self.eof && id3_off + id3_total > self.buf.len() {
                        if let Err(e) = self.force_fill(id3_off + id3_total) {
                            return Some(Err(e));
                        }
                        continue;
                    }
                    return Some(Ok(self.take_id3_junk(id3_off, id3_total)));
                }
                (Some((id3_off, id3_total)), None) => {
                    if !self.eof && id3_off + id3_total > self.buf.len() {
                        if let Err(e) = self.force_fill(id3_off + id3_total) {
                            return Some(Err(e));
                        }
                        continue;
                    }
                    return Some(Ok(self.take_id3_junk(id3_off, id3_total)));
                }
                (_, Some((hdr_off, decoded))) => {
                    if hdr_off > 0 {
                        let junk = self.buf.drain(..hdr_off).collect();
                        return Some(Ok(Span::Junk(junk)));
                    }
                    let frame_size = decoded.frame_size();
                    if self.buf.len() < frame_size {
                        if self.eof {
                            let rest = std::mem::take(&mut self.buf);
                            return Some(Ok(Span::Junk(rest)));
                        }
                        // Not enough buffered yet for this frame; force another fill.
                        if let Err(e) = self.force_fill(frame_size) {
                            return Some(Err(e));
                        }
                        continue;
                    }
                    let bytes: Vec<u8> = self.buf.drain(..frame_size).collect();
                    return Some(Ok(Span::Frame {
                        header: decoded,
                        bytes,
                    }));
                }
                (None, None) => {
                    if self.eof {
                        let rest = std::mem::take(&mut self.buf);
                        return Some(Ok(Span::Junk(rest)));
                    }
                    if let Err(e) = self.force_fill(self.buf.len() + MIN_BUF) {
                        return Some(Err(e));
                    }
                }
            }
        }
    }

    fn take_id3_junk(&mut self, id3_off: usize, id3_total: usize) -> Span {
        let end = id3_off + id3_total;
        if end <= self.buf.len() {
            let junk: Vec<u8> = self.buf.drain(..end).collect();
            Span::Junk(junk)
        } else if self.eof {
            let rest = std::mem::take(&mut self.buf);
            Span::Junk(rest)
        } else {
            // handled by caller via force_fill + retry; return what we can for now
            let rest = std::mem::take(&mut self.buf);
            Span::Junk(rest)
        }
    }

    fn force_fill(&mut self, want: usize) -> std::io::Result<()> {
        while !self.eof && self.buf.len() < want {
            let mut chunk = [0u8; MIN_BUF];
            let n = self.reader.read(&mut chunk)?;
            if n == 0 {
                self.eof = true;
            } else {
                self.buf.extend_from_slice(&chunk[..n]);
            }
        }
        Ok(())
    }
}

impl<R: Read> Iterator for Scanner<R> {
    type Item = std::io::Result<Span>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_span()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpeg::header::MpegHeader;

    fn frame_bytes(bitrate_index: u8) -> Vec<u8> {
        let mut header = [0xFFu8, 0xFB, 0x00, 0x00];
        header[2] = (bitrate_index << 4) | (0 << 2); // 44100 Hz
        let decoded = MpegHeader::decode(&header).unwrap();
        let mut frame = header.to_vec();
        frame.resize(decoded.frame_size(), 0xAB);
        frame
    }

    #[test]
    fn splits_junk_and_frames() {
        let mut data = b"junk".to_vec();
        data.extend(frame_bytes(9));
        data.extend(frame_bytes(9));
        data.extend(b"more junk");

        let mut scanner = Scanner::new(std::io::Cursor::new(data));
        let spans: Vec<Span> = std::iter::from_fn(|| scanner.next_span())
            .map(|r| r.unwrap())
            .collect();

        assert!(matches!(&spans[0], Span::Junk(b) if b == b"junk"));
        assert!(matches!(&spans[1], Span::Frame { .. }));
        assert!(matches!(&spans[2], Span::Frame { .. }));
        assert!(matches!(&spans[3], Span::Junk(b) if b == b"more junk"));
    }

    #[test]
    fn skips_id3_container_as_one_junk_span() {
        let mut id3 = b"ID3".to_vec();
        id3.push(4); // version
        id3.push(0); // revision
        id3.push(0); // flags
        // syncsafe size = 20 bytes of payload (could itself contain a false synch)
        id3.extend([0x00, 0x00, 0x00, 20]);
        id3.extend(vec![0xFFu8; 20]); // payload full of false synch bytes

        let mut data = id3.clone();
        data.extend(frame_bytes(9));

        let mut scanner = Scanner::new(std::io::Cursor::new(data));
        let first = scanner.next_span().unwrap().unwrap();
        match first {
            Span::Junk(b) => assert_eq!(b.len(), id3.len()),
            _ => panic!("expected the ID3 container to be emitted as one junk span"),
        }
        let second = scanner.next_span().unwrap().unwrap();
        assert!(matches!(second, Span::Frame { .. }));
    }

    #[test]
    fn skips_id3_container_larger_than_the_scan_buffer() {
        // Payload bigger than MIN_BUF so the container can't be resolved from
        // a single fill; the false-synch bytes inside must still be skipped
        // wholesale rather than re-scanned once the first fill drains past them.
        let payload_len = MIN_BUF * 2;
        let mut id3 = b"ID3".to_vec();
        id3.push(4);
        id3.push(0);
        id3.push(0);
        let size = payload_len as u32;
        id3.extend([
            ((size >> 21) & 0x7F) as u8,
            ((size >> 14) & 0x7F) as u8,
            ((size >> 7) & 0x7F) as u8,
            (size & 0x7F) as u8,
        ]);
        id3.extend(vec![0xFFu8; payload_len]);

        let mut data = id3.clone();
        data.extend(frame_bytes(9));

        let mut scanner = Scanner::new(std::io::Cursor::new(data));
        let first = scanner.next_span().unwrap().unwrap();
        match first {
            Span::Junk(b) => assert_eq!(b.len(), id3.len()),
            _ => panic!("expected the whole oversized ID3 container as one junk span"),
        }
        let second = scanner.next_span().unwrap().unwrap();
        assert!(matches!(second, Span::Frame { .. }));
    }

    #[test]
    fn truncated_trailing_frame_is_emitted_as_junk() {
        let mut full = frame_bytes(9);
        full.truncate(full.len() - 10);
        let mut scanner = Scanner::new(std::io::Cursor::new(full.clone()));
        let span = scanner.next_span().unwrap().unwrap();
        assert!(matches!(span, Span::Junk(b) if b == full));
    }
}

//! Mapping from instruction addresses back to template source.
//!
//! During compilation the map is a plain array parallel to the code buffer:
//! only opcode-start addresses carry a [`SourceSpan`]. For storage the map
//! can be flattened with [`encode`] into a delta-encoded VLQ stream where
//! each entry is 3 VLQ values:
//! - `delta_addr` (unsigned VLQ)
//! - `delta_start` (signed, zigzag + VLQ)
//! - `delta_stop` (signed, zigzag + VLQ)

use std::fmt;

/// A half-open `[start, stop)` range of character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub start: usize,
    pub stop: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }

    pub fn len(&self) -> usize {
        self.stop.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.stop <= self.start
    }

    /// Smallest span covering both.
    pub fn merge(self, other: SourceSpan) -> SourceSpan {
        SourceSpan {
            start: self.start.min(other.start),
            stop: self.stop.max(other.stop),
        }
    }

    /// The covered characters of `text`.
    pub fn slice(&self, text: &str) -> String {
        text.chars().skip(self.start).take(self.len()).collect()
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.stop)
    }
}

/// Span of the last mapped instruction at or before `addr`.
pub fn lookup(map: &[Option<SourceSpan>], addr: usize) -> Option<SourceSpan> {
    let end = addr.saturating_add(1).min(map.len());
    map[..end].iter().rev().find_map(|s| *s)
}

/// Flatten the mapped slots of `map` into a VLQ byte stream.
pub fn encode(map: &[Option<SourceSpan>]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut prev_addr: usize = 0;
    let mut prev_start: i64 = 0;
    let mut prev_stop: i64 = 0;

    for (addr, span) in map.iter().enumerate() {
        let Some(span) = span else { continue };
        let delta_start = span.start as i64 - prev_start;
        let delta_stop = span.stop as i64 - prev_stop;

        encode_unsigned_vlq((addr - prev_addr) as u32, &mut buf);
        encode_unsigned_vlq(zigzag_encode(delta_start), &mut buf);
        encode_unsigned_vlq(zigzag_encode(delta_stop), &mut buf);

        prev_addr = addr;
        prev_start = span.start as i64;
        prev_stop = span.stop as i64;
    }

    buf
}

/// [`lookup`] over a stream produced by [`encode`].
pub fn lookup_encoded(encoded: &[u8], target: usize) -> Option<SourceSpan> {
    let mut pos = 0;
    let mut addr: usize = 0;
    let mut start: i64 = 0;
    let mut stop: i64 = 0;
    let mut best = None;

    while pos < encoded.len() {
        let delta_addr = decode_unsigned_vlq(encoded, &mut pos)?;
        let delta_start =
            zigzag_decode(decode_unsigned_vlq(encoded, &mut pos)?);
        let delta_stop = zigzag_decode(decode_unsigned_vlq(encoded, &mut pos)?);

        addr += delta_addr as usize;
        start += delta_start;
        stop += delta_stop;

        if addr > target {
            break;
        }
        best = Some(SourceSpan::new(start as usize, stop as usize));
    }

    best
}

// ── VLQ helpers ─────────────────────────────────────────────────────

/// Each byte carries 7 data bits plus a continuation bit (MSB).
fn encode_unsigned_vlq(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn decode_unsigned_vlq(encoded: &[u8], pos: &mut usize) -> Option<u32> {
    let mut result: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = *encoded.get(*pos)?;
        *pos += 1;
        result |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            return Some(result);
        }
        shift += 7;
        if shift >= 35 {
            return None;
        }
    }
}

fn zigzag_encode(value: i64) -> u32 {
    ((value << 1) ^ (value >> 63)) as u32
}

fn zigzag_decode(value: u32) -> i64 {
    ((value >> 1) as i64) ^ (-((value & 1) as i64))
}

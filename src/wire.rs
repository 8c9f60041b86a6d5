use serde::Serialize;

// -----------------------------
// Fixed-layout little-endian fields
// -----------------------------
//
// Callers validate the buffer length against the record layout before reading, so the
// offsets below are always in range.

/// Bytes at a known offset whose meaning has not been identified.
///
/// Kept verbatim so records can be re-encoded and compared without guessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpaqueSpan {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl OpaqueSpan {
    pub fn end(&self) -> usize {
        self.offset + self.bytes.len()
    }
}

pub(crate) fn le_u32(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(b)
}

pub(crate) fn le_i32(buf: &[u8], off: usize) -> i32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    i32::from_le_bytes(b)
}

pub(crate) fn le_u64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(b)
}

pub(crate) fn le_f32(buf: &[u8], off: usize) -> f32 {
    // from_bits keeps NaN payloads intact.
    f32::from_bits(le_u32(buf, off))
}

pub(crate) fn le_f32_array<const N: usize>(buf: &[u8], off: usize) -> [f32; N] {
    std::array::from_fn(|i| le_f32(buf, off + i * 4))
}

pub(crate) fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_f32(buf: &mut [u8], off: usize, v: f32) {
    put_u32(buf, off, v.to_bits());
}

/// Copy each `(start, end)` range of `buf` into an [`OpaqueSpan`].
pub(crate) fn opaque_spans(buf: &[u8], ranges: &[(usize, usize)]) -> Vec<OpaqueSpan> {
    ranges
        .iter()
        .map(|&(start, end)| OpaqueSpan {
            offset: start,
            bytes: buf[start..end].to_vec(),
        })
        .collect()
}

/// Decode a buffer of packed little-endian u64 values. Returns `None` if the length is not a
/// multiple of 8.
pub(crate) fn le_u64_seq(buf: &[u8]) -> Option<Vec<u64>> {
    if buf.len() % 8 != 0 {
        return None;
    }
    Some(buf.chunks_exact(8).map(|c| le_u64(c, 0)).collect())
}

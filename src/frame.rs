use serde::Serialize;
use thiserror::Error;

use crate::error::DecodeError;
use crate::wire::{OpaqueSpan, le_i32, le_u32, le_u64, opaque_spans};

/// `total_size` + `payload_size`.
pub const ENVELOPE_LEN: usize = 8;
/// Fixed metadata block following the bitstream.
pub const TRAILER_LEN: usize = 56;
/// Annex-B 4-byte start code.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

// Trailer bytes without a named field: a magic word, three small constants, and two words
// around the frame counters.
const TRAILER_UNKNOWN: [(usize, usize); 3] = [(0x08, 0x18), (0x2C, 0x30), (0x34, 0x38)];

// HEVC parameter sets.
const HEVC_VPS: u8 = 32;
const HEVC_SPS: u8 = 33;
const HEVC_PPS: u8 = 34;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    IFrame,
    KeyFrame,
    Other(i32),
}

impl FrameType {
    pub fn from_raw(v: i32) -> Self {
        match v {
            0 => FrameType::IFrame,
            3 => FrameType::KeyFrame,
            other => FrameType::Other(other),
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            FrameType::IFrame => 0,
            FrameType::KeyFrame => 3,
            FrameType::Other(v) => v,
        }
    }
}

/// Non-fatal findings while decoding a video payload. The frame is still produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameWarning {
    /// `total_size` should equal the payload length minus its own 4 bytes.
    #[error("envelope total_size {declared} != payload length - 4 ({actual})")]
    SizeMismatch { declared: u32, actual: usize },

    #[error("bitstream does not begin with a start code (found {found:02x?})")]
    InvalidStartCode { found: Vec<u8> },

    /// Trailer's embedded size disagrees with the envelope's `payload_size`.
    #[error("trailer size {trailer} != envelope payload_size {envelope}")]
    TrailerSizeMismatch { envelope: u32, trailer: u32 },

    #[error("{count} unexpected bytes after the trailer")]
    TrailingBytes { count: usize },

    #[error("key frame without VPS/SPS/PPS ahead of slice data")]
    MissingParameterSets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Hevc,
    Avc,
}

/// The 56-byte block after each frame's bitstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTrailer {
    pub width: u32,
    pub height: u32,
    pub timestamp_ns: u64,
    pub payload_size: u32,
    pub frame_type: FrameType,
    pub last_keyframe_index: i32,
    pub frame_index: i32,
    pub raw: Vec<OpaqueSpan>,
}

impl FrameTrailer {
    fn decode(buf: &[u8]) -> Self {
        FrameTrailer {
            width: le_u32(buf, 0x00),
            height: le_u32(buf, 0x04),
            timestamp_ns: le_u64(buf, 0x18),
            payload_size: le_u32(buf, 0x20),
            frame_type: FrameType::from_raw(le_i32(buf, 0x24)),
            last_keyframe_index: le_i32(buf, 0x28),
            frame_index: le_i32(buf, 0x30),
            raw: opaque_spans(buf, &TRAILER_UNKNOWN),
        }
    }
}

/// One decoded video-channel message.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub total_size: u32,
    pub payload_size: u32,
    /// Start-code-delimited NAL units, exactly as stored.
    pub nal_bitstream: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ns: u64,
    pub frame_type: FrameType,
    pub frame_index: i32,
    pub last_keyframe_index: i32,
    pub trailer_raw: Vec<OpaqueSpan>,
}

impl VideoFrame {
    pub fn nal_units(&self) -> NalUnits<'_> {
        nal_units(&self.nal_bitstream)
    }

    pub fn codec(&self) -> Codec {
        detect_codec(&self.nal_bitstream)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub frame: VideoFrame,
    pub warnings: Vec<FrameWarning>,
}

/// Decode a video payload: envelope, bitstream, trailer.
///
/// Size inconsistencies are reported as warnings; the envelope's `payload_size` is trusted to
/// locate the trailer. Only a payload too short to hold what it announces is an error.
pub fn decode_frame(payload: &[u8]) -> Result<DecodedFrame, DecodeError> {
    if payload.len() < ENVELOPE_LEN {
        return Err(DecodeError::FrameTooShort { len: payload.len() });
    }

    let mut warnings = Vec::new();

    let total_size = le_u32(payload, 0);
    let payload_size = le_u32(payload, 4);

    let actual = payload.len() - 4;
    if total_size as usize != actual {
        warnings.push(FrameWarning::SizeMismatch {
            declared: total_size,
            actual,
        });
    }

    let bitstream_end = ENVELOPE_LEN.saturating_add(payload_size as usize);
    let needed = bitstream_end.saturating_add(TRAILER_LEN);
    if payload.len() < needed {
        return Err(DecodeError::FrameTruncated {
            needed,
            len: payload.len(),
        });
    }
    if payload.len() > needed {
        warnings.push(FrameWarning::TrailingBytes {
            count: payload.len() - needed,
        });
    }

    let bitstream = &payload[ENVELOPE_LEN..bitstream_end];
    if !bitstream.starts_with(&START_CODE) {
        warnings.push(FrameWarning::InvalidStartCode {
            found: bitstream[..bitstream.len().min(4)].to_vec(),
        });
    }

    let trailer = FrameTrailer::decode(&payload[bitstream_end..needed]);
    if trailer.payload_size != payload_size {
        warnings.push(FrameWarning::TrailerSizeMismatch {
            envelope: payload_size,
            trailer: trailer.payload_size,
        });
    }

    if trailer.frame_type == FrameType::KeyFrame
        && detect_codec(bitstream) == Codec::Hevc
        && !has_leading_parameter_sets(bitstream)
    {
        warnings.push(FrameWarning::MissingParameterSets);
    }

    Ok(DecodedFrame {
        frame: VideoFrame {
            total_size,
            payload_size,
            nal_bitstream: bitstream.to_vec(),
            width: trailer.width,
            height: trailer.height,
            timestamp_ns: trailer.timestamp_ns,
            frame_type: trailer.frame_type,
            frame_index: trailer.frame_index,
            last_keyframe_index: trailer.last_keyframe_index,
            trailer_raw: trailer.raw,
        },
        warnings,
    })
}

// -----------------------------
// Annex-B NAL scanning
// -----------------------------

/// HEVC `nal_unit_type`: bits 1..6 of the first header byte.
pub fn hevc_nal_type(nal: &[u8]) -> Option<u8> {
    nal.first().map(|b| (b >> 1) & 0x3F)
}

// VPS, SPS and PPS must all appear before the first VCL unit (types 0..=31).
fn has_leading_parameter_sets(bitstream: &[u8]) -> bool {
    let (mut vps, mut sps, mut pps) = (false, false, false);
    for nal in nal_units(bitstream) {
        match hevc_nal_type(nal) {
            Some(HEVC_VPS) => vps = true,
            Some(HEVC_SPS) => sps = true,
            Some(HEVC_PPS) => pps = true,
            Some(t) if t < 32 => break,
            _ => {}
        }
    }
    vps && sps && pps
}

/// Sniff HEVC vs AVC from the first NAL header within the leading 128 bytes.
///
/// Ambiguous input is reported as HEVC, which is what the recorder produces.
pub fn detect_codec(bitstream: &[u8]) -> Codec {
    let head = &bitstream[..bitstream.len().min(128)];
    let Some(first) = nal_units(head).next() else {
        return Codec::Hevc;
    };
    let b = first[0];
    if matches!((b & 0x7E) >> 1, HEVC_VPS | HEVC_SPS | HEVC_PPS) {
        Codec::Hevc
    } else if matches!(b & 0x1F, 7 | 8) {
        Codec::Avc
    } else {
        Codec::Hevc
    }
}

/// Iterate the NAL units of an Annex-B bitstream (start codes stripped).
pub fn nal_units(data: &[u8]) -> NalUnits<'_> {
    NalUnits { data, pos: 0 }
}

pub struct NalUnits<'a> {
    data: &'a [u8],
    pos: usize,
}

// Returns (start of the start code, first byte after it). 4-byte codes are reported from
// their leading zero.
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let code_start = if i > from && data[i - 1] == 0 { i - 1 } else { i };
            return Some((code_start, i + 3));
        }
        i += 1;
    }
    None
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        loop {
            let (_, begin) = find_start_code(self.data, self.pos)?;
            let end = find_start_code(self.data, begin)
                .map(|(code_start, _)| code_start)
                .unwrap_or(self.data.len());
            self.pos = end;
            if end > begin {
                return Some(&self.data[begin..end]);
            }
        }
    }
}

use std::io;

use thiserror::Error;

use crate::frame::FrameWarning;
use crate::sensor::SensorVariant;

/// Failure to decode a single container message.
///
/// These are local to one message: a non-strict extraction counts them and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Recording header JSON is unparsable, incomplete, or carries a blob of the wrong size.
    #[error("malformed recording header: {reason}")]
    MalformedHeader { reason: String },

    /// Recording footer JSON is unparsable or not an object.
    #[error("malformed recording footer: {reason}")]
    MalformedFooter { reason: String },

    /// Video payload cannot even hold the 8-byte envelope.
    #[error("video payload too short for envelope: {len} bytes")]
    FrameTooShort { len: usize },

    /// Envelope announces more bitstream than the payload holds (bitstream + 56-byte trailer).
    #[error("video payload truncated: need {needed} bytes, have {len}")]
    FrameTruncated { needed: usize, len: usize },

    /// Sensor payloads are exactly 360 bytes.
    #[error("sensor record must be 360 bytes, got {len}")]
    RecordSize { len: usize },

    /// Discriminant byte is neither the raw nor the integrated marker.
    #[error("unknown sensor discriminant {value:#04x}")]
    UnknownDiscriminant { value: u8 },

    /// Discriminant byte disagrees with the channel the record arrived on.
    #[error("sensor variant mismatch: channel expects {expected:?}, record is {found:?}")]
    VariantMismatch {
        expected: SensorVariant,
        found: SensorVariant,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    /// Passthrough for IO errors (open/read/sink writes).
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The underlying MCAP reader failed.
    #[cfg(feature = "mcap")]
    #[error("container read error: {0}")]
    Container(#[from] mcap::McapError),

    /// A message failed to decode and the failure was escalated (strict mode, or recording
    /// metadata).
    #[error("decode error on {channel} at {timestamp}: {source}")]
    Decode {
        channel: String,
        timestamp: u64,
        #[source]
        source: DecodeError,
    },

    /// A non-fatal frame finding promoted to a failure by strict mode.
    #[error("strict mode: {warning} on {channel} at {timestamp}")]
    Strict {
        channel: String,
        timestamp: u64,
        warning: FrameWarning,
    },

    /// Channel selector did not match any channel in the catalog.
    #[error("channel '{selector}' not found")]
    ChannelNotFound { selector: String },

    /// The container has no summary section (channel catalog / statistics).
    #[error("container has no summary section")]
    MissingSummary,

    /// Camera configuration file is unusable.
    #[error("intrinsics configuration error: {reason}")]
    Intrinsics { reason: String },
}

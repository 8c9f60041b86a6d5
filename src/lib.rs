//! `svo2-extract` recovers video, IMU samples and calibration metadata from SVO2 recordings.
//!
//! An SVO2 file is an MCAP container whose channels carry fixed-layout binary records. This
//! crate classifies each channel by name, decodes its payloads into typed records, and
//! reassembles the camera's H.265 elementary stream.
//!
//! This crate provides:
//! - Standalone decoders for each payload kind ([`decode_header`], [`decode_footer`],
//!   [`decode_frame`], [`decode_sensor`]).
//! - A synchronous iterator-based [`Extractor`] that drives one forward pass, keeps
//!   [`ExtractionStatistics`], and can forward artifacts into [`Sinks`].
//! - A Tokio-based async `Stream` wrapper (enabled by default).
//!
//! ## Quick start
//! - Use [`extract_path`] with a [`Sinks`] holding a `File` for the bitstream and a
//!   [`CsvRecordSink`] for sensor samples.
//! - Or build an extractor over any message stream with [`extractor_from_messages`] and
//!   iterate [`ExtractEvent`]s.
//!
//! ## Features
//! - `mcap` (default): memory-mapped MCAP reader ([`McapFile`]).
//! - `async` (default): Tokio stream helpers.

pub mod error;

pub mod channel;
pub mod frame;
pub mod metadata;
pub mod sensor;
mod wire;

pub mod extract;
pub mod intrinsics;
pub mod sink;
pub mod source;
pub mod stats;

#[cfg(feature = "async")]
pub mod async_extract;

pub use channel::{ChannelRole, RoleCategory, classify};
pub use error::{DecodeError, Error};
pub use extract::{
    ChannelSelector, ExtractEvent, ExtractOptions, ExtractionReport, Extractor,
    extractor_from_messages,
};
pub use frame::{FrameType, FrameWarning, VideoFrame, decode_frame};
pub use metadata::{RecordingFooter, RecordingHeader, decode_footer, decode_header};
pub use sensor::{SensorRecord, SensorVariant, decode_sensor};
pub use sink::{ByteSink, CsvRecordSink, JsonLinesRecordSink, RecordSink, Sinks};
pub use source::{ChannelInfo, ContainerMessage};
pub use stats::{ExtractionStatistics, StatsWarning};
pub use wire::OpaqueSpan;

#[cfg(feature = "mcap")]
pub use extract::extract_path;
#[cfg(feature = "mcap")]
pub use source::{McapFile, McapMessages};

#[cfg(all(feature = "async", feature = "mcap"))]
pub use async_extract::stream_from_path;
#[cfg(feature = "async")]
pub use async_extract::stream_from_messages;

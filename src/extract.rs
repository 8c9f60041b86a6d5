use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::Error;
use crate::channel::{ChannelRole, RoleCategory, classify};
use crate::error::DecodeError;
use crate::frame::{FrameWarning, VideoFrame, decode_frame};
use crate::metadata::{RecordingFooter, RecordingHeader, decode_footer, decode_header};
use crate::sensor::{SensorRecord, decode_sensor};
use crate::sink::Sinks;
use crate::source::{ChannelInfo, ContainerMessage};
use crate::stats::ExtractionStatistics;

/// Which non-metadata channels a pass decodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSelector {
    #[default]
    All,
    /// Exact channel name. Against a catalog, a substring picks the lowest matching id.
    Name(String),
    Id(u16),
    Role(RoleCategory),
}

impl ChannelSelector {
    pub fn matches(&self, id: u16, name: &str, role: &ChannelRole) -> bool {
        match self {
            ChannelSelector::All => true,
            ChannelSelector::Name(s) => name == s,
            ChannelSelector::Id(want) => *want == id,
            ChannelSelector::Role(cat) => role.category() == Some(*cat),
        }
    }

    /// Pin a name or id selector to exactly one catalog channel.
    ///
    /// A name resolves to the lowest-id channel whose topic contains it. An empty catalog
    /// leaves the selector unchanged.
    pub fn resolve(&self, catalog: &[ChannelInfo]) -> Result<ChannelSelector, Error> {
        if catalog.is_empty() {
            return Ok(self.clone());
        }
        let found = match self {
            ChannelSelector::All | ChannelSelector::Role(_) => return Ok(self.clone()),
            ChannelSelector::Name(s) => catalog
                .iter()
                .filter(|c| c.topic.contains(s.as_str()))
                .min_by_key(|c| c.id),
            ChannelSelector::Id(id) => catalog.iter().find(|c| c.id == *id),
        };
        match found {
            Some(c) => {
                debug!(selector = %self, id = c.id, topic = %c.topic, "resolved selector");
                Ok(ChannelSelector::Id(c.id))
            }
            None => Err(Error::ChannelNotFound {
                selector: self.to_string(),
            }),
        }
    }
}

impl FromStr for ChannelSelector {
    type Err = std::convert::Infallible;

    /// A bare number selects by channel id, anything else by name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<u16>() {
            Ok(id) => ChannelSelector::Id(id),
            Err(_) => ChannelSelector::Name(s.to_string()),
        })
    }
}

impl std::fmt::Display for ChannelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelSelector::All => write!(f, "*"),
            ChannelSelector::Name(s) => write!(f, "{s}"),
            ChannelSelector::Id(id) => write!(f, "#{id}"),
            ChannelSelector::Role(r) => write!(f, "{r:?}"),
        }
    }
}

/// Pass configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    pub selector: ChannelSelector,
    /// Abort on the first decode error or frame warning.
    pub strict: bool,
}

impl ExtractOptions {
    pub fn selector(mut self, selector: ChannelSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// A decoded artifact, in container order.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractEvent {
    Header(RecordingHeader),
    Footer(RecordingFooter),
    Frame {
        channel: Arc<str>,
        serial: u32,
        frame: VideoFrame,
        warnings: Vec<FrameWarning>,
    },
    Sensor {
        channel: Arc<str>,
        serial: u32,
        record: SensorRecord,
    },
}

/// Header or footer message that failed to decode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataFailure {
    pub channel: String,
    pub timestamp: u64,
    pub reason: String,
}

/// Outcome of [`Extractor::run`].
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub stats: ExtractionStatistics,
    pub header: Option<RecordingHeader>,
    #[serde(skip)]
    pub footer: Option<RecordingFooter>,
    pub metadata_errors: Vec<MetadataFailure>,
}

struct ChannelEntry {
    name: Arc<str>,
    role: ChannelRole,
}

/// Single forward pass over a container message stream.
///
/// Iterating yields decoded events. Per-message decode failures are counted in the statistics
/// and skipped; they only surface as `Err` items in strict mode, after which iteration stops.
/// Header and footer failures are always surfaced, since the cross-checks depend on them, but
/// a non-strict pass keeps going afterwards. Container read errors end the pass.
pub struct Extractor<I> {
    messages: I,
    options: ExtractOptions,
    catalog: Vec<ChannelInfo>,
    channels: HashMap<String, ChannelEntry>,
    stats: ExtractionStatistics,
    header: Option<RecordingHeader>,
    footer: Option<RecordingFooter>,
    metadata_errors: Vec<MetadataFailure>,
    finished: bool,
}

/// Create an extractor over any container message stream.
pub fn extractor_from_messages<'a, I>(
    messages: I,
    options: ExtractOptions,
) -> Extractor<I::IntoIter>
where
    I: IntoIterator<Item = Result<ContainerMessage<'a>, Error>>,
{
    Extractor {
        messages: messages.into_iter(),
        options,
        catalog: Vec::new(),
        channels: HashMap::new(),
        stats: ExtractionStatistics::default(),
        header: None,
        footer: None,
        metadata_errors: Vec::new(),
        finished: false,
    }
}

impl<I> Extractor<I> {
    /// Attach the container's channel catalog for end-of-pass count checks.
    ///
    /// Name and id selectors are resolved against it; one that matches no channel is kept
    /// as given.
    pub fn with_catalog(mut self, catalog: Vec<ChannelInfo>) -> Self {
        match self.options.selector.resolve(&catalog) {
            Ok(selector) => self.options.selector = selector,
            Err(e) => warn!(error = %e, "selector not resolved against catalog"),
        }
        self.catalog = catalog;
        self
    }

    pub fn stats(&self) -> &ExtractionStatistics {
        &self.stats
    }

    pub fn header(&self) -> Option<&RecordingHeader> {
        self.header.as_ref()
    }

    pub fn footer(&self) -> Option<&RecordingFooter> {
        self.footer.as_ref()
    }

    pub fn into_report(self) -> ExtractionReport {
        ExtractionReport {
            stats: self.stats,
            header: self.header,
            footer: self.footer,
            metadata_errors: self.metadata_errors,
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let roles: HashMap<String, ChannelRole> = self
            .channels
            .iter()
            .map(|(name, entry)| (name.clone(), entry.role))
            .collect();
        self.stats.finish(
            &roles,
            self.header.as_ref(),
            self.footer.as_ref(),
            &self.catalog,
        );

        info!(
            messages = self.stats.total_messages(),
            frames = self.stats.frames_decoded,
            sensor_records = self.stats.sensor_records_decoded,
            errors = self.stats.decode_error_count,
            warnings = self.stats.decode_warning_count,
            cross_check_warnings = self.stats.warnings.len(),
            "extraction pass complete"
        );
    }

    fn entry(&mut self, name: &str) -> (Arc<str>, ChannelRole) {
        if let Some(e) = self.channels.get(name) {
            return (e.name.clone(), e.role);
        }
        let role = classify(name);
        debug!(channel = name, ?role, "classified channel");
        let entry = ChannelEntry {
            name: Arc::from(name),
            role,
        };
        let out = (entry.name.clone(), role);
        self.channels.insert(name.to_string(), entry);
        out
    }

    // Count and log a per-message failure; only strict mode turns it into an `Err` item.
    fn reject(
        &mut self,
        channel: &str,
        timestamp: u64,
        source: DecodeError,
    ) -> Result<Option<ExtractEvent>, Error> {
        self.stats.decode_error_count += 1;
        warn!(channel, timestamp, error = %source, "skipping message");
        if self.options.strict {
            return Err(Error::Decode {
                channel: channel.to_string(),
                timestamp,
                source,
            });
        }
        Ok(None)
    }

    fn reject_metadata(&mut self, channel: &str, timestamp: u64, source: DecodeError) -> Error {
        self.stats.decode_error_count += 1;
        error!(channel, timestamp, error = %source, "recording metadata not decodable");
        self.metadata_errors.push(MetadataFailure {
            channel: channel.to_string(),
            timestamp,
            reason: source.to_string(),
        });
        Error::Decode {
            channel: channel.to_string(),
            timestamp,
            source,
        }
    }

    fn process(&mut self, msg: ContainerMessage<'_>) -> Result<Option<ExtractEvent>, Error> {
        let (channel, role) = self.entry(&msg.channel_name);
        self.stats.record_message(&channel, msg.timestamp);

        if !role.is_metadata()
            && !self
                .options
                .selector
                .matches(msg.channel_id, &channel, &role)
        {
            self.stats.skipped_message_count += 1;
            return Ok(None);
        }

        match role {
            ChannelRole::Header => match decode_header(&msg.payload) {
                Ok(header) => {
                    if self.header.is_some() {
                        warn!(
                            timestamp = msg.timestamp,
                            "duplicate recording header, keeping the latest"
                        );
                    }
                    self.header = Some(header.clone());
                    Ok(Some(ExtractEvent::Header(header)))
                }
                Err(e) => Err(self.reject_metadata(&channel, msg.timestamp, e)),
            },
            ChannelRole::Footer => match decode_footer(&msg.payload) {
                Ok(footer) => {
                    self.footer = Some(footer.clone());
                    Ok(Some(ExtractEvent::Footer(footer)))
                }
                Err(e) => Err(self.reject_metadata(&channel, msg.timestamp, e)),
            },
            ChannelRole::Video { serial } => {
                let decoded = match decode_frame(&msg.payload) {
                    Ok(d) => d,
                    Err(e) => return self.reject(&channel, msg.timestamp, e),
                };

                for w in &decoded.warnings {
                    self.stats.decode_warning_count += 1;
                    warn!(
                        channel = %channel,
                        timestamp = msg.timestamp,
                        warning = %w,
                        "video frame"
                    );
                    if self.options.strict {
                        return Err(Error::Strict {
                            channel: channel.to_string(),
                            timestamp: msg.timestamp,
                            warning: w.clone(),
                        });
                    }
                }

                let frame = decoded.frame;
                if let Some(h) = &self.header {
                    let (w, hgt) = (h.geometry.width, h.geometry.height);
                    // Side-by-side frames may carry the doubled width.
                    let matches = frame.height == hgt
                        && (frame.width == w || frame.width == w.saturating_mul(2));
                    if !matches {
                        self.stats.note_dimension_mismatch(&channel);
                    }
                }
                if !self.stats.check_frame_order(&channel, frame.timestamp_ns) {
                    debug!(
                        channel = %channel,
                        ts = frame.timestamp_ns,
                        "frame timestamp not increasing"
                    );
                }

                self.stats.frames_decoded += 1;
                self.stats.bitstream_bytes += frame.nal_bitstream.len() as u64;
                Ok(Some(ExtractEvent::Frame {
                    channel,
                    serial,
                    frame,
                    warnings: decoded.warnings,
                }))
            }
            ChannelRole::Sensors { serial, .. } => {
                let Some(expected) = role.sensor_variant() else {
                    return Ok(None);
                };
                let record = match decode_sensor(&msg.payload, expected) {
                    Ok(r) => r,
                    Err(e) => return self.reject(&channel, msg.timestamp, e),
                };
                if record.timestamp_unix_ns != msg.timestamp {
                    self.stats.note_sensor_timestamp_mismatch(&channel);
                    debug!(
                        channel = %channel,
                        container = msg.timestamp,
                        record = record.timestamp_unix_ns,
                        "sensor timestamp differs from container timestamp"
                    );
                }
                self.stats.sensor_records_decoded += 1;
                Ok(Some(ExtractEvent::Sensor {
                    channel,
                    serial,
                    record,
                }))
            }
            ChannelRole::Unknown => {
                self.stats.unknown_channel_count += 1;
                debug!(channel = %channel, "unknown channel skipped");
                Ok(None)
            }
        }
    }
}

impl<'a, I> Extractor<I>
where
    I: Iterator<Item = Result<ContainerMessage<'a>, Error>>,
{
    /// Pull the next event (convenience wrapper around `Iterator::next`).
    pub fn next_event(&mut self) -> Result<Option<ExtractEvent>, Error> {
        self.next().transpose()
    }

    /// Drive the whole pass, forwarding frames and sensor records to `sinks`.
    ///
    /// Sink write failures always abort. Metadata failures are collected in the report
    /// unless the pass is strict.
    pub fn run(mut self, sinks: &mut Sinks<'_>) -> Result<ExtractionReport, Error> {
        loop {
            match self.next_event() {
                Ok(None) => break,
                Ok(Some(ExtractEvent::Frame { channel, frame, .. })) => {
                    if let Some(sink) = sinks.video.as_deref_mut() {
                        sink.write_fragment(&channel, &frame.nal_bitstream)?;
                    }
                }
                Ok(Some(ExtractEvent::Sensor {
                    channel, record, ..
                })) => {
                    if let Some(sink) = sinks.sensors.as_deref_mut() {
                        sink.write_record(&channel, &record)?;
                    }
                }
                Ok(Some(ExtractEvent::Header(_) | ExtractEvent::Footer(_))) => {}
                Err(Error::Decode { .. }) if !self.options.strict => {}
                Err(e) => return Err(e),
            }
        }
        if let Some(sink) = sinks.sensors.as_deref_mut() {
            sink.finish()?;
        }
        Ok(self.into_report())
    }
}

impl<'a, I> Iterator for Extractor<I>
where
    I: Iterator<Item = Result<ContainerMessage<'a>, Error>>,
{
    type Item = Result<ExtractEvent, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let msg = match self.messages.next() {
                None => {
                    self.finish();
                    return None;
                }
                Some(Err(e)) => {
                    error!(error = %e, "container read failed");
                    self.finished = true;
                    return Some(Err(e));
                }
                Some(Ok(msg)) => msg,
            };

            match self.process(msg) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => continue,
                Err(e) => {
                    if self.options.strict {
                        self.finished = true;
                    }
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Run a complete pass over an MCAP file on disk.
#[cfg(feature = "mcap")]
pub fn extract_path(
    path: impl AsRef<std::path::Path>,
    options: ExtractOptions,
    sinks: &mut Sinks<'_>,
) -> Result<ExtractionReport, Error> {
    let file = crate::source::McapFile::open(path)?;
    let catalog = file.catalog_if_present()?;
    let selector = options.selector.resolve(&catalog)?;
    extractor_from_messages(file.messages()?, options.selector(selector))
        .with_catalog(catalog)
        .run(sinks)
}

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::warn;

use crate::channel::ChannelRole;
use crate::metadata::{RecordingFooter, RecordingHeader};
use crate::source::ChannelInfo;

/// End-of-pass consistency findings. None of these stop an extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatsWarning {
    /// Observed message count differs from the footer's timestamp array length.
    FooterCountMismatch {
        channel: String,
        observed: u64,
        footer: u64,
    },
    /// Footer timestamps differ from the decoded frame trailer timestamps, compared by
    /// position when both arrays have the same length.
    FooterTimestampMismatch {
        channel: String,
        first_index: u64,
        frames: u64,
    },
    /// Observed message count differs from the container catalog.
    CatalogCountMismatch {
        channel: String,
        observed: u64,
        declared: u64,
    },
    /// Serial embedded in the channel name differs from the header's.
    SerialMismatch {
        channel: String,
        channel_serial: u32,
        header_serial: u32,
    },
    /// Frames whose trailer dimensions disagree with the header.
    DimensionMismatch { channel: String, frames: u64 },
    /// Frames whose trailer timestamp did not increase.
    NonMonotonicTimestamps { channel: String, frames: u64 },
    /// Sensor records whose embedded Unix timestamp differs from the container's.
    SensorTimestampMismatch { channel: String, records: u64 },
}

#[derive(Debug, Clone, Default)]
struct ChannelChecks {
    last_frame_ts: Option<u64>,
    frame_timestamps: Vec<u64>,
    dimension_mismatches: u64,
    non_monotonic: u64,
    timestamp_mismatches: u64,
}

/// Accumulator for a single extraction pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionStatistics {
    /// Every message seen, by channel name, whether decoded or skipped.
    pub per_channel_message_count: BTreeMap<String, u64>,
    pub start_timestamp: Option<u64>,
    pub end_timestamp: Option<u64>,
    pub decode_error_count: u64,
    pub decode_warning_count: u64,
    /// Messages not decoded because the selector excluded them.
    pub skipped_message_count: u64,
    pub unknown_channel_count: u64,
    pub frames_decoded: u64,
    pub sensor_records_decoded: u64,
    pub bitstream_bytes: u64,
    pub warnings: Vec<StatsWarning>,
    #[serde(skip)]
    checks: HashMap<String, ChannelChecks>,
}

impl ExtractionStatistics {
    pub fn message_count(&self, channel: &str) -> u64 {
        self.per_channel_message_count
            .get(channel)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_messages(&self) -> u64 {
        self.per_channel_message_count.values().sum()
    }

    pub(crate) fn record_message(&mut self, channel: &str, timestamp: u64) {
        match self.per_channel_message_count.get_mut(channel) {
            Some(n) => *n += 1,
            None => {
                self.per_channel_message_count.insert(channel.to_string(), 1);
            }
        }
        self.start_timestamp = Some(self.start_timestamp.map_or(timestamp, |s| s.min(timestamp)));
        self.end_timestamp = Some(self.end_timestamp.map_or(timestamp, |e| e.max(timestamp)));
    }

    fn checks_mut(&mut self, channel: &str) -> &mut ChannelChecks {
        self.checks.entry(channel.to_string()).or_default()
    }

    /// Track trailer timestamp ordering; returns false if it went backwards or repeated.
    pub(crate) fn check_frame_order(&mut self, channel: &str, timestamp_ns: u64) -> bool {
        let checks = self.checks_mut(channel);
        let ordered = checks.last_frame_ts.is_none_or(|prev| timestamp_ns > prev);
        if !ordered {
            checks.non_monotonic += 1;
        }
        checks.last_frame_ts = Some(timestamp_ns);
        checks.frame_timestamps.push(timestamp_ns);
        ordered
    }

    pub(crate) fn note_dimension_mismatch(&mut self, channel: &str) {
        self.checks_mut(channel).dimension_mismatches += 1;
    }

    pub(crate) fn note_sensor_timestamp_mismatch(&mut self, channel: &str) {
        self.checks_mut(channel).timestamp_mismatches += 1;
    }

    /// Run the end-of-pass cross-checks and append their findings to `warnings`.
    pub(crate) fn finish(
        &mut self,
        roles: &HashMap<String, ChannelRole>,
        header: Option<&RecordingHeader>,
        footer: Option<&RecordingFooter>,
        catalog: &[ChannelInfo],
    ) {
        let mut found = Vec::new();

        if let Some(footer) = footer {
            for (channel, timestamps) in &footer.timestamps {
                let observed = self.message_count(channel);
                let expected = timestamps.len() as u64;
                if observed != expected {
                    found.push(StatsWarning::FooterCountMismatch {
                        channel: channel.clone(),
                        observed,
                        footer: expected,
                    });
                }

                let frames = self
                    .checks
                    .get(channel)
                    .map(|c| c.frame_timestamps.as_slice())
                    .unwrap_or_default();
                if frames.len() != timestamps.len() {
                    continue;
                }
                let mut differing = timestamps
                    .iter()
                    .zip(frames)
                    .enumerate()
                    .filter(|(_, (footer_ts, frame_ts))| footer_ts != frame_ts)
                    .map(|(i, _)| i as u64);
                if let Some(first_index) = differing.next() {
                    found.push(StatsWarning::FooterTimestampMismatch {
                        channel: channel.clone(),
                        first_index,
                        frames: 1 + differing.count() as u64,
                    });
                }
            }
        }

        for info in catalog {
            if let Some(declared) = info.message_count {
                let observed = self.message_count(&info.topic);
                if observed != declared {
                    found.push(StatsWarning::CatalogCountMismatch {
                        channel: info.topic.clone(),
                        observed,
                        declared,
                    });
                }
            }
        }

        if let Some(header) = header {
            let header_serial = header.geometry.serial_number;
            let mut mismatched: Vec<_> = roles
                .iter()
                .filter_map(|(name, role)| role.serial().map(|s| (name, s)))
                .filter(|(_, s)| *s != header_serial)
                .collect();
            mismatched.sort();
            for (channel, channel_serial) in mismatched {
                found.push(StatsWarning::SerialMismatch {
                    channel: channel.clone(),
                    channel_serial,
                    header_serial,
                });
            }
        }

        let mut channels: Vec<_> = self.checks.iter().collect();
        channels.sort_by(|a, b| a.0.cmp(b.0));
        for (channel, c) in channels {
            if c.dimension_mismatches > 0 {
                found.push(StatsWarning::DimensionMismatch {
                    channel: channel.clone(),
                    frames: c.dimension_mismatches,
                });
            }
            if c.non_monotonic > 0 {
                found.push(StatsWarning::NonMonotonicTimestamps {
                    channel: channel.clone(),
                    frames: c.non_monotonic,
                });
            }
            if c.timestamp_mismatches > 0 {
                found.push(StatsWarning::SensorTimestampMismatch {
                    channel: channel.clone(),
                    records: c.timestamp_mismatches,
                });
            }
        }

        for w in &found {
            warn!(warning = ?w, "statistics cross-check");
        }
        self.warnings.extend(found);
    }
}

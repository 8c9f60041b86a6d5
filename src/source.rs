//! The seam to the generic message container.
//!
//! The extractor only needs an ordered stream of [`ContainerMessage`]s and, optionally, a
//! channel catalog. [`McapFile`] provides both for MCAP files; anything else can feed the
//! extractor by producing the same iterator.

use std::borrow::Cow;

use serde::Serialize;

use crate::Error;

/// One (channel, timestamp, payload) tuple from the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerMessage<'a> {
    pub channel_id: u16,
    pub channel_name: Cow<'a, str>,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: u64,
    pub payload: Cow<'a, [u8]>,
}

impl ContainerMessage<'static> {
    /// Owned message, mostly for synthetic streams.
    pub fn owned(
        channel_id: u16,
        channel_name: impl Into<String>,
        timestamp: u64,
        payload: Vec<u8>,
    ) -> Self {
        ContainerMessage {
            channel_id,
            channel_name: Cow::Owned(channel_name.into()),
            timestamp,
            payload: Cow::Owned(payload),
        }
    }
}

/// Catalog entry for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub id: u16,
    pub topic: String,
    pub encoding: String,
    /// Declared number of messages, when the container records it.
    pub message_count: Option<u64>,
}

/// File-level statistics from the container summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceStatistics {
    pub message_count: Option<u64>,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
}

#[cfg(feature = "mcap")]
pub use self::mcap_file::{McapFile, McapMessages};

#[cfg(feature = "mcap")]
mod mcap_file {
    use std::borrow::Cow;
    use std::fs::File;
    use std::path::Path;

    use memmap2::Mmap;
    use tracing::debug;

    use crate::Error;
    use super::{ChannelInfo, ContainerMessage, SourceStatistics};

    /// A memory-mapped MCAP recording.
    pub struct McapFile {
        mmap: Mmap,
    }

    impl McapFile {
        pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
            let path = path.as_ref();
            let file = File::open(path)?;
            // The mapping is read-only and lives as long as `self`.
            let mmap = unsafe { Mmap::map(&file)? };
            debug!(path = %path.display(), len = mmap.len(), "mapped container");
            Ok(McapFile { mmap })
        }

        /// Channels sorted by id, with declared message counts when present.
        pub fn catalog(&self) -> Result<Vec<ChannelInfo>, Error> {
            let summary =
                mcap::read::Summary::read(&self.mmap)?.ok_or(Error::MissingSummary)?;
            let mut channels: Vec<ChannelInfo> = summary
                .channels
                .iter()
                .map(|(id, ch)| ChannelInfo {
                    id: *id,
                    topic: ch.topic.clone(),
                    encoding: ch.message_encoding.clone(),
                    message_count: summary
                        .stats
                        .as_ref()
                        .and_then(|s| s.channel_message_counts.get(id).copied()),
                })
                .collect();
            channels.sort_by_key(|c| c.id);
            Ok(channels)
        }

        pub fn statistics(&self) -> Result<SourceStatistics, Error> {
            let summary =
                mcap::read::Summary::read(&self.mmap)?.ok_or(Error::MissingSummary)?;
            Ok(summary
                .stats
                .map(|s| SourceStatistics {
                    message_count: Some(s.message_count),
                    start_time: Some(s.message_start_time),
                    end_time: Some(s.message_end_time),
                })
                .unwrap_or_default())
        }

        /// Like [`McapFile::catalog`], but a file without a summary yields an empty catalog.
        pub fn catalog_if_present(&self) -> Result<Vec<ChannelInfo>, Error> {
            match self.catalog() {
                Err(Error::MissingSummary) => {
                    debug!("no summary section, running without a catalog");
                    Ok(Vec::new())
                }
                other => other,
            }
        }

        /// Lazily iterate all messages in file order. Payloads borrow from the mapping.
        pub fn messages(&self) -> Result<McapMessages<'_>, Error> {
            Ok(McapMessages {
                stream: mcap::read::RawMessageStream::new(&self.mmap)?,
            })
        }
    }

    /// Messages of a [`McapFile`], tagged with the channel id from the record header.
    pub struct McapMessages<'a> {
        stream: mcap::read::RawMessageStream<'a>,
    }

    impl<'a> Iterator for McapMessages<'a> {
        type Item = Result<ContainerMessage<'a>, Error>;

        fn next(&mut self) -> Option<Self::Item> {
            let raw = match self.stream.next()? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(e.into())),
            };
            let id = raw.header.channel_id;
            let Some(channel) = self.stream.get_channel(id) else {
                return Some(Err(
                    mcap::McapError::UnknownChannel(raw.header.sequence, id).into()
                ));
            };
            Some(Ok(ContainerMessage {
                channel_id: id,
                channel_name: Cow::Owned(channel.topic.clone()),
                timestamp: raw.header.log_time,
                payload: raw.data,
            }))
        }
    }
}

#![cfg(feature = "mcap")]

mod common;

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::*;
use svo2_extract::sensor::SensorVariant;
use svo2_extract::{
    ChannelSelector, ContainerMessage, Error, ExtractOptions, McapFile, SensorRecord, Sinks,
    StatsWarning, extract_path, extractor_from_messages,
};

/// Header, three frames, footer, two raw sensor samples and one integrated sample.
/// Channel ids follow first appearance: header 0, video 1, footer 2, sensors 3, integrated 4.
fn messages() -> Vec<ContainerMessage<'static>> {
    let mut msgs = recording();
    msgs.push(msg(3, SENSORS, T0 + 5, sensor_payload(SensorVariant::Raw, T0 + 5)));
    msgs.push(msg(3, SENSORS, T0 + 6, sensor_payload(SensorVariant::Raw, T0 + 6)));
    msgs.push(msg(4, INTEGRATED, T0 + 7, sensor_payload(SensorVariant::Integrated, T0 + 7)));
    msgs
}

fn write_mcap(path: &Path, options: mcap::WriteOptions, msgs: &[ContainerMessage<'_>]) {
    let out = BufWriter::new(File::create(path).unwrap());
    let mut writer = options.create(out).unwrap();
    let mut channels: HashMap<String, Arc<mcap::Channel<'static>>> = HashMap::new();
    for (sequence, m) in msgs.iter().enumerate() {
        let channel = channels
            .entry(m.channel_name.to_string())
            .or_insert_with(|| {
                Arc::new(mcap::Channel {
                    topic: m.channel_name.to_string(),
                    schema: None,
                    message_encoding: String::new(),
                    metadata: BTreeMap::new(),
                })
            })
            .clone();
        writer
            .write(&mcap::Message {
                channel,
                sequence: sequence as u32,
                log_time: m.timestamp,
                publish_time: m.timestamp,
                data: Cow::Owned(m.payload.to_vec()),
            })
            .unwrap();
    }
    writer.finish().unwrap();
}

fn recording_file(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("recording.svo2");
    write_mcap(&path, mcap::WriteOptions::new(), &messages());
    path
}

#[test]
fn catalog_lists_channels_with_counts() {
    let dir = tempfile::tempdir().unwrap();
    let file = McapFile::open(recording_file(&dir)).unwrap();

    let catalog = file.catalog().unwrap();
    let listed: Vec<(u16, &str, Option<u64>)> = catalog
        .iter()
        .map(|c| (c.id, c.topic.as_str(), c.message_count))
        .collect();
    assert_eq!(
        listed,
        vec![
            (0, "svo_header", Some(1)),
            (1, VIDEO, Some(3)),
            (2, "svo_footer", Some(1)),
            (3, SENSORS, Some(2)),
            (4, INTEGRATED, Some(1)),
        ]
    );
    assert_eq!(file.catalog_if_present().unwrap(), catalog);

    let stats = file.statistics().unwrap();
    assert_eq!(stats.message_count, Some(8));
    assert_eq!(stats.start_time, Some(T0));
    assert_eq!(stats.end_time, Some(T0 + 70_000_000));
}

#[test]
fn messages_carry_container_channel_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flat.svo2");
    // Unchunked files put channel records inline with the messages.
    write_mcap(&path, mcap::WriteOptions::new().use_chunks(false), &messages());
    let file = McapFile::open(&path).unwrap();

    let read: Vec<ContainerMessage<'_>> = file
        .messages()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let ids: Vec<(u16, &str)> = read
        .iter()
        .map(|m| (m.channel_id, m.channel_name.as_ref()))
        .collect();
    assert_eq!(ids[0], (0, "svo_header"));
    assert_eq!(ids[1], (1, VIDEO));
    assert_eq!(ids[4], (2, "svo_footer"));
    assert_eq!(ids[7], (4, INTEGRATED));

    let original = messages();
    assert_eq!(read.len(), original.len());
    for (got, want) in read.iter().zip(&original) {
        assert_eq!(got.timestamp, want.timestamp);
        assert_eq!(got.payload, want.payload);
    }
}

#[test]
fn extract_path_reassembles_the_recording() {
    let dir = tempfile::tempdir().unwrap();
    let path = recording_file(&dir);

    let mut video: Vec<u8> = Vec::new();
    let mut records: Vec<SensorRecord> = Vec::new();
    let report = {
        let mut sinks = Sinks::default().video(&mut video).sensors(&mut records);
        extract_path(&path, ExtractOptions::default(), &mut sinks).unwrap()
    };

    let mut expected = key_bitstream();
    expected.extend(delta_bitstream(1));
    expected.extend(delta_bitstream(2));
    assert_eq!(video, expected);
    assert_eq!(records.len(), 3);
    assert_eq!(report.stats.frames_decoded, 3);
    assert_eq!(report.stats.total_messages(), 8);
    assert!(report.stats.warnings.is_empty(), "{:?}", report.stats.warnings);
    assert_eq!(report.header.unwrap().geometry.serial_number, SERIAL);
}

fn selected(path: &Path, selector: ChannelSelector) -> Result<Vec<SensorRecord>, Error> {
    let mut records: Vec<SensorRecord> = Vec::new();
    {
        let mut sinks = Sinks::default().sensors(&mut records);
        extract_path(path, ExtractOptions::default().selector(selector), &mut sinks)?;
    }
    Ok(records)
}

#[test]
fn selectors_pick_one_channel() {
    let dir = tempfile::tempdir().unwrap();
    let path = recording_file(&dir);

    let records = selected(&path, ChannelSelector::Id(4)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].variant, SensorVariant::Integrated);

    // Both sensor topics contain "sensors"; the lower id wins.
    let records = selected(&path, ChannelSelector::Name("sensors".into())).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.variant == SensorVariant::Raw));

    let records = selected(&path, ChannelSelector::Name(INTEGRATED.into())).unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn unknown_selectors_fail_before_the_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = recording_file(&dir);

    for selector in [ChannelSelector::Name("depth".into()), ChannelSelector::Id(9)] {
        let err = selected(&path, selector.clone()).unwrap_err();
        assert!(
            matches!(&err, Error::ChannelNotFound { selector: s } if *s == selector.to_string()),
            "{err:?}"
        );
    }
}

#[test]
fn truncated_pass_disagrees_with_the_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let file = McapFile::open(recording_file(&dir)).unwrap();
    let catalog = file.catalog().unwrap();

    // Stop after the first raw sensor sample.
    let messages = file.messages().unwrap().take(6);
    let report = extractor_from_messages(messages, ExtractOptions::default())
        .with_catalog(catalog)
        .run(&mut Sinks::default())
        .unwrap();

    let w = &report.stats.warnings;
    assert!(w.contains(&StatsWarning::CatalogCountMismatch {
        channel: SENSORS.to_string(),
        observed: 1,
        declared: 2,
    }));
    assert!(w.contains(&StatsWarning::CatalogCountMismatch {
        channel: INTEGRATED.to_string(),
        observed: 0,
        declared: 1,
    }));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = McapFile::open(dir.path().join("absent.svo2")).err().unwrap();
    assert!(matches!(err, Error::Io(_)));
}

#[cfg(feature = "async")]
#[tokio::test]
async fn stream_from_path_reports_unknown_selector() {
    use tokio_stream::StreamExt;

    let dir = tempfile::tempdir().unwrap();
    let path = recording_file(&dir);

    let options = ExtractOptions::default().selector(ChannelSelector::Id(9));
    let items: Vec<_> = svo2_extract::stream_from_path(&path, options, 4)
        .collect()
        .await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(Error::ChannelNotFound { .. })));

    let options = ExtractOptions::default().selector(ChannelSelector::Name("sensors".into()));
    let sensors: Vec<_> = svo2_extract::stream_from_path(&path, options, 4)
        .filter(|item| matches!(item, Ok(svo2_extract::ExtractEvent::Sensor { .. })))
        .collect()
        .await;
    assert_eq!(sensors.len(), 2);
}

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use svo2_extract::ContainerMessage;
use svo2_extract::frame::{ENVELOPE_LEN, TRAILER_LEN};
use svo2_extract::sensor::{SENSOR_RECORD_LEN, SensorVariant};

pub const SERIAL: u32 = 40735594;
pub const VIDEO: &str = "Camera_SN40735594/side_by_side";
pub const SENSORS: &str = "Camera_SN40735594/sensors";
pub const INTEGRATED: &str = "Camera_SN40735594/integrated_sensors";

pub fn header_struct(width: u32, height: u32, serial: u32) -> Vec<u8> {
    let mut b = vec![0u8; 0x80];
    b[0x00..0x04].copy_from_slice(&width.to_le_bytes());
    b[0x04..0x08].copy_from_slice(&height.to_le_bytes());
    b[0x08..0x0C].copy_from_slice(&serial.to_le_bytes());
    b[0x0C..0x10].copy_from_slice(&30u32.to_le_bytes());
    b
}

pub fn header_payload(width: u32, height: u32, serial: u32) -> Vec<u8> {
    let calib = BASE64.encode([0u8; 72]);
    serde_json::json!({
        "header": BASE64.encode(header_struct(width, height, serial)),
        "Calib_acc": calib,
        "Calib_gyro": calib,
        "imu_frequency_hz": 400.0,
        "zed_sdk_version": "4.1.0",
    })
    .to_string()
    .into_bytes()
}

pub fn footer_payload(channel: &str, timestamps: &[u64]) -> Vec<u8> {
    let raw: Vec<u8> = timestamps.iter().flat_map(|t| t.to_le_bytes()).collect();
    serde_json::json!({ channel: BASE64.encode(raw) })
        .to_string()
        .into_bytes()
}

/// Key frame bitstream: VPS, SPS, PPS, IDR slice.
pub fn key_bitstream() -> Vec<u8> {
    let mut b = Vec::new();
    for nal in [
        &[0x40, 0x01, 0x0C][..],
        &[0x42, 0x01, 0x01],
        &[0x44, 0x01, 0xC1],
        &[0x26, 0x01, 0xAF, 0x10],
    ] {
        b.extend_from_slice(&[0, 0, 0, 1]);
        b.extend_from_slice(nal);
    }
    b
}

/// Trailing (non-key) slice.
pub fn delta_bitstream(tag: u8) -> Vec<u8> {
    vec![0, 0, 0, 1, 0x02, 0x01, tag, tag]
}

pub fn frame_payload(
    bitstream: &[u8],
    width: u32,
    height: u32,
    timestamp: u64,
    frame_type: i32,
    frame_index: i32,
) -> Vec<u8> {
    let payload_size = bitstream.len() as u32;
    let total = (4 + bitstream.len() + TRAILER_LEN) as u32;

    let mut b = Vec::with_capacity(ENVELOPE_LEN + bitstream.len() + TRAILER_LEN);
    b.extend_from_slice(&total.to_le_bytes());
    b.extend_from_slice(&payload_size.to_le_bytes());
    b.extend_from_slice(bitstream);

    let mut t = [0u8; TRAILER_LEN];
    t[0x00..0x04].copy_from_slice(&width.to_le_bytes());
    t[0x04..0x08].copy_from_slice(&height.to_le_bytes());
    t[0x18..0x20].copy_from_slice(&timestamp.to_le_bytes());
    t[0x20..0x24].copy_from_slice(&payload_size.to_le_bytes());
    t[0x24..0x28].copy_from_slice(&frame_type.to_le_bytes());
    t[0x30..0x34].copy_from_slice(&frame_index.to_le_bytes());
    b.extend_from_slice(&t);
    b
}

pub fn sensor_payload(variant: SensorVariant, unix_ns: u64) -> Vec<u8> {
    let mut b = vec![0u8; SENSOR_RECORD_LEN];
    b[0x01] = variant.discriminant();
    b[0x08..0x10].copy_from_slice(&(unix_ns / 1000).to_le_bytes());
    b[0x10..0x18].copy_from_slice(&unix_ns.to_le_bytes());
    b[0x18] = 1;
    b[0x84..0x88].copy_from_slice(&9.81f32.to_le_bytes());
    b[0xE4..0xE8].copy_from_slice(&35.0f32.to_le_bytes());
    b
}

pub fn msg(id: u16, channel: &str, timestamp: u64, payload: Vec<u8>) -> ContainerMessage<'static> {
    ContainerMessage::owned(id, channel, timestamp, payload)
}

pub const T0: u64 = 1_700_000_000_000_000_000;

/// Header, three video frames, footer listing the three frame timestamps.
pub fn recording() -> Vec<ContainerMessage<'static>> {
    let ts = [T0 + 1, T0 + 33_000_001, T0 + 66_000_001];
    vec![
        msg(0, "svo_header", T0, header_payload(1920, 1080, SERIAL)),
        msg(2, VIDEO, ts[0], frame_payload(&key_bitstream(), 3840, 1080, ts[0], 3, 0)),
        msg(2, VIDEO, ts[1], frame_payload(&delta_bitstream(1), 3840, 1080, ts[1], 1, 1)),
        msg(2, VIDEO, ts[2], frame_payload(&delta_bitstream(2), 3840, 1080, ts[2], 1, 2)),
        msg(1, "svo_footer", T0 + 70_000_000, footer_payload(VIDEO, &ts)),
    ]
}

pub fn ok<T>(items: Vec<T>) -> Vec<Result<T, svo2_extract::Error>> {
    items.into_iter().map(Ok).collect()
}

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::wire::{
    OpaqueSpan, le_f32_array, le_u32, le_u64_seq, opaque_spans, put_f32, put_u32,
};

/// Size of the binary struct carried base64-encoded in the header's `header` key.
pub const HEADER_STRUCT_LEN: usize = 0x80;

/// Each calibration blob is two 3x3 f32 matrices.
pub const CALIBRATION_LEN: usize = 2 * 9 * 4;

const TRANSFORM_OFFSET: usize = 0x24;
const TRANSFORM_END: usize = TRANSFORM_OFFSET + 12 * 4;

// Everything outside width/height/serial/fps and the transform block, one 4-byte slot each.
const HEADER_UNKNOWN_SLOTS: [(usize, usize); 16] = [
    (0x10, 0x14),
    (0x14, 0x18),
    (0x18, 0x1C),
    (0x1C, 0x20),
    (0x20, 0x24),
    (0x54, 0x58),
    (0x58, 0x5C),
    (0x5C, 0x60),
    (0x60, 0x64),
    (0x64, 0x68),
    (0x68, 0x6C),
    (0x6C, 0x70),
    (0x70, 0x74),
    (0x74, 0x78),
    (0x78, 0x7C),
    (0x7C, 0x80),
];

/// The fixed 128-byte camera block embedded in the recording header.
///
/// The transform is stored row-major as a 3x4 `[R | t]` matrix. It does not match the
/// stereo transform the vendor SDK reports, so treat it as opaque geometry for now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderStruct {
    /// Width of a single camera image in pixels.
    pub width: u32,
    pub height: u32,
    pub serial_number: u32,
    pub fps: u32,
    pub transform: [f32; 12],
    /// Unidentified slots, verbatim.
    pub raw_fields: Vec<OpaqueSpan>,
}

impl HeaderStruct {
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() != HEADER_STRUCT_LEN {
            return Err(DecodeError::MalformedHeader {
                reason: format!(
                    "header struct is {} bytes, expected {HEADER_STRUCT_LEN}",
                    buf.len()
                ),
            });
        }

        Ok(HeaderStruct {
            width: le_u32(buf, 0x00),
            height: le_u32(buf, 0x04),
            serial_number: le_u32(buf, 0x08),
            fps: le_u32(buf, 0x0C),
            transform: le_f32_array(buf, TRANSFORM_OFFSET),
            raw_fields: opaque_spans(buf, &HEADER_UNKNOWN_SLOTS),
        })
    }

    /// Re-encode the struct. Decoding then encoding reproduces the original bytes.
    pub fn encode(&self) -> [u8; HEADER_STRUCT_LEN] {
        let mut buf = [0u8; HEADER_STRUCT_LEN];
        put_u32(&mut buf, 0x00, self.width);
        put_u32(&mut buf, 0x04, self.height);
        put_u32(&mut buf, 0x08, self.serial_number);
        put_u32(&mut buf, 0x0C, self.fps);
        for (i, v) in self.transform.iter().enumerate() {
            put_f32(&mut buf, TRANSFORM_OFFSET + i * 4, *v);
        }
        for span in &self.raw_fields {
            if span.end() <= HEADER_STRUCT_LEN {
                buf[span.offset..span.end()].copy_from_slice(&span.bytes);
            }
        }
        buf
    }
}

/// IMU calibration pair as stored in `Calib_acc` / `Calib_gyro`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImuCalibration {
    pub bias: [[f32; 3]; 3],
    /// Scale and cross-axis terms.
    pub scale: [[f32; 3]; 3],
}

impl ImuCalibration {
    fn decode(field: &str, buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() != CALIBRATION_LEN {
            return Err(DecodeError::MalformedHeader {
                reason: format!(
                    "{field} is {} bytes, expected {CALIBRATION_LEN}",
                    buf.len()
                ),
            });
        }
        let floats: [f32; 18] = le_f32_array(buf, 0);
        let matrix = |base: usize| -> [[f32; 3]; 3] {
            std::array::from_fn(|r| std::array::from_fn(|c| floats[base + r * 3 + c]))
        };
        Ok(ImuCalibration {
            bias: matrix(0),
            scale: matrix(9),
        })
    }
}

/// Decoded `svo_header` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingHeader {
    pub geometry: HeaderStruct,
    pub imu_frequency_hz: f64,
    pub sdk_version: String,
    /// Container format version string (e.g. "2.0.3"), when present.
    pub format_version: Option<String>,
    pub accel_calibration: ImuCalibration,
    pub gyro_calibration: ImuCalibration,
}

#[derive(Deserialize)]
struct HeaderJson {
    header: String,
    #[serde(rename = "Calib_acc")]
    calib_acc: String,
    #[serde(rename = "Calib_gyro")]
    calib_gyro: String,
    #[serde(default)]
    imu_frequency_hz: f64,
    #[serde(default)]
    zed_sdk_version: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

fn b64(field: &str, s: &str) -> Result<Vec<u8>, DecodeError> {
    BASE64
        .decode(s.trim())
        .map_err(|e| DecodeError::MalformedHeader {
            reason: format!("{field}: invalid base64: {e}"),
        })
}

/// Decode the JSON recording header.
///
/// Unrecognized extra keys are ignored.
pub fn decode_header(payload: &[u8]) -> Result<RecordingHeader, DecodeError> {
    let json: HeaderJson =
        serde_json::from_slice(payload).map_err(|e| DecodeError::MalformedHeader {
            reason: e.to_string(),
        })?;

    let geometry = HeaderStruct::decode(&b64("header", &json.header)?)?;
    let accel_calibration =
        ImuCalibration::decode("Calib_acc", &b64("Calib_acc", &json.calib_acc)?)?;
    let gyro_calibration =
        ImuCalibration::decode("Calib_gyro", &b64("Calib_gyro", &json.calib_gyro)?)?;

    debug!(
        width = geometry.width,
        height = geometry.height,
        serial = geometry.serial_number,
        fps = geometry.fps,
        "decoded recording header"
    );

    Ok(RecordingHeader {
        geometry,
        imu_frequency_hz: json.imu_frequency_hz,
        sdk_version: json.zed_sdk_version.unwrap_or_else(|| "unknown".to_string()),
        format_version: json.version,
        accel_calibration,
        gyro_calibration,
    })
}

/// Decoded `svo_footer` message: per-channel timestamp arrays as recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordingFooter {
    pub timestamps: BTreeMap<String, Vec<u64>>,
    /// Keys whose value could not be decoded, with the reason.
    pub failures: BTreeMap<String, String>,
}

impl RecordingFooter {
    pub fn message_count(&self, channel: &str) -> Option<usize> {
        self.timestamps.get(channel).map(Vec::len)
    }
}

fn footer_entry(value: &Value) -> Result<Vec<u64>, String> {
    match value {
        Value::String(s) => {
            let bytes = BASE64
                .decode(s.trim())
                .map_err(|e| format!("invalid base64: {e}"))?;
            le_u64_seq(&bytes)
                .ok_or_else(|| format!("{} bytes is not a whole number of u64", bytes.len()))
        }
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_u64().ok_or_else(|| format!("non-u64 element {v}")))
            .collect(),
        other => Err(format!("unsupported value type: {other}")),
    }
}

/// Decode the JSON recording footer.
///
/// Only an unparsable document fails; a bad key is recorded in
/// [`RecordingFooter::failures`] and the remaining keys stay usable.
pub fn decode_footer(payload: &[u8]) -> Result<RecordingFooter, DecodeError> {
    let doc: Value = serde_json::from_slice(payload).map_err(|e| DecodeError::MalformedFooter {
        reason: e.to_string(),
    })?;
    let Value::Object(map) = doc else {
        return Err(DecodeError::MalformedFooter {
            reason: "footer is not a JSON object".to_string(),
        });
    };

    let mut footer = RecordingFooter::default();
    for (key, value) in &map {
        match footer_entry(value) {
            Ok(ts) => {
                footer.timestamps.insert(key.clone(), ts);
            }
            Err(reason) => {
                warn!(channel = %key, %reason, "footer entry not decodable");
                footer.failures.insert(key.clone(), reason);
            }
        }
    }
    Ok(footer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_block() -> Vec<u8> {
        let mut b: Vec<u8> = (0..HEADER_STRUCT_LEN as u32).map(|i| (i * 7) as u8).collect();
        b[0..4].copy_from_slice(&1920u32.to_le_bytes());
        b[4..8].copy_from_slice(&1080u32.to_le_bytes());
        b[8..12].copy_from_slice(&40735594u32.to_le_bytes());
        b[12..16].copy_from_slice(&30u32.to_le_bytes());
        b
    }

    fn calib() -> Vec<u8> {
        (0..18).flat_map(|i| (i as f32 * 0.5).to_le_bytes()).collect()
    }

    fn header_json(block: &[u8]) -> String {
        serde_json::json!({
            "header": BASE64.encode(block),
            "Calib_acc": BASE64.encode(calib()),
            "Calib_gyro": BASE64.encode(calib()),
            "imu_frequency_hz": 200.0,
            "zed_sdk_version": "4.1.0",
            "version": "2.0.3",
            "something_new": {"nested": true},
        })
        .to_string()
    }

    #[test]
    fn decodes_header_fields() {
        let h = decode_header(header_json(&header_block()).as_bytes()).unwrap();
        assert_eq!(h.geometry.width, 1920);
        assert_eq!(h.geometry.height, 1080);
        assert_eq!(h.geometry.serial_number, 40735594);
        assert_eq!(h.geometry.fps, 30);
        assert_eq!(h.geometry.raw_fields.len(), 16);
        assert_eq!(h.imu_frequency_hz, 200.0);
        assert_eq!(h.sdk_version, "4.1.0");
        assert_eq!(h.format_version.as_deref(), Some("2.0.3"));
        assert_eq!(h.accel_calibration.bias[0], [0.0, 0.5, 1.0]);
        assert_eq!(h.accel_calibration.scale[2], [7.5, 8.0, 8.5]);
    }

    #[test]
    fn header_block_round_trips() {
        let block = header_block();
        let h = decode_header(header_json(&block).as_bytes()).unwrap();
        assert_eq!(h.geometry.encode().as_slice(), block.as_slice());
    }

    #[test]
    fn header_missing_field_is_malformed() {
        let json = serde_json::json!({ "header": BASE64.encode(header_block()) }).to_string();
        let err = decode_header(json.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedHeader { .. }));
    }

    #[test]
    fn header_wrong_blob_length_is_malformed() {
        let short = &header_block()[..100];
        let err = decode_header(header_json(short).as_bytes()).unwrap_err();
        match err {
            DecodeError::MalformedHeader { reason } => assert!(reason.contains("100")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn header_not_json() {
        assert!(decode_header(b"\xff\xfe not json").is_err());
    }

    #[test]
    fn footer_mixed_encodings_and_bad_keys() {
        let packed: Vec<u8> = [10u64, 20, 30].iter().flat_map(|v| v.to_le_bytes()).collect();
        let json = serde_json::json!({
            "Camera_SN1/side_by_side": BASE64.encode(&packed),
            "Camera_SN1/sensors": [1, 2],
            "broken": "***",
            "odd": BASE64.encode([1u8, 2, 3]),
        })
        .to_string();

        let footer = decode_footer(json.as_bytes()).unwrap();
        assert_eq!(
            footer.timestamps["Camera_SN1/side_by_side"],
            vec![10, 20, 30]
        );
        assert_eq!(footer.message_count("Camera_SN1/sensors"), Some(2));
        assert!(footer.failures.contains_key("broken"));
        assert!(footer.failures.contains_key("odd"));
    }

    #[test]
    fn footer_must_be_object() {
        assert!(matches!(
            decode_footer(b"[1,2,3]"),
            Err(DecodeError::MalformedFooter { .. })
        ));
    }
}

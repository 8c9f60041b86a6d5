use serde::{Serialize, Serializer};

use crate::error::DecodeError;
use crate::wire::{OpaqueSpan, le_f32, le_f32_array, le_u64, opaque_spans};

/// Every sensor payload, raw or integrated, has this size.
pub const SENSOR_RECORD_LEN: usize = 360;

const DISCRIMINANT_OFFSET: usize = 0x01;
const DISCRIMINANT_RAW: u8 = 0x33;
const DISCRIMINANT_INTEGRATED: u8 = 0x26;

const NEW_SAMPLE_OFFSET: usize = 0x18;

// Byte ranges with no named field. 0xA0..0xE0 looks like a 4x4 covariance block but is
// unverified.
const SENSOR_UNKNOWN: [(usize, usize); 8] = [
    (0x00, 0x01),
    (0x02, 0x08),
    // Whole byte kept; only nonzero-ness is decoded.
    (0x18, 0x19),
    (0x19, 0x3C),
    (0xA0, 0xE0),
    (0xE0, 0xE4),
    (0xE8, 0x15C),
    (0x160, 0x168),
];

/// The two samples that share the 360-byte layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorVariant {
    /// Full-rate IMU sample.
    Raw,
    /// Frame-synchronized sample.
    Integrated,
}

impl SensorVariant {
    pub fn from_discriminant(b: u8) -> Option<Self> {
        match b {
            DISCRIMINANT_RAW => Some(SensorVariant::Raw),
            DISCRIMINANT_INTEGRATED => Some(SensorVariant::Integrated),
            _ => None,
        }
    }

    pub fn discriminant(self) -> u8 {
        match self {
            SensorVariant::Raw => DISCRIMINANT_RAW,
            SensorVariant::Integrated => DISCRIMINANT_INTEGRATED,
        }
    }
}

/// One decoded sensor sample. Float fields keep NaN as recorded.
///
/// Serialized non-finite floats become the strings `"NaN"`, `"inf"` and `"-inf"`, since JSON
/// has no literal for them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRecord {
    pub variant: SensorVariant,
    pub timestamp_boot_ns: u64,
    pub timestamp_unix_ns: u64,
    pub imu_new_sample: bool,
    /// `[x, y, z, w]`.
    #[serde(serialize_with = "floats")]
    pub orientation: [f32; 4],
    #[serde(serialize_with = "floats")]
    pub orientation_covariance_diag: [f32; 3],
    #[serde(serialize_with = "floats")]
    pub angular_velocity: [f32; 3],
    #[serde(serialize_with = "floats")]
    pub linear_acceleration: [f32; 3],
    #[serde(serialize_with = "floats")]
    pub angular_velocity_uncalibrated: [f32; 3],
    #[serde(serialize_with = "floats")]
    pub linear_acceleration_uncalibrated: [f32; 3],
    #[serde(serialize_with = "floats")]
    pub angular_velocity_covariance_diag: [f32; 3],
    #[serde(serialize_with = "floats")]
    pub linear_acceleration_covariance_diag: [f32; 3],
    #[serde(serialize_with = "float")]
    pub temperature_c: f32,
    #[serde(serialize_with = "float")]
    pub effective_rate: f32,
    #[serde(skip)]
    pub unknown_raw: Vec<OpaqueSpan>,
}

struct Float(f32);

impl Serialize for Float {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if self.0.is_finite() {
            s.serialize_f32(self.0)
        } else {
            s.collect_str(&self.0)
        }
    }
}

fn float<S: Serializer>(v: &f32, s: S) -> Result<S::Ok, S::Error> {
    Float(*v).serialize(s)
}

fn floats<S: Serializer, const N: usize>(v: &[f32; N], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(v.iter().map(|x| Float(*x)))
}

/// Decode a sensor payload, checking its discriminant against the channel's variant.
pub fn decode_sensor(
    payload: &[u8],
    expected: SensorVariant,
) -> Result<SensorRecord, DecodeError> {
    if payload.len() != SENSOR_RECORD_LEN {
        return Err(DecodeError::RecordSize { len: payload.len() });
    }

    let discriminant = payload[DISCRIMINANT_OFFSET];
    let variant = SensorVariant::from_discriminant(discriminant)
        .ok_or(DecodeError::UnknownDiscriminant {
            value: discriminant,
        })?;
    if variant != expected {
        return Err(DecodeError::VariantMismatch {
            expected,
            found: variant,
        });
    }

    Ok(SensorRecord {
        variant,
        timestamp_boot_ns: le_u64(payload, 0x08),
        timestamp_unix_ns: le_u64(payload, 0x10),
        imu_new_sample: payload[NEW_SAMPLE_OFFSET] != 0,
        orientation: le_f32_array(payload, 0x3C),
        orientation_covariance_diag: le_f32_array(payload, 0x4C),
        angular_velocity_uncalibrated: le_f32_array(payload, 0x58),
        linear_acceleration_uncalibrated: le_f32_array(payload, 0x64),
        angular_velocity: le_f32_array(payload, 0x70),
        linear_acceleration: le_f32_array(payload, 0x7C),
        angular_velocity_covariance_diag: le_f32_array(payload, 0x88),
        linear_acceleration_covariance_diag: le_f32_array(payload, 0x94),
        temperature_c: le_f32(payload, 0xE4),
        effective_rate: le_f32(payload, 0x15C),
        unknown_raw: opaque_spans(payload, &SENSOR_UNKNOWN),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_f32s(buf: &mut [u8], off: usize, vals: &[f32]) {
        for (i, v) in vals.iter().enumerate() {
            buf[off + i * 4..off + i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
    }

    fn record(variant: SensorVariant) -> Vec<u8> {
        let mut b = vec![0u8; SENSOR_RECORD_LEN];
        b[0] = 0x01;
        b[1] = variant.discriminant();
        b[0x08..0x10].copy_from_slice(&123_456u64.to_le_bytes());
        b[0x10..0x18].copy_from_slice(&1_700_000_000_000_000_001u64.to_le_bytes());
        b[0x18] = 1;
        put_f32s(&mut b, 0x3C, &[0.0, 0.0, 0.0, 1.0]);
        put_f32s(&mut b, 0x58, &[0.1, 0.2, 0.3]);
        put_f32s(&mut b, 0x64, &[0.0, 0.0, 9.81]);
        put_f32s(&mut b, 0x70, &[1.0, 2.0, 3.0]);
        put_f32s(&mut b, 0x7C, &[4.0, 5.0, 6.0]);
        put_f32s(&mut b, 0xE4, &[41.5]);
        put_f32s(&mut b, 0x15C, &[f32::NAN]);
        b[0xA0] = 0xEE;
        b
    }

    #[test]
    fn decodes_raw_sample() {
        let r = decode_sensor(&record(SensorVariant::Raw), SensorVariant::Raw).unwrap();
        assert_eq!(r.variant, SensorVariant::Raw);
        assert_eq!(r.timestamp_boot_ns, 123_456);
        assert_eq!(r.timestamp_unix_ns, 1_700_000_000_000_000_001);
        assert!(r.imu_new_sample);
        assert_eq!(r.orientation, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(r.angular_velocity_uncalibrated, [0.1, 0.2, 0.3]);
        assert_eq!(r.linear_acceleration_uncalibrated, [0.0, 0.0, 9.81]);
        assert_eq!(r.angular_velocity, [1.0, 2.0, 3.0]);
        assert_eq!(r.linear_acceleration, [4.0, 5.0, 6.0]);
        assert_eq!(r.temperature_c, 41.5);
        assert!(r.effective_rate.is_nan());
    }

    #[test]
    fn unknown_ranges_preserved() {
        let r = decode_sensor(&record(SensorVariant::Integrated), SensorVariant::Integrated)
            .unwrap();
        let block = r.unknown_raw.iter().find(|s| s.offset == 0xA0).unwrap();
        assert_eq!(block.bytes.len(), 64);
        assert_eq!(block.bytes[0], 0xEE);
        let marker = r.unknown_raw.iter().find(|s| s.offset == 0).unwrap();
        assert_eq!(marker.bytes, vec![0x01]);
        let flag = r.unknown_raw.iter().find(|s| s.offset == 0x18).unwrap();
        assert_eq!(flag.bytes, vec![0x01]);
        assert!(r.imu_new_sample);
    }

    #[test]
    fn named_and_opaque_ranges_cover_the_record() {
        let r = decode_sensor(&record(SensorVariant::Raw), SensorVariant::Raw).unwrap();
        let named = [
            (0x01, 0x02),
            (0x08, 0x18),
            (0x3C, 0xA0),
            (0xE4, 0xE8),
            (0x15C, 0x160),
        ];
        let mut covered = vec![0u8; SENSOR_RECORD_LEN];
        let opaque = r.unknown_raw.iter().map(|s| (s.offset, s.end()));
        for (start, end) in named.into_iter().chain(opaque) {
            for c in &mut covered[start..end] {
                *c += 1;
            }
        }
        assert!(covered.iter().all(|&c| c == 1), "{covered:?}");
    }

    #[test]
    fn non_finite_floats_serialize_as_strings() {
        let mut r = decode_sensor(&record(SensorVariant::Raw), SensorVariant::Raw).unwrap();
        r.orientation[0] = f32::INFINITY;
        r.angular_velocity[2] = f32::NEG_INFINITY;
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["effective_rate"], "NaN");
        assert_eq!(v["orientation"][0], "inf");
        assert_eq!(v["orientation"][3], 1.0);
        assert_eq!(v["angular_velocity"][2], "-inf");
        assert_eq!(v["temperature_c"], 41.5);
    }

    #[test]
    fn size_must_be_exact() {
        let full = record(SensorVariant::Raw);
        for len in [359, 361, 0] {
            let mut p = full.clone();
            p.resize(len, 0);
            assert_eq!(
                decode_sensor(&p, SensorVariant::Raw),
                Err(DecodeError::RecordSize { len })
            );
        }
    }

    #[test]
    fn variant_mismatch_is_an_error() {
        let p = record(SensorVariant::Integrated);
        assert_eq!(
            decode_sensor(&p, SensorVariant::Raw),
            Err(DecodeError::VariantMismatch {
                expected: SensorVariant::Raw,
                found: SensorVariant::Integrated
            })
        );
    }

    #[test]
    fn unknown_discriminant() {
        let mut p = record(SensorVariant::Raw);
        p[1] = 0x99;
        assert_eq!(
            decode_sensor(&p, SensorVariant::Raw),
            Err(DecodeError::UnknownDiscriminant { value: 0x99 })
        );
    }
}

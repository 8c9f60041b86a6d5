//! Camera intrinsics from the vendor's `sensor.conf` calibration file.
//!
//! The file is INI-shaped but TOML-compatible: one `[LEFT_CAM_<MODE>]` /
//! `[RIGHT_CAM_<MODE>]` section per resolution mode plus a `[STEREO]` section. The right
//! camera is the reference frame; the left camera is expressed relative to it.

use std::fs;
use std::path::Path;

use serde::Serialize;
use toml::{Table, Value};

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum CameraMode {
    #[value(name = "FHD1200")]
    Fhd1200,
    #[value(name = "FHD")]
    Fhd,
    #[value(name = "SVGA")]
    Svga,
}

impl CameraMode {
    pub fn key(self) -> &'static str {
        match self {
            CameraMode::Fhd1200 => "FHD1200",
            CameraMode::Fhd => "FHD",
            CameraMode::Svga => "SVGA",
        }
    }

    /// Mode from image height: 1200, 1080 or 600.
    pub fn from_height(height: u32) -> Result<Self, Error> {
        match height {
            1200 => Ok(CameraMode::Fhd1200),
            1080 => Ok(CameraMode::Fhd),
            600 => Ok(CameraMode::Svga),
            other => Err(Error::Intrinsics {
                reason: format!("unrecognized image height: {other}"),
            }),
        }
    }
}

/// Brown-Conrady (OpenCV) parameters for one camera.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intrinsics {
    /// `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`
    pub camera_matrix: [[f64; 3]; 3],
    /// `k1, k2, p1, p2, k3`
    pub dist_coeffs: [f64; 5],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StereoIntrinsics {
    pub left: Intrinsics,
    pub right: Intrinsics,
    /// Millimetres.
    pub baseline: f64,
    pub ty: f64,
    pub tz: f64,
    /// Radians.
    pub cv: f64,
    pub rx: f64,
    pub rz: f64,
}

fn missing(what: String) -> Error {
    Error::Intrinsics {
        reason: format!("missing {what}"),
    }
}

fn section<'t>(table: &'t Table, name: &str) -> Result<&'t Table, Error> {
    table
        .get(name)
        .and_then(Value::as_table)
        .ok_or_else(|| missing(format!("section [{name}]")))
}

// Config writers are not consistent about `0` vs `0.0`.
fn number(sec: &Table, sec_name: &str, key: &str) -> Result<f64, Error> {
    match sec.get(key) {
        Some(Value::Float(f)) => Ok(*f),
        Some(Value::Integer(i)) => Ok(*i as f64),
        _ => Err(missing(format!("{sec_name}.{key}"))),
    }
}

impl Intrinsics {
    fn from_section(table: &Table, name: &str) -> Result<Self, Error> {
        let sec = section(table, name)?;
        let get = |key: &str| number(sec, name, key);
        let (fx, fy, cx, cy) = (get("fx")?, get("fy")?, get("cx")?, get("cy")?);
        Ok(Intrinsics {
            camera_matrix: [[fx, 0.0, cx], [0.0, fy, cy], [0.0, 0.0, 1.0]],
            dist_coeffs: [get("k1")?, get("k2")?, get("p1")?, get("p2")?, get("k3")?],
        })
    }
}

impl StereoIntrinsics {
    pub fn from_config_str(text: &str, mode: CameraMode) -> Result<Self, Error> {
        let table: Table = text.parse().map_err(|e: toml::de::Error| Error::Intrinsics {
            reason: e.to_string(),
        })?;
        let m = mode.key();

        let left = Intrinsics::from_section(&table, &format!("LEFT_CAM_{m}"))?;
        let right = Intrinsics::from_section(&table, &format!("RIGHT_CAM_{m}"))?;

        let stereo = section(&table, "STEREO")?;
        let get = |key: &str| number(stereo, "STEREO", key);
        Ok(StereoIntrinsics {
            left,
            right,
            baseline: get("Baseline")?,
            ty: get("TY")?,
            tz: get("TZ")?,
            cv: get(format!("CV_{m}").as_str())?,
            rx: get(format!("RX_{m}").as_str())?,
            rz: get(format!("RZ_{m}").as_str())?,
        })
    }

    pub fn from_config_path(path: impl AsRef<Path>, mode: CameraMode) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Self::from_config_str(&text, mode)
    }
}

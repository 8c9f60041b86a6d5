//! Destinations for decoded artifacts.

use std::io::{self, Write};

use crate::sensor::{SensorRecord, SensorVariant};

/// Receives successive bitstream fragments, in container order.
pub trait ByteSink {
    fn write_fragment(&mut self, channel: &str, bytes: &[u8]) -> io::Result<()>;
}

impl<W: Write> ByteSink for W {
    fn write_fragment(&mut self, _channel: &str, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)
    }
}

/// Receives successive decoded sensor records, in container order.
pub trait RecordSink {
    fn write_record(&mut self, channel: &str, record: &SensorRecord) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl RecordSink for Vec<SensorRecord> {
    fn write_record(&mut self, _channel: &str, record: &SensorRecord) -> io::Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Where a pass sends its output. A missing sink drops that kind of artifact.
#[derive(Default)]
pub struct Sinks<'a> {
    pub video: Option<&'a mut dyn ByteSink>,
    pub sensors: Option<&'a mut dyn RecordSink>,
}

impl<'a> Sinks<'a> {
    pub fn video(mut self, sink: &'a mut dyn ByteSink) -> Self {
        self.video = Some(sink);
        self
    }

    pub fn sensors(mut self, sink: &'a mut dyn RecordSink) -> Self {
        self.sensors = Some(sink);
        self
    }
}

const CSV_HEADER: &str = "channel,variant,timestamp_unix_ns,timestamp_boot_ns,imu_new_sample,\
orientation_x,orientation_y,orientation_z,orientation_w,\
orientation_covariance_x,orientation_covariance_y,orientation_covariance_z,\
angular_velocity_x,angular_velocity_y,angular_velocity_z,\
linear_acceleration_x,linear_acceleration_y,linear_acceleration_z,\
angular_velocity_uncalibrated_x,angular_velocity_uncalibrated_y,\
angular_velocity_uncalibrated_z,\
linear_acceleration_uncalibrated_x,linear_acceleration_uncalibrated_y,\
linear_acceleration_uncalibrated_z,\
angular_velocity_covariance_x,angular_velocity_covariance_y,angular_velocity_covariance_z,\
linear_acceleration_covariance_x,linear_acceleration_covariance_y,\
linear_acceleration_covariance_z,\
temperature_c,effective_rate";

fn fmt_f32(v: f32) -> String {
    // Cast to f64 to expose the exact stored f32 value.
    format!("{:.15}", v as f64)
}

fn variant_name(v: SensorVariant) -> &'static str {
    match v {
        SensorVariant::Raw => "raw",
        SensorVariant::Integrated => "integrated",
    }
}

/// One CSV row per record, keyed by Unix timestamp. Rows are written as they arrive.
pub struct CsvRecordSink<W: Write> {
    out: W,
    wrote_header: bool,
}

impl<W: Write> CsvRecordSink<W> {
    pub fn new(out: W) -> Self {
        CsvRecordSink {
            out,
            wrote_header: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordSink for CsvRecordSink<W> {
    fn write_record(&mut self, channel: &str, r: &SensorRecord) -> io::Result<()> {
        if !self.wrote_header {
            writeln!(self.out, "{CSV_HEADER}")?;
            self.wrote_header = true;
        }

        // Channel names are `<device>/<stream>` tokens, no quoting needed.
        let mut row = format!(
            "{channel},{},{},{},{}",
            variant_name(r.variant),
            r.timestamp_unix_ns,
            r.timestamp_boot_ns,
            r.imu_new_sample
        );
        let vectors: [&[f32]; 8] = [
            &r.orientation,
            &r.orientation_covariance_diag,
            &r.angular_velocity,
            &r.linear_acceleration,
            &r.angular_velocity_uncalibrated,
            &r.linear_acceleration_uncalibrated,
            &r.angular_velocity_covariance_diag,
            &r.linear_acceleration_covariance_diag,
        ];
        for v in vectors.iter().flat_map(|v| v.iter()) {
            row.push(',');
            row.push_str(&fmt_f32(*v));
        }
        row.push(',');
        row.push_str(&fmt_f32(r.temperature_c));
        row.push(',');
        row.push_str(&fmt_f32(r.effective_rate));
        writeln!(self.out, "{row}")
    }

    fn finish(&mut self) -> io::Result<()> {
        if !self.wrote_header {
            writeln!(self.out, "{CSV_HEADER}")?;
            self.wrote_header = true;
        }
        self.out.flush()
    }
}

/// One JSON object per line. Non-finite floats are written as strings.
pub struct JsonLinesRecordSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesRecordSink<W> {
    pub fn new(out: W) -> Self {
        JsonLinesRecordSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[derive(serde::Serialize)]
struct JsonRow<'a> {
    channel: &'a str,
    #[serde(flatten)]
    record: &'a SensorRecord,
}

impl<W: Write> RecordSink for JsonLinesRecordSink<W> {
    fn write_record(&mut self, channel: &str, record: &SensorRecord) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, &JsonRow { channel, record })?;
        self.out.write_all(b"\n")
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

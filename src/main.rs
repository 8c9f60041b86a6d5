use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use svo2_extract::intrinsics::{CameraMode, StereoIntrinsics};
use svo2_extract::{
    ChannelRole, ChannelSelector, CsvRecordSink, ExtractOptions, ExtractionReport,
    JsonLinesRecordSink, McapFile, RecordSink, RecordingHeader, RoleCategory, Sinks, classify,
    decode_footer, decode_header, extract_path,
};

#[derive(Parser, Debug)]
#[command(name = "svo2-extract")]
#[command(
    about = "Extract video, IMU samples and metadata from SVO2 recordings",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Log per-message detail
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List channels and file statistics
    List {
        #[arg(value_name = "INPUT.svo2")]
        input: PathBuf,
    },
    /// Print the recording header and footer channel lengths as JSON
    Info {
        #[arg(value_name = "INPUT.svo2")]
        input: PathBuf,
    },
    /// Write the H.265 elementary stream
    Video {
        #[command(flatten)]
        pass: PassArgs,

        /// Output file (default: <INPUT>_video.h265, '-' for stdout)
        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Write IMU/sensor records as a table
    Sensors {
        #[command(flatten)]
        pass: PassArgs,

        /// Output file (default: stdout)
        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format (default: from the output extension, else csv)
        #[arg(long = "format", value_enum)]
        format: Option<SensorFormat>,

        /// Read the integrated sensor stream instead of the raw one
        #[arg(long, action = clap::ArgAction::SetTrue)]
        integrated: bool,
    },
    /// Concatenate the raw payloads of one channel
    Dump {
        #[arg(value_name = "INPUT.svo2")]
        input: PathBuf,

        /// Channel id, or a name; a partial name picks the lowest matching id
        #[arg(long, value_name = "NAME|ID")]
        channel: ChannelSelector,

        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: PathBuf,
    },
    /// Convert a sensor.conf calibration file to stereo intrinsics JSON
    Intrinsics {
        #[arg(value_name = "SENSOR.conf")]
        conf: PathBuf,

        /// Resolution mode
        #[arg(long, value_enum, required_unless_present = "height", conflicts_with = "height")]
        mode: Option<CameraMode>,

        /// Image height used to pick the resolution mode (1200, 1080 or 600)
        #[arg(long)]
        height: Option<u32>,
    },
}

#[derive(Args, Debug)]
struct PassArgs {
    #[arg(value_name = "INPUT.svo2")]
    input: PathBuf,

    /// Abort on the first decode error or frame warning
    #[arg(long, action = clap::ArgAction::SetTrue)]
    strict: bool,

    /// Write the extraction report as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

impl PassArgs {
    fn options(&self, selector: ChannelSelector) -> ExtractOptions {
        ExtractOptions::default()
            .selector(selector)
            .strict(self.strict)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SensorFormat {
    Csv,
    Jsonl,
}

fn infer_format(output: Option<&Path>) -> SensorFormat {
    let ext = output
        .and_then(Path::extension)
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jsonl" | "ndjson" | "json") => SensorFormat::Jsonl,
        _ => SensorFormat::Csv,
    }
}

fn should_write_to_stdout(output: Option<&Path>) -> bool {
    match output {
        None => true,
        Some(p) => p.as_os_str() == "-",
    }
}

fn open_output(output: Option<&Path>) -> Result<BufWriter<Box<dyn Write>>> {
    let out: Box<dyn Write> = match output {
        Some(path) if !should_write_to_stdout(output) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        _ => Box::new(io::stdout().lock()),
    };
    Ok(BufWriter::new(out))
}

fn default_video_path(input: &Path) -> PathBuf {
    let mut name: OsString = input.file_stem().unwrap_or(input.as_os_str()).to_owned();
    name.push("_video.h265");
    input.with_file_name(name)
}

fn init_tracing(quiet: bool, verbose: bool) {
    let default = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn write_report(path: Option<&Path>, report: &ExtractionReport) -> Result<()> {
    for w in &report.stats.warnings {
        warn!(?w, "consistency check");
    }
    let Some(path) = path else {
        return Ok(());
    };
    let mut out = BufWriter::new(
        File::create(path).with_context(|| format!("creating {}", path.display()))?,
    );
    serde_json::to_writer_pretty(&mut out, report)?;
    writeln!(out)?;
    out.flush()?;
    info!(path = %path.display(), "wrote report");
    Ok(())
}

fn run_list(input: &Path) -> Result<()> {
    let file = McapFile::open(input)?;
    let catalog = file.catalog()?;
    let stats = file.statistics()?;

    let mut out = BufWriter::new(io::stdout().lock());
    writeln!(out, "{:>4}  {:<40} {:<10} {:>10}  role", "id", "topic", "encoding", "messages")?;
    for c in &catalog {
        let count = c
            .message_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        let role = match classify(&c.topic) {
            ChannelRole::Header => "header".to_string(),
            ChannelRole::Footer => "footer".to_string(),
            ChannelRole::Video { serial } => format!("video (SN{serial})"),
            ChannelRole::Sensors {
                serial,
                integrated: false,
            } => format!("sensors (SN{serial})"),
            ChannelRole::Sensors {
                serial,
                integrated: true,
            } => format!("integrated sensors (SN{serial})"),
            ChannelRole::Unknown => "unknown".to_string(),
        };
        writeln!(out, "{:>4}  {:<40} {:<10} {:>10}  {role}", c.id, c.topic, c.encoding, count)?;
    }
    if let Some(n) = stats.message_count {
        writeln!(out, "total messages: {n}")?;
    }
    if let (Some(start), Some(end)) = (stats.start_time, stats.end_time) {
        let secs = end.saturating_sub(start) as f64 / 1e9;
        writeln!(out, "time range: {start} .. {end} ({secs:.3} s)")?;
    }
    out.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct Info {
    header: Option<RecordingHeader>,
    footer_lengths: BTreeMap<String, usize>,
}

fn run_info(input: &Path) -> Result<()> {
    let file = McapFile::open(input)?;
    let mut info = Info {
        header: None,
        footer_lengths: BTreeMap::new(),
    };
    for msg in file.messages()? {
        let msg = msg?;
        match classify(&msg.channel_name) {
            ChannelRole::Header => {
                let header = decode_header(&msg.payload)
                    .with_context(|| format!("decoding header at {}", msg.timestamp))?;
                info.header = Some(header);
            }
            ChannelRole::Footer => {
                let footer = decode_footer(&msg.payload)
                    .with_context(|| format!("decoding footer at {}", msg.timestamp))?;
                for (key, reason) in &footer.failures {
                    warn!(key = %key, reason = %reason, "footer entry not decodable");
                }
                info.footer_lengths = footer
                    .timestamps
                    .iter()
                    .map(|(k, v)| (k.clone(), v.len()))
                    .collect();
            }
            _ => {}
        }
    }
    if info.header.is_none() {
        warn!("no recording header found");
    }

    let mut out = BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut out, &info)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn run_video(pass: &PassArgs, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| default_video_path(&pass.input));
    let mut out = open_output(Some(&output))?;

    let report = {
        let mut sinks = Sinks::default().video(&mut out);
        extract_path(
            &pass.input,
            pass.options(ChannelSelector::Role(RoleCategory::Video)),
            &mut sinks,
        )?
    };
    out.flush()?;

    if report.stats.frames_decoded == 0 {
        warn!("no video frames decoded");
    }
    info!(
        frames = report.stats.frames_decoded,
        bytes = report.stats.bitstream_bytes,
        output = %output.display(),
        "wrote elementary stream"
    );
    write_report(pass.report.as_deref(), &report)
}

fn run_sensors(
    pass: &PassArgs,
    output: Option<PathBuf>,
    format: Option<SensorFormat>,
    integrated: bool,
) -> Result<()> {
    let format = format.unwrap_or_else(|| infer_format(output.as_deref()));
    let category = if integrated {
        RoleCategory::IntegratedSensors
    } else {
        RoleCategory::Sensors
    };
    let options = pass.options(ChannelSelector::Role(category));
    let out = open_output(output.as_deref())?;

    let mut sink: Box<dyn RecordSink> = match format {
        SensorFormat::Csv => Box::new(CsvRecordSink::new(out)),
        SensorFormat::Jsonl => Box::new(JsonLinesRecordSink::new(out)),
    };
    let report = {
        let mut sinks = Sinks::default().sensors(sink.as_mut());
        extract_path(&pass.input, options, &mut sinks)?
    };

    if report.stats.sensor_records_decoded == 0 {
        warn!(?category, "no sensor records decoded");
    }
    info!(
        records = report.stats.sensor_records_decoded,
        errors = report.stats.decode_error_count,
        "wrote sensor table"
    );
    write_report(pass.report.as_deref(), &report)
}

fn run_dump(input: &Path, selector: ChannelSelector, output: &Path) -> Result<()> {
    let file = McapFile::open(input)?;
    let selector = selector.resolve(&file.catalog_if_present()?)?;

    let mut out = BufWriter::new(
        File::create(output).with_context(|| format!("creating {}", output.display()))?,
    );
    let (mut messages, mut bytes) = (0u64, 0u64);
    for msg in file.messages()? {
        let msg = msg?;
        let role = classify(&msg.channel_name);
        if !selector.matches(msg.channel_id, &msg.channel_name, &role) {
            continue;
        }
        out.write_all(&msg.payload)?;
        messages += 1;
        bytes += msg.payload.len() as u64;
    }
    out.flush()?;

    if messages == 0 {
        bail!("channel {selector} has no messages");
    }
    info!(messages, bytes, output = %output.display(), "dumped channel");
    Ok(())
}

fn run_intrinsics(conf: &Path, mode: Option<CameraMode>, height: Option<u32>) -> Result<()> {
    let mode = match (mode, height) {
        (Some(m), _) => m,
        (None, Some(h)) => CameraMode::from_height(h)?,
        (None, None) => bail!("either --mode or --height is required"),
    };
    let stereo = StereoIntrinsics::from_config_path(conf, mode)
        .with_context(|| format!("reading {}", conf.display()))?;

    let mut out = BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut out, &stereo)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match cli.command {
        Command::List { input } => run_list(&input),
        Command::Info { input } => run_info(&input),
        Command::Video { pass, output } => run_video(&pass, output),
        Command::Sensors {
            pass,
            output,
            format,
            integrated,
        } => run_sensors(&pass, output, format, integrated),
        Command::Dump {
            input,
            channel,
            output,
        } => run_dump(&input, channel, &output),
        Command::Intrinsics { conf, mode, height } => run_intrinsics(&conf, mode, height),
    }
}

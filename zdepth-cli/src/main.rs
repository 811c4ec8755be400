//! zdepth CLI entrypoint.
//!
//! ```bash
//! zdepth probe --device 0
//! zdepth probe --json
//! zdepth config --config codec.json --json
//! ```

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use zdepth_codec::H264Codec;
use zdepth_core::config::CodecConfig;
use zdepth_core::context::ExecutionContext;
use zdepth_core::cuda::CudaDriver;
use zdepth_core::error::{CodecError, Result};
use zdepth_core::types::StreamGeometry;
use zdepth_nvcodec::NvidiaBackend;

#[derive(Parser, Debug)]
#[command(
    name = "zdepth",
    version,
    about = "Hardware H.264 codec lifecycle for depth streams",
    arg_required_else_help = true,
    after_help = "Examples:\n  zdepth probe --json\n  zdepth probe --device 1\n  zdepth config --config codec.json --json"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open an execution context on a CUDA device and test for an encoder session.
    Probe(ProbeArgs),
    /// Print the effective codec configuration.
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
struct ProbeArgs {
    /// CUDA device ordinal.
    #[arg(short = 'd', long = "device", default_value_t = 0)]
    device: u32,

    /// Emit JSON probe output.
    #[arg(long = "json", default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    /// JSON configuration file. Missing fields take their defaults.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Override the CUDA device ordinal.
    #[arg(short = 'd', long = "device")]
    device: Option<u32>,

    /// Emit JSON output.
    #[arg(long = "json", default_value_t = false)]
    json: bool,
}

const JSON_SCHEMA_VERSION: u32 = 1;

/// Edge length of the black keyframe used for the encoder session check.
const SESSION_CHECK_SIZE: u32 = 64;

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let json_error_command = match &cli.command {
        Commands::Probe(args) if args.json => Some("probe"),
        Commands::Config(args) if args.json => Some("config"),
        _ => None,
    };

    let result = match cli.command {
        Commands::Probe(args) => run_probe(args),
        Commands::Config(args) => run_config(args),
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            if let Some(command) = json_error_command {
                println!("{}", command_error_json(command, &err));
            } else {
                tracing::error!(error = %err, code = err.error_code(), "Command failed");
            }
            std::process::exit(err.error_code() as i32);
        }
    }
}

fn init_tracing() {
    let ansi_enabled = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(ansi_enabled)
        .init();
}

// ─── probe ───────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct ProbeReport {
    schema_version: u32,
    command: &'static str,
    ok: bool,
    device: u32,
    device_count: u32,
    name: String,
    total_mem_mb: usize,
    compute_capability: String,
    multiprocessor_count: i32,
    encoder_session: SessionReport,
}

#[derive(Serialize, Debug)]
struct SessionReport {
    ok: bool,
    bytes: usize,
    error_code: Option<u32>,
    error: Option<String>,
}

fn run_probe(args: ProbeArgs) -> Result<()> {
    let mut driver = CudaDriver::new();
    let device_count = driver.device_count()?;
    if args.device >= device_count {
        return Err(CodecError::Config(format!(
            "device {} requested but only {device_count} CUDA device(s) are visible",
            args.device
        )));
    }

    let mut context = ExecutionContext::new();
    context.create(&mut driver, args.device)?;
    let properties = context.properties().cloned().unwrap_or_default();
    context.destroy(&mut driver);

    let report = ProbeReport {
        schema_version: JSON_SCHEMA_VERSION,
        command: "probe",
        ok: true,
        device: args.device,
        device_count,
        name: properties.name,
        total_mem_mb: properties.total_memory_bytes / (1024 * 1024),
        compute_capability: format!(
            "{}.{}",
            properties.compute_capability.0, properties.compute_capability.1
        ),
        multiprocessor_count: properties.multiprocessor_count,
        encoder_session: probe_encoder_session(args.device),
    };

    if args.json {
        println!("{}", to_json(&report)?);
    } else {
        println!("probe: device {} of {}", report.device, report.device_count);
        println!(
            "name={} total_mem_mb={} compute_capability={} sm_count={}",
            report.name,
            report.total_mem_mb,
            report.compute_capability,
            report.multiprocessor_count
        );
        let session = &report.encoder_session;
        match &session.error {
            None => println!("encoder_session=ok bytes={}", session.bytes),
            Some(error) => println!(
                "encoder_session=unavailable code={} error={error}",
                session.error_code.unwrap_or_default()
            ),
        }
    }
    Ok(())
}

/// Encode and flush one black keyframe through the NVIDIA backend.
fn probe_encoder_session(gpu_index: u32) -> SessionReport {
    let config = CodecConfig::default().with_gpu_index(gpu_index);
    let result = H264Codec::new(NvidiaBackend::new(), config).and_then(|mut codec| {
        let geometry = StreamGeometry::new(SESSION_CHECK_SIZE, SESSION_CHECK_SIZE)?;
        let mut frame = vec![16u8; geometry.luma_bytes()];
        frame.resize(geometry.nv12_bytes(), 128);
        let mut compressed = Vec::new();
        codec.encode_begin(geometry, true, &frame, &mut compressed)?;
        codec.encode_finish(&mut compressed)?;
        Ok(compressed.len())
    });

    match result {
        Ok(bytes) => SessionReport {
            ok: true,
            bytes,
            error_code: None,
            error: None,
        },
        Err(err) => SessionReport {
            ok: false,
            bytes: 0,
            error_code: Some(err.error_code()),
            error: Some(err.to_string()),
        },
    }
}

// ─── config ──────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct ConfigReport<'a> {
    schema_version: u32,
    command: &'static str,
    ok: bool,
    source: Option<String>,
    config: &'a CodecConfig,
}

fn run_config(args: ConfigArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => CodecConfig::from_json_file(path)?,
        None => CodecConfig::default(),
    };
    if let Some(device) = args.device {
        config = config.with_gpu_index(device);
    }
    config.validate()?;

    if args.json {
        let report = ConfigReport {
            schema_version: JSON_SCHEMA_VERSION,
            command: "config",
            ok: true,
            source: args.config.as_ref().map(|p| p.display().to_string()),
            config: &config,
        };
        println!("{}", to_json(&report)?);
    } else {
        match &args.config {
            Some(path) => println!("config: {}", path.display()),
            None => println!("config: defaults"),
        }
        println!("gpu_index={}", config.gpu_index);
        println!("decode_attempts={}", config.decode_attempts);
        println!("encoder_preset={:?}", config.encoder_preset);
        println!("decode_output={:?}", config.decode_output);
    }
    Ok(())
}

// ─── JSON helpers ────────────────────────────────────────────────────────────

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|err| CodecError::Config(format!("failed to serialize output: {err}")))
}

fn command_error_json(command: &str, err: &CodecError) -> serde_json::Value {
    serde_json::json!({
        "schema_version": JSON_SCHEMA_VERSION,
        "command": command,
        "ok": false,
        "error_code": err.error_code(),
        "error": err.to_string(),
    })
}

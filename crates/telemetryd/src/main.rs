//! telemetryd — the telemetry daemon.
//!
//! One binary, two modes:
//! - `server`: metric store, HTTP API, periodic dump to disk
//! - `agent`: samples the host process and reports to a server
//!
//! # Usage
//!
//! ```text
//! telemetryd server -a 0.0.0.0:8080 -f ./dump/dump -i 300 -r
//! telemetryd agent -a http://localhost:8080 -p 2 -r 10
//! ```
//!
//! Every flag can also be set through the environment variable named in
//! `--help`.

mod agent_mode;
mod server_mode;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use telemetry_agent::{AgentConfig, ReportMode};

use crate::server_mode::ServerConfig;

#[derive(Parser)]
#[command(name = "telemetryd", about = "Telemetry metrics server and agent")]
struct Cli {
    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the metrics server.
    Server(ServerArgs),
    /// Run the agent, reporting this host to a server.
    Agent(AgentArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Args)]
struct LogArgs {
    /// Log filter, e.g. `info` or `telemetry_api=debug`. `RUST_LOG` wins if set.
    #[arg(short = 'l', long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Log destination: a file path, `stdout` or `stderr`.
    #[arg(long, env = "LOG_PATH", global = true)]
    log_file: Option<PathBuf>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text", global = true)]
    log_format: LogFormat,
}

#[derive(Args)]
struct ServerArgs {
    /// Address to listen on.
    #[arg(short, long, env = "ADDRESS", default_value = "0.0.0.0:8080")]
    address: String,

    /// Dump file path.
    #[arg(short = 'f', long, env = "FILE_STORAGE_PATH", default_value = "./dump/dump")]
    file_storage_path: PathBuf,

    /// Seconds between dumps; 0 dumps only at shutdown.
    #[arg(short = 'i', long, env = "STORE_INTERVAL", default_value_t = 300)]
    store_interval: u64,

    /// Restore metrics from the dump file on start.
    #[arg(short, long, env = "RESTORE")]
    restore: bool,
}

#[derive(Args)]
struct AgentArgs {
    /// Server address.
    #[arg(short, long, env = "ADDRESS", default_value = "http://localhost:8080")]
    address: String,

    /// Seconds between polls.
    #[arg(short = 'p', long, env = "POLL_INTERVAL", default_value_t = 2,
          value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval: u64,

    /// Seconds between reports.
    #[arg(short = 'r', long, env = "REPORT_INTERVAL", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..))]
    report_interval: u64,

    /// Gzip report bodies.
    #[arg(long, env = "COMPRESS", default_value_t = true, action = ArgAction::Set)]
    compress: bool,

    /// `batch` or `per-metric`.
    #[arg(long, env = "REPORT_MODE", default_value_t = ReportMode::Batch)]
    report_mode: ReportMode,

    /// Per-request timeout in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        Self {
            address: args.address,
            file_storage_path: args.file_storage_path,
            store_interval: Duration::from_secs(args.store_interval),
            restore: args.restore,
        }
    }
}

impl From<AgentArgs> for AgentConfig {
    fn from(args: AgentArgs) -> Self {
        Self {
            address: args.address,
            poll_interval: Duration::from_secs(args.poll_interval),
            report_interval: Duration::from_secs(args.report_interval),
            compress: args.compress,
            mode: args.report_mode,
            timeout: Duration::from_secs(args.timeout),
        }
    }
}

fn init_tracing(args: &LogArgs) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&args.log_level))?;

    let (writer, ansi) = match args.log_file.as_deref() {
        None => (BoxMakeWriter::new(std::io::stdout), true),
        Some(p) if p == Path::new("stdout") => (BoxMakeWriter::new(std::io::stdout), true),
        Some(p) if p == Path::new("stderr") => (BoxMakeWriter::new(std::io::stderr), true),
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);
    let installed = match args.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log)?;

    match cli.command {
        Command::Server(args) => server_mode::run_server(args.into()).await,
        Command::Agent(args) => agent_mode::run_agent(args.into()).await,
    }
}

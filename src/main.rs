//! analyser - K6BEZ antenna analyser driver
//!
//! Runs a VSWR scan or a detector voltage capture and writes plot-ready
//! text to a file or stdout.

use analyser_core::cli::{print_exit_codes, CliResult};
use analyser_core::config::config_path;
use analyser_core::core::recorder::Recorder;
use analyser_core::{
    install_interrupt_handler, AppConfig, ByteTransport, CancellationToken, Detector,
    OscilloscopeConfig, OscilloscopeSession, PlotFileRecorder, ScanSession, SessionError,
    SessionSummary, SimulatedAnalyser,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info, warn};

/// analyser CLI
#[derive(Parser, Debug)]
#[command(
    name = "analyser",
    version,
    about = "K6BEZ antenna analyser driver",
    long_about = None
)]
struct Cli {
    /// Analyser serial device
    #[arg(short, long, global = true, env = "ANALYSER_PORT")]
    port: Option<String>,

    /// Baud rate
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Per-byte read timeout in tenths of a second
    #[arg(long, global = true, value_parser = clap::value_parser!(u8).range(1..))]
    timeout_ds: Option<u8>,

    /// Capture file; stdout when absent
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Talk to a built-in firmware simulator instead of hardware
    #[arg(long, global = true)]
    simulate: bool,

    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a frequency range and record VSWR
    Scan {
        /// Start frequency in Hz
        #[arg(short = 'a', long)]
        start: i64,

        /// Stop frequency in Hz
        #[arg(short = 'b', long)]
        stop: i64,

        /// Number of steps between start and stop
        #[arg(short = 'n', long)]
        steps: Option<u32>,

        /// Settle delay in ms
        #[arg(short = 's', long)]
        settle: Option<u32>,
    },

    /// Record detector voltages
    Osc {
        /// Frequency to tune to before measuring; the DDS stays in reset if omitted
        #[arg(short = 'a', long)]
        freq: Option<i64>,

        /// Settle delay in ms
        #[arg(short = 's', long)]
        settle: Option<u32>,

        /// Detector to read (forward or reverse)
        #[arg(short = 'd', long, default_value = "forward")]
        detector: Detector,
    },

    /// List available serial ports
    Ports,

    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },

    /// Print the exit code table
    ExitCodes,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(&cli).unwrap_or_else(|e| CliResult::setup_failed(format!("{e:#}")));
    match (&result, result.message()) {
        (CliResult::Error(code, _), Some(msg)) => {
            eprintln!("{msg}");
            debug!(code, "exiting");
        }
        (_, Some(msg)) => info!("{}", msg),
        _ => {}
    }
    result.to_exit_code()
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<CliResult> {
    let config = effective_config(cli)?;

    match &cli.command {
        Commands::Scan {
            start,
            stop,
            steps,
            settle,
        } => {
            let scan = config.scan.scan(*start, *stop, *steps, *settle);
            let transport = match open_transport(cli, &config, scan.validate()) {
                Ok(transport) => transport,
                Err(e) => return Ok(CliResult::from(e)),
            };
            let cancel = interrupt_token()?;
            let mut recorder = open_recorder(cli)?;
            Ok(report(ScanSession::new(transport, scan, cancel).run(&mut recorder)))
        }
        Commands::Osc {
            freq,
            settle,
            detector,
        } => {
            let osc = config.scan.oscilloscope(
                OscilloscopeConfig::new(*detector).freq_hz(freq.unwrap_or(0)),
                *settle,
            );
            let transport = match open_transport(cli, &config, osc.validate()) {
                Ok(transport) => transport,
                Err(e) => return Ok(CliResult::from(e)),
            };
            let cancel = interrupt_token()?;
            let mut recorder = open_recorder(cli)?;
            Ok(report(
                OscilloscopeSession::new(transport, osc, cancel).run(&mut recorder),
            ))
        }
        Commands::Ports => list_ports(),
        Commands::Config { save } => {
            print!("{}", config.to_toml()?);
            if *save {
                let path = match &cli.config {
                    Some(path) => {
                        config.save_to(path)?;
                        path.clone()
                    }
                    None => config.save()?,
                };
                return Ok(CliResult::success_with_message(format!(
                    "Saved {}",
                    path.display()
                )));
            }
            Ok(CliResult::success())
        }
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(CliResult::success())
        }
    }
}

/// Config file values with command line overrides applied
fn effective_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None if config_path().is_some() => AppConfig::load()?,
        None => AppConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.port.device.clone_from(port);
    }
    if let Some(baud) = cli.baud {
        config.port.baud_rate = baud;
    }
    if let Some(timeout) = cli.timeout_ds {
        config.port.timeout_deciseconds = timeout;
    }
    Ok(config)
}

fn interrupt_token() -> anyhow::Result<CancellationToken> {
    let token = CancellationToken::new();
    install_interrupt_handler(&token).context("Could not install the Ctrl-C handler")?;
    Ok(token)
}

type Sink = PlotFileRecorder<Box<dyn Write>>;

fn open_recorder(cli: &Cli) -> anyhow::Result<Spinner<Sink>> {
    let out: Box<dyn Write> = match &cli.output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Could not open output file {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock()),
    };
    Ok(Spinner::new(PlotFileRecorder::new(out), !cli.verbose))
}

/// Check the acquisition parameters, then open the simulator or the serial port
///
/// Runs before the output file is created, so a failure here leaves an
/// existing capture untouched.
fn open_transport(
    cli: &Cli,
    config: &AppConfig,
    checked: Result<(), String>,
) -> Result<Box<dyn ByteTransport>, SessionError> {
    checked.map_err(SessionError::InvalidConfig)?;
    if cli.simulate {
        info!("Using the simulated analyser");
        return Ok(Box::new(SimulatedAnalyser::new()));
    }
    open_serial(config)
}

#[cfg(unix)]
fn open_serial(config: &AppConfig) -> Result<Box<dyn ByteTransport>, SessionError> {
    config.port.validate().map_err(SessionError::Open)?;
    debug!(device = %config.port.device, baud = config.port.baud_rate, "opening port");
    let transport =
        analyser_core::SerialTransport::open(&config.port).map_err(SessionError::Open)?;
    Ok(Box::new(transport))
}

#[cfg(not(unix))]
fn open_serial(_config: &AppConfig) -> Result<Box<dyn ByteTransport>, SessionError> {
    Err(SessionError::Open(
        analyser_core::TransportError::InvalidConfiguration(
            "serial ports are only supported on Unix; use --simulate".to_string(),
        ),
    ))
}

fn report(result: Result<SessionSummary, SessionError>) -> CliResult {
    if let Ok(summary) = &result {
        if summary.skipped_lines > 0 {
            warn!("{} malformed data lines were skipped", summary.skipped_lines);
        }
    }
    CliResult::from(result)
}

fn list_ports() -> anyhow::Result<CliResult> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        return Ok(CliResult::success_with_message("No serial ports found."));
    }
    for port in &ports {
        println!("{}", port.port_name);
    }
    Ok(CliResult::success())
}

/// Shows activity on stderr, one tick per record
struct Spinner<R> {
    inner: R,
    enabled: bool,
    ticks: usize,
}

impl<R> Spinner<R> {
    const FRAMES: [char; 4] = ['\\', '-', '/', '|'];

    fn new(inner: R, enabled: bool) -> Self {
        Self {
            inner,
            enabled,
            ticks: 0,
        }
    }
}

impl<T, R: Recorder<T>> Recorder<T> for Spinner<R> {
    fn record(&mut self, record: &T) -> io::Result<()> {
        self.inner.record(record)?;
        if self.enabled {
            eprint!("{}  \r", Self::FRAMES[self.ticks % Self::FRAMES.len()]);
            self.ticks += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.enabled && self.ticks > 0 {
            eprint!("   \r");
        }
        self.inner.finish()
    }
}

//! Sim Bridge CLI Application
//!
//! Command-line harness for the sim-bridge library. It loads a simulation
//! engine shared library, wires the callback bridge into it and reports
//! every callback the engine makes:
//! - Plot requests and messages
//! - Control-iteration notifications
//! - Subscribed engine events

use anyhow::{Context, Result};
use clap::Parser;
use sim_bridge::{runtime, DynamicLibrary, EventCode, HostContext};
use std::path::PathBuf;
use std::sync::Arc;

mod callbacks;
mod config;
mod report;

use callbacks::RecordingHost;
use config::AppConfig;

/// Sim Bridge - exercise a simulation engine's host callbacks
#[derive(Parser, Debug)]
#[command(name = "sim-bridge-cli")]
#[command(about = "Load a simulation engine and record its host callbacks", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the engine shared library (overrides the config file)
    #[arg(short, long, value_name = "FILE")]
    library: Option<PathBuf>,

    /// Exported entry point to call with the session context
    #[arg(short, long, value_name = "SYMBOL")]
    entry: Option<String>,

    /// Event to subscribe to, by name or code (can be repeated)
    #[arg(long = "event", value_name = "EVENT")]
    events: Vec<String>,

    /// Write the callback transcript as JSON
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Sim Bridge CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using bridge library v{}", sim_bridge::VERSION);

    // Merge config file and command-line overrides
    let config = resolve_config(&args)?;
    let Some(library_path) = config.library.path.clone() else {
        println!("Sim Bridge - No engine library specified");
        println!("\nQuick Start:");
        println!("  sim-bridge-cli --library libengine.so --entry sim_run");
        println!("  sim-bridge-cli --config bridge.toml");
        println!("\nUse --help for more options");
        return Ok(());
    };

    // Load the engine library
    let events = config.event_codes()?;
    let library = unsafe { DynamicLibrary::open(&library_path, &config.bridge.symbols) }
        .with_context(|| format!("Failed to load engine: {:?}", library_path))?;
    let library = Arc::new(library);

    // Install the bridge and run one session; shut down even if it failed
    runtime::init(library.clone(), config.bridge.clone())?;
    let host = Arc::new(RecordingHost::new());
    let outcome = run_session(&config, &library, &host, &events);
    runtime::shutdown()?;
    outcome?;

    // Report what the engine called back with
    let records = host.records();
    if !args.quiet {
        print!("{}", report::render_summary(&config.session.name, &records));
    }
    if let Some(path) = &config.output.json {
        report::write_json(path, &records)?;
    }

    Ok(())
}

/// Merge the config file (if any) with command-line overrides
fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    if let Some(library) = &args.library {
        config.library.path = Some(library.clone());
    }
    if let Some(entry) = &args.entry {
        config.library.entry_point = Some(entry.clone());
    }
    if !args.events.is_empty() {
        config.session.events = args.events.clone();
    }
    if let Some(output) = &args.output {
        config.output.json = Some(output.clone());
    }

    log::debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Open a session, let the engine run, then close it again
fn run_session(
    config: &AppConfig,
    library: &DynamicLibrary,
    host: &Arc<RecordingHost>,
    events: &[EventCode],
) -> Result<()> {
    let context = HostContext::new(config.session.name.clone())
        .with_plot(host.clone())
        .with_messages(host.clone())
        .with_controls(host.clone());
    let session = runtime::open_session(Arc::new(context)).context("Failed to open session")?;

    // Subscribe requested events
    for code in events {
        session
            .subscribe(*code, host.clone())
            .with_context(|| format!("Failed to subscribe to event {}", code))?;
    }

    // Hand control to the engine
    if let Some(entry) = &config.library.entry_point {
        log::info!("Running {} in {:?}", entry, library.path());
        let status = unsafe { library.call_entry(entry, session.handle()) }?;
        if status != 0 {
            log::warn!("{} returned status {}", entry, status);
        }
    } else {
        log::info!("No entry point configured; callbacks registered and released");
    }

    session.close();
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

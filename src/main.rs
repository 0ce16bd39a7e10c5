//! RSSI Features CLI
//!
//! Rolling feature extraction for labelled beacon recordings.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rssi_features::{
    config::Config, diagnostics::create_shared_stats, Aggregator, SenderReceiverFilter, VERSION,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rssi-features")]
#[command(version = VERSION)]
#[command(about = "Rolling RSSI feature extraction for labelled beacon recordings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn a raw record log into a feature table
    Aggregate {
        /// Input log (stdin if omitted)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Output table (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of most recent records kept for windowing
        #[arg(long)]
        capacity: Option<usize>,

        /// Keep rows that contain undefined values
        #[arg(long)]
        allow_incomplete: bool,

        /// Compute everything but write nothing
        #[arg(long)]
        dry_run: bool,

        /// Log per-line details
        #[arg(long, short)]
        verbose: bool,

        /// Write run statistics to this file (JSON)
        #[arg(long)]
        stats: Option<PathBuf>,
    },

    /// Keep only the records of one sender/receiver link
    Select {
        /// Input log (stdin if omitted)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Output log (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Sender id to keep (any if omitted)
        #[arg(long)]
        sender: Option<u32>,

        /// Receiver id to keep (any if omitted)
        #[arg(long)]
        receiver: Option<u32>,

        /// Filter but write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the header row of the feature table
    Columns {
        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the effective configuration
    Config {
        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Aggregate {
            input,
            output,
            config,
            capacity,
            allow_incomplete,
            dry_run,
            verbose,
            stats,
        } => {
            let config = aggregate_config(
                config.as_deref(),
                capacity,
                allow_incomplete,
                dry_run,
                verbose,
            )?;
            init_logging(config.verbose);
            cmd_aggregate(&config, input.as_deref(), output.as_deref(), stats.as_deref())
        }
        Commands::Select {
            input,
            output,
            sender,
            receiver,
            dry_run,
        } => {
            init_logging(false);
            cmd_select(input.as_deref(), output.as_deref(), sender, receiver, dry_run)
        }
        Commands::Columns { config } => {
            init_logging(false);
            let config = load_config(config.as_deref())?;
            let aggregator = Aggregator::new(&config)?;
            println!("{}", aggregator.header()?);
            Ok(())
        }
        Commands::Config { config } => {
            init_logging(false);
            cmd_config(config.as_deref())
        }
    }
}

/// Logs go to stderr so stdout can carry the table. Called once the
/// effective configuration is known, so a config file can turn on `debug`.
fn init_logging(verbose: bool) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level(verbose))),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

fn default_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// File (or default) configuration with command-line flags applied on top.
fn aggregate_config(
    path: Option<&Path>,
    capacity: Option<usize>,
    allow_incomplete: bool,
    dry_run: bool,
    verbose: bool,
) -> Result<Config> {
    let mut config = load_config(path)?;
    if let Some(capacity) = capacity {
        config.capacity = capacity;
    }
    config.allow_incomplete |= allow_incomplete;
    config.dry_run |= dry_run;
    config.verbose |= verbose;
    Ok(config)
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Could not load configuration {}", path.display()))?,
        None => Config::load().context("Could not load default configuration")?,
    };
    Ok(config)
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    Ok(match path {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Could not open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    })
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Could not create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    })
}

fn cmd_aggregate(
    config: &Config,
    input: Option<&Path>,
    output: Option<&Path>,
    stats_path: Option<&Path>,
) -> Result<()> {
    tracing::info!(
        capacity = config.capacity,
        channels = config.channels.len(),
        windows = config.windows.len(),
        dry_run = config.dry_run,
        "Running aggregator"
    );

    let stats = create_shared_stats();
    let mut aggregator = Aggregator::with_stats(config, stats.clone())?;

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let reader = open_input(input)?;
    let writer = open_output(output)?;
    aggregator
        .run_while(reader, writer, || running.load(Ordering::SeqCst))
        .context("Aggregation failed")?;

    eprintln!();
    eprintln!("{}", stats.summary());

    if let Some(path) = stats_path {
        if let Err(e) = stats.save(path) {
            tracing::warn!("Could not save run statistics: {e}");
        }
    }
    Ok(())
}

fn cmd_select(
    input: Option<&Path>,
    output: Option<&Path>,
    sender: Option<u32>,
    receiver: Option<u32>,
    dry_run: bool,
) -> Result<()> {
    tracing::info!(?sender, ?receiver, dry_run, "Running sender/receiver filter");

    let filter = SenderReceiverFilter::new(sender, receiver).with_dry_run(dry_run);
    let reader = open_input(input)?;
    let writer = open_output(output)?;
    filter.run(reader, writer).context("Selection failed")?;

    eprintln!();
    eprintln!("{}", filter.stats().summary());
    Ok(())
}

fn cmd_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;

    println!("Configuration");
    println!("=============");
    println!();
    println!(
        "Config file: {:?}",
        path.map(Path::to_path_buf).unwrap_or_else(Config::config_path)
    );
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}

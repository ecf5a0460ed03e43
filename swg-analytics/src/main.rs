//! swg-analytics-relay - CLI for the analytics relay
//!
//! This tool provides commands for:
//! - Checking the effective relay configuration
//! - Relaying client events (JSON lines) to the logging frontend
//! - Generating transaction ids
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/swg-analytics/config.toml (~/.config/swg-analytics/config.toml)
//! - Logs: $XDG_STATE_HOME/swg-analytics/ (~/.local/state/swg-analytics/)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use swg_analytics_core::context::generate_transaction_id;
use swg_analytics_core::{
    AnalyticsService, ClientEvent, ClientEventManager, Config, HttpChannel, PageEnvironment,
};

#[derive(Parser)]
#[command(name = "swg-analytics-relay")]
#[command(about = "Relay subscription widget analytics to the logging frontend")]
#[command(version)]
struct Args {
    /// Verbose output (writes the log file)
    #[arg(short, long)]
    verbose: bool,

    /// Config file to use instead of the XDG default
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the effective configuration
    Status,

    /// Relay client events, one JSON object per line
    Relay {
        /// Read events from this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Also forward events from AMP, propensity and publisher originators
        #[arg(long)]
        enable_publisher_events: bool,

        /// Referrer of the page the events came from
        #[arg(long, default_value = "")]
        referrer: String,

        /// Query string of the page the events came from
        #[arg(long, default_value = "")]
        query: String,

        /// Extra labels to attach to every request
        #[arg(short, long)]
        label: Vec<String>,
    },

    /// Print a fresh transaction id
    Txid,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };

    // Keep the guard alive for the whole run so buffered logs get flushed
    let _log_guard = if args.verbose {
        Some(
            swg_analytics_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config),
        Command::Relay {
            input,
            enable_publisher_events,
            referrer,
            query,
            label,
        } => {
            let page = PageEnvironment::new(referrer, query);
            cmd_relay(config, input, enable_publisher_events, page, label).await
        }
        Command::Txid => {
            println!("{}", generate_transaction_id());
            Ok(())
        }
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("SwG Analytics Relay Configuration");
    println!("=================================");
    println!();

    let runtime = &config.runtime;
    println!(
        "Publication ID:  {}",
        if runtime.publication_id.is_empty() {
            "<not set>"
        } else {
            runtime.publication_id.as_str()
        }
    );
    println!("Frontend URL:    {}", runtime.frontend_url);
    println!("Publisher events: {}", runtime.enable_swg_analytics);
    println!(
        "Experiments:     {}",
        if runtime.experiments.is_empty() {
            "<none>"
        } else {
            runtime.experiments.as_str()
        }
    );

    let channel = &config.channel;
    println!("Timeout:         {}s", channel.timeout_secs);
    println!("Max Retries:     {}", channel.max_retries);
    println!("Ready Attempts:  {}", channel.ready_attempts);
    println!("Log Level:       {}", config.logging.level);
    println!(
        "Log File:        {}",
        swg_analytics_core::logging::log_file_path().display()
    );

    Ok(())
}

async fn cmd_relay(
    mut config: Config,
    input: Option<PathBuf>,
    enable_publisher_events: bool,
    page: PageEnvironment,
    labels: Vec<String>,
) -> Result<()> {
    if enable_publisher_events {
        config.runtime.enable_swg_analytics = true;
    }

    let reader: Box<dyn BufRead> = match &input {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let channel =
        HttpChannel::new(config.channel.clone()).context("failed to create HTTP channel")?;
    let events = ClientEventManager::new();
    let service = AnalyticsService::new(&config.runtime, &page, Arc::new(channel), &events);
    service.add_labels(&labels);

    let mut malformed = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ClientEvent>(&line) {
            Ok(event) => events.log_event(&event),
            Err(e) => {
                malformed += 1;
                tracing::warn!(line = index + 1, error = %e, "Skipping malformed event");
                eprintln!("line {}: skipping malformed event: {}", index + 1, e);
            }
        }
    }

    service.flush().await;

    let stats = service.stats();
    println!("Transaction ID:  {}", service.transaction_id());
    println!();
    println!("Stats:");
    println!("  Admitted:  {}", stats.admitted);
    println!("  Dropped:   {}", stats.dropped);
    println!("  Sent:      {}", stats.sent);
    println!("  Failed:    {}", stats.failed);
    if malformed > 0 {
        println!("  Malformed: {}", malformed);
    }

    Ok(())
}

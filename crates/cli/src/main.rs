use anyhow::Result;
use clap::{Parser, Subcommand};
use oracle_core::config::{AppConfig, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
use commands::{handle_config_command, run_simulation, ConfigCommands, SimulateOptions};

#[derive(Parser)]
#[command(name = "oracle-cli")]
#[command(about = "Oracle CLI - Management and simulation tool for the quorum oracle")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration Management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Run rounds against simulated providers
    Simulate {
        /// Path to config file (defaults to $ORACLE_CONFIG or config/config.toml)
        #[arg(short, long)]
        file: Option<String>,

        /// Number of rounds, overriding the configured value
        #[arg(short, long)]
        rounds: Option<u32>,

        /// Quorum threshold, overriding the configured default
        #[arg(short, long)]
        quorum: Option<usize>,

        /// Fraction of queries providers leave unanswered, in [0, 1]
        #[arg(long)]
        fault_ratio: Option<f64>,

        /// Print Prometheus metrics when done
        #[arg(long)]
        metrics: bool,
    },
}

/// Initializes the logging system based on the configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let level = logging.level.as_str();
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,oracle_core={level},oracle_cli={level}")));

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format.as_str() == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer().json();
        registry.with(fmt_layer).init();
    } else {
        // "pretty" and any other format default to pretty logging
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config(config_command) => {
            handle_config_command(config_command)?;
        }

        Commands::Simulate { file, rounds, quorum, fault_ratio, metrics } => {
            let config = match file {
                Some(path) => AppConfig::from_file(&path)?,
                None => AppConfig::load()?,
            };
            init_logging(&config.logging);

            let options = SimulateOptions { rounds, quorum, fault_ratio, show_metrics: metrics };
            run_simulation(config, options).await?;
        }
    }

    Ok(())
}

use clap::Subcommand;
use oracle_core::config::AppConfig;
use std::path::Path;

use super::utils::{print_error, print_info, print_success, CliError, CliResult};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the current configuration
    Validate {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Show current configuration
    Show {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Include disabled providers
        #[arg(long)]
        all: bool,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output path for the config file
        #[arg(short, long, default_value = "config/config.toml")]
        output: String,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(&file),
        ConfigCommands::Show { file, all } => show_config(&file, all),
        ConfigCommands::Generate { output, force } => generate_config(&output, force),
    }
}

fn validate_config(file: &str) -> CliResult<()> {
    if !Path::new(file).exists() {
        print_error(&format!("Configuration file not found: {file}"));
        return Err(CliError::Config(format!("File not found: {file}")));
    }

    print_info(&format!("Loading configuration from {file}..."));

    let config = AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))?;

    print_info("Validating configuration...");
    config.validate().map_err(CliError::Config)?;

    print_success("Configuration is valid!");

    let enabled = config.to_provider_refs().len();
    println!("Configuration Summary:");
    println!("  Environment: {}", config.environment);
    println!("  Providers: {enabled} enabled of {}", config.providers.len());
    println!("  Default Quorum: {} of {enabled}", config.engine.default_quorum_threshold);
    println!(
        "  Metrics: {}",
        if config.metrics.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    Ok(())
}

fn show_config(file: &str, all: bool) -> CliResult<()> {
    let config = AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))?;

    println!("Configuration from {file}:");
    println!("  Environment: {}", config.environment);

    println!("\n[Engine]");
    println!("  Max Providers: {}", config.engine.max_providers);
    println!("  Default Quorum Threshold: {}", config.engine.default_quorum_threshold);
    println!("  History Capacity: {}", config.engine.history_capacity);
    println!("  Event Capacity: {}", config.engine.event_capacity);
    println!("  Effect Timeout: {}s", config.engine.effect_timeout_seconds);

    println!("\n[Providers] ({} configured)", config.providers.len());
    for provider in config.providers.iter().filter(|p| all || p.enabled) {
        let status = if provider.enabled { "" } else { " (disabled)" };
        println!("  {}: {}{status}", provider.name, provider.endpoint);
    }

    println!("\n[Metrics]");
    println!("  Enabled: {}", config.metrics.enabled);

    println!("\n[Logging]");
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);

    println!("\n[Simulation]");
    println!("  Rounds: {}", config.simulation.rounds);
    println!(
        "  Values: {} +/- {}",
        config.simulation.base_value, config.simulation.spread
    );
    println!("  Max Jitter: {}ms", config.simulation.max_jitter_ms);
    println!("  Fault Ratio: {}", config.simulation.fault_ratio);
    if let Some(target) = &config.simulation.action_target {
        println!("  Action Target: {target}");
    }

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# Quorum Oracle Configuration
# This is a sample configuration file with sensible defaults

environment = "development"

[engine]
max_providers = 45
default_quorum_threshold = 3
history_capacity = 1024
event_capacity = 1024
effect_timeout_seconds = 30

# Data providers queried by every round
[[providers]]
name = "node-1"
endpoint = "https://node-1.example.com/price"

[[providers]]
name = "node-2"
endpoint = "https://node-2.example.com/price"

[[providers]]
name = "node-3"
endpoint = "https://node-3.example.com/price"

[[providers]]
name = "node-4"
endpoint = "https://node-4.example.com/price"

[[providers]]
name = "node-5"
endpoint = "https://node-5.example.com/price"
enabled = true

[metrics]
enabled = true

[logging]
level = "info"
format = "pretty"

[simulation]
rounds = 5
base_value = 1000000
spread = 500
max_jitter_ms = 50
fault_ratio = 0.0
"#;

fn generate_config(output: &str, force: bool) -> CliResult<()> {
    if Path::new(output).exists() && !force {
        return Err(CliError::Config(format!(
            "File {output} already exists. Use --force to overwrite."
        )));
    }

    if let Some(parent) = Path::new(output).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, SAMPLE_CONFIG)?;

    print_success(&format!("Sample configuration generated: {output}"));
    print_info("Remember to:");
    print_info("  1. Point provider endpoints at your real data sources");
    print_info("  2. Keep default_quorum_threshold at or below the enabled provider count");

    Ok(())
}

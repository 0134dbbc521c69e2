//! Configuration view and validation commands (`condense config`).

use anyhow::Result;
use std::path::Path;

use condense::config::{CONFIG_FILE_NAME, CondenseConfig, CondenseToml};

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, work_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| work_dir.join(CONFIG_FILE_NAME));

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Condense Configuration");
            println!("======================");
            println!();

            let config = CondenseConfig::discover(cli.config.as_deref(), work_dir)?;
            match &config.source {
                Some(path) => println!("Config file: {}", path.display()),
                None => {
                    println!("No {} found at {}", CONFIG_FILE_NAME, config_path.display());
                    println!("Using default configuration.");
                }
            }
            println!();
            print_effective(&config.toml);

            println!("API key: {}", if config.api_key().is_ok() { "set" } else { "not set" });
            println!();
            if config.source.is_none() {
                println!("Run 'condense config init' to create a {} file.", CONFIG_FILE_NAME);
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE_NAME);
                return Ok(());
            }

            let toml = CondenseToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE_NAME, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            CondenseToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE_NAME, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [defaults] model, temperature, limit");
            println!("  - [retry] and [pipeline] for retries, depth and concurrency");
            println!("  - [[models]] to add models with their context size and prices");
            println!();
        }
    }

    Ok(())
}

fn print_effective(toml: &CondenseToml) {
    let d = &toml.defaults;
    println!("[defaults]");
    println!("  model = \"{}\"", d.model);
    println!("  temperature = {}", d.temperature);
    println!("  max_output_tokens = {}", d.max_output_tokens);
    println!("  reserved_completion_tokens = {}", d.reserved_completion_tokens);
    println!("  limit = \"{}\"", d.limit);
    println!();

    println!("[retry]");
    println!("  max_attempts = {}", toml.retry.max_attempts);
    println!("  delay_secs = {}", toml.retry.delay_secs);
    if toml.retry.exponential {
        println!("  exponential = true");
        println!("  max_delay_secs = {}", toml.retry.max_delay_secs);
    }
    println!();

    println!("[pipeline]");
    println!("  max_depth = {}", toml.pipeline.max_depth);
    println!("  failure_policy = \"{}\"", toml.pipeline.failure_policy);
    println!("  concurrency = {}", toml.pipeline.concurrency);
    println!();

    println!("[batch]");
    println!("  max_errors = {}", toml.batch.max_errors);
    println!();

    println!("[api]");
    println!("  base_url = \"{}\"", toml.api.base_url);
    println!("  timeout_secs = {}", toml.api.timeout_secs);
    println!();

    println!("Models:");
    for model in toml.model_table().iter() {
        println!(
            "  {:<16} {:>7} tokens  ${}/1k in  ${}/1k out",
            model.id, model.context_tokens, model.input_price_per_1k, model.output_price_per_1k
        );
    }
    println!();
}

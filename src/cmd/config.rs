//! Configuration view and validation commands: `kanban config`.

use anyhow::Result;

use kanban::config::KanbanConfig;

use super::super::ConfigCommands;

pub fn cmd_config(config: &KanbanConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Kanban Configuration");
            println!("====================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No kanban.toml found at {}", config_path.display());
                println!("Using defaults. Run 'kanban init' to create one.");
            }
            println!();

            // Effective values include environment overrides.
            let toml = &config.toml;
            println!("[server]");
            println!("  host = \"{}\"", toml.server.host);
            println!("  port = {}", toml.server.port);
            println!("  db_path = \"{}\"", config.db_path().display());
            println!("  dev_mode = {}", toml.server.dev_mode);
            println!();
            println!("[commit]");
            println!("  timeout_ms = {}", toml.commit.timeout_ms);
            println!("  max_attempts = {}", toml.commit.max_attempts);
            println!("  retry_backoff_ms = {}", toml.commit.retry_backoff_ms);
            println!();
            println!("[logging]");
            println!("  level = \"{}\"", config.log_level());
            println!("  format = \"{}\"", toml.logging.format);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No kanban.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = config.validate();
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
    }

    Ok(())
}

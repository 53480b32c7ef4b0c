//! Configuration view and validation commands: `boardsync config`.

use anyhow::Result;
use std::path::Path;

use boardsync::config::{CONFIG_DIR, CONFIG_FILE, SyncConfig, SyncToml};

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_dir = project_dir.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No boardsync.toml found at {}; using defaults.", config_path.display());
            }
            println!();

            let config = SyncConfig::new(project_dir)?;
            let toml = &config.toml;
            println!("[store]");
            println!("  database_path = \"{}\"", config.database_path().display());
            println!("  state_path = \"{}\"", config.state_path().display());
            println!();
            println!("[feed]");
            println!("  capacity = {}", toml.feed.capacity);
            println!();
            println!("[boards]");
            println!("  default_board_name = \"{}\"", toml.boards.default_board_name);
            println!("  starter_columns = {:?}", toml.boards.starter_columns);
            println!("  max_name_len = {}", toml.boards.max_name_len);
            println!();
            println!("[tasks]");
            println!("  max_title_len = {}", toml.tasks.max_title_len);
            println!("  compact_on_delete = {}", toml.tasks.compact_on_delete);
        }
        Some(ConfigCommands::Validate) => {
            if !config_path.exists() {
                println!("No boardsync.toml found. Using defaults (valid).");
                return Ok(());
            }
            let toml = SyncToml::load(&config_path)?;
            toml.check()?;
            let warnings = toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("boardsync.toml already exists at {}", config_path.display());
                return Ok(());
            }
            std::fs::create_dir_all(&config_dir)?;
            SyncToml::default().save(&config_path)?;
            println!("Created boardsync.toml at {}", config_path.display());
        }
    }
    Ok(())
}

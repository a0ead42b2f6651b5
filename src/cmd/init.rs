//! Project initialization: `kanban init`.

use anyhow::{Context, Result};

use kanban::config::{KanbanConfig, KanbanToml};

pub fn cmd_init(config: &KanbanConfig) -> Result<()> {
    std::fs::create_dir_all(&config.kanban_dir)
        .with_context(|| format!("Failed to create {}", config.kanban_dir.display()))?;

    let config_path = config.config_file();
    let created_config = !config_path.exists();
    if created_config {
        KanbanToml::default().save(&config_path)?;
    }

    let db_path = config.db_path();
    let had_db = db_path.exists();
    super::open_db(config)?;

    if created_config || !had_db {
        println!("Initialized kanban project at {}", config.kanban_dir.display());
        println!();
        println!("  config:   {}", config_path.display());
        println!("  database: {}", db_path.display());
        println!();
        println!("Next steps:");
        println!("  1. Run `kanban board create <TITLE>` to create a board");
        println!("  2. Run `kanban serve` to start the board server");
    } else {
        println!(
            "Kanban project already initialized at {}",
            config.kanban_dir.display()
        );
    }

    Ok(())
}

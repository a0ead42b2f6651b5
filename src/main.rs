use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use kanban::config::KanbanConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "kanban")]
#[command(version, about = "Kanban boards with dense task ordering")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .kanban/kanban.toml and the board database
    Init,
    /// Serve the board API and WebSocket
    Serve {
        /// Port to serve on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path (overrides config)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (permissive CORS, bind all interfaces)
        #[arg(long)]
        dev: bool,
    },
    /// Create, list and show boards
    Board {
        #[command(subcommand)]
        command: BoardCommands,
    },
    /// Manage columns
    Column {
        #[command(subcommand)]
        command: ColumnCommands,
    },
    /// Create and reposition tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum BoardCommands {
    /// Create a board with "To Do", "In Progress" and "Done" columns
    Create {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List all boards
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show a board with its columns and tasks
    Show {
        id: i64,
        /// Only show tasks whose title contains this text (case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ColumnCommands {
    /// Append a column to a board
    Add {
        board_id: i64,
        title: String,
        /// Hex color, e.g. "#3b82f6"
        #[arg(short, long)]
        color: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum TaskCommands {
    /// Append a task to a column
    Add {
        column_id: i64,
        title: String,
        /// low, medium, high or urgent
        #[arg(short, long, default_value = "medium")]
        priority: String,
        /// Due date as YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Move a task to another index within its column
    Reorder {
        task_id: i64,
        column_id: i64,
        index: usize,
    },
    /// Move a task into another column at an index (the column's task count appends)
    Move {
        task_id: i64,
        source_column_id: i64,
        target_column_id: i64,
        index: usize,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = KanbanConfig::load(project_dir, cli.verbose)?;
    kanban::logging::init(&config.log_level(), config.log_format());

    match cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Serve { port, db_path, dev } => {
            cmd::cmd_serve(&config, port, db_path, dev).await?
        }
        Commands::Board { command } => cmd::cmd_board(&config, command)?,
        Commands::Column { command } => cmd::cmd_column(&config, command)?,
        Commands::Task { command } => cmd::cmd_task(&config, command).await?,
        Commands::Config { command } => cmd::cmd_config(&config, command)?,
    }

    Ok(())
}

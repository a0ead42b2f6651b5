//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled                     |
//! |----------|--------------------------------------|
//! | `init`   | `Init`                               |
//! | `serve`  | `Serve`                              |
//! | `board`  | `Board create / list / show`         |
//! | `task`   | `Column add`, `Task add / reorder / move` |
//! | `config` | `Config show / validate`             |

pub mod board;
pub mod config;
pub mod init;
pub mod serve;
pub mod task;

pub use board::cmd_board;
pub use config::cmd_config;
pub use init::cmd_init;
pub use serve::cmd_serve;
pub use task::{cmd_column, cmd_task};

use anyhow::{Context, Result};

use kanban::board::db::BoardDb;
use kanban::config::KanbanConfig;

/// Open the configured database, creating its directory on first use.
pub(crate) fn open_db(config: &KanbanConfig) -> Result<BoardDb> {
    let path = config.db_path();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    BoardDb::new(&path).with_context(|| format!("Failed to open database {}", path.display()))
}

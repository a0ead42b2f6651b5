//! Board server: `kanban serve`.

use anyhow::Result;
use std::path::PathBuf;

use kanban::board::server::start_server;
use kanban::config::KanbanConfig;

pub async fn cmd_serve(
    config: &KanbanConfig,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!(%warning, "Configuration warning");
    }
    start_server(config.server_config(port, db_path, dev)).await
}

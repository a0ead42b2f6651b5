//! Board commands: `kanban board create | list | show`.

use anyhow::Result;
use console::style;

use kanban::board::display::render_board;
use kanban::config::KanbanConfig;

use super::super::BoardCommands;

pub fn cmd_board(config: &KanbanConfig, command: BoardCommands) -> Result<()> {
    let db = super::open_db(config)?;

    match command {
        BoardCommands::Create { title, description } => {
            let board = db.create_board(&title, description.as_deref())?;
            println!(
                "Created board {} {}",
                style(&board.title).bold(),
                style(format!("#{}", board.id)).dim()
            );
            for column in db.list_columns(board.id)? {
                println!("  {} #{}", column.title, column.id);
            }
        }
        BoardCommands::List { json } => {
            let boards = db.list_boards()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&boards)?);
            } else if boards.is_empty() {
                println!("No boards yet. Run `kanban board create <TITLE>`.");
            } else {
                for board in boards {
                    println!("{:>4}  {}", board.id, board.title);
                }
            }
        }
        BoardCommands::Show { id, filter, json } => {
            let mut snapshot = db.get_board_snapshot(id)?;
            if let Some(query) = filter.as_deref() {
                snapshot = snapshot.filter_tasks(query);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                let today = chrono::Local::now().date_naive();
                print!("{}", render_board(&snapshot, today));
            }
        }
    }

    Ok(())
}

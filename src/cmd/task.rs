//! Column and task commands: `kanban column add`, `kanban task add | reorder | move`.
//!
//! Reorder and move go through the same commit path the drag controller
//! uses, so transaction failures are retried within the configured budget.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use console::style;

use kanban::board::controller::commit_intent;
use kanban::board::db::DbHandle;
use kanban::board::display::{format_due_date, priority_color, priority_label};
use kanban::board::drag::Intent;
use kanban::board::models::{DEFAULT_COLUMN_COLOR, NewTask, Priority, Task};
use kanban::config::KanbanConfig;
use kanban::errors::BoardError;

use super::super::{ColumnCommands, TaskCommands};

pub fn cmd_column(config: &KanbanConfig, command: ColumnCommands) -> Result<()> {
    let db = super::open_db(config)?;

    match command {
        ColumnCommands::Add {
            board_id,
            title,
            color,
        } => {
            let color = color
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_COLUMN_COLOR.to_string());
            let column = db.append_column(board_id, &title, &color)?;
            println!(
                "Added column {} {} at position {}",
                style(&column.title).bold(),
                style(format!("#{}", column.id)).dim(),
                column.position
            );
        }
    }

    Ok(())
}

pub async fn cmd_task(config: &KanbanConfig, command: TaskCommands) -> Result<()> {
    let db = DbHandle::new(super::open_db(config)?);

    match command {
        TaskCommands::Add {
            column_id,
            title,
            priority,
            due,
            description,
        } => {
            let new_task = NewTask {
                title,
                priority: parse_priority(&priority)?,
                due_date: due.as_deref().map(parse_due_date).transpose()?,
                description,
            };
            let task = db
                .call(move |db| db.append_task(column_id, &new_task))
                .await?;
            println!("Added task:");
            print_task(&task);
        }
        TaskCommands::Reorder {
            task_id,
            column_id,
            index,
        } => {
            let intent = Intent::Reorder {
                task_id,
                column_id,
                new_index: index,
            };
            let board_id = board_of_column(&db, column_id).await?;
            commit_intent(&db, board_id, intent, &config.commit_policy()).await?;
            print_task(&fetch_task(&db, task_id).await?);
        }
        TaskCommands::Move {
            task_id,
            source_column_id,
            target_column_id,
            index,
        } => {
            let intent = Intent::Move {
                task_id,
                source_column_id,
                target_column_id,
                new_index: index,
            };
            let board_id = board_of_column(&db, source_column_id).await?;
            commit_intent(&db, board_id, intent, &config.commit_policy()).await?;
            print_task(&fetch_task(&db, task_id).await?);
        }
    }

    Ok(())
}

fn parse_priority(raw: &str) -> Result<Priority> {
    Ok(raw.parse::<Priority>().map_err(BoardError::invalid)?)
}

fn parse_due_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid due date '{}', expected YYYY-MM-DD", raw))
}

async fn board_of_column(db: &DbHandle, column_id: i64) -> Result<i64> {
    let column = db
        .call(move |db| {
            db.get_column(column_id)?
                .ok_or(BoardError::ColumnNotFound { id: column_id })
        })
        .await?;
    Ok(column.board_id)
}

async fn fetch_task(db: &DbHandle, task_id: i64) -> Result<Task> {
    let task = db
        .call(move |db| {
            db.get_task(task_id)?
                .ok_or(BoardError::TaskNotFound { id: task_id })
        })
        .await?;
    Ok(task)
}

fn print_task(task: &Task) {
    let today = chrono::Local::now().date_naive();
    let badge = style(format!("[{}]", priority_label(task.priority))).fg(priority_color(task.priority));
    println!(
        "  {} {} {}",
        style(format!("#{}", task.id)).dim(),
        badge,
        task.title
    );
    println!("  column #{} position {}", task.column_id, task.position);
    let due = format_due_date(task.due_date, today);
    if !due.is_empty() {
        println!("  due: {}", due);
    }
}

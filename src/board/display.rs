//! Terminal presentation of boards: priority badges, due dates, board layout.

use std::fmt::Write as _;

use chrono::NaiveDate;
use console::{Color, style};

use super::models::{BoardSnapshot, Priority, Task};

pub fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "Low",
        Priority::Medium => "Medium",
        Priority::High => "High",
        Priority::Urgent => "Urgent",
    }
}

pub fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::Low => Color::Blue,
        Priority::Medium => Color::Green,
        Priority::High => Color::Yellow,
        Priority::Urgent => Color::Red,
    }
}

/// A task is overdue once its due date is in the past. Due today is not overdue.
pub fn is_overdue(due_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    due_date.is_some_and(|due| due < today)
}

/// Whole days past the due date, if overdue.
pub fn overdue_days(due_date: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    let due = due_date?;
    let days = (today - due).num_days();
    (days > 0).then_some(days)
}

/// `""` without a due date, `"overdue by N day(s)"` when overdue, else the ISO date.
pub fn format_due_date(due_date: Option<NaiveDate>, today: NaiveDate) -> String {
    match (due_date, overdue_days(due_date, today)) {
        (None, _) => String::new(),
        (Some(_), Some(1)) => "overdue by 1 day".to_string(),
        (Some(_), Some(days)) => format!("overdue by {} days", days),
        (Some(due), None) => due.format("%Y-%m-%d").to_string(),
    }
}

fn render_task(out: &mut String, task: &Task, today: NaiveDate) {
    let badge = style(format!("[{}]", priority_label(task.priority))).fg(priority_color(task.priority));
    let _ = write!(out, "  {:>3}. {} {}", task.position, badge, task.title);

    let due = format_due_date(task.due_date, today);
    if !due.is_empty() {
        let due = if is_overdue(task.due_date, today) {
            style(due).red().to_string()
        } else {
            style(due).dim().to_string()
        };
        let _ = write!(out, "  {}", due);
    }
    let _ = writeln!(out, "  {}", style(format!("#{}", task.id)).dim());
}

/// Render a board snapshot as plain text, one block per column.
pub fn render_board(snapshot: &BoardSnapshot, today: NaiveDate) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", style(&snapshot.board.title).bold(), style(format!("#{}", snapshot.board.id)).dim());
    if let Some(description) = &snapshot.board.description {
        let _ = writeln!(out, "{}", style(description).dim());
    }

    for column in &snapshot.columns {
        let _ = writeln!(
            out,
            "\n{} {} {}",
            style(&column.column.title).cyan().bold(),
            style(format!("({})", column.tasks.len())).dim(),
            style(format!("#{} {}", column.column.id, column.column.color)).dim()
        );
        if column.tasks.is_empty() {
            let _ = writeln!(out, "  {}", style("(empty)").dim());
        }
        for task in &column.tasks {
            render_task(&mut out, task, today);
        }
    }
    out
}

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Columns every new board starts with: (title, color).
pub const SEED_COLUMNS: [(&str, &str); 3] = [
    ("To Do", "#ef4444"),
    ("In Progress", "#f59e0b"),
    ("Done", "#10b981"),
];

/// Colors offered for new columns. The first one is the default.
pub const PRESET_COLORS: [&str; 8] = [
    "#ef4444", "#f59e0b", "#10b981", "#3b82f6", "#8b5cf6", "#ec4899", "#64748b", "#6b7280",
];

pub const DEFAULT_COLUMN_COLOR: &str = PRESET_COLORS[0];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Board {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub id: i64,
    pub board_id: i64,
    pub title: String,
    pub color: String,
    pub position: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub column_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub position: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields accepted when appending a task to a column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

// View types

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnWithTasks {
    #[serde(flatten)]
    pub column: Column,
    pub tasks: Vec<Task>,
}

/// A board with its columns and tasks, both in position order.
///
/// Snapshots are values: every projection step produces a new one.
/// `version` records which confirmed server read this snapshot derives from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoardSnapshot {
    pub board: Board,
    pub columns: Vec<ColumnWithTasks>,
    #[serde(default)]
    pub version: u64,
}

impl BoardSnapshot {
    pub fn column(&self, column_id: i64) -> Option<&ColumnWithTasks> {
        self.columns.iter().find(|c| c.column.id == column_id)
    }

    /// Index of the column and of the task within it.
    pub fn locate_task(&self, task_id: i64) -> Option<(usize, usize)> {
        self.columns.iter().enumerate().find_map(|(ci, col)| {
            col.tasks
                .iter()
                .position(|t| t.id == task_id)
                .map(|ti| (ci, ti))
        })
    }

    pub fn task(&self, task_id: i64) -> Option<&Task> {
        self.locate_task(task_id)
            .map(|(ci, ti)| &self.columns[ci].tasks[ti])
    }

    /// Task ids per column, in display order. Handy for comparing orderings.
    pub fn ordering(&self) -> Vec<(i64, Vec<i64>)> {
        self.columns
            .iter()
            .map(|c| (c.column.id, c.tasks.iter().map(|t| t.id).collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: i64, column_id: i64, position: i64) -> Task {
        Task {
            id,
            column_id,
            title: format!("Task {}", id),
            description: None,
            priority: Priority::Medium,
            due_date: None,
            position,
            created_at: "2024-01-01".to_string(),
            updated_at: "2024-01-01".to_string(),
        }
    }

    fn snapshot() -> BoardSnapshot {
        let column = |id, position| Column {
            id,
            board_id: 1,
            title: format!("Column {}", id),
            color: "#000000".to_string(),
            position,
            created_at: "2024-01-01".to_string(),
        };
        BoardSnapshot {
            board: Board {
                id: 1,
                title: "Board".to_string(),
                description: None,
                created_at: "2024-01-01".to_string(),
            },
            columns: vec![
                ColumnWithTasks {
                    column: column(10, 0),
                    tasks: vec![task(1, 10, 0), task(2, 10, 1)],
                },
                ColumnWithTasks {
                    column: column(20, 1),
                    tasks: vec![task(3, 20, 0)],
                },
            ],
            version: 0,
        }
    }

    #[test]
    fn test_priority_parse_accepts_any_case() {
        assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
        assert_eq!("low".parse::<Priority>().unwrap(), Priority::Low);
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_defaults_to_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
        assert_eq!(NewTask::titled("x").priority, Priority::Medium);
    }

    #[test]
    fn test_priority_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::from_str::<Priority>("\"urgent\"").unwrap(),
            Priority::Urgent
        );
    }

    #[test]
    fn test_new_task_deserializes_with_defaults() {
        let t: NewTask = serde_json::from_str(r#"{"title": "Write docs"}"#).unwrap();
        assert_eq!(t.title, "Write docs");
        assert_eq!(t.priority, Priority::Medium);
        assert!(t.due_date.is_none());
        assert!(t.description.is_none());

        let t: NewTask =
            serde_json::from_str(r#"{"title": "Ship", "due_date": "2025-03-01"}"#).unwrap();
        assert_eq!(t.due_date, NaiveDate::from_ymd_opt(2025, 3, 1));
    }

    #[test]
    fn test_seed_and_default_colors_are_presets() {
        assert_eq!(DEFAULT_COLUMN_COLOR, "#ef4444");
        for (_, color) in SEED_COLUMNS {
            assert!(PRESET_COLORS.contains(&color));
        }
    }

    #[test]
    fn test_locate_task() {
        let snap = snapshot();
        assert_eq!(snap.locate_task(2), Some((0, 1)));
        assert_eq!(snap.locate_task(3), Some((1, 0)));
        assert_eq!(snap.locate_task(99), None);
        assert_eq!(snap.task(3).map(|t| t.column_id), Some(20));
    }

    #[test]
    fn test_ordering() {
        assert_eq!(
            snapshot().ordering(),
            vec![(10, vec![1, 2]), (20, vec![3])]
        );
    }

    #[test]
    fn test_column_with_tasks_serializes_flat() {
        let snap = snapshot();
        let json = serde_json::to_value(&snap.columns[0]).unwrap();
        assert_eq!(json["id"], 10);
        assert_eq!(json["title"], "Column 10");
        assert_eq!(json["tasks"].as_array().unwrap().len(), 2);
    }
}

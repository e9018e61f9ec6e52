use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: String,
    pub url: Option<String>,
    pub duration_secs: Option<u32>,
    pub is_active: bool,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub kind: String,
    pub url: Option<String>,
    pub duration_secs: Option<u32>,
    pub is_active: Option<bool>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub url: Option<String>,
    pub duration_secs: Option<u32>,
    pub is_active: Option<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    InProgress,
    Completed,
}

/// One attempt of a task by a user. At most one per (user, task) per calendar
/// day, enforced at start time under the user lock.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TaskCompletion {
    pub id: String,
    pub user_id: String,
    pub task_id: String,
    pub status: CompletionStatus,
    pub reward_cents: i64,
    pub started_at: chrono::NaiveDateTime,
    pub completed_at: Option<chrono::NaiveDateTime>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AvailableTasks {
    pub tasks: Vec<Task>,
    pub tasks_completed_today: u32,
    pub tasks_allowed: u32,
    pub tasks_remaining: u32,
    pub reward_per_task_cents: i64,
}

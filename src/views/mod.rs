//! Read models and task/sprint services built on the Local Store.
//!
//! Renderers produce plain text for the terminal; services mutate records
//! through the store so every change is persisted and queued for push.

pub mod admin;
pub mod export;
pub mod sprint;
pub mod standup;
pub mod tasks;

use thiserror::Error;

/// Domain validation failures, shown to the user as is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please fill in sprint name, start date, and end date.")]
    SprintFieldsRequired,
    #[error("Please fill in all required fields.")]
    InviteFieldsRequired,
    #[error("Please provide a reason the task wasn't completed.")]
    ReasonRequired,
    #[error("Task text cannot be empty.")]
    EmptyTask,
    #[error("A sprint needs at least one goal.")]
    LastGoal,
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("Sprint not found: {0}")]
    SprintNotFound(String),
    #[error("Goal {0} does not exist.")]
    GoalOutOfRange(usize),
    #[error("No active sprint for team {0}.")]
    NoActiveSprint(String),
}

//! Sprint planning for one team.

use std::fmt::Write as _;

use crate::dates::format_display_date;
use crate::error::ServiceResult;
use crate::storage::{LocalStore, generate_record_id};
use crate::types::Sprint;
use crate::views::ValidationError;

/// Form input for a new sprint. List fields may contain blank rows.
#[derive(Clone, Debug, Default)]
pub struct NewSprint {
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub goals: Vec<String>,
    pub backlog_items: Vec<String>,
    pub task_breakdown: Vec<String>,
    pub capacity_planning: String,
    pub risks: String,
    pub notes: String,
}

fn clean_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .map(String::from)
        .collect()
}

fn optional(text: &str) -> Option<String> {
    Some(text.trim().to_string()).filter(|t| !t.is_empty())
}

pub struct SprintPlanner<'a> {
    store: &'a LocalStore,
    team_id: String,
}

impl<'a> SprintPlanner<'a> {
    pub fn new(store: &'a LocalStore, team_id: &str) -> Self {
        Self {
            store,
            team_id: team_id.to_string(),
        }
    }

    /// Newest first.
    pub fn sprints(&self) -> Vec<Sprint> {
        self.store.sprints_for_team(&self.team_id)
    }

    pub fn active_sprint(&self) -> Option<Sprint> {
        self.store.active_sprint_for_team(&self.team_id)
    }

    fn find(&self, sprint_id: &str) -> ServiceResult<Sprint> {
        self.sprints()
            .into_iter()
            .find(|s| s.id == sprint_id)
            .ok_or_else(|| ValidationError::SprintNotFound(sprint_id.to_string()).into())
    }

    fn require_active(&self) -> ServiceResult<Sprint> {
        self.active_sprint()
            .ok_or_else(|| ValidationError::NoActiveSprint(self.team_id.clone()).into())
    }

    fn deactivate_all(&self) -> ServiceResult<()> {
        for sprint in self.sprints().into_iter().filter(|s| s.is_active) {
            self.store.save_sprint(Sprint {
                is_active: false,
                ..sprint
            })?;
        }
        Ok(())
    }

    /// Creates the sprint as the team's only active one.
    pub fn create_sprint(&self, input: NewSprint) -> ServiceResult<Sprint> {
        if input.name.trim().is_empty()
            || input.start_date.trim().is_empty()
            || input.end_date.trim().is_empty()
        {
            return Err(ValidationError::SprintFieldsRequired.into());
        }

        self.deactivate_all()?;
        let sprint = Sprint {
            id: generate_record_id("sprint"),
            team_id: self.team_id.clone(),
            name: input.name.trim().to_string(),
            start_date: input.start_date.trim().to_string(),
            end_date: input.end_date.trim().to_string(),
            goals: clean_list(&input.goals),
            backlog_items: clean_list(&input.backlog_items),
            task_breakdown: clean_list(&input.task_breakdown),
            capacity_planning: optional(&input.capacity_planning),
            risks: optional(&input.risks),
            notes: optional(&input.notes),
            is_active: true,
        };
        self.store.save_sprint(sprint.clone())?;
        Ok(sprint)
    }

    pub fn activate(&self, sprint_id: &str) -> ServiceResult<Sprint> {
        let sprint = self.find(sprint_id)?;
        self.deactivate_all()?;
        let activated = Sprint {
            is_active: true,
            ..sprint
        };
        self.store.save_sprint(activated.clone())?;
        Ok(activated)
    }

    pub fn archive(&self, sprint_id: &str) -> ServiceResult<Sprint> {
        let archived = Sprint {
            is_active: false,
            ..self.find(sprint_id)?
        };
        self.store.save_sprint(archived.clone())?;
        Ok(archived)
    }

    pub fn update_goal(&self, index: usize, text: &str) -> ServiceResult<Sprint> {
        let mut sprint = self.require_active()?;
        let goal = sprint
            .goals
            .get_mut(index)
            .ok_or(ValidationError::GoalOutOfRange(index + 1))?;
        *goal = text.to_string();
        self.store.save_sprint(sprint.clone())?;
        Ok(sprint)
    }

    pub fn add_goal(&self, text: &str) -> ServiceResult<Sprint> {
        let mut sprint = self.require_active()?;
        sprint.goals.push(text.to_string());
        self.store.save_sprint(sprint.clone())?;
        Ok(sprint)
    }

    /// Refuses to remove the last goal.
    pub fn remove_goal(&self, index: usize) -> ServiceResult<Sprint> {
        let mut sprint = self.require_active()?;
        if sprint.goals.len() <= 1 {
            return Err(ValidationError::LastGoal.into());
        }
        if index >= sprint.goals.len() {
            return Err(ValidationError::GoalOutOfRange(index + 1).into());
        }
        sprint.goals.remove(index);
        self.store.save_sprint(sprint.clone())?;
        Ok(sprint)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let sprints = self.sprints();
        if sprints.is_empty() {
            out.push_str("No sprints yet.\n");
            return out;
        }
        for sprint in sprints {
            let status = if sprint.is_active { "active" } else { "archived" };
            let _ = writeln!(
                out,
                "{} [{}]  {} - {}  ({})",
                sprint.name,
                status,
                format_display_date(&sprint.start_date),
                format_display_date(&sprint.end_date),
                sprint.id
            );
            for (i, goal) in sprint.goals.iter().enumerate() {
                let _ = writeln!(out, "   {}. {}", i + 1, goal);
            }
        }
        out
    }
}

//! The team standup board for one team and day.

use std::fmt::Write as _;

use serde::Serialize;

use crate::dates::{format_display_date, today};
use crate::storage::LocalStore;
use crate::types::{Sprint, StandupEntry, Task, Team, User};

/// How many recent dates the date picker offers.
const RECENT_DATES: usize = 14;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub completed_yesterday: usize,
    pub total_yesterday: usize,
    pub completed_today: usize,
    pub total_today: usize,
}

pub fn task_stats(entry: &StandupEntry) -> TaskStats {
    TaskStats {
        completed_yesterday: entry.yesterday_tasks.iter().filter(|t| t.completed).count(),
        total_yesterday: entry.yesterday_tasks.len(),
        completed_today: entry.today_tasks.iter().filter(|t| t.completed).count(),
        total_today: entry.today_tasks.len(),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SprintProgress {
    pub completed: usize,
    pub total: usize,
    /// Rounded to the nearest whole percent; 0 when there are no tasks.
    pub percent: u32,
}

/// Counts the sprint's tasks, yesterday and today, across `entries`.
pub fn sprint_progress(entries: &[StandupEntry], sprint: &Sprint) -> SprintProgress {
    let tasks: Vec<&Task> = entries
        .iter()
        .flat_map(|e| e.yesterday_tasks.iter().chain(e.today_tasks.iter()))
        .filter(|t| t.sprint_id.as_deref() == Some(sprint.id.as_str()))
        .collect();
    let completed = tasks.iter().filter(|t| t.completed).count();
    let total = tasks.len();
    let percent = if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as u32
    };
    SprintProgress {
        completed,
        total,
        percent,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TeamSummary {
    pub updates: usize,
    pub completed_yesterday: usize,
    pub planned_today: usize,
    pub blockers: usize,
}

#[derive(Clone, Debug)]
pub struct MemberUpdate {
    pub user: User,
    pub entry: Option<StandupEntry>,
}

#[derive(Clone, Debug)]
pub struct TeamStandup {
    pub date: String,
    pub team_id: String,
    pub team: Option<Team>,
    pub active_sprint: Option<Sprint>,
    pub members: Vec<MemberUpdate>,
    /// This team's entries for `date`, including people no longer listed.
    pub entries: Vec<StandupEntry>,
    users: Vec<User>,
}

impl TeamStandup {
    pub fn load(store: &LocalStore, team_id: &str, date: &str) -> Self {
        let users = store.get_users();
        let entries: Vec<StandupEntry> = store
            .get_entries()
            .into_iter()
            .filter(|e| e.team_id == team_id && e.date == date)
            .collect();
        let members = users
            .iter()
            .filter(|u| u.team_id == team_id)
            .map(|u| MemberUpdate {
                user: u.clone(),
                entry: entries.iter().find(|e| e.user_id == u.id).cloned(),
            })
            .collect();

        Self {
            date: date.to_string(),
            team_id: team_id.to_string(),
            team: store.get_teams().into_iter().find(|t| t.id == team_id),
            active_sprint: store.active_sprint_for_team(team_id),
            members,
            entries,
            users,
        }
    }

    pub fn sprint_progress(&self) -> Option<SprintProgress> {
        self.active_sprint
            .as_ref()
            .map(|s| sprint_progress(&self.entries, s))
    }

    /// `(name, blockers)` for every entry that reports one.
    pub fn blockers(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|e| e.has_blockers())
            .map(|e| {
                let name = self
                    .users
                    .iter()
                    .find(|u| u.id == e.user_id)
                    .map(|u| u.name.clone())
                    .unwrap_or_else(|| e.user_id.clone());
                (name, e.blockers.clone().unwrap_or_default())
            })
            .collect()
    }

    pub fn summary(&self) -> TeamSummary {
        TeamSummary {
            updates: self.entries.len(),
            completed_yesterday: self.entries.iter().map(|e| task_stats(e).completed_yesterday).sum(),
            planned_today: self.entries.iter().map(|e| e.today_tasks.len()).sum(),
            blockers: self.blockers().len(),
        }
    }

    fn sprint_marker(&self, task: &Task) -> &'static str {
        match (&self.active_sprint, &task.sprint_id) {
            (Some(sprint), Some(id)) if &sprint.id == id => " [Sprint]",
            _ => "",
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Standup · {}", format_display_date(&self.date));
        out.push('\n');

        match (&self.active_sprint, self.sprint_progress()) {
            (Some(sprint), Some(progress)) => {
                let _ = writeln!(out, "🎯 {} ({}% Complete)", sprint.name, progress.percent);
                let _ = writeln!(
                    out,
                    "   {} - {} · {}/{} tasks done",
                    format_display_date(&sprint.start_date),
                    format_display_date(&sprint.end_date),
                    progress.completed,
                    progress.total
                );
                if !sprint.goals.is_empty() {
                    out.push_str("   Sprint Goals:\n");
                    for (i, goal) in sprint.goals.iter().enumerate() {
                        let _ = writeln!(out, "   {}. {}", i + 1, goal);
                    }
                }
            }
            _ => {
                out.push_str("No Active Sprint\n");
                out.push_str("   Create a sprint to track team goals and progress.\n");
            }
        }

        let blockers = self.blockers();
        if !blockers.is_empty() {
            let _ = writeln!(out, "\nTeam Blockers ({})", blockers.len());
            for (name, text) in &blockers {
                let _ = writeln!(out, "   {name}: {text}");
            }
        }

        let team_name = self
            .team
            .as_ref()
            .map(|t| t.name.as_str())
            .unwrap_or(self.team_id.as_str());
        for member in &self.members {
            out.push('\n');
            let Some(entry) = &member.entry else {
                let _ = writeln!(out, "{} [{}]", member.user.name, team_name);
                let _ = writeln!(out, "   No update for {}", format_display_date(&self.date));
                let _ = writeln!(out, "   {} hasn't logged their standup yet", member.user.name);
                continue;
            };

            let stats = task_stats(entry);
            let _ = writeln!(
                out,
                "{} [{}]  {}/{} done · {}/{} today",
                member.user.name,
                team_name,
                stats.completed_yesterday,
                stats.total_yesterday,
                stats.completed_today,
                stats.total_today
            );
            if !entry.yesterday_tasks.is_empty() {
                out.push_str("   Yesterday:\n");
                for task in &entry.yesterday_tasks {
                    let mark = if task.completed { "✓" } else { "○" };
                    let _ = writeln!(out, "     {mark} {}{}", task.text, self.sprint_marker(task));
                }
            }
            if !entry.today_tasks.is_empty() {
                out.push_str("   Today:\n");
                for task in &entry.today_tasks {
                    let _ = writeln!(out, "     • {}{}", task.text, self.sprint_marker(task));
                }
            }
            if let Some(blockers) = entry.blockers.as_deref().filter(|b| !b.trim().is_empty()) {
                let _ = writeln!(out, "   🚫 Blockers: {blockers}");
            }
        }

        if !self.entries.is_empty() {
            let summary = self.summary();
            let _ = writeln!(
                out,
                "\nTeam Summary: {} updates · {} completed yesterday · {} planned today · {} blockers",
                summary.updates, summary.completed_yesterday, summary.planned_today, summary.blockers
            );
        }
        out
    }
}

/// The most recent dates that have any entry, newest first.
pub fn available_dates(store: &LocalStore) -> Vec<String> {
    let mut dates = super::export::available_dates(store);
    dates.truncate(RECENT_DATES);
    dates
}

/// Label for the date picker, with `(Today)` appended for today.
pub fn date_label(date: &str) -> String {
    if date == today() {
        format!("{} (Today)", format_display_date(date))
    } else {
        format_display_date(date)
    }
}

//! "My Tasks": the signed-in person's own entry for a day.

use std::fmt::Write as _;

use crate::dates::{format_display_date, now_iso, previous_day};
use crate::error::ServiceResult;
use crate::storage::{LocalStore, generate_task_id};
use crate::types::{Sprint, StandupEntry, Task};
use crate::views::ValidationError;
use crate::views::standup::{TaskStats, task_stats};

/// Local hour from which the board nags about yesterday's open tasks.
pub const END_OF_DAY_HOUR: u32 = 16;

/// One task per non-blank line, with a leading `-`, `•` or `*` removed.
pub fn parse_task_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let line = line.trim();
            line.strip_prefix(|c| matches!(c, '-' | '•' | '*'))
                .unwrap_or(line)
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

pub fn is_end_of_day(hour: u32) -> bool {
    hour >= END_OF_DAY_HOUR
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskList {
    Yesterday,
    Today,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Low,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryAction {
    pub title: &'static str,
    pub description: String,
    pub action: &'static str,
    pub priority: Priority,
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

pub struct MyTasks<'a> {
    store: &'a LocalStore,
    entry: StandupEntry,
    active_sprint: Option<Sprint>,
}

impl<'a> MyTasks<'a> {
    /// The stored entry for `user_id` on `date`, or a fresh one (saved on
    /// the first change).
    pub fn load_or_create(store: &'a LocalStore, user_id: &str, team_id: &str, date: &str) -> Self {
        let entry = store
            .entry_for_user_and_date(user_id, date)
            .unwrap_or_else(|| StandupEntry::blank(user_id, team_id, date));
        Self {
            store,
            active_sprint: store.active_sprint_for_team(team_id),
            entry,
        }
    }

    pub fn entry(&self) -> &StandupEntry {
        &self.entry
    }

    pub fn active_sprint(&self) -> Option<&Sprint> {
        self.active_sprint.as_ref()
    }

    fn save(&mut self) -> ServiceResult<()> {
        self.entry.updated_at = now_iso();
        self.store.save_entry(self.entry.clone())?;
        Ok(())
    }

    fn list_mut(&mut self, list: TaskList) -> &mut Vec<Task> {
        match list {
            TaskList::Yesterday => &mut self.entry.yesterday_tasks,
            TaskList::Today => &mut self.entry.today_tasks,
        }
    }

    /// Which list holds `task_id`. Yesterday's list wins on a clash.
    fn locate(&self, task_id: &str) -> Option<TaskList> {
        if self.entry.yesterday_tasks.iter().any(|t| t.id == task_id) {
            Some(TaskList::Yesterday)
        } else if self.entry.today_tasks.iter().any(|t| t.id == task_id) {
            Some(TaskList::Today)
        } else {
            None
        }
    }

    fn update(&mut self, task_id: &str, change: impl FnOnce(&mut Task)) -> ServiceResult<()> {
        let list = self
            .locate(task_id)
            .ok_or_else(|| ValidationError::TaskNotFound(task_id.to_string()))?;
        if let Some(task) = self.list_mut(list).iter_mut().find(|t| t.id == task_id) {
            change(task);
        }
        self.save()
    }

    /// Adds one task per line to today's list, linked to the active sprint.
    pub fn add_today_tasks(&mut self, text: &str) -> ServiceResult<Vec<Task>> {
        let lines = parse_task_lines(text);
        if lines.is_empty() {
            return Err(ValidationError::EmptyTask.into());
        }
        let sprint_id = self.active_sprint.as_ref().map(|s| s.id.clone());
        let added: Vec<Task> = lines
            .into_iter()
            .map(|text| Task {
                sprint_id: sprint_id.clone(),
                ..Task::new(generate_task_id(), text)
            })
            .collect();
        self.entry.today_tasks.extend(added.iter().cloned());
        self.save()?;
        Ok(added)
    }

    pub fn update_task_text(&mut self, task_id: &str, text: &str) -> ServiceResult<()> {
        let text = text.to_string();
        self.update(task_id, |task| task.text = text)
    }

    pub fn remove_task(&mut self, task_id: &str) -> ServiceResult<()> {
        let list = self
            .locate(task_id)
            .ok_or_else(|| ValidationError::TaskNotFound(task_id.to_string()))?;
        self.list_mut(list).retain(|t| t.id != task_id);
        self.save()
    }

    pub fn complete_task(&mut self, task_id: &str, notes: Option<&str>) -> ServiceResult<()> {
        let notes = notes.map(str::trim).filter(|n| !n.is_empty()).map(String::from);
        self.update(task_id, |task| {
            task.completed = true;
            task.completed_at = Some(now_iso());
            task.notes = notes;
        })
    }

    /// Unticks a task, dropping its completion time and notes.
    pub fn reopen_task(&mut self, task_id: &str) -> ServiceResult<()> {
        self.update(task_id, |task| {
            task.completed = false;
            task.completed_at = None;
            task.notes = None;
        })
    }

    pub fn mark_incomplete(
        &mut self,
        task_id: &str,
        reason: &str,
        new_eta: Option<&str>,
    ) -> ServiceResult<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::ReasonRequired.into());
        }
        let reason = reason.to_string();
        let new_eta = new_eta.map(str::trim).filter(|e| !e.is_empty()).map(String::from);
        self.update(task_id, |task| {
            task.completed = false;
            task.incompletion_reason = Some(reason);
            task.new_eta = new_eta;
        })
    }

    /// Copies an unfinished task from yesterday's list onto today's.
    pub fn move_to_today(
        &mut self,
        task_id: &str,
        reason: &str,
        new_eta: Option<&str>,
    ) -> ServiceResult<Task> {
        let original = self
            .entry
            .yesterday_tasks
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
            .ok_or_else(|| ValidationError::TaskNotFound(task_id.to_string()))?;

        let moved = Task {
            id: format!("{}-moved-{}", original.id, chrono::Utc::now().timestamp_millis()),
            incompletion_reason: Some(reason.trim().to_string()).filter(|r| !r.is_empty()),
            new_eta: new_eta.map(str::trim).filter(|e| !e.is_empty()).map(String::from),
            moved_from_date: previous_day(&self.entry.date),
            ..original
        };
        self.entry.today_tasks.push(moved.clone());
        self.save()?;
        Ok(moved)
    }

    pub fn tag_user(&mut self, task_id: &str, user_id: &str) -> ServiceResult<()> {
        let user_id = user_id.to_string();
        self.update(task_id, |task| {
            let tags = task.assigned_users.get_or_insert_with(Vec::new);
            if !tags.contains(&user_id) {
                tags.push(user_id);
            }
        })
    }

    pub fn untag_user(&mut self, task_id: &str, user_id: &str) -> ServiceResult<()> {
        self.update(task_id, |task| {
            if let Some(tags) = task.assigned_users.as_mut() {
                tags.retain(|id| id != user_id);
            }
        })
    }

    pub fn set_blockers(&mut self, blockers: Option<&str>) -> ServiceResult<()> {
        self.entry.blockers = blockers.map(str::trim).filter(|b| !b.is_empty()).map(String::from);
        self.save()
    }

    pub fn progress(&self) -> TaskStats {
        task_stats(&self.entry)
    }

    pub fn primary_action(&self, end_of_day: bool) -> PrimaryAction {
        let stats = self.progress();
        let pending_yesterday = stats.total_yesterday - stats.completed_yesterday;
        let pending_today = stats.total_today - stats.completed_today;

        if stats.total_today == 0 {
            PrimaryAction {
                title: "Plan Your Day",
                description: "Start by adding tasks for today".to_string(),
                action: "Add your first task below",
                priority: Priority::High,
            }
        } else if pending_yesterday > 0 && end_of_day {
            PrimaryAction {
                title: "Update Yesterday's Progress",
                description: format!(
                    "{pending_yesterday} task{} from yesterday need{} status updates",
                    plural(pending_yesterday),
                    if pending_yesterday == 1 { "s" } else { "" }
                ),
                action: "Mark tasks as complete or provide reasons",
                priority: Priority::Urgent,
            }
        } else if pending_today > 0 {
            PrimaryAction {
                title: "Focus on Today's Tasks",
                description: format!(
                    "{pending_today} task{} remaining for today",
                    plural(pending_today)
                ),
                action: "Complete your planned work",
                priority: Priority::Normal,
            }
        } else {
            PrimaryAction {
                title: "Great Progress!",
                description: "All tasks are up to date".to_string(),
                action: "Plan tomorrow or add more tasks",
                priority: Priority::Low,
            }
        }
    }

    fn render_task(&self, out: &mut String, task: &Task) {
        let mark = if task.completed { "[x]" } else { "[ ]" };
        let _ = write!(out, "  {mark} {}  ({})", task.text, task.id);
        if let (Some(sprint), Some(id)) = (&self.active_sprint, &task.sprint_id) {
            if &sprint.id == id {
                out.push_str(" [Sprint]");
            }
        }
        if let Some(tags) = task.assigned_users.as_ref().filter(|t| !t.is_empty()) {
            let _ = write!(out, " [{} tagged]", tags.len());
        }
        out.push('\n');
        if let Some(from) = &task.moved_from_date {
            let _ = writeln!(out, "      Moved from {from}");
        }
        if task.completed {
            if let Some(notes) = &task.notes {
                let _ = writeln!(out, "      Notes: {notes}");
            }
        } else if let Some(reason) = &task.incompletion_reason {
            let _ = writeln!(out, "      Reason: {reason}");
            if let Some(eta) = &task.new_eta {
                let _ = writeln!(out, "      New ETA: {eta}");
            }
        }
    }

    pub fn render(&self, end_of_day: bool) -> String {
        let action = self.primary_action(end_of_day);
        let stats = self.progress();
        let mut out = String::new();

        let _ = writeln!(out, "{}", action.title);
        let _ = writeln!(out, "  {}", action.description);
        let _ = writeln!(out, "  {}", action.action);
        if let Some(sprint) = &self.active_sprint {
            let _ = writeln!(out, "  Active Sprint: {}", sprint.name);
        }

        let _ = writeln!(
            out,
            "\nToday's Focus ({})  {}/{} Complete",
            format_display_date(&self.entry.date),
            stats.completed_today,
            stats.total_today
        );
        if self.entry.today_tasks.is_empty() {
            out.push_str("  Start by planning what you want to accomplish today\n");
        }
        for task in &self.entry.today_tasks {
            self.render_task(&mut out, task);
        }

        if !self.entry.yesterday_tasks.is_empty() {
            let yesterday = previous_day(&self.entry.date).unwrap_or_default();
            let pending = stats.total_yesterday - stats.completed_yesterday;
            let _ = write!(out, "\nYesterday's Tasks ({})", format_display_date(&yesterday));
            if pending > 0 {
                let _ = write!(out, "  {pending} need updates");
            }
            out.push('\n');
            for task in &self.entry.yesterday_tasks {
                self.render_task(&mut out, task);
            }
        }

        if let Some(blockers) = self.entry.blockers.as_deref() {
            let _ = writeln!(out, "\nBlockers: {blockers}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_sprint;
    use crate::types::DEFAULT_TEAM_ID;

    const DAY: &str = "2024-03-05";

    #[test]
    fn pasted_bullets_become_separate_tasks() {
        let lines = parse_task_lines("- Review PR\n\n  • Write docs \n* Deploy\nplain line");
        assert_eq!(lines, ["Review PR", "Write docs", "Deploy", "plain line"]);
        assert!(parse_task_lines("  \n - \n").is_empty());
    }

    #[test]
    fn only_one_leading_bullet_is_removed() {
        let lines = parse_task_lines("-- keep the dash
*bold* claim
fix a-b split");
        assert_eq!(lines, ["- keep the dash", "bold* claim", "fix a-b split"]);
    }

    #[test]
    fn new_entries_are_saved_on_first_change() {
        let store = LocalStore::in_memory();
        store.save_sprint(sample_sprint("s1", true)).unwrap();
        let mut tasks = MyTasks::load_or_create(&store, "alex", DEFAULT_TEAM_ID, DAY);
        assert!(store.get_entries().is_empty());

        let added = tasks.add_today_tasks("- one\n- two").unwrap();
        assert_eq!(added.len(), 2);
        assert!(added.iter().all(|t| t.sprint_id.as_deref() == Some("s1")));

        let saved = store.entry_for_user_and_date("alex", DAY).unwrap();
        assert_eq!(saved.id, format!("alex-{DAY}"));
        assert_eq!(saved.today_tasks.len(), 2);
        assert!(tasks.render(false).contains("0/2 Complete"));
    }

    #[test]
    fn completing_and_reopening_round_trips_the_task() {
        let store = LocalStore::in_memory();
        let mut tasks = MyTasks::load_or_create(&store, "alex", DEFAULT_TEAM_ID, DAY);
        let id = tasks.add_today_tasks("Ship it").unwrap()[0].id.clone();

        tasks.complete_task(&id, Some("  merged  ")).unwrap();
        let task = &tasks.entry().today_tasks[0];
        assert!(task.completed);
        assert!(task.completed_at.is_some());
        assert_eq!(task.notes.as_deref(), Some("merged"));
        assert_eq!(tasks.primary_action(false).title, "Great Progress!");

        tasks.reopen_task(&id).unwrap();
        let task = &store.entry_for_user_and_date("alex", DAY).unwrap().today_tasks[0];
        assert!(!task.completed);
        assert!(task.completed_at.is_none());
        assert!(task.notes.is_none());
    }

    #[test]
    fn marking_incomplete_requires_a_reason() {
        let store = LocalStore::in_memory();
        let mut entry = StandupEntry::blank("alex", DEFAULT_TEAM_ID, DAY);
        entry.yesterday_tasks.push(Task::new("y1", "Fix flaky test"));
        store.save_entry(entry).unwrap();
        let mut tasks = MyTasks::load_or_create(&store, "alex", DEFAULT_TEAM_ID, DAY);

        let err = tasks.mark_incomplete("y1", "  ", None).unwrap_err();
        assert!(err.to_string().contains("reason"));

        tasks.mark_incomplete("y1", "Blocked on CI", Some("Friday")).unwrap();
        let task = &tasks.entry().yesterday_tasks[0];
        assert_eq!(task.incompletion_reason.as_deref(), Some("Blocked on CI"));
        assert_eq!(task.new_eta.as_deref(), Some("Friday"));
    }

    #[test]
    fn moving_to_today_copies_the_task() {
        let store = LocalStore::in_memory();
        let mut entry = StandupEntry::blank("alex", DEFAULT_TEAM_ID, DAY);
        entry.yesterday_tasks.push(Task::new("y1", "Fix flaky test"));
        store.save_entry(entry).unwrap();
        let mut tasks = MyTasks::load_or_create(&store, "alex", DEFAULT_TEAM_ID, DAY);

        let moved = tasks.move_to_today("y1", "ran out of time", None).unwrap();
        assert!(moved.id.starts_with("y1-moved-"));
        assert_eq!(moved.text, "Fix flaky test");
        assert_eq!(moved.moved_from_date.as_deref(), Some("2024-03-04"));
        assert_eq!(tasks.entry().yesterday_tasks.len(), 1);
        assert_eq!(tasks.entry().today_tasks.len(), 1);
        assert!(tasks.move_to_today("nope", "x", None).is_err());
    }

    #[test]
    fn tags_are_unique_and_removable() {
        let store = LocalStore::in_memory();
        let mut tasks = MyTasks::load_or_create(&store, "alex", DEFAULT_TEAM_ID, DAY);
        let id = tasks.add_today_tasks("Pair on auth").unwrap()[0].id.clone();

        tasks.tag_user(&id, "kim").unwrap();
        tasks.tag_user(&id, "kim").unwrap();
        tasks.tag_user(&id, "sam").unwrap();
        assert_eq!(
            tasks.entry().today_tasks[0].assigned_users.as_deref(),
            Some(&["kim".to_string(), "sam".to_string()][..])
        );
        tasks.untag_user(&id, "kim").unwrap();
        assert_eq!(
            tasks.entry().today_tasks[0].assigned_users,
            Some(vec!["sam".to_string()])
        );
    }

    #[test]
    fn primary_action_follows_the_day() {
        let store = LocalStore::in_memory();
        let mut tasks = MyTasks::load_or_create(&store, "alex", DEFAULT_TEAM_ID, DAY);
        assert_eq!(tasks.primary_action(false).priority, Priority::High);

        tasks.add_today_tasks("a\nb").unwrap();
        let action = tasks.primary_action(false);
        assert_eq!(action.title, "Focus on Today's Tasks");
        assert_eq!(action.description, "2 tasks remaining for today");

        tasks.entry.yesterday_tasks.push(Task::new("y1", "left over"));
        let action = tasks.primary_action(true);
        assert_eq!(action.priority, Priority::Urgent);
        assert_eq!(action.description, "1 task from yesterday needs status updates");
        assert!(is_end_of_day(16));
        assert!(!is_end_of_day(15));
    }

    #[test]
    fn unknown_tasks_are_reported() {
        let store = LocalStore::in_memory();
        let mut tasks = MyTasks::load_or_create(&store, "alex", DEFAULT_TEAM_ID, DAY);
        let err = tasks.complete_task("missing", None).unwrap_err();
        assert_eq!(err.to_string(), "Task not found: missing");
        assert!(tasks.add_today_tasks(" \n ").is_err());
    }
}

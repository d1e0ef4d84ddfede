//! Slack-ready text for one day's standup.

use serde::Serialize;

use crate::dates::{format_display_date, previous_day};
use crate::storage::LocalStore;

pub const NO_ENTRIES: &str = "No entries found for the selected date.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub user_id: String,
    pub user_name: String,
    /// Completed tasks from yesterday's list.
    pub done: Vec<String>,
    pub today: Vec<String>,
    pub blockers: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub people: usize,
    pub completed: usize,
    pub planned: usize,
    pub with_blockers: usize,
}

#[derive(Clone, Debug)]
pub struct SlackExport {
    pub date: String,
    pub rows: Vec<ExportRow>,
}

impl SlackExport {
    /// One row per entry on `date` whose person is still listed, sorted by
    /// name.
    pub fn for_date(store: &LocalStore, date: &str) -> Self {
        let users = store.get_users();
        let mut rows: Vec<ExportRow> = store
            .entries_for_date(date)
            .into_iter()
            .filter_map(|entry| {
                let user = users.iter().find(|u| u.id == entry.user_id)?;
                Some(ExportRow {
                    user_id: entry.user_id.clone(),
                    user_name: user.name.clone(),
                    done: entry
                        .yesterday_tasks
                        .iter()
                        .filter(|t| t.completed)
                        .map(|t| t.text.clone())
                        .collect(),
                    today: entry.today_tasks.iter().map(|t| t.text.clone()).collect(),
                    blockers: entry.blockers.clone().filter(|b| !b.is_empty()),
                })
            })
            .collect();
        rows.sort_by(|a, b| a.user_name.cmp(&b.user_name));
        Self {
            date: date.to_string(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn summary(&self) -> ExportSummary {
        ExportSummary {
            people: self.rows.len(),
            completed: self.rows.iter().map(|r| r.done.len()).sum(),
            planned: self.rows.iter().map(|r| r.today.len()).sum(),
            with_blockers: self.rows.iter().filter(|r| r.blockers.is_some()).count(),
        }
    }

    pub fn to_text(&self) -> String {
        if self.rows.is_empty() {
            return NO_ENTRIES.to_string();
        }

        let yesterday = previous_day(&self.date)
            .map(|d| format_display_date(&d))
            .unwrap_or_default();
        let blocks: Vec<String> = self
            .rows
            .iter()
            .map(|row| {
                let mut lines = vec![format!("@{}", row.user_name)];
                if !row.done.is_empty() {
                    lines.push(format!("✅ **Completed {yesterday}:**"));
                    lines.extend(row.done.iter().map(|t| format!("   • {t}")));
                }
                if !row.today.is_empty() {
                    lines.push("🔄 **Working on today:**".to_string());
                    lines.extend(row.today.iter().map(|t| format!("   • {t}")));
                }
                if let Some(blockers) = &row.blockers {
                    lines.push(format!("⛔ **Blockers:** {blockers}"));
                }
                lines.join("\n")
            })
            .collect();

        format!(
            "📅 **Daily Standup - {}**\n\n{}",
            format_display_date(&self.date),
            blocks.join("\n\n")
        )
    }
}

/// Every date with at least one entry, newest first.
pub fn available_dates(store: &LocalStore) -> Vec<String> {
    let mut dates: Vec<String> = store.get_entries().into_iter().map(|e| e.date).collect();
    dates.sort_by(|a, b| b.cmp(a));
    dates.dedup();
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::today;
    use crate::types::{DEFAULT_TEAM_ID, StandupEntry, Task, User};

    fn store_with(name: &str, user_id: &str) -> LocalStore {
        let store = LocalStore::in_memory();
        let mut users = store.get_users();
        users.push(User {
            id: user_id.into(),
            name: name.into(),
            team_id: DEFAULT_TEAM_ID.into(),
        });
        store.save_users(&users);
        store
    }

    #[test]
    fn todays_export_mentions_the_user_and_lists_the_task() {
        let date = today();
        let store = store_with("Test User", "user-1");
        let mut entry = StandupEntry::blank("user-1", DEFAULT_TEAM_ID, &date);
        entry.today_tasks.push(Task::new("task-1", "Implement feature X"));
        store.save_entry(entry).unwrap();

        let text = SlackExport::for_date(&store, &date).to_text();
        assert!(text.contains("@Test User\n"), "{text}");
        assert!(text.contains("🔄 **Working on today:**\n   • Implement feature X"));
        assert!(!text.contains("✅"));
        assert!(text.starts_with(&format!(
            "📅 **Daily Standup - {}**\n\n",
            format_display_date(&date)
        )));
    }

    #[test]
    fn completed_yesterday_and_blockers_are_included() {
        let store = store_with("Alex", "alex");
        let mut entry = StandupEntry::blank("alex", DEFAULT_TEAM_ID, "2024-03-05");
        let mut done = Task::new("y1", "Wrote migration");
        done.completed = true;
        entry.yesterday_tasks = vec![done, Task::new("y2", "not finished")];
        entry.blockers = Some("Need DB access".into());
        store.save_entry(entry).unwrap();

        let export = SlackExport::for_date(&store, "2024-03-05");
        assert_eq!(
            export.to_text(),
            "📅 **Daily Standup - Tue, Mar 5**\n\n\
             @Alex\n\
             ✅ **Completed Mon, Mar 4:**\n   • Wrote migration\n\
             ⛔ **Blockers:** Need DB access"
        );
        assert_eq!(export.summary().with_blockers, 1);
        assert_eq!(export.summary().completed, 1);
    }

    #[test]
    fn rows_sort_by_name_and_skip_unknown_people() {
        let store = store_with("Zoe", "zoe");
        store.add_user("Adam", None);
        for user in ["zoe", "adam", "ghost"] {
            let mut entry = StandupEntry::blank(user, DEFAULT_TEAM_ID, "2024-03-05");
            entry.today_tasks.push(Task::new("t", "work"));
            store.save_entry(entry).unwrap();
        }
        let export = SlackExport::for_date(&store, "2024-03-05");
        let names: Vec<_> = export.rows.iter().map(|r| r.user_name.as_str()).collect();
        assert_eq!(names, ["Adam", "Zoe"]);
    }

    #[test]
    fn empty_days_say_so() {
        let store = LocalStore::in_memory();
        assert_eq!(SlackExport::for_date(&store, "2024-03-05").to_text(), NO_ENTRIES);
        assert!(available_dates(&store).is_empty());
    }
}

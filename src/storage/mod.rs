//! The Local Store: the synchronous, authoritative read model of the
//! application, persisted as one JSON array per collection.
//!
//! Reads never fail. A missing or unreadable collection is logged and treated
//! as empty. Saves of entries and sprints report a generic failure; saves of
//! teams and users swallow it. Every save through this type hands the record
//! to the [`Outbox`] (when one is attached) for a best-effort push to the
//! remote mirror. Pulls from the mirror go through the `overwrite_*`
//! methods, which never push.

mod kv;
pub mod migration;

use std::sync::{Arc, Mutex};

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};
use ulid::Ulid;

pub use kv::{FileKv, KeyValueStore, MemoryKv};

use crate::remote::outbox::{Outbox, PushRequest};
use crate::types::{DEFAULT_TEAM_ID, Sprint, StandupEntry, Team, User};

pub mod keys {
    pub const ENTRIES: &str = "bricktrack_entries";
    pub const USERS: &str = "bricktrack_users";
    pub const TEAMS: &str = "bricktrack_teams";
    pub const SPRINTS: &str = "bricktrack_sprints";
    pub const AUTH_USERS: &str = "bricktrack_auth_users";
    pub const CURRENT_USER: &str = "bricktrack_current_user";
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage quota exceeded while writing {0}")]
    QuotaExceeded(String),
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    #[error("couldn't find a home directory for local data")]
    NoDataDir,
    #[error("Failed to save {0}")]
    SaveFailed(&'static str),
}

pub fn default_teams() -> Vec<Team> {
    vec![
        Team {
            id: "development".into(),
            name: "Development".into(),
            color: "#3b82f6".into(),
        },
        Team {
            id: "marketing".into(),
            name: "Marketing".into(),
            color: "#10b981".into(),
        },
    ]
}

/// No people are pre-seeded.
pub fn default_users() -> Vec<User> {
    Vec::new()
}

pub fn generate_task_id() -> String {
    format!("task-{}", Ulid::new().to_string().to_lowercase())
}

/// `<prefix>-<unix millis>-<9 lowercase alphanumerics>`, the id shape used
/// for accounts and sprints.
pub fn generate_record_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{prefix}-{}-{suffix}", chrono::Utc::now().timestamp_millis())
}

/// `"Jane Doe"` becomes `"jane-doe"`.
pub fn user_id_from_name(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
    outbox: Option<Outbox>,
    // serialises read-modify-write cycles on a collection
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            outbox: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()))
    }

    pub fn with_outbox(mut self, outbox: Outbox) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn outbox(&self) -> Option<&Outbox> {
        self.outbox.as_ref()
    }

    pub(crate) fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.kv.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn write_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, &raw)
    }

    pub(crate) fn remove_key(&self, key: &str) -> Result<(), StoreError> {
        self.kv.remove(key)
    }

    /// Loads a collection, degrading to empty on any error.
    pub(crate) fn load_collection<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        match self.read_json::<Vec<T>>(key) {
            Ok(Some(items)) => items,
            Ok(None) => Vec::new(),
            Err(err) => {
                error!(key, error = %err, "error loading collection");
                Vec::new()
            }
        }
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, request: PushRequest) {
        if let Some(outbox) = &self.outbox {
            outbox.enqueue(request);
        }
    }

    // entries

    /// Rewrites legacy-shaped entries in place. Re-running it is a no-op.
    pub fn migrate_legacy_entries(&self) {
        let raw = match self.read_json::<Vec<Value>>(keys::ENTRIES) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(err) => {
                error!(error = %err, "error migrating entries");
                return;
            }
        };
        if let Some(migrated) = migration::migrate_entries(&raw) {
            debug!(count = migrated.len(), "migrated legacy standup entries");
            if let Err(err) = self.write_json(keys::ENTRIES, &migrated) {
                error!(error = %err, "error migrating entries");
            }
        }
    }

    pub fn get_entries(&self) -> Vec<StandupEntry> {
        self.migrate_legacy_entries();
        self.load_collection(keys::ENTRIES)
    }

    /// Inserts the entry, or replaces the one with the same user and date and
    /// refreshes its `updated_at`.
    pub fn save_entry(&self, entry: StandupEntry) -> Result<(), StoreError> {
        let stored = {
            let _guard = self.lock_writes();
            let mut entries = self.get_entries();
            let stored = match entries
                .iter()
                .position(|e| e.user_id == entry.user_id && e.date == entry.date)
            {
                Some(index) => {
                    let replaced = StandupEntry {
                        updated_at: crate::dates::now_iso(),
                        ..entry
                    };
                    entries[index] = replaced.clone();
                    replaced
                }
                None => {
                    entries.push(entry.clone());
                    entry
                }
            };
            if let Err(err) = self.write_json(keys::ENTRIES, &entries) {
                error!(error = %err, "error saving entry");
                return Err(StoreError::SaveFailed("entry"));
            }
            stored
        };
        self.push(PushRequest::Entry(stored));
        Ok(())
    }

    pub fn entries_for_user(&self, user_id: &str) -> Vec<StandupEntry> {
        let mut entries: Vec<_> = self
            .get_entries()
            .into_iter()
            .filter(|e| e.user_id == user_id)
            .collect();
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        entries
    }

    pub fn entries_for_date(&self, date: &str) -> Vec<StandupEntry> {
        let mut entries: Vec<_> = self
            .get_entries()
            .into_iter()
            .filter(|e| e.date == date)
            .collect();
        entries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        entries
    }

    pub fn entries_for_team(&self, team_id: &str) -> Vec<StandupEntry> {
        let mut entries: Vec<_> = self
            .get_entries()
            .into_iter()
            .filter(|e| e.team_id == team_id)
            .collect();
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        entries
    }

    pub fn entry_for_user_and_date(&self, user_id: &str, date: &str) -> Option<StandupEntry> {
        self.get_entries()
            .into_iter()
            .find(|e| e.user_id == user_id && e.date == date)
    }

    // teams

    /// Always contains every default team; missing ones are appended and the
    /// repaired collection is saved straight away.
    pub fn get_teams(&self) -> Vec<Team> {
        let teams = match self.read_json::<Vec<Team>>(keys::TEAMS) {
            Ok(Some(teams)) => teams,
            Ok(None) => return default_teams(),
            Err(err) => {
                error!(error = %err, "error loading teams");
                return default_teams();
            }
        };

        let missing: Vec<Team> = default_teams()
            .into_iter()
            .filter(|d| !teams.iter().any(|t| t.id == d.id))
            .collect();
        if missing.is_empty() {
            return teams;
        }

        let mut repaired = teams;
        repaired.extend(missing);
        self.save_teams(&repaired);
        repaired
    }

    pub fn save_teams(&self, teams: &[Team]) {
        if let Err(err) = self.write_json(keys::TEAMS, teams) {
            error!(error = %err, "error saving teams");
            return;
        }
        self.push(PushRequest::Teams(teams.to_vec()));
    }

    // users

    pub fn get_users(&self) -> Vec<User> {
        let users = match self.read_json::<Vec<User>>(keys::USERS) {
            Ok(Some(users)) => users,
            Ok(None) => default_users(),
            Err(err) => {
                error!(error = %err, "error loading users");
                return default_users();
            }
        };

        let users: Vec<User> = users
            .into_iter()
            .map(|mut u| {
                if u.team_id.is_empty() {
                    u.team_id = DEFAULT_TEAM_ID.to_string();
                }
                u
            })
            .collect();

        let missing: Vec<User> = default_users()
            .into_iter()
            .filter(|d| {
                !users
                    .iter()
                    .any(|u| u.name.to_lowercase() == d.name.to_lowercase())
            })
            .collect();
        if missing.is_empty() {
            return users;
        }

        let mut repaired = users;
        repaired.extend(missing);
        self.save_users(&repaired);
        repaired
    }

    pub fn save_users(&self, users: &[User]) {
        if let Err(err) = self.write_json(keys::USERS, users) {
            error!(error = %err, "error saving users");
            return;
        }
        self.push(PushRequest::Users(users.to_vec()));
    }

    /// Adds a person by display name, returning the existing record when the
    /// derived id is already taken.
    pub fn add_user(&self, name: &str, team_id: Option<&str>) -> User {
        let _guard = self.lock_writes();
        let mut users = self.get_users();
        let id = user_id_from_name(name);
        if let Some(existing) = users.iter().find(|u| u.id == id) {
            return existing.clone();
        }
        let user = User {
            id,
            name: name.to_string(),
            team_id: team_id.unwrap_or(DEFAULT_TEAM_ID).to_string(),
        };
        users.push(user.clone());
        self.save_users(&users);
        user
    }

    /// Adds the user unless one with the same id is already listed.
    pub fn ensure_user(&self, user: User) {
        let _guard = self.lock_writes();
        let mut users = self.get_users();
        if users.iter().any(|u| u.id == user.id) {
            return;
        }
        users.push(user);
        self.save_users(&users);
    }

    // sprints

    pub fn get_sprints(&self) -> Vec<Sprint> {
        self.load_collection(keys::SPRINTS)
    }

    pub fn save_sprint(&self, sprint: Sprint) -> Result<(), StoreError> {
        {
            let _guard = self.lock_writes();
            let mut sprints = self.get_sprints();
            match sprints.iter().position(|s| s.id == sprint.id) {
                Some(index) => sprints[index] = sprint.clone(),
                None => sprints.push(sprint.clone()),
            }
            if let Err(err) = self.write_json(keys::SPRINTS, &sprints) {
                error!(error = %err, "error saving sprint");
                return Err(StoreError::SaveFailed("sprint"));
            }
        }
        self.push(PushRequest::Sprint(sprint));
        Ok(())
    }

    pub fn active_sprint_for_team(&self, team_id: &str) -> Option<Sprint> {
        self.get_sprints()
            .into_iter()
            .find(|s| s.team_id == team_id && s.is_active)
    }

    /// Newest start date first.
    pub fn sprints_for_team(&self, team_id: &str) -> Vec<Sprint> {
        let mut sprints: Vec<_> = self
            .get_sprints()
            .into_iter()
            .filter(|s| s.team_id == team_id)
            .collect();
        sprints.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        sprints
    }

    // wholesale overwrites, used by pulls and admin sweeps; never pushed

    pub fn overwrite_entries(&self, entries: &[StandupEntry]) -> Result<(), StoreError> {
        let _guard = self.lock_writes();
        self.write_json(keys::ENTRIES, entries)
    }

    pub fn overwrite_sprints(&self, sprints: &[Sprint]) -> Result<(), StoreError> {
        let _guard = self.lock_writes();
        self.write_json(keys::SPRINTS, sprints)
    }

    pub fn overwrite_teams(&self, teams: &[Team]) -> Result<(), StoreError> {
        let _guard = self.lock_writes();
        self.write_json(keys::TEAMS, teams)
    }

    pub fn overwrite_users(&self, users: &[User]) -> Result<(), StoreError> {
        let _guard = self.lock_writes();
        self.write_json(keys::USERS, users)
    }

    /// Administrative bulk wipe of the four mirrored collections.
    pub fn clear_all_data(&self) {
        for key in [keys::ENTRIES, keys::USERS, keys::TEAMS, keys::SPRINTS] {
            if let Err(err) = self.remove_key(key) {
                error!(key, error = %err, "error clearing collection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Task;

    fn entry(user: &str, date: &str, today: &[&str]) -> StandupEntry {
        let mut e = StandupEntry::blank(user, DEFAULT_TEAM_ID, date);
        e.today_tasks = today
            .iter()
            .enumerate()
            .map(|(i, t)| Task::new(format!("t{i}"), *t))
            .collect();
        e
    }

    #[test]
    fn saving_twice_for_same_user_and_date_keeps_one_entry() {
        let store = LocalStore::in_memory();
        store.save_entry(entry("alex", "2024-01-02", &["a"])).unwrap();
        store.save_entry(entry("alex", "2024-01-02", &["a", "b"])).unwrap();
        store.save_entry(entry("alex", "2024-01-03", &["c"])).unwrap();
        store.save_entry(entry("kim", "2024-01-02", &["d"])).unwrap();

        let entries = store.get_entries();
        assert_eq!(entries.len(), 3);
        let alex = store.entry_for_user_and_date("alex", "2024-01-02").unwrap();
        assert_eq!(alex.today_tasks.len(), 2);

        let mut pairs: Vec<_> = entries
            .iter()
            .map(|e| (e.user_id.clone(), e.date.clone()))
            .collect();
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), entries.len());
    }

    #[test]
    fn replacing_an_entry_refreshes_updated_at() {
        let store = LocalStore::in_memory();
        let mut first = entry("alex", "2024-01-02", &["a"]);
        first.updated_at = "2000-01-01T00:00:00.000Z".into();
        store.save_entry(first.clone()).unwrap();
        store.save_entry(first).unwrap();
        let saved = store.entry_for_user_and_date("alex", "2024-01-02").unwrap();
        assert_ne!(saved.updated_at, "2000-01-01T00:00:00.000Z");
    }

    #[test]
    fn entry_queries_sort_like_the_views_expect() {
        let store = LocalStore::in_memory();
        store.save_entry(entry("kim", "2024-01-02", &[])).unwrap();
        store.save_entry(entry("alex", "2024-01-02", &[])).unwrap();
        store.save_entry(entry("alex", "2024-01-05", &[])).unwrap();

        let by_date = store.entries_for_date("2024-01-02");
        assert_eq!(by_date[0].user_id, "alex");
        assert_eq!(by_date[1].user_id, "kim");

        let alex = store.entries_for_user("alex");
        assert_eq!(alex[0].date, "2024-01-05");
        assert_eq!(store.entries_for_team(DEFAULT_TEAM_ID).len(), 3);
    }

    #[test]
    fn teams_always_include_defaults() {
        let store = LocalStore::in_memory();
        assert_eq!(store.get_teams(), default_teams());

        store
            .write_json(
                keys::TEAMS,
                &[Team {
                    id: "design".into(),
                    name: "Design".into(),
                    color: "#f59e0b".into(),
                }],
            )
            .unwrap();
        let teams = store.get_teams();
        let ids: Vec<_> = teams.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["design", "development", "marketing"]);

        // the repair was persisted
        let persisted: Vec<Team> = store.read_json(keys::TEAMS).unwrap().unwrap();
        assert_eq!(persisted.len(), 3);
    }

    #[test]
    fn corrupted_collections_read_as_defaults() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(keys::TEAMS, "{not json").unwrap();
        kv.set(keys::USERS, "[1, 2").unwrap();
        kv.set(keys::ENTRIES, "null?").unwrap();
        let store = LocalStore::new(kv);

        assert_eq!(store.get_teams(), default_teams());
        assert!(store.get_users().is_empty());
        assert!(store.get_entries().is_empty());
    }

    #[test]
    fn users_without_team_are_assigned_development() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(keys::USERS, r#"[{"id":"sam","name":"Sam"}]"#).unwrap();
        let store = LocalStore::new(kv);
        assert_eq!(store.get_users()[0].team_id, DEFAULT_TEAM_ID);
    }

    #[test]
    fn add_user_slugs_the_name_and_is_idempotent() {
        let store = LocalStore::in_memory();
        let first = store.add_user("Jane  Doe", Some("marketing"));
        assert_eq!(first.id, "jane-doe");
        let again = store.add_user("jane doe", None);
        assert_eq!(again, first);
        assert_eq!(store.get_users().len(), 1);
    }

    #[test]
    fn get_entries_migrates_legacy_records_once() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(
            keys::ENTRIES,
            r#"[{"id":"e1","userId":"alex","date":"2024-01-02","yesterdayPlan":"Old plan","todayPlan":"New plan","completed":true}]"#,
        )
        .unwrap();
        let store = LocalStore::new(kv.clone());

        let entries = store.get_entries();
        assert_eq!(entries[0].yesterday_tasks[0].text, "Old plan");
        assert!(entries[0].yesterday_tasks[0].completed);
        let after_first = kv.get(keys::ENTRIES).unwrap();

        store.get_entries();
        assert_eq!(kv.get(keys::ENTRIES).unwrap(), after_first);
    }

    #[test]
    fn sprint_upsert_and_active_lookup() {
        let store = LocalStore::in_memory();
        let mut sprint = Sprint {
            id: "s1".into(),
            team_id: "development".into(),
            name: "Sprint 1".into(),
            start_date: "2024-01-01".into(),
            end_date: "2024-01-14".into(),
            goals: vec!["Ship".into()],
            backlog_items: vec![],
            task_breakdown: vec![],
            capacity_planning: None,
            risks: None,
            notes: None,
            is_active: true,
        };
        store.save_sprint(sprint.clone()).unwrap();
        sprint.name = "Sprint One".into();
        store.save_sprint(sprint.clone()).unwrap();

        assert_eq!(store.get_sprints().len(), 1);
        assert_eq!(
            store.active_sprint_for_team("development").unwrap().name,
            "Sprint One"
        );
        assert!(store.active_sprint_for_team("marketing").is_none());
    }

    #[test]
    fn entry_write_failures_are_reported_but_team_failures_are_not() {
        let store = LocalStore::new(Arc::new(MemoryKv::with_quota(64)));
        let mut big = entry("alex", "2024-01-02", &[]);
        big.blockers = Some("x".repeat(200));

        let err = store.save_entry(big).unwrap_err();
        assert_eq!(err.to_string(), "Failed to save entry");
        assert!(store.get_entries().is_empty());

        // swallowed, and reads still return the defaults
        store.save_teams(&default_teams());
        assert_eq!(store.get_teams(), default_teams());
    }

    #[test]
    fn clear_all_data_wipes_the_mirrored_collections() {
        let store = LocalStore::in_memory();
        store.save_entry(entry("alex", "2024-01-02", &["a"])).unwrap();
        store.add_user("Alex", None);
        store.clear_all_data();
        assert!(store.get_entries().is_empty());
        assert!(store.get_users().is_empty());
    }
}

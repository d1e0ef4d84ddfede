//! Backend row shapes.
//!
//! Local field names are camelCase, backend columns are snake_case:
//! `userId⇄user_id`, `teamId⇄team_id`, `startDate⇄start_date`,
//! `endDate⇄end_date`, `backlogItems⇄backlog_items`,
//! `taskBreakdown⇄task_breakdown`, `capacityPlanning⇄capacity_planning`,
//! `isActive⇄is_active`, `passwordHash⇄password_hash`,
//! `createdAt⇄created_at`, `lastLoginAt⇄last_login_at`, `isAdmin⇄is_admin`.
//! Entries additionally carry `yesterday_tasks`, `today_tasks` and
//! `updated_at`. Every other field keeps its name. Tasks nested inside an
//! entry are stored as JSON in the local shape.

use serde::{Deserialize, Deserializer, Serialize};

use crate::remote_row;
use crate::types::{AuthUser, Sprint, StandupEntry, StoredUser, Task, Team, User};

pub mod tables {
    pub const ENTRIES: &str = "bt_entries";
    pub const SPRINTS: &str = "bt_sprints";
    pub const TEAMS: &str = "bt_teams";
    /// app users, not auth identities
    pub const USERS: &str = "bt_users";
    pub const AUTH_USERS: &str = "bt_auth_users";

    /// Tables pulled by a full sync and watched by the realtime channel.
    pub const MIRRORED: [&str; 4] = [ENTRIES, SPRINTS, TEAMS, USERS];
    pub const ALL: [&str; 5] = [ENTRIES, SPRINTS, TEAMS, USERS, AUTH_USERS];
}

/// Treats an explicit `null` column like a missing one.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

remote_row! {
    /// A row of `bt_entries`.
    EntryRow <=> StandupEntry {
        id: String,
        user_id: String,
        #[serde(default, deserialize_with = "null_as_default")]
        team_id: String,
        date: String,
        #[serde(default, deserialize_with = "null_as_default")]
        yesterday_tasks: Vec<Task>,
        #[serde(default, deserialize_with = "null_as_default")]
        today_tasks: Vec<Task>,
        #[serde(default)]
        blockers: Option<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        created_at: String,
        #[serde(default, deserialize_with = "null_as_default")]
        updated_at: String,
    }
}

remote_row! {
    /// A row of `bt_sprints`.
    SprintRow <=> Sprint {
        id: String,
        team_id: String,
        name: String,
        start_date: String,
        end_date: String,
        #[serde(default, deserialize_with = "null_as_default")]
        goals: Vec<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        backlog_items: Vec<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        task_breakdown: Vec<String>,
        #[serde(default)]
        capacity_planning: Option<String>,
        #[serde(default)]
        risks: Option<String>,
        #[serde(default)]
        notes: Option<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        is_active: bool,
    }
}

remote_row! {
    /// A row of `bt_teams`. Same names on both sides.
    TeamRow <=> Team {
        id: String,
        name: String,
        color: String,
    }
}

remote_row! {
    /// A row of `bt_users`.
    UserRow <=> User {
        id: String,
        name: String,
        #[serde(default, deserialize_with = "null_as_default")]
        team_id: String,
    }
}

/// A row of `bt_auth_users`, including the password hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthUserRow {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub team_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_login_at: String,
    #[serde(default)]
    pub is_admin: Option<bool>,
    pub password_hash: String,
}

impl From<StoredUser> for AuthUserRow {
    fn from(stored: StoredUser) -> Self {
        let StoredUser {
            user,
            password_hash,
        } = stored;
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            name: user.name,
            team_id: user.team_id,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
            is_admin: Some(user.is_admin),
            password_hash,
        }
    }
}

impl From<AuthUserRow> for StoredUser {
    fn from(row: AuthUserRow) -> Self {
        Self {
            user: AuthUser {
                id: row.id,
                username: row.username,
                email: row.email,
                name: row.name,
                team_id: row.team_id,
                created_at: row.created_at,
                last_login_at: row.last_login_at,
                is_admin: row.is_admin.unwrap_or(false),
            },
            password_hash: row.password_hash,
        }
    }
}

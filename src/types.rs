use serde::{Deserialize, Serialize};

/// Team assigned to records that predate team support.
pub const DEFAULT_TEAM_ID: &str = "development";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incompletion_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_eta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_from_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_users: Option<Vec<String>>,
}

impl Task {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ..Self::default()
        }
    }
}

/// One user's standup for one calendar day. The store keeps at most one per
/// `(user_id, date)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandupEntry {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub team_id: String,
    /// `YYYY-MM-DD`
    pub date: String,
    #[serde(default)]
    pub yesterday_tasks: Vec<Task>,
    #[serde(default)]
    pub today_tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockers: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl StandupEntry {
    /// An empty entry for `user_id` on `date`, keyed `<user>-<date>`.
    pub fn blank(user_id: &str, team_id: &str, date: &str) -> Self {
        let now = crate::dates::now_iso();
        Self {
            id: format!("{user_id}-{date}"),
            user_id: user_id.to_string(),
            team_id: team_id.to_string(),
            date: date.to_string(),
            yesterday_tasks: Vec::new(),
            today_tasks: Vec::new(),
            blockers: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn has_blockers(&self) -> bool {
        self.blockers
            .as_deref()
            .is_some_and(|b| !b.trim().is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub team_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub color: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sprint {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub goals: Vec<String>,
    /// URLs or ticket ids.
    #[serde(default)]
    pub backlog_items: Vec<String>,
    #[serde(default)]
    pub task_breakdown: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_planning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

/// Login identity. Never carries the password hash; see [`StoredUser`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub name: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_login_at: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// An [`AuthUser`] together with its password hash, as kept in the local
/// credential table and the remote auth table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    #[serde(flatten)]
    pub user: AuthUser,
    pub password_hash: String,
}

impl From<&AuthUser> for User {
    fn from(auth: &AuthUser) -> Self {
        let name = if !auth.name.trim().is_empty() {
            auth.name.clone()
        } else if !auth.username.trim().is_empty() {
            auth.username.clone()
        } else {
            "User".to_string()
        };
        let team_id = if auth.team_id.is_empty() {
            DEFAULT_TEAM_ID.to_string()
        } else {
            auth.team_id.clone()
        };
        User {
            id: auth.id.clone(),
            name,
            team_id,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupData {
    pub username: String,
    pub password: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub team_id: String,
}

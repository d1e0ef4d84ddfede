//! The Remote Mirror: an optional, best-effort copy of the four collections
//! (plus the auth table) held by the hosted backend.
//!
//! Every operation first checks the capability gate. With no backend
//! configured they return immediately without touching anything. Pulls
//! overwrite local collections wholesale (last writer wins, no merge).

pub mod client;
pub mod outbox;
pub mod rows;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};

pub use client::{PostgrestClient, RemoteBackend};
pub use rows::tables;

use crate::config::RemoteConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::remote::outbox::PushRequest;
use crate::remote::rows::{AuthUserRow, EntryRow, SprintRow, TeamRow, UserRow};
use crate::storage::LocalStore;
use crate::types::{Sprint, StandupEntry, StoredUser, Team, User};

/// Everything one full pull fetched. A table whose read failed is `None`
/// and leaves its local collection untouched.
#[derive(Clone, Debug, Default)]
pub struct RemoteSnapshot {
    pub entries: Option<Vec<StandupEntry>>,
    pub sprints: Option<Vec<Sprint>>,
    pub teams: Option<Vec<Team>>,
    pub users: Option<Vec<User>>,
}

/// Record counts written by a pull, per collection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PullSummary {
    pub entries: Option<usize>,
    pub sprints: Option<usize>,
    pub teams: Option<usize>,
    pub users: Option<usize>,
}

/// Outcome of probing one table from the diagnostics command.
#[derive(Clone, Debug, Serialize)]
pub struct TableProbe {
    pub table: &'static str,
    pub rows: Option<usize>,
    pub error: Option<String>,
}

#[derive(Clone, Default)]
pub struct RemoteMirror {
    backend: Option<Arc<dyn RemoteBackend>>,
}

impl RemoteMirror {
    pub fn new(backend: Option<Arc<dyn RemoteBackend>>) -> Self {
        Self { backend }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_config(config: Option<&RemoteConfig>) -> Self {
        match config {
            Some(config) => {
                info!(url = %config.url, "remote mirror enabled");
                Self::new(Some(Arc::new(PostgrestClient::new(config))))
            }
            None => {
                warn!("remote mirror not configured, running in local-only mode");
                Self::disabled()
            }
        }
    }

    /// The capability gate.
    pub fn remote_enabled(&self) -> bool {
        self.backend.is_some()
    }

    fn gate(&self, operation: &'static str) -> Option<&Arc<dyn RemoteBackend>> {
        if self.backend.is_none() {
            debug!(operation, "remote sync disabled, skipping");
        }
        self.backend.as_ref()
    }

    async fn fetch_table<R, L>(backend: &Arc<dyn RemoteBackend>, table: &'static str) -> Option<Vec<L>>
    where
        R: DeserializeOwned + Into<L>,
    {
        let rows = match backend.select_all(table).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(table, error = %err, "remote read failed");
                return None;
            }
        };
        match serde_json::from_value::<Vec<R>>(Value::Array(rows)) {
            Ok(rows) => Some(rows.into_iter().map(Into::into).collect()),
            Err(err) => {
                warn!(table, error = %err, "remote rows did not match the expected shape");
                None
            }
        }
    }

    /// Reads the four mirrored tables in parallel. `None` when disabled.
    pub async fn fetch_all(&self) -> Option<RemoteSnapshot> {
        let backend = self.gate("fetch_all")?;
        let (entries, sprints, teams, users) = tokio::join!(
            Self::fetch_table::<EntryRow, StandupEntry>(backend, tables::ENTRIES),
            Self::fetch_table::<SprintRow, Sprint>(backend, tables::SPRINTS),
            Self::fetch_table::<TeamRow, Team>(backend, tables::TEAMS),
            Self::fetch_table::<UserRow, User>(backend, tables::USERS),
        );
        Some(RemoteSnapshot {
            entries,
            sprints,
            teams,
            users,
        })
    }

    /// Overwrites each collection the snapshot carries. Nothing is pushed back.
    pub fn apply_snapshot(&self, store: &LocalStore, snapshot: RemoteSnapshot) -> PullSummary {
        fn write<T>(
            what: &'static str,
            items: Option<Vec<T>>,
            overwrite: impl FnOnce(&[T]) -> Result<(), crate::storage::StoreError>,
        ) -> Option<usize> {
            let items = items?;
            match overwrite(&items) {
                Ok(()) => {
                    debug!(collection = what, count = items.len(), "synced from remote");
                    Some(items.len())
                }
                Err(err) => {
                    error!(collection = what, error = %err, "failed to store pulled records");
                    None
                }
            }
        }

        PullSummary {
            entries: write("entries", snapshot.entries, |e| store.overwrite_entries(e)),
            sprints: write("sprints", snapshot.sprints, |s| store.overwrite_sprints(s)),
            teams: write("teams", snapshot.teams, |t| store.overwrite_teams(t)),
            users: write("users", snapshot.users, |u| store.overwrite_users(u)),
        }
    }

    /// Pulls every mirrored table into the Local Store. A local edit made
    /// since the last successful push is lost if the backend lacks it.
    pub async fn sync_all_to_local(&self, store: &LocalStore) -> PullSummary {
        match self.fetch_all().await {
            Some(snapshot) => {
                let summary = self.apply_snapshot(store, snapshot);
                info!(?summary, "pulled remote data");
                summary
            }
            None => PullSummary::default(),
        }
    }

    async fn upsert_rows<R: Serialize>(
        backend: &Arc<dyn RemoteBackend>,
        table: &'static str,
        rows: Vec<R>,
    ) -> MirrorResult<()> {
        let rows = rows
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        backend.upsert(table, rows, "id").await
    }

    pub async fn push_entry(&self, entry: &StandupEntry) -> MirrorResult<()> {
        let Some(backend) = self.gate("push_entry") else {
            return Ok(());
        };
        debug!(record_id = %entry.id, "pushing entry");
        Self::upsert_rows(backend, tables::ENTRIES, vec![EntryRow::from(entry.clone())]).await
    }

    pub async fn push_sprint(&self, sprint: &Sprint) -> MirrorResult<()> {
        let Some(backend) = self.gate("push_sprint") else {
            return Ok(());
        };
        Self::upsert_rows(backend, tables::SPRINTS, vec![SprintRow::from(sprint.clone())]).await
    }

    pub async fn push_teams(&self, teams: &[Team]) -> MirrorResult<()> {
        let Some(backend) = self.gate("push_teams") else {
            return Ok(());
        };
        let rows: Vec<TeamRow> = teams.iter().cloned().map(TeamRow::from).collect();
        Self::upsert_rows(backend, tables::TEAMS, rows).await
    }

    /// Rows are normalised: a blank name becomes `User`, a missing team
    /// becomes the default team.
    pub async fn push_users(&self, users: &[User]) -> MirrorResult<()> {
        let Some(backend) = self.gate("push_users") else {
            return Ok(());
        };
        let rows: Vec<UserRow> = users
            .iter()
            .map(|u| UserRow {
                id: u.id.clone(),
                name: if u.name.trim().is_empty() {
                    "User".to_string()
                } else {
                    u.name.clone()
                },
                team_id: if u.team_id.is_empty() {
                    crate::types::DEFAULT_TEAM_ID.to_string()
                } else {
                    u.team_id.clone()
                },
            })
            .collect();
        Self::upsert_rows(backend, tables::USERS, rows).await
    }

    pub async fn push(&self, request: &PushRequest) -> MirrorResult<()> {
        match request {
            PushRequest::Entry(entry) => self.push_entry(entry).await,
            PushRequest::Sprint(sprint) => self.push_sprint(sprint).await,
            PushRequest::Teams(teams) => self.push_teams(teams).await,
            PushRequest::Users(users) => self.push_users(users).await,
        }
    }

    /// Failures are logged, never returned.
    pub async fn upsert_auth_user(&self, user: &StoredUser) {
        let Some(backend) = self.gate("upsert_auth_user") else {
            return;
        };
        let row = AuthUserRow::from(user.clone());
        if let Err(err) = Self::upsert_rows(backend, tables::AUTH_USERS, vec![row]).await {
            warn!(username = %user.user.username, error = %err, "failed to upsert auth user");
        }
    }

    /// `None` when disabled, not found, ambiguous, or on any failure.
    pub async fn get_auth_user_by_username(&self, username: &str) -> Option<StoredUser> {
        let backend = self.gate("get_auth_user_by_username")?;
        let rows = match backend
            .select_eq(tables::AUTH_USERS, "username", username)
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                warn!(username, error = %err, "failed to fetch auth user");
                return None;
            }
        };
        if rows.len() > 1 {
            warn!(username, count = rows.len(), "multiple auth users share a username");
            return None;
        }
        let row = rows.into_iter().next()?;
        match serde_json::from_value::<AuthUserRow>(row) {
            Ok(row) => Some(row.into()),
            Err(err) => {
                warn!(username, error = %err, "auth user row did not match the expected shape");
                None
            }
        }
    }

    /// Reads every table and reports the outcome of each. This is the only
    /// operation that hands remote errors to its caller.
    pub async fn diagnose(&self) -> MirrorResult<Vec<TableProbe>> {
        let backend = self.backend.as_ref().ok_or(MirrorError::Disabled)?;
        let mut probes = Vec::with_capacity(tables::ALL.len());
        for table in tables::ALL {
            let probe = match backend.select_all(table).await {
                Ok(rows) => TableProbe {
                    table,
                    rows: Some(rows.len()),
                    error: None,
                },
                Err(err) => TableProbe {
                    table,
                    rows: None,
                    error: Some(err.to_string()),
                },
            };
            probes.push(probe);
        }
        Ok(probes)
    }
}

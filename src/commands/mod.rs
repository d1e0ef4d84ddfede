//! Command handlers behind the CLI.
//!
//! Every invocation opens an [`App`]: the local store on disk, the remote
//! mirror (disabled unless both remote settings are present) and the push
//! outbox. Handlers print with `colored`; errors bubble up as
//! [`ServiceError`] and are printed once by `main`.

mod account;
mod admin;
mod board;
mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use tracing::{debug, warn};

use crate::auth::{AuthError, AuthService};
use crate::cli::{Cli, Command, GlobalArguments};
use crate::config::{RemoteConfig, SyncSettings};
use crate::dates::today;
use crate::error::ServiceResult;
use crate::remote::RemoteMirror;
use crate::remote::outbox::{Outbox, PushStatus};
use crate::storage::{FileKv, KeyValueStore, LocalStore};
use crate::types::{AuthUser, DEFAULT_TEAM_ID};

pub struct App {
    pub data_dir: PathBuf,
    pub remote: Option<RemoteConfig>,
    pub sync: SyncSettings,
    pub mirror: Arc<RemoteMirror>,
    pub store: Arc<LocalStore>,
    pub outbox: Outbox,
    pub auth: AuthService,
}

impl App {
    /// Must be called inside a tokio runtime; the outbox worker is spawned
    /// here.
    pub fn open(settings: &GlobalArguments) -> ServiceResult<Self> {
        let kv = match &settings.data_dir {
            Some(dir) => FileKv::new(dir),
            None => FileKv::default_location()?,
        };
        let data_dir = kv.root().to_path_buf();
        let remote = settings.remote_config();
        let sync = SyncSettings::default();

        let mirror = Arc::new(RemoteMirror::from_config(remote.as_ref()));
        let (outbox, _worker) = Outbox::spawn(mirror.clone(), sync.retry.clone());
        let store = Arc::new(
            LocalStore::new(Arc::new(kv) as Arc<dyn KeyValueStore>).with_outbox(outbox.clone()),
        );
        let auth = AuthService::new(store.clone(), mirror.clone());
        debug!(data_dir = %data_dir.display(), remote = remote.is_some(), "opened local store");

        Ok(Self {
            data_dir,
            remote,
            sync,
            mirror,
            store,
            outbox,
            auth,
        })
    }

    pub fn require_user(&self) -> ServiceResult<AuthUser> {
        Ok(self.auth.current_user().ok_or(AuthError::NotLoggedIn)?)
    }

    /// The given team, else the signed-in user's, else the default team.
    pub fn team_or_default(&self, team: Option<&str>) -> String {
        team.map(String::from)
            .or_else(|| self.auth.current_user().map(|u| u.team_id))
            .unwrap_or_else(|| DEFAULT_TEAM_ID.to_string())
    }

    /// Waits up to `exit_flush_limit` for queued pushes and reports the ones
    /// that failed or are still pending. Local data is already saved either
    /// way.
    pub async fn close(self) {
        if !self.mirror.remote_enabled() {
            return;
        }
        if !self.outbox.flush_within(self.sync.exit_flush_limit).await {
            warn!(
                limit = ?self.sync.exit_flush_limit,
                pending = self.outbox.pending_count(),
                "remote unreachable, exiting with pushes pending"
            );
        }
        for (record, status) in self.outbox.statuses() {
            match status {
                PushStatus::Confirmed => {}
                PushStatus::Pending => eprintln!(
                    "{} {} was saved locally but had not synced before exit",
                    "!".yellow().bold(),
                    record
                ),
                PushStatus::Failed(reason) => {
                    warn!(%record, %reason, "push failed");
                    eprintln!(
                        "{} {} was saved locally but not synced: {}",
                        "!".yellow().bold(),
                        record,
                        reason
                    );
                }
            }
        }
    }
}

fn date_or_today(date: Option<String>) -> String {
    date.unwrap_or_else(today)
}

pub async fn run(cli: Cli) -> ServiceResult<()> {
    let app = App::open(&cli.settings)?;
    let result = dispatch(&app, cli.command).await;
    app.close().await;
    result
}

async fn dispatch(app: &App, command: Command) -> ServiceResult<()> {
    match command {
        Command::Status => sync::status(app),
        Command::Diagnose => sync::diagnose(app).await,
        Command::Pull => sync::pull(app).await,
        Command::Watch => sync::watch(app).await,
        Command::Signup(args) => account::signup(app, args).await,
        Command::Login { username, password } => account::login(app, username, password).await,
        Command::Logout => account::logout(app),
        Command::Whoami => account::whoami(app),
        Command::Password => account::change_password(app).await,
        Command::Task(task) => board::task(app, task),
        Command::Blockers { text, date } => board::blockers(app, text, date_or_today(date)),
        Command::Standup { team, date, dates } => board::standup(app, team, date, dates),
        Command::Export { date, out } => board::export(app, date_or_today(date), out),
        Command::Sprint(sprint) => board::sprint(app, sprint),
        Command::Admin(admin) => admin::run(app, admin).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_uses_the_given_data_dir_and_stays_local_without_remote() {
        let dir = tempfile::tempdir().unwrap();
        let settings = GlobalArguments {
            data_dir: Some(dir.path().to_path_buf()),
            ..GlobalArguments::default()
        };
        let app = App::open(&settings).unwrap();
        assert!(!app.mirror.remote_enabled());
        assert_eq!(app.team_or_default(None), DEFAULT_TEAM_ID);
        assert_eq!(app.team_or_default(Some("design")), "design");
        assert!(app.require_user().is_err());

        app.store.add_user("Kim Lee", None);
        app.close().await;

        let reopened = App::open(&settings).unwrap();
        assert!(reopened.store.get_users().iter().any(|u| u.name == "Kim Lee"));
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_waiting_when_the_remote_is_unreachable() {
        use crate::error::MirrorError;
        use crate::remote::RemoteBackend;
        use crate::testing::{MockBackend, sample_sprint};
        use std::time::Duration;

        let backend = Arc::new(MockBackend::default());
        backend.fail_upserts(usize::MAX, MirrorError::Network("connection refused".into()));
        let mirror = Arc::new(RemoteMirror::new(Some(
            backend.clone() as Arc<dyn RemoteBackend>
        )));
        let sync = SyncSettings::default();
        let (outbox, _worker) = Outbox::spawn(mirror.clone(), sync.retry.clone());
        let store = Arc::new(LocalStore::in_memory().with_outbox(outbox.clone()));
        let app = App {
            data_dir: PathBuf::from("unused"),
            remote: None,
            auth: AuthService::new(store.clone(), mirror.clone()),
            sync,
            mirror,
            store: store.clone(),
            outbox: outbox.clone(),
        };

        store.save_sprint(sample_sprint("s1", true)).unwrap();
        let started = tokio::time::Instant::now();
        tokio::time::timeout(Duration::from_secs(30), app.close())
            .await
            .expect("close is bounded");
        assert!(started.elapsed() <= Duration::from_secs(6));
        assert_eq!(outbox.pending_count(), 1);
        assert_eq!(store.get_sprints().len(), 1);
    }
}

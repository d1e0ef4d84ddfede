use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::RemoteConfig;
use crate::metadata::{PKG_DESCRIPTION, PKG_NAME, PKG_VERSION};

#[derive(Parser, Debug, Clone)]
#[command(name = PKG_NAME)]
#[command(version = PKG_VERSION)]
#[command(about = PKG_DESCRIPTION, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: GlobalArguments,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArguments {
    /// Directory holding the local collections (defaults to ~/.bricktrack)
    #[arg(long, global = true, env = "BRICKTRACK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Hosted backend URL; remote sync stays off without it
    #[arg(long, global = true, env = "BRICKTRACK_REMOTE_URL")]
    pub remote_url: Option<String>,

    /// Hosted backend access key
    #[arg(long, global = true, env = "BRICKTRACK_REMOTE_KEY", hide_env_values = true)]
    pub remote_key: Option<String>,
}

impl GlobalArguments {
    pub fn remote_config(&self) -> Option<RemoteConfig> {
        RemoteConfig::resolve(self.remote_url.clone(), self.remote_key.clone())
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the signed-in user, remote sync mode and table counts
    Status,
    /// Probe every remote table and report what came back
    Diagnose,
    /// Replace the local collections with the remote tables
    Pull,
    /// Stay subscribed to remote changes until Ctrl-C
    Watch,
    /// Create an account and sign in
    Signup(SignupArguments),
    /// Sign in (prompts for the password when not given)
    Login {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out
    Logout,
    /// Print the signed-in user
    Whoami,
    /// Change the signed-in user's password
    Password,
    /// Work with your own tasks for a day
    #[command(subcommand)]
    Task(TaskCommand),
    /// Set or clear today's blockers
    Blockers {
        /// Omit to clear
        text: Option<String>,
        #[arg(long)]
        date: Option<String>,
    },
    /// Show a team's standup board
    Standup {
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        date: Option<String>,
        /// List the dates that have updates instead
        #[arg(long, conflicts_with = "date")]
        dates: bool,
    },
    /// Print the Slack-ready summary for a day
    Export {
        #[arg(long)]
        date: Option<String>,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Plan and switch sprints
    #[command(subcommand)]
    Sprint(SprintCommand),
    /// Administrative tools
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Args, Debug, Clone)]
pub struct SignupArguments {
    #[arg(long)]
    pub username: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long, default_value = crate::types::DEFAULT_TEAM_ID)]
    pub team: String,
    /// Prompted for when not given
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    /// Show the day's tasks and the suggested next step
    List {
        #[arg(long)]
        date: Option<String>,
    },
    /// Add tasks to today's list, one per line (bullets are stripped)
    Add {
        text: String,
        #[arg(long)]
        date: Option<String>,
    },
    /// Replace a task's text
    Edit {
        id: String,
        text: String,
        #[arg(long)]
        date: Option<String>,
    },
    Remove {
        id: String,
        #[arg(long)]
        date: Option<String>,
    },
    /// Mark a task done
    Done {
        id: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        date: Option<String>,
    },
    /// Undo a completion
    Reopen {
        id: String,
        #[arg(long)]
        date: Option<String>,
    },
    /// Record why a task didn't get done
    Incomplete {
        id: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        eta: Option<String>,
        #[arg(long)]
        date: Option<String>,
    },
    /// Carry one of yesterday's tasks over to today
    Move {
        id: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        eta: Option<String>,
        #[arg(long)]
        date: Option<String>,
    },
    /// Tag a teammate on a task
    Tag {
        id: String,
        user: String,
        #[arg(long)]
        date: Option<String>,
    },
    Untag {
        id: String,
        user: String,
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SprintCommand {
    /// List the team's sprints, newest first
    List {
        #[arg(long)]
        team: Option<String>,
    },
    /// Create a sprint and make it the active one
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Repeat for several goals
        #[arg(long = "goal")]
        goals: Vec<String>,
        #[arg(long = "backlog")]
        backlog_items: Vec<String>,
        #[arg(long)]
        capacity: Option<String>,
        #[arg(long)]
        risks: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        team: Option<String>,
    },
    Activate {
        id: String,
        #[arg(long)]
        team: Option<String>,
    },
    Archive {
        id: String,
        #[arg(long)]
        team: Option<String>,
    },
    /// Add a goal to the active sprint
    AddGoal {
        text: String,
        #[arg(long)]
        team: Option<String>,
    },
    /// Remove a goal (1-based) from the active sprint
    RemoveGoal {
        number: usize,
        #[arg(long)]
        team: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AdminCommand {
    /// List accounts
    Users,
    /// Create an account for a teammate
    Invite {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = crate::types::DEFAULT_TEAM_ID)]
        team: String,
        /// Generated when not given
        #[arg(long)]
        password: Option<String>,
    },
    /// Delete an account; its entries are kept
    DeleteUser { id: String },
    /// List entries that belong to no account, with suggested owners
    Orphans,
    /// Move an orphan's entries to an account
    Associate { from: String, to: String },
    /// Link orphans whose id matches an account name
    AutoAssociate,
    /// Delete every orphaned entry
    Cleanup {
        #[arg(long)]
        yes: bool,
    },
    /// Delete all standup data on this device
    Wipe {
        #[arg(long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sprint_goals_repeat() {
        let cli = Cli::parse_from([
            "bricktrack", "sprint", "create", "--name", "S1", "--start", "2024-01-01", "--end",
            "2024-01-14", "--goal", "a", "--goal", "b",
        ]);
        let Command::Sprint(SprintCommand::Create { goals, .. }) = cli.command else {
            panic!("expected sprint create");
        };
        assert_eq!(goals, ["a", "b"]);
    }

    #[test]
    fn remote_needs_both_values() {
        let mut settings = GlobalArguments {
            remote_url: Some("example.supabase.co".into()),
            ..GlobalArguments::default()
        };
        assert!(settings.remote_config().is_none());
        settings.remote_key = Some("anon".into());
        assert_eq!(
            settings.remote_config().map(|c| c.url),
            Some("https://example.supabase.co".to_string())
        );
    }
}

use colored::Colorize;
use tracing::info;

use super::App;
use crate::error::ServiceResult;
use crate::realtime::{RealtimeSync, SyncState};
use crate::remote::PullSummary;

fn count(n: Option<usize>) -> String {
    n.map(|n| n.to_string()).unwrap_or_else(|| "skipped".dimmed().to_string())
}

fn print_pull(summary: &PullSummary) {
    println!("  Entries: {}", count(summary.entries));
    println!("  Sprints: {}", count(summary.sprints));
    println!("  Teams:   {}", count(summary.teams));
    println!("  Users:   {}", count(summary.users));
}

pub(super) fn status(app: &App) -> ServiceResult<()> {
    match app.auth.current_user() {
        Some(user) => println!("Signed in as {} ({})", user.name.bold(), user.username),
        None => println!("Not signed in"),
    }
    println!("Data: {}", app.data_dir.display());
    match &app.remote {
        Some(remote) => println!("Remote sync: {} ({})", "enabled".green(), remote.url),
        None => println!(
            "Remote sync: {} (set BRICKTRACK_REMOTE_URL and BRICKTRACK_REMOTE_KEY)",
            "local only".yellow()
        ),
    }
    println!(
        "Local: {} entries, {} sprints, {} teams, {} users, {} accounts",
        app.store.get_entries().len(),
        app.store.get_sprints().len(),
        app.store.get_teams().len(),
        app.store.get_users().len(),
        app.auth.stored_users().len()
    );
    Ok(())
}

pub(super) async fn diagnose(app: &App) -> ServiceResult<()> {
    let probes = app.mirror.diagnose().await?;
    for probe in probes {
        match (probe.rows, probe.error) {
            (Some(rows), _) => println!("{} {} ({rows} rows)", "✓".green().bold(), probe.table),
            (None, error) => println!(
                "{} {}: {}",
                "✗".red().bold(),
                probe.table,
                error.unwrap_or_default()
            ),
        }
    }
    Ok(())
}

pub(super) async fn pull(app: &App) -> ServiceResult<()> {
    if !app.mirror.remote_enabled() {
        println!("{} Remote sync is off; nothing to pull", "!".yellow().bold());
        return Ok(());
    }
    let summary = app.mirror.sync_all_to_local(&app.store).await;
    println!("{} Pulled from remote", "✓".green().bold());
    print_pull(&summary);
    Ok(())
}

fn describe(app: &App, state: SyncState) -> String {
    match state {
        SyncState::Idle => "idle".dimmed().to_string(),
        SyncState::Connecting => "connecting".yellow().to_string(),
        SyncState::Subscribed => "live".green().to_string(),
        SyncState::Fallback => format!(
            "polling every {}s",
            app.sync.fallback_poll_interval.as_secs()
        )
        .yellow()
        .to_string(),
    }
}

pub(super) async fn watch(app: &App) -> ServiceResult<()> {
    let mut sync = RealtimeSync::from_config(
        app.remote.as_ref(),
        app.mirror.clone(),
        app.store.clone(),
        app.sync.clone(),
    );
    if !app.mirror.remote_enabled() {
        println!("{} Remote sync is off; nothing to watch", "!".yellow().bold());
        return Ok(());
    }

    let mut states = sync.subscribe_state();
    let mut pulls = sync.subscribe_pulls();
    sync.start().await;
    println!("Watching for remote changes. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                println!("Sync: {}", describe(app, state));
            }
            changed = pulls.changed() => {
                if changed.is_err() {
                    break;
                }
                let n = *pulls.borrow_and_update();
                println!(
                    "{} Local data refreshed ({n} pulls, {} entries)",
                    "✓".green().bold(),
                    app.store.get_entries().len()
                );
            }
        }
    }

    sync.stop().await;
    info!("realtime watch stopped");
    Ok(())
}

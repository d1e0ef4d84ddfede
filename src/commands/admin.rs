use colored::Colorize;
use dialoguer::Confirm;

use super::App;
use crate::cli::AdminCommand;
use crate::error::ServiceResult;
use crate::views::admin::{AdminTools, Invite};

fn confirmed(skip_prompt: bool, prompt: &str) -> ServiceResult<bool> {
    if skip_prompt {
        return Ok(true);
    }
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

pub(super) async fn run(app: &App, command: AdminCommand) -> ServiceResult<()> {
    let admin = AdminTools::open(&app.store, &app.auth)?;
    match command {
        AdminCommand::Users => {
            let users = app.auth.all_users();
            if users.is_empty() {
                println!("No accounts yet.");
            }
            for user in users {
                let badge = if user.is_admin { " admin".cyan().to_string() } else { String::new() };
                println!(
                    "{}  {} ({}) [{}]{}",
                    user.id.dimmed(),
                    user.name.bold(),
                    user.username,
                    user.team_id,
                    badge
                );
            }
        }
        AdminCommand::Invite {
            email,
            name,
            team,
            password,
        } => {
            let invited = admin
                .invite_user(Invite {
                    email,
                    name,
                    team_id: team,
                    password,
                })
                .await?;
            println!(
                "{} {} has been added to the platform.",
                "✓".green().bold(),
                invited.user.name.bold()
            );
            if invited.generated {
                println!("  Password for {}: {}", invited.user.username, invited.password);
            }
        }
        AdminCommand::DeleteUser { id } => {
            app.auth.delete_user(&id);
            println!("{} Deleted account {id}; their entries were kept", "✓".green().bold());
        }
        AdminCommand::Orphans => {
            let orphans = admin.orphaned_data();
            if orphans.is_empty() {
                println!("{} No orphaned entries", "✓".green().bold());
                return Ok(());
            }
            println!("{} orphaned ids", orphans.len());
            for orphan in &orphans {
                println!(
                    "  {}  {} entries, latest: {}",
                    orphan.user_id.bold(),
                    orphan.entry_count,
                    orphan.latest_entry
                );
            }
            for suggestion in admin.suggested_associations() {
                println!(
                    "  Suggested: \"{}\" → {} ({})",
                    suggestion.orphaned_user_id,
                    suggestion.user.name,
                    suggestion.user.id
                );
            }
        }
        AdminCommand::Associate { from, to } => {
            if admin.associate_data_with_user(&from, &to)? {
                println!("{} Entries of {from} now belong to {to}", "✓".green().bold());
            } else {
                println!("{} No entries found for {from}", "!".yellow().bold());
            }
        }
        AdminCommand::AutoAssociate => {
            let linked = admin.auto_associate_obvious_matches()?;
            println!("{} Linked {linked} orphaned ids to matching users", "✓".green().bold());
        }
        AdminCommand::Cleanup { yes } => {
            if !confirmed(yes, "Delete all orphaned data? This cannot be undone.")? {
                return Ok(());
            }
            let removed = admin.cleanup_orphaned_data()?;
            println!("{} Removed {removed} orphaned entries.", "✓".green().bold());
        }
        AdminCommand::Wipe { yes } => {
            if !confirmed(yes, "Delete all standup data on this device?")? {
                return Ok(());
            }
            admin.wipe();
            println!("{} Local standup data cleared", "✓".green().bold());
        }
    }
    Ok(())
}

use std::path::PathBuf;

use chrono::Timelike;
use colored::Colorize;

use super::{App, date_or_today};
use crate::cli::{SprintCommand, TaskCommand};
use crate::error::ServiceResult;
use crate::views::ValidationError;
use crate::views::export::SlackExport;
use crate::views::sprint::{NewSprint, SprintPlanner};
use crate::views::standup::{TeamStandup, available_dates, date_label};
use crate::views::tasks::{MyTasks, is_end_of_day};

fn end_of_day_now() -> bool {
    is_end_of_day(chrono::Local::now().hour())
}

fn my_tasks<'a>(app: &'a App, date: Option<String>) -> ServiceResult<MyTasks<'a>> {
    let user = app.require_user()?;
    Ok(MyTasks::load_or_create(
        &app.store,
        &user.id,
        &user.team_id,
        &date_or_today(date),
    ))
}

/// Accepts an app-user id or a display name.
fn resolve_user_id(app: &App, user: &str) -> String {
    app.store
        .get_users()
        .into_iter()
        .find(|u| u.id == user || u.name.eq_ignore_ascii_case(user))
        .map(|u| u.id)
        .unwrap_or_else(|| user.to_string())
}

pub(super) fn task(app: &App, command: TaskCommand) -> ServiceResult<()> {
    match command {
        TaskCommand::List { date } => {
            print!("{}", my_tasks(app, date)?.render(end_of_day_now()));
        }
        TaskCommand::Add { text, date } => {
            let added = my_tasks(app, date)?.add_today_tasks(&text)?;
            for task in added {
                println!("{} Added {} ({})", "✓".green().bold(), task.text, task.id.dimmed());
            }
        }
        TaskCommand::Edit { id, text, date } => {
            my_tasks(app, date)?.update_task_text(&id, &text)?;
            println!("{} Updated {id}", "✓".green().bold());
        }
        TaskCommand::Remove { id, date } => {
            my_tasks(app, date)?.remove_task(&id)?;
            println!("{} Removed {id}", "✓".green().bold());
        }
        TaskCommand::Done { id, notes, date } => {
            let mut tasks = my_tasks(app, date)?;
            tasks.complete_task(&id, notes.as_deref())?;
            let stats = tasks.progress();
            println!(
                "{} Done. {}/{} complete today",
                "✓".green().bold(),
                stats.completed_today,
                stats.total_today
            );
        }
        TaskCommand::Reopen { id, date } => {
            my_tasks(app, date)?.reopen_task(&id)?;
            println!("{} Reopened {id}", "✓".green().bold());
        }
        TaskCommand::Incomplete {
            id,
            reason,
            eta,
            date,
        } => {
            my_tasks(app, date)?.mark_incomplete(&id, &reason, eta.as_deref())?;
            println!("{} Reason recorded for {id}", "✓".green().bold());
        }
        TaskCommand::Move {
            id,
            reason,
            eta,
            date,
        } => {
            let moved = my_tasks(app, date)?.move_to_today(&id, &reason, eta.as_deref())?;
            println!("{} Moved to today as {}", "✓".green().bold(), moved.id);
        }
        TaskCommand::Tag { id, user, date } => {
            let user_id = resolve_user_id(app, &user);
            my_tasks(app, date)?.tag_user(&id, &user_id)?;
            println!("{} Tagged {user_id}", "✓".green().bold());
        }
        TaskCommand::Untag { id, user, date } => {
            let user_id = resolve_user_id(app, &user);
            my_tasks(app, date)?.untag_user(&id, &user_id)?;
            println!("{} Untagged {user_id}", "✓".green().bold());
        }
    }
    Ok(())
}

pub(super) fn blockers(app: &App, text: Option<String>, date: String) -> ServiceResult<()> {
    let mut tasks = my_tasks(app, Some(date))?;
    tasks.set_blockers(text.as_deref())?;
    if tasks.entry().has_blockers() {
        println!("{} Blockers recorded", "✓".green().bold());
    } else {
        println!("{} Blockers cleared", "✓".green().bold());
    }
    Ok(())
}

pub(super) fn standup(
    app: &App,
    team: Option<String>,
    date: Option<String>,
    list_dates: bool,
) -> ServiceResult<()> {
    if list_dates {
        let dates = available_dates(&app.store);
        if dates.is_empty() {
            println!("No updates yet.");
        }
        for date in dates {
            println!("{date}  {}", date_label(&date));
        }
        return Ok(());
    }

    let team = app.team_or_default(team.as_deref());
    let board = TeamStandup::load(&app.store, &team, &date_or_today(date));
    print!("{}", board.render());
    Ok(())
}

pub(super) fn export(app: &App, date: String, out: Option<PathBuf>) -> ServiceResult<()> {
    let export = SlackExport::for_date(&app.store, &date);
    let text = export.to_text();
    match out {
        Some(path) => {
            std::fs::write(&path, &text)?;
            let summary = export.summary();
            println!(
                "{} Wrote {} ({} people, {} completed, {} planned, {} with blockers)",
                "✓".green().bold(),
                path.display(),
                summary.people,
                summary.completed,
                summary.planned,
                summary.with_blockers
            );
        }
        None => println!("{text}"),
    }
    Ok(())
}

pub(super) fn sprint(app: &App, command: SprintCommand) -> ServiceResult<()> {
    match command {
        SprintCommand::List { team } => {
            let team = app.team_or_default(team.as_deref());
            print!("{}", SprintPlanner::new(&app.store, &team).render());
        }
        SprintCommand::Create {
            name,
            start,
            end,
            goals,
            backlog_items,
            capacity,
            risks,
            notes,
            team,
        } => {
            let team = app.team_or_default(team.as_deref());
            let sprint = SprintPlanner::new(&app.store, &team).create_sprint(NewSprint {
                name,
                start_date: start,
                end_date: end,
                goals,
                backlog_items,
                task_breakdown: Vec::new(),
                capacity_planning: capacity.unwrap_or_default(),
                risks: risks.unwrap_or_default(),
                notes: notes.unwrap_or_default(),
            })?;
            println!(
                "{} {} is now the active sprint ({})",
                "✓".green().bold(),
                sprint.name.bold(),
                sprint.id
            );
        }
        SprintCommand::Activate { id, team } => {
            let team = app.team_or_default(team.as_deref());
            let sprint = SprintPlanner::new(&app.store, &team).activate(&id)?;
            println!("{} {} activated", "✓".green().bold(), sprint.name);
        }
        SprintCommand::Archive { id, team } => {
            let team = app.team_or_default(team.as_deref());
            let sprint = SprintPlanner::new(&app.store, &team).archive(&id)?;
            println!("{} {} archived", "✓".green().bold(), sprint.name);
        }
        SprintCommand::AddGoal { text, team } => {
            let team = app.team_or_default(team.as_deref());
            let sprint = SprintPlanner::new(&app.store, &team).add_goal(&text)?;
            println!("{} {} now has {} goals", "✓".green().bold(), sprint.name, sprint.goals.len());
        }
        SprintCommand::RemoveGoal { number, team } => {
            let team = app.team_or_default(team.as_deref());
            let index = number
                .checked_sub(1)
                .ok_or(ValidationError::GoalOutOfRange(number))?;
            let sprint = SprintPlanner::new(&app.store, &team).remove_goal(index)?;
            println!("{} {} now has {} goals", "✓".green().bold(), sprint.name, sprint.goals.len());
        }
    }
    Ok(())
}

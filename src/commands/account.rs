use colored::Colorize;
use dialoguer::Password;

use super::App;
use crate::cli::SignupArguments;
use crate::error::ServiceResult;
use crate::types::{AuthUser, LoginCredentials, SignupData};

fn prompt_password(prompt: &str) -> ServiceResult<String> {
    Ok(Password::new().with_prompt(prompt).interact()?)
}

fn print_user(user: &AuthUser) {
    println!("{} ({})", user.name.bold(), user.username);
    if let Some(email) = &user.email {
        println!("  Email: {email}");
    }
    println!("  Team: {}", user.team_id);
    if user.is_admin {
        println!("  {}", "Admin".cyan());
    }
}

pub(super) async fn signup(app: &App, args: SignupArguments) -> ServiceResult<()> {
    let password = match args.password {
        Some(password) => password,
        None => Password::new()
            .with_prompt("Password")
            .with_confirmation("Password (again)", "Passwords do not match")
            .interact()?,
    };
    let user = app
        .auth
        .signup(SignupData {
            username: args.username,
            password,
            name: args.name,
            email: args.email,
            team_id: args.team,
        })
        .await?;
    println!("{} Account created", "✓".green().bold());
    print_user(&user);
    Ok(())
}

pub(super) async fn login(
    app: &App,
    username: String,
    password: Option<String>,
) -> ServiceResult<()> {
    let password = match password {
        Some(password) => password,
        None => prompt_password("Password")?,
    };
    let user = app
        .auth
        .login(&LoginCredentials { username, password })
        .await?;
    println!("{} Welcome back, {}", "✓".green().bold(), user.name.bold());
    Ok(())
}

pub(super) fn logout(app: &App) -> ServiceResult<()> {
    app.auth.logout();
    println!("{} Signed out", "✓".green().bold());
    Ok(())
}

pub(super) fn whoami(app: &App) -> ServiceResult<()> {
    print_user(&app.require_user()?);
    Ok(())
}

pub(super) async fn change_password(app: &App) -> ServiceResult<()> {
    app.require_user()?;
    let current = prompt_password("Current password")?;
    let new = Password::new()
        .with_prompt("New password")
        .with_confirmation("New password (again)", "Passwords do not match")
        .interact()?;
    app.auth.change_password(&current, &new).await?;
    println!("{} Password updated", "✓".green().bold());
    Ok(())
}

use anyhow::{Context, Result};

use moneymate_lib::session::{self, RegisterRequest};

use crate::app::App;
use crate::render::terminal::{paint, Color};

pub async fn login(app: &App, email: &str, password: &str) -> Result<()> {
    let identity = session::auth::login(&app.ctx.client, &app.ctx.session, email, password)
        .await
        .context("Login failed")?;

    if app.is_json() {
        println!("{}", serde_json::to_string_pretty(&identity)?);
    } else {
        println!("Logged in as {}", paint(&identity.email, Color::BOLD, app.use_color));
    }
    Ok(())
}

pub async fn register(
    app: &App,
    email: String,
    first_name: String,
    last_name: String,
    password: String,
) -> Result<()> {
    // Single password entry on the command line, so it confirms itself
    let request = RegisterRequest {
        email,
        confirm_password: password.clone(),
        password,
        first_name,
        last_name,
    };
    session::auth::register(&app.ctx.client, &request)
        .await
        .context("Registration failed")?;

    if app.is_json() {
        println!("{}", serde_json::json!({ "registered": request.email }));
    } else {
        println!("Registered {}. You can now log in.", request.email);
    }
    Ok(())
}

pub fn logout(app: &App) -> Result<()> {
    app.ctx.session.logout().context("Failed to clear session")?;
    if !app.is_json() {
        println!("Logged out");
    }
    Ok(())
}

pub fn whoami(app: &App) -> Result<()> {
    let identity = app.ctx.session.identity();

    if app.is_json() {
        println!(
            "{}",
            serde_json::json!({
                "authenticated": identity.is_some(),
                "identity": identity,
            })
        );
        return Ok(());
    }

    match identity {
        Some(identity) => {
            let name = format!("{} {}", identity.first_name, identity.last_name);
            let name = name.trim();
            if name.is_empty() {
                println!("{}", identity.email);
            } else {
                println!("{} <{}>", name, identity.email);
            }
        }
        None => println!("Not logged in"),
    }
    Ok(())
}

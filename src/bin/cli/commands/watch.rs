use anyhow::{Context, Result};

use crate::app::App;
use crate::render::terminal::{paint, Color};

/// Print session changes made by other clients until Ctrl-C. A fresh login
/// triggers a catalog reload.
pub async fn run(app: &App) -> Result<()> {
    let _watcher = app
        .ctx
        .watch_storage()
        .context("Failed to watch session storage")?;
    let mut state = app.ctx.session.subscribe_state();
    let mut authenticated = state.borrow_and_update().is_authenticated();

    report(app, authenticated, None);

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let now = state.borrow_and_update().is_authenticated();
                if now == authenticated {
                    continue;
                }
                authenticated = now;

                let count = if authenticated {
                    match app.ctx.catalog.refresh().await {
                        Ok(docs) => Some(docs.len()),
                        Err(e) => {
                            log::warn!("watch: reload failed: {}", e);
                            None
                        }
                    }
                } else {
                    None
                };
                report(app, authenticated, count);
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("watch: interrupted");
                break;
            }
        }
    }

    Ok(())
}

fn report(app: &App, authenticated: bool, documents: Option<usize>) {
    let email = app
        .ctx
        .session
        .identity()
        .map(|i| i.email)
        .unwrap_or_default();

    if app.is_json() {
        println!(
            "{}",
            serde_json::json!({
                "authenticated": authenticated,
                "email": email,
                "documents": documents,
                "at": chrono::Local::now().to_rfc3339(),
            })
        );
        return;
    }

    let stamp = chrono::Local::now().format("%H:%M:%S").to_string();
    let status = if authenticated {
        paint(&format!("logged in as {}", email), Color::GREEN, app.use_color)
    } else {
        paint("logged out", Color::RED, app.use_color)
    };
    match documents {
        Some(count) => println!("[{}] {} ({} documents)", stamp, status, count),
        None => println!("[{}] {}", stamp, status),
    }
}

//! Authentication commands.

use super::App;
use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use session_store::{OAuthCallbackServer, Session, SignOutScope};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// How long to wait for the controller to pick up a fresh sign-in.
const SIGN_IN_SETTLE: Duration = Duration::from_secs(2);

/// Sign in through the browser.
pub async fn login(app: &App, provider: &str, no_browser: bool, format: &OutputFormat) -> Result<()> {
    app.start().await;

    if let Some(user) = app.context.controller().user() {
        let who = user.email.unwrap_or(user.id);
        output::print_success(&format!("Already logged in as {}", who), format);
        return Ok(());
    }

    let server = OAuthCallbackServer::with_defaults();
    let listener = server.bind().await?;
    let authorize_url = app
        .context
        .store()
        .sign_in(provider, &server.callback_url())
        .await?;

    if no_browser {
        println!("Open this URL to sign in:\n\n  {}\n", authorize_url);
    } else {
        println!("Opening browser to sign in...");
        if let Err(e) = open::that(authorize_url.as_str()) {
            warn!(error = %e, "Failed to open browser");
            println!("Could not open a browser. Open this URL instead:\n\n  {}\n", authorize_url);
        }
    }
    println!("Waiting for sign-in to complete...");

    let tokens = server.serve(listener).await?;
    let callback_url = tokens.to_callback_url(&server.callback_url())?;
    let session = app.context.store().complete_sign_in(&callback_url).await?;
    finish_sign_in(app, session, format).await
}

/// Complete a sign-in from a redirect URL pasted by the user.
pub async fn callback(app: &App, url: &str, format: &OutputFormat) -> Result<()> {
    let callback_url = Url::parse(url.trim()).context("Invalid callback URL")?;
    app.start().await;
    let session = app.context.store().complete_sign_in(&callback_url).await?;
    finish_sign_in(app, session, format).await
}

async fn finish_sign_in(app: &App, session: Session, format: &OutputFormat) -> Result<()> {
    // The provider's SignedIn event updates the controller asynchronously;
    // wait for it so first-login bookkeeping lands before we exit.
    let mut snapshots = app.context.controller().subscribe();
    let settled = tokio::time::timeout(
        SIGN_IN_SETTLE,
        snapshots.wait_for(|snapshot| snapshot.is_authenticated()),
    )
    .await
    .map(|observed| observed.is_ok())
    .unwrap_or(false);
    if !settled {
        warn!("Controller did not observe sign-in in time");
    }

    let who = session.user.email.clone().unwrap_or(session.user.id.clone());
    info!(user_id = %session.user.id, "Signed in");
    if app.context.controller().is_first_login() {
        output::print_success(&format!("Welcome! Logged in as {}", who), format);
    } else {
        output::print_success(&format!("Logged in as {}", who), format);
    }
    Ok(())
}

/// Sign out. `--force` skips the server and wipes all local state.
pub async fn logout(app: &App, force: bool, format: &OutputFormat) -> Result<()> {
    app.start().await;

    if force {
        app.context.emergency_logout(app.navigator.as_ref()).await;
        output::print_success("Local auth state cleared", format);
        return Ok(());
    }

    if !app.context.controller().is_authenticated() {
        output::print_success("Not logged in", format);
        return Ok(());
    }

    app.context.controller().cancel_token_refresh();
    match app.context.store().sign_out(SignOutScope::Global).await {
        Ok(()) => output::print_success("Logged out successfully", format),
        Err(e) => {
            warn!(error = %e, "Sign-out failed");
            output::print_error(
                &format!("Logout failed: {}. Use --force to clear local state.", e),
                format,
            );
        }
    }
    Ok(())
}

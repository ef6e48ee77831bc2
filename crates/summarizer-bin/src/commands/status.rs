//! Status command and the foreground watchdog.

use super::App;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use auth_state_controller::{AuthPhase, AuthSnapshot, NavigationEvent};
use chrono::{TimeZone, Utc};
use consistency_watchdog::{ConsistencyWatchdog, FixOutcome, MismatchBanner, WatchdogConfig};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Serialize)]
struct StatusOutput {
    phase: AuthPhase,
    logged_in: bool,
    user_id: Option<String>,
    email: Option<String>,
    expires_at: Option<String>,
    next_refresh_secs: Option<u64>,
    first_login: bool,
    api_ready: bool,
    recently_recovered: bool,
}

impl StatusOutput {
    fn collect(app: &App, snapshot: &AuthSnapshot) -> Self {
        let controller = app.context.controller();
        let user = snapshot.user.as_ref();
        Self {
            phase: snapshot.phase,
            logged_in: snapshot.is_authenticated(),
            user_id: user.map(|u| u.id.clone()),
            email: user.and_then(|u| u.email.clone()),
            expires_at: snapshot.session.as_ref().and_then(|s| {
                Utc.timestamp_opt(s.expires_at, 0)
                    .single()
                    .map(|at| at.to_rfc3339())
            }),
            next_refresh_secs: controller.scheduled_refresh_in().map(|d| d.as_secs()),
            first_login: controller.is_first_login(),
            api_ready: app.context.api_gate().is_ready(),
            recently_recovered: app.context.recently_recovered(),
        }
    }

    fn print_text(&self) {
        let phase = format!("{:?}", self.phase);
        output::print_row("Phase", &phase);
        if self.logged_in {
            output::print_row("Auth", "logged in");
            output::print_row("User ID", self.user_id.as_deref().unwrap_or("unknown"));
            if let Some(email) = &self.email {
                output::print_row("Email", email);
            }
            output::print_row("Expires", self.expires_at.as_deref().unwrap_or("unknown"));
            if let Some(secs) = self.next_refresh_secs {
                output::print_row("Next refresh", &format!("in {}s", secs));
            }
        } else {
            output::print_row("Auth", "not logged in");
        }
        output::print_row("API", if self.api_ready { "ready" } else { "waiting" });
    }
}

/// Print auth status. `--watch` keeps a watchdog running and prints every
/// change; `--fix` runs the manual repair once.
pub async fn status(app: &mut App, watch: Option<u64>, fix: bool, format: &OutputFormat) -> Result<()> {
    app.start().await;

    if fix {
        let watchdog = ConsistencyWatchdog::new(app.context.clone(), app.navigator.clone());
        let outcome = watchdog.fix_now().await;
        match outcome {
            FixOutcome::Reloaded => output::print_success("Auth state repaired", format),
            FixOutcome::ForcedLogout => {
                output::print_error("Auth state could not be repaired", format)
            }
        }
        return Ok(());
    }

    let snapshot = app.context.controller().snapshot();
    let status = StatusOutput::collect(app, &snapshot);
    output::print(&status, format, StatusOutput::print_text);

    if let Some(secs) = watch {
        watch_loop(app, Duration::from_secs(secs.max(1)), format).await?;
    }
    Ok(())
}

async fn watch_loop(app: &mut App, interval: Duration, format: &OutputFormat) -> Result<()> {
    let mut navigation = app.navigator.subscribe();

    loop {
        let config = WatchdogConfig {
            interval,
            ..WatchdogConfig::from(app.context.timings())
        };
        let watchdog = ConsistencyWatchdog::with_config(
            app.context.clone(),
            app.navigator.clone(),
            config,
        );
        watchdog.start();

        let reload = watch_until_reload(app, &watchdog, &mut navigation, format).await;
        watchdog.stop();
        if !reload {
            return Ok(());
        }

        info!("Reloading auth state");
        if *format == OutputFormat::Text {
            println!("Reloading auth state...");
        }
        app.reload().await?;
    }
}

/// Print changes until interrupted (false) or a reload is requested (true).
async fn watch_until_reload(
    app: &App,
    watchdog: &Arc<ConsistencyWatchdog>,
    navigation: &mut tokio::sync::watch::Receiver<Option<NavigationEvent>>,
    format: &OutputFormat,
) -> bool {
    let mut snapshots = app.context.controller().subscribe();
    let mut banners = watchdog.subscribe_banner();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return false,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return false;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                let status = StatusOutput::collect(app, &snapshot);
                output::print(&status, format, |status| {
                    output::print_divider();
                    status.print_text();
                });
            }
            changed = banners.changed() => {
                if changed.is_err() {
                    return false;
                }
                let banner = banners.borrow_and_update().clone();
                if let Some(banner) = banner {
                    print_banner(&banner, format);
                }
            }
            changed = navigation.changed() => {
                if changed.is_err() {
                    return false;
                }
                let event = *navigation.borrow_and_update();
                match event {
                    Some(NavigationEvent::Reload) => return true,
                    Some(NavigationEvent::Navigate(_)) => return false,
                    None => {}
                }
            }
        }
    }
}

fn print_banner(banner: &MismatchBanner, format: &OutputFormat) {
    output::print(banner, format, |banner| {
        output::print_heading(&banner.title);
        println!("{}", banner.message);
        println!("Run 'summarizer status --fix' to repair it.");
    });
}

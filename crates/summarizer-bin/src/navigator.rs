//! Terminal rendering of navigation requests.

use auth_state_controller::{NavigationEvent, Navigator, Route};
use tokio::sync::watch;
use tracing::info;

/// Prints where the user should go and lets long-running commands react to
/// the latest request.
pub struct CliNavigator {
    tx: watch::Sender<Option<NavigationEvent>>,
}

impl CliNavigator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<NavigationEvent>> {
        self.tx.subscribe()
    }
}

impl Default for CliNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator for CliNavigator {
    fn navigate(&self, route: Route) {
        info!(route = ?route, "Navigation requested");
        let hint = match route {
            Route::Login => "You are signed out. Run 'summarizer login' to sign in again.",
            Route::ForcedLogout => {
                "Sign-in state could not be repaired. Run 'summarizer logout --force', then 'summarizer login'."
            }
            Route::EmergencyLogout => {
                "Your session could not be recovered. Run 'summarizer logout --force', then 'summarizer login'."
            }
        };
        eprintln!("{}", hint);
        self.tx.send_replace(Some(NavigationEvent::Navigate(route)));
    }

    fn reload(&self) {
        info!("Reload requested");
        self.tx.send_replace(Some(NavigationEvent::Reload));
    }
}

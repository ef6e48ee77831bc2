//! Where recovery paths send the user.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

/// Destinations recovery can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Login,
    /// Sign-out flow entered when automated repair has given up.
    ForcedLogout,
    /// Aggressive clearing after an unrecoverable auth error.
    EmergencyLogout,
}

/// Navigation seam. A browser would change location; the CLI prints
/// instructions and exits.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);

    /// Restart the current view from scratch.
    fn reload(&self);
}

/// What a [`RecordingNavigator`] was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationEvent {
    Navigate(Route),
    Reload,
}

/// Navigator that only remembers what it was told.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    events: Mutex<Vec<NavigationEvent>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NavigationEvent> {
        self.events.lock().clone()
    }

    pub fn reloads(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, NavigationEvent::Reload))
            .count()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                NavigationEvent::Navigate(route) => Some(*route),
                NavigationEvent::Reload => None,
            })
            .collect()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        info!(route = ?route, "Navigation requested");
        self.events.lock().push(NavigationEvent::Navigate(route));
    }

    fn reload(&self) {
        info!("Reload requested");
        self.events.lock().push(NavigationEvent::Reload);
    }
}

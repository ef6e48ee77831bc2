//! Single-flight coordination of token refreshes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// `None` while the refresh runs, then the leader's outcome.
type OutcomeRx = watch::Receiver<Option<bool>>;

#[derive(Default)]
struct CoordinatorState {
    in_flight: Option<OutcomeRx>,
    last_refresh_time: Option<DateTime<Utc>>,
    generation: u64,
}

/// Ensures at most one token refresh runs at a time.
///
/// Callers that arrive while a refresh is running share the leader's outcome
/// instead of starting their own.
pub struct TokenRefreshCoordinator {
    state: Mutex<CoordinatorState>,
    wait_timeout: Duration,
}

/// What `begin` hands out.
pub enum RefreshTicket {
    /// Run the refresh and report through the lease.
    Lead(RefreshLease),
    /// Another caller is refreshing; wait for its outcome.
    InFlight(RefreshWaiter),
}

impl TokenRefreshCoordinator {
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::default()),
            wait_timeout,
        }
    }

    pub fn begin(self: &Arc<Self>) -> RefreshTicket {
        let mut state = self.state.lock();
        if let Some(rx) = &state.in_flight {
            debug!("Token refresh already in progress, waiting");
            return RefreshTicket::InFlight(RefreshWaiter {
                rx: rx.clone(),
                timeout: self.wait_timeout,
            });
        }

        state.generation += 1;
        let (tx, rx) = watch::channel(None);
        state.in_flight = Some(rx);

        RefreshTicket::Lead(RefreshLease {
            coordinator: Arc::clone(self),
            generation: state.generation,
            tx: Some(tx),
        })
    }

    /// Run `refresh` unless one is already running, and return the outcome
    /// either way.
    pub async fn run<F, Fut>(self: &Arc<Self>, refresh: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        match self.begin() {
            RefreshTicket::Lead(lease) => {
                let ok = refresh().await;
                lease.complete(ok);
                ok
            }
            RefreshTicket::InFlight(waiter) => waiter.outcome().await,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    pub fn last_refresh_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_refresh_time
    }

    /// Wait for the running refresh, if any. `None` when nothing was running.
    pub async fn wait_for_refresh(&self) -> Option<bool> {
        let rx = self.state.lock().in_flight.clone()?;
        let waiter = RefreshWaiter {
            rx,
            timeout: self.wait_timeout,
        };
        Some(waiter.outcome().await)
    }

    fn release(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.in_flight = None;
        }
        state.last_refresh_time = Some(Utc::now());
    }
}

/// Exclusive right to perform the current refresh.
///
/// Dropping it without calling [`complete`](Self::complete) reports failure,
/// so waiters are never left hanging.
pub struct RefreshLease {
    coordinator: Arc<TokenRefreshCoordinator>,
    generation: u64,
    tx: Option<watch::Sender<Option<bool>>>,
}

impl RefreshLease {
    pub fn complete(mut self, ok: bool) {
        self.finish(ok);
    }

    fn finish(&mut self, ok: bool) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        tx.send_replace(Some(ok));
        self.coordinator.release(self.generation);
        debug!(generation = self.generation, success = ok, "Token refresh finished");
    }
}

impl Drop for RefreshLease {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!(generation = self.generation, "Token refresh abandoned");
            self.finish(false);
        }
    }
}

/// Follower side of a running refresh.
pub struct RefreshWaiter {
    rx: OutcomeRx,
    timeout: Duration,
}

impl RefreshWaiter {
    /// The leader's outcome, or `true` if it takes longer than the wait
    /// timeout.
    pub async fn outcome(mut self) -> bool {
        let waited = tokio::time::timeout(self.timeout, self.rx.wait_for(Option::is_some))
            .await
            .map(|resolved| resolved.is_ok());
        match waited {
            // The lease always publishes before its sender goes away.
            Ok(_) => self.rx.borrow().unwrap_or(false),
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Timed out waiting for token refresh, proceeding"
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coordinator() -> Arc<TokenRefreshCoordinator> {
        Arc::new(TokenRefreshCoordinator::new(Duration::from_secs(3)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..8).map(|_| {
            let coordinator = coordinator.clone();
            let calls = calls.clone();
            async move {
                coordinator
                    .run(|| async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(400)).await;
                        false
                    })
                    .await
            }
        });

        let outcomes = join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outcomes.iter().all(|ok| !ok));
        assert!(!coordinator.is_refreshing());
        assert!(coordinator.last_refresh_time().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_follower_times_out_to_success() {
        let coordinator = coordinator();
        let RefreshTicket::Lead(lease) = coordinator.begin() else {
            panic!("first caller should lead");
        };
        let RefreshTicket::InFlight(waiter) = coordinator.begin() else {
            panic!("second caller should follow");
        };

        let started = tokio::time::Instant::now();
        assert!(waiter.outcome().await);
        assert_eq!(started.elapsed(), Duration::from_secs(3));

        lease.complete(false);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_lease_resolves_false() {
        let coordinator = coordinator();
        let RefreshTicket::Lead(lease) = coordinator.begin() else {
            panic!("first caller should lead");
        };
        let RefreshTicket::InFlight(waiter) = coordinator.begin() else {
            panic!("second caller should follow");
        };

        drop(lease);

        assert!(!waiter.outcome().await);
        assert!(!coordinator.is_refreshing());
        assert!(matches!(coordinator.begin(), RefreshTicket::Lead(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_refresh_without_refresh_returns_none() {
        let coordinator = coordinator();
        assert_eq!(coordinator.wait_for_refresh().await, None);

        let RefreshTicket::Lead(lease) = coordinator.begin() else {
            panic!("first caller should lead");
        };
        let waiting = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait_for_refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        lease.complete(true);

        assert_eq!(waiting.await.unwrap(), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_lease_does_not_clear_newer_refresh() {
        let coordinator = coordinator();
        let RefreshTicket::Lead(first) = coordinator.begin() else {
            panic!("first caller should lead");
        };
        first.complete(true);

        let RefreshTicket::Lead(_second) = coordinator.begin() else {
            panic!("refresh finished, next caller should lead");
        };
        assert!(coordinator.is_refreshing());
    }
}

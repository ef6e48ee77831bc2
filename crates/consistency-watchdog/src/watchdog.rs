//! The watchdog: detect divergence, repair it a bounded number of times,
//! then hand over to the user.

use crate::mismatch::{ConsistencyReport, MismatchKind};
use crate::record::{RepairRecord, RepairStep};
use auth_state_controller::{AuthContext, Navigator, Route};
use chrono::Utc;
use client_storage::{StorageArea, StorageKeys};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use summarizer_config_and_utils::AuthTimings;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Flags older builds left behind that can keep auth from settling.
const STUCK_LOCAL_FLAGS: [&str; 4] = [
    StorageKeys::DISABLE_AUTH_LISTENERS,
    StorageKeys::AUTH_LOOP_RESET,
    StorageKeys::AUTH_LOOP_DETECTED,
    StorageKeys::TRIED_LOCAL_STORAGE_USER,
];
const STUCK_SESSION_FLAGS: [&str; 1] = [StorageKeys::AUTH_PAGE_RELOADED];

/// Extra session keys a manual fix clears.
const MANUAL_FIX_SESSION_FLAGS: [&str; 3] = [
    StorageKeys::AUTH_PAGE_INTENTIONAL_RELOAD,
    StorageKeys::HOME_RELOAD_COUNT,
    StorageKeys::LAST_HOME_RELOAD,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub interval: Duration,
    pub recheck_delay: Duration,
}

impl From<&AuthTimings> for WatchdogConfig {
    fn from(timings: &AuthTimings) -> Self {
        Self {
            interval: timings.watchdog_interval(),
            recheck_delay: timings.watchdog_recheck_delay(),
        }
    }
}

/// User-facing notice shown once automated repair has run out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MismatchBanner {
    pub kind: MismatchKind,
    pub title: String,
    pub message: String,
}

impl MismatchBanner {
    fn for_kind(kind: MismatchKind) -> Self {
        Self {
            kind,
            title: "Authentication state mismatch detected".to_string(),
            message: "Your sign-in state looks inconsistent. Use Fix Now to repair it or sign in again."
                .to_string(),
        }
    }
}

/// What one check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "kind")]
pub enum CheckOutcome {
    /// Auth is not ready yet.
    Skipped,
    Consistent,
    /// Flags cleared and state refreshed; the views agree again.
    Repaired(MismatchKind),
    /// Flags cleared and state refreshed; still diverging.
    RefreshAttempted(MismatchKind),
    /// The one automated reload was requested.
    Reloaded(MismatchKind),
    /// Nothing automated is left; the banner is up.
    Exhausted(MismatchKind),
}

/// Outcome of [`ConsistencyWatchdog::fix_now`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixOutcome {
    /// State agrees; a reload was requested to pick it up everywhere.
    Reloaded,
    /// Still inconsistent; routed to the forced sign-out flow.
    ForcedLogout,
}

/// Background cross-check between reactive auth state, the provider and
/// persisted storage.
pub struct ConsistencyWatchdog {
    context: AuthContext,
    navigator: Arc<dyn Navigator>,
    config: WatchdogConfig,
    record: Mutex<RepairRecord>,
    banner_tx: watch::Sender<Option<MismatchBanner>>,
    banner_dismissed: AtomicBool,
    checking: tokio::sync::Mutex<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConsistencyWatchdog {
    pub fn new(context: AuthContext, navigator: Arc<dyn Navigator>) -> Arc<Self> {
        let config = WatchdogConfig::from(context.timings());
        Self::with_config(context, navigator, config)
    }

    pub fn with_config(
        context: AuthContext,
        navigator: Arc<dyn Navigator>,
        config: WatchdogConfig,
    ) -> Arc<Self> {
        let record = Self::restore_record(&context);
        let (banner_tx, _) = watch::channel(None);
        Arc::new(Self {
            context,
            navigator,
            config,
            record: Mutex::new(record),
            banner_tx,
            banner_dismissed: AtomicBool::new(false),
            checking: tokio::sync::Mutex::new(()),
            task: Mutex::new(None),
        })
    }

    /// Keep the stored record only when the last run ended in our own reload.
    fn restore_record(context: &AuthContext) -> RepairRecord {
        let storage = context.storage();
        let intentional = storage
            .flag(StorageArea::Session, StorageKeys::INTENTIONAL_AUTH_RELOAD)
            .unwrap_or(false);

        if intentional {
            if let Err(e) = storage.session().delete(StorageKeys::INTENTIONAL_AUTH_RELOAD) {
                warn!(error = %e, "Failed to consume intentional reload marker");
            }
            let record = RepairRecord::load(storage);
            info!(
                attempts = record.attempts,
                stage = ?record.stage,
                "Resuming repair after intentional reload"
            );
            return record;
        }

        let record = RepairRecord::default();
        if let Err(e) = record.save(storage) {
            warn!(error = %e, "Failed to reset repair record");
        }
        record
    }

    pub fn record(&self) -> RepairRecord {
        self.record.lock().clone()
    }

    pub fn banner(&self) -> Option<MismatchBanner> {
        self.banner_tx.borrow().clone()
    }

    pub fn subscribe_banner(&self) -> watch::Receiver<Option<MismatchBanner>> {
        self.banner_tx.subscribe()
    }

    /// Hide the banner for the rest of this run, or until the state heals.
    pub fn dismiss_banner(&self) {
        self.banner_dismissed.store(true, Ordering::SeqCst);
        self.banner_tx.send_replace(None);
        debug!("Mismatch banner dismissed");
    }

    // ==========================================
    // Checks
    // ==========================================

    /// Observe the three views.
    pub async fn inspect(&self) -> ConsistencyReport {
        let snapshot = self.context.controller().snapshot();
        let provider_has_session = self.context.store().get_session().await.is_some();
        let token_key = self.context.store().persisted_session_key();
        let persisted_token = self
            .context
            .storage()
            .local()
            .has(&token_key)
            .unwrap_or(false);

        ConsistencyReport {
            reactive_authenticated: snapshot.is_authenticated(),
            reactive_has_user: snapshot.user.is_some(),
            reactive_has_session: snapshot.session.is_some(),
            provider_has_session,
            persisted_token,
        }
    }

    /// Run one check and at most one repair step.
    pub async fn check_once(&self) -> CheckOutcome {
        let _checking = self.checking.lock().await;

        if !self.context.controller().is_auth_ready() {
            debug!("Auth not ready, skipping consistency check");
            return CheckOutcome::Skipped;
        }

        let report = self.inspect().await;
        let Some(kind) = report.mismatch() else {
            self.on_consistent(&report);
            return CheckOutcome::Consistent;
        };

        if kind.is_critical() {
            error!(kind = ?kind, report = ?report, "Critical auth state mismatch");
        } else {
            warn!(kind = ?kind, report = ?report, "Auth state mismatch");
        }

        let step = self.record.lock().next_step();
        match step {
            RepairStep::RefreshState => self.try_refresh(kind).await,
            RepairStep::Reload => self.try_reload(kind),
            RepairStep::GiveUp => {
                self.update_record(RepairStep::GiveUp);
                self.show_banner(kind);
                CheckOutcome::Exhausted(kind)
            }
        }
    }

    async fn try_refresh(&self, kind: MismatchKind) -> CheckOutcome {
        self.update_record(RepairStep::RefreshState);
        info!(kind = ?kind, "Attempting automatic auth repair");

        self.clear_stuck_flags(false);
        let refreshed = self.context.controller().refresh_auth_state().await;
        debug!(outcome = ?refreshed, "Auth state refreshed for repair");

        let report = self.inspect().await;
        match report.mismatch() {
            None => {
                info!(kind = ?kind, "Auth mismatch repaired");
                self.on_consistent(&report);
                CheckOutcome::Repaired(kind)
            }
            Some(_) => {
                warn!(kind = ?kind, "Refresh did not repair auth mismatch");
                CheckOutcome::RefreshAttempted(kind)
            }
        }
    }

    fn try_reload(&self, kind: MismatchKind) -> CheckOutcome {
        self.update_record(RepairStep::Reload);

        // The marker must be in place before the reload so the next run
        // keeps the record instead of starting over.
        if let Err(e) = self
            .context
            .storage()
            .set_flag(StorageArea::Session, StorageKeys::INTENTIONAL_AUTH_RELOAD)
        {
            warn!(error = %e, "Failed to set intentional reload marker");
        }

        warn!(kind = ?kind, "Auth mismatch persists, reloading once");
        self.navigator.reload();
        CheckOutcome::Reloaded(kind)
    }

    fn on_consistent(&self, report: &ConsistencyReport) {
        self.banner_dismissed.store(false, Ordering::SeqCst);
        self.banner_tx.send_if_modified(|banner| banner.take().is_some());

        // Only a state that agrees outright clears the ladder.
        if !report.is_agreed() {
            return;
        }
        let mut record = self.record.lock();
        if record.is_clean() {
            return;
        }
        info!(attempts = record.attempts, "Auth state consistent, resetting repair record");
        *record = RepairRecord::default();
        if let Err(e) = record.save(self.context.storage()) {
            warn!(error = %e, "Failed to reset repair record");
        }
    }

    fn update_record(&self, step: RepairStep) {
        let mut record = self.record.lock();
        record.record(step, Utc::now());
        if let Err(e) = record.save(self.context.storage()) {
            warn!(error = %e, "Failed to persist repair record");
        }
    }

    fn show_banner(&self, kind: MismatchKind) {
        if self.banner_dismissed.load(Ordering::SeqCst) {
            return;
        }
        let banner = MismatchBanner::for_kind(kind);
        self.banner_tx.send_if_modified(|current| {
            if current.as_ref() == Some(&banner) {
                return false;
            }
            *current = Some(banner.clone());
            true
        });
    }

    fn clear_stuck_flags(&self, manual: bool) {
        let storage = self.context.storage();
        let mut removed = 0;
        let mut clear = |area: StorageArea, keys: &[&str]| match storage.remove_keys(area, keys) {
            Ok(count) => removed += count,
            Err(e) => warn!(area = ?area, error = %e, "Failed to clear stuck auth flags"),
        };

        clear(StorageArea::Local, &STUCK_LOCAL_FLAGS);
        clear(StorageArea::Session, &STUCK_SESSION_FLAGS);
        if manual {
            clear(StorageArea::Session, &MANUAL_FIX_SESSION_FLAGS);
        }
        debug!(removed, manual, "Cleared stuck auth flags");
    }

    // ==========================================
    // Manual fix
    // ==========================================

    /// The banner's "Fix Now": clear everything, refresh once, then either
    /// reload or send the user through a forced sign-out.
    pub async fn fix_now(&self) -> FixOutcome {
        let _checking = self.checking.lock().await;
        info!("Manually fixing auth state");

        self.clear_stuck_flags(true);
        self.context.controller().refresh_auth_state().await;

        let report = self.inspect().await;
        if report.is_agreed() {
            info!("Manual fix succeeded");
            self.on_consistent(&report);
            self.navigator.reload();
            FixOutcome::Reloaded
        } else {
            warn!(report = ?report, "Manual fix did not resolve the mismatch, forcing logout");
            self.navigator.navigate(Route::ForcedLogout);
            FixOutcome::ForcedLogout
        }
    }

    // ==========================================
    // Run loop
    // ==========================================

    /// Check now, shortly after, then on every interval tick and snapshot
    /// change until [`stop`](Self::stop).
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let watchdog = Arc::clone(self);
        *task = Some(tokio::spawn(async move { watchdog.run().await }));
        debug!(
            interval_ms = self.config.interval.as_millis() as u64,
            "Consistency watchdog started"
        );
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("Consistency watchdog stopped");
        }
    }

    async fn run(&self) {
        let mut snapshots = self.context.controller().subscribe();

        self.check_once().await;
        tokio::time::sleep(self.config.recheck_delay).await;
        self.check_once().await;

        let mut interval = tokio::time::interval(self.config.interval);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            self.check_once().await;
        }
    }
}

impl Drop for ConsistencyWatchdog {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

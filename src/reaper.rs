// ============================================================================
// Reaper Scheduler - Periodic expiry sweeps
// ============================================================================
//
// Two independent background tasks, each on its own interval:
//
//   - the session reap removes idle application sessions and detaches
//     them from their SSO records;
//   - the SSO reap purges inactive SSO records and force-removes any
//     session still bound to a purged record, so nothing keeps pointing
//     at a reclaimed identity.
//
// The sweeps run concurrently with each other and with request traffic;
// neither holds a store lock across a whole sweep (the stores do
// two-phase snapshot/recheck removal). Races with logout or with each
// other surface as idempotent no-ops. Shutdown is clean: stop() signals
// both tasks and waits for them, and an in-flight sweep always finishes
// before its task exits, so a session is never left detached on one
// side only.
//
// ============================================================================

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use vestibule_config::Config;

use crate::clock::Clock;
use crate::session_store::SessionStore;
use crate::sso_registry::SsoRegistry;

pub struct ReaperScheduler {
    sessions: Arc<SessionStore>,
    sso: Arc<SsoRegistry>,
    clock: Arc<dyn Clock>,
    config: Config,
    shutdown_tx: Option<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
}

impl ReaperScheduler {
    pub fn new(
        sessions: Arc<SessionStore>,
        sso: Arc<SsoRegistry>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            sessions,
            sso,
            clock,
            config,
            shutdown_tx: None,
            handles: Vec::new(),
        }
    }

    /// Spawn both sweep tasks. Calling start on a running scheduler is
    /// a no-op.
    pub fn start(&mut self) {
        if self.shutdown_tx.is_some() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            session_reap_interval_secs = self.config.session_reap_interval.as_secs(),
            sso_reap_interval_secs = self.config.sso_reap_interval.as_secs(),
            "Starting reaper scheduler"
        );

        let session_task = {
            let sessions = self.sessions.clone();
            let sso = self.sso.clone();
            let clock = self.clock.clone();
            let interval = self.config.session_reap_interval;
            let mut shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            reap_sessions(&sessions, &sso, clock.now_ms()).await;
                        }
                        _ = shutdown_rx.changed() => break,
                    }
                }
                tracing::debug!("Session reaper stopped");
            })
        };

        let sso_task = {
            let sessions = self.sessions.clone();
            let sso = self.sso.clone();
            let clock = self.clock.clone();
            let interval = self.config.sso_reap_interval;
            let mut shutdown_rx = shutdown_rx;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            reap_sso_records(&sessions, &sso, clock.now_ms()).await;
                        }
                        _ = shutdown_rx.changed() => break,
                    }
                }
                tracing::debug!("SSO reaper stopped");
            })
        };

        self.handles.push(session_task);
        self.handles.push(sso_task);
        self.shutdown_tx = Some(shutdown_tx);
    }

    /// Stop scheduling further sweeps and wait for both tasks. Any
    /// in-flight sweep finishes first; nothing is interrupted
    /// mid-mutation.
    pub async fn stop(&mut self) {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return;
        };
        let _ = shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Reaper task did not shut down cleanly");
            }
        }
        tracing::info!("Reaper scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }
}

/// One application-session sweep: remove idle sessions, then detach
/// each removed session from its SSO record (symmetric removal keeps
/// the bindings bidirectionally consistent).
pub async fn reap_sessions(sessions: &SessionStore, sso: &SsoRegistry, now_ms: u64) {
    let removed = sessions.sweep_expired(now_ms).await;
    if removed.is_empty() {
        tracing::debug!("No expired application sessions to reap");
        return;
    }

    for session in &removed {
        if let Some(sso_id) = &session.sso_id {
            sso.detach(sso_id, &session.app_id, &session.session_id).await;
        }
    }

    vestibule_metrics::SESSIONS_REAPED_TOTAL.inc_by(removed.len() as u64);
    tracing::info!(reaped = removed.len(), "Reaped expired application sessions");
}

/// One SSO sweep: purge inactive records, then force-remove any session
/// still bound to a purged record. The session reaper usually gets
/// there first; this is defensive cleanup for sessions whose own idle
/// window has not elapsed.
pub async fn reap_sso_records(sessions: &SessionStore, sso: &SsoRegistry, now_ms: u64) {
    let removed = sso.sweep_expired(now_ms).await;
    if removed.is_empty() {
        tracing::debug!("No expired SSO records to purge");
        return;
    }

    let mut orphans = 0u64;
    for record in &removed {
        for (app_id, session_id) in &record.bindings {
            // A concurrent logout or session reap may already have
            // removed it; that is fine.
            if sessions.remove(session_id).await.is_some() {
                orphans += 1;
                tracing::debug!(
                    sso_id = %record.sso_id,
                    app_id = %app_id,
                    session_id = %session_id,
                    "Force-removed session bound to purged SSO record"
                );
            }
        }
    }

    vestibule_metrics::SSO_RECORDS_REAPED_TOTAL.inc_by(removed.len() as u64);
    if orphans > 0 {
        vestibule_metrics::ORPHAN_SESSIONS_REMOVED_TOTAL.inc_by(orphans);
    }
    tracing::info!(
        purged = removed.len(),
        orphan_sessions = orphans,
        "Purged expired SSO records"
    );
}

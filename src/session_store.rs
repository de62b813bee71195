// ============================================================================
// Session Store - Per-application session records
// ============================================================================
//
// Owns every AppSession. Pure CRUD plus the expiry predicate; which
// records get destroyed and when is the reaper's call (sweep) or the
// dispatcher's (logout). The `sso_id` field is a cross-reference into
// the SsoRegistry, never ownership: removing a session must be followed
// by a symmetric detach on the registry side, which is the caller's
// responsibility because the two stores must not lock each other.
//
// ============================================================================

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use vestibule_error::{AppError, AppResult};

use crate::types::{AppId, Principal, SessionId, SsoId};

/// One per-application, per-login-instance session.
#[derive(Clone, Debug)]
pub struct AppSession {
    pub session_id: SessionId,
    pub app_id: AppId,
    pub created_at_ms: u64,
    pub last_access_ms: u64,
    pub idle_timeout: Duration,
    /// Identity recorded at login. Absent on sessions created before
    /// authentication (e.g. a visit that only rendered the login form).
    pub principal: Option<Principal>,
    /// Back-reference to the owning SSO record. Absent on
    /// unauthenticated sessions and when SSO is disabled.
    pub sso_id: Option<SsoId>,
}

impl AppSession {
    /// Expiry predicate: eligible for reclamation once the idle window
    /// has fully elapsed since the last access.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_access_ms) > self.idle_timeout.as_millis() as u64
    }
}

/// In-memory store of application sessions.
///
/// All entries live behind one `RwLock`; individual operations take the
/// write lock only for a single entry's read-modify-write, and the
/// sweep never holds it across the whole scan (see [`Self::sweep_expired`]).
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, AppSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a fresh session for `app_id`.
    ///
    /// `created_at == last_access == now`; the session starts without
    /// an SSO binding (see [`Self::bind_sso`]).
    pub async fn create(
        &self,
        app_id: AppId,
        idle_timeout: Duration,
        principal: Option<Principal>,
        now_ms: u64,
    ) -> SessionId {
        let session_id = SessionId::generate();
        let session = AppSession {
            session_id: session_id.clone(),
            app_id: app_id.clone(),
            created_at_ms: now_ms,
            last_access_ms: now_ms,
            idle_timeout,
            principal,
            sso_id: None,
        };

        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session);

        vestibule_metrics::SESSIONS_CREATED_TOTAL.inc();
        tracing::debug!(session_id = %session_id, app_id = %app_id, "Created application session");
        session_id
    }

    /// Record activity on a session.
    ///
    /// Returns false if the session is absent or already past its idle
    /// timeout (lazy expiry check on read) — the caller must then treat
    /// the session as gone, even if the reaper has not swept it yet.
    pub async fn touch(&self, session_id: &SessionId, now_ms: u64) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(session) if !session.is_expired(now_ms) => {
                session.last_access_ms = session.last_access_ms.max(now_ms);
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, session_id: &SessionId) -> Option<AppSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Set the cross-reference to the owning SSO record.
    pub async fn bind_sso(&self, session_id: &SessionId, sso_id: SsoId) -> AppResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))?;
        session.sso_id = Some(sso_id);
        Ok(())
    }

    /// Explicit destruction (logout, or defensive cleanup after an SSO
    /// purge). Returns the removed record so the caller can detach it
    /// from the registry; removing an already-absent session is a no-op.
    pub async fn remove(&self, session_id: &SessionId) -> Option<AppSession> {
        let removed = self.sessions.write().await.remove(session_id);
        if let Some(session) = &removed {
            tracing::debug!(
                session_id = %session.session_id,
                app_id = %session.app_id,
                "Removed application session"
            );
        }
        removed
    }

    /// Remove every session whose idle timeout has elapsed and return
    /// the removed records (each still carrying its `sso_id`) so the
    /// reaper can detach them from the registry.
    ///
    /// Two-phase: candidates are snapshotted under the read lock, then
    /// removed under the write lock only after re-checking the expiry
    /// predicate, so a touch that lands between the phases wins and the
    /// session survives. Reclamation is therefore best-effort with
    /// bounded delay: an expired session stays visible for at most
    /// `idle_timeout + reap_interval` past its true expiry instant.
    pub async fn sweep_expired(&self, now_ms: u64) -> Vec<AppSession> {
        let candidates: Vec<SessionId> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|s| s.is_expired(now_ms))
                .map(|s| s.session_id.clone())
                .collect()
        };

        if candidates.is_empty() {
            return Vec::new();
        }

        let mut removed = Vec::new();
        let mut sessions = self.sessions.write().await;
        for session_id in candidates {
            // Re-check: a concurrent touch between the phases wins.
            if sessions
                .get(&session_id)
                .is_some_and(|s| s.is_expired(now_ms))
            {
                if let Some(session) = sessions.remove(&session_id) {
                    removed.push(session);
                }
            }
        }
        removed
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Copy of every live entry, for monitoring and consistency checks.
    pub async fn snapshot(&self) -> Vec<AppSession> {
        self.sessions.read().await.values().cloned().collect()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

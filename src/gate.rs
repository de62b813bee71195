// ============================================================================
// Request Gate - Per-request authentication decision
// ============================================================================
//
// Entry point used by the external dispatcher for every request. The
// ordering here is the core design decision of the whole coordinator:
//
//   1. a live application session (with a live SSO record) wins;
//   2. failing that, a live SSO record transparently mints a fresh
//      application session — a session timeout alone never forces
//      re-login while the shared record is still active;
//   3. failing both, the client needs a login — so an SSO timeout
//      forces re-login on every application even if some individual
//      session object has not itself expired.
//
// Every recoverable error becomes NeedsLogin. Nothing on this path may
// crash the process.
//
// ============================================================================

use std::sync::Arc;

use crate::clock::Clock;
use crate::coordinator::AuthenticationCoordinator;
use crate::session_store::SessionStore;
use crate::sso_registry::SsoRegistry;
use crate::types::{AppId, Principal, SessionId, SsoId};

/// Outcome of one request's authentication check.
///
/// On `Authenticated`, `session_id` may differ from the presented one
/// (transparent reauthentication minted a fresh session); the
/// dispatcher must relay it back to the client as its new session
/// reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthDecision {
    Authenticated {
        session_id: SessionId,
        principal: Principal,
    },
    NeedsLogin,
}

pub struct RequestGate {
    sessions: Arc<SessionStore>,
    sso: Arc<SsoRegistry>,
    coordinator: Arc<AuthenticationCoordinator>,
    clock: Arc<dyn Clock>,
    sso_enabled: bool,
}

impl RequestGate {
    pub fn new(
        sessions: Arc<SessionStore>,
        sso: Arc<SsoRegistry>,
        coordinator: Arc<AuthenticationCoordinator>,
        clock: Arc<dyn Clock>,
        sso_enabled: bool,
    ) -> Self {
        Self {
            sessions,
            sso,
            coordinator,
            clock,
            sso_enabled,
        }
    }

    /// Resolve the presented references to an authentication decision,
    /// propagating activity to both stores on the way.
    pub async fn authenticate(
        &self,
        app_id: &AppId,
        presented_session_id: Option<&SessionId>,
        presented_sso_id: Option<&SsoId>,
    ) -> AuthDecision {
        let now_ms = self.clock.now_ms();

        // Step 1: live application session.
        if let Some(session_id) = presented_session_id {
            if self.sessions.touch(session_id, now_ms).await {
                if let Some(decision) = self.authenticate_session(session_id, now_ms).await {
                    return decision;
                }
            }
        }

        // Step 2: no usable session, but a live SSO record — mint a
        // fresh session without re-login.
        if self.sso_enabled {
            if let Some(sso_id) = presented_sso_id {
                if self.sso.touch(sso_id, now_ms).await {
                    match self.coordinator.reauthenticate_via_sso(sso_id, app_id).await {
                        Ok(new_session_id) => {
                            if let Some(session) = self.sessions.get(&new_session_id).await {
                                if let Some(principal) = session.principal {
                                    return AuthDecision::Authenticated {
                                        session_id: new_session_id,
                                        principal,
                                    };
                                }
                            }
                        }
                        // Lost the race against the SSO reaper; fall
                        // back to a full login.
                        Err(e) => {
                            tracing::debug!(
                                sso_id = %sso_id,
                                app_id = %app_id,
                                error = %e,
                                "Transparent reauthentication failed"
                            );
                        }
                    }
                }
            }
        }

        // Step 3: nothing valid presented.
        AuthDecision::NeedsLogin
    }

    /// Decide whether a successfully touched session authenticates the
    /// request. None means "fall through to the SSO step".
    async fn authenticate_session(
        &self,
        session_id: &SessionId,
        now_ms: u64,
    ) -> Option<AuthDecision> {
        let session = self.sessions.get(session_id).await?;

        match &session.sso_id {
            // Bound session: the SSO record must still be live. An
            // expired or purged record means re-login everywhere, even
            // though this session object has not itself expired.
            Some(sso_id) => {
                if self.sso.touch(sso_id, now_ms).await {
                    let record = self.sso.get(sso_id).await?;
                    Some(AuthDecision::Authenticated {
                        session_id: session_id.clone(),
                        principal: record.principal,
                    })
                } else {
                    tracing::debug!(
                        session_id = %session_id,
                        sso_id = %sso_id,
                        "Session is live but its SSO record is not; forcing re-login"
                    );
                    None
                }
            }
            // Unbound session: authenticated only if it carries its own
            // principal (logins while SSO is disabled). Pre-login
            // sessions have neither and never authenticate.
            None => session
                .principal
                .map(|principal| AuthDecision::Authenticated {
                    session_id: session_id.clone(),
                    principal,
                }),
        }
    }
}

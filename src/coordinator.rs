// ============================================================================
// Authentication Coordinator - Login orchestration
// ============================================================================
//
// Orchestrates the two stores on the login and reauthentication paths.
// Credential verification itself is delegated to an injected
// CredentialVerifier; the coordinator only records the outcome that an
// identity was validated. The invariant it maintains: a session and its
// SSO record are bound on both sides or not at all — a failed SSO bind
// rolls the freshly created session back, so no orphaned sessions.
//
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use vestibule_config::Config;
use vestibule_error::{AppError, AppResult};

use crate::clock::Clock;
use crate::session_store::SessionStore;
use crate::sso_registry::SsoRegistry;
use crate::types::{AppId, Principal, SessionId, SsoId};

/// Capability for the external identity store.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, principal: &Principal, credential_proof: &str) -> bool;
}

pub struct AuthenticationCoordinator {
    sessions: Arc<SessionStore>,
    sso: Arc<SsoRegistry>,
    verifier: Arc<dyn CredentialVerifier>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl AuthenticationCoordinator {
    pub fn new(
        sessions: Arc<SessionStore>,
        sso: Arc<SsoRegistry>,
        verifier: Arc<dyn CredentialVerifier>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            sessions,
            sso,
            verifier,
            clock,
            config,
        }
    }

    /// Full login for `app_id`.
    ///
    /// Verification failure mutates nothing. On success the principal's
    /// SSO record is created or reused, a fresh application session is
    /// created, and the two are bound on both sides, in that order.
    pub async fn login(
        &self,
        principal: &Principal,
        credential_proof: &str,
        app_id: &AppId,
    ) -> AppResult<SessionId> {
        // 1. Delegate credential verification
        if !self.verifier.verify(principal, credential_proof).await {
            vestibule_metrics::LOGIN_FAILURES_TOTAL.inc();
            tracing::warn!(principal = %principal, app_id = %app_id, "Login rejected by credential verification");
            return Err(AppError::AuthenticationFailed);
        }

        let now_ms = self.clock.now_ms();

        // 2. Without SSO the session alone carries the identity
        if !self.config.sso_enabled {
            let session_id = self
                .sessions
                .create(
                    app_id.clone(),
                    self.config.session_idle_timeout,
                    Some(principal.clone()),
                    now_ms,
                )
                .await;
            tracing::info!(
                principal = %principal,
                app_id = %app_id,
                session_id = %session_id,
                "Login succeeded (SSO disabled)"
            );
            return Ok(session_id);
        }

        // 3. Create or reuse the principal's SSO record
        let sso_id = self.sso.create_or_reuse(principal, now_ms).await;

        // 4. Create the application session and bind both sides
        let session_id = self
            .bind_new_session(&sso_id, principal, app_id, now_ms)
            .await?;

        tracing::info!(
            principal = %principal,
            app_id = %app_id,
            session_id = %session_id,
            sso_id = %sso_id,
            "Login succeeded"
        );
        Ok(session_id)
    }

    /// Mint a fresh application session against an existing SSO record,
    /// skipping credential verification. Used when a request carries a
    /// valid SSO reference but no (or an expired) application session.
    pub async fn reauthenticate_via_sso(
        &self,
        sso_id: &SsoId,
        app_id: &AppId,
    ) -> AppResult<SessionId> {
        let now_ms = self.clock.now_ms();

        let principal = match self.sso.get(sso_id).await {
            Some(record) if !record.is_expired(now_ms) => record.principal,
            _ => {
                return Err(AppError::SsoInvalid(format!(
                    "SSO record {sso_id} is unknown or already reclaimed"
                )));
            }
        };

        let session_id = self
            .bind_new_session(sso_id, &principal, app_id, now_ms)
            .await?;

        vestibule_metrics::SSO_REAUTH_TOTAL.inc();
        tracing::info!(
            principal = %principal,
            app_id = %app_id,
            session_id = %session_id,
            sso_id = %sso_id,
            "Minted application session from live SSO record"
        );
        Ok(session_id)
    }

    /// Explicit logout: destroy the session and detach its SSO binding.
    /// The SSO record itself stays alive (other applications may still
    /// be using it); only the reaper destroys records. Logging out an
    /// already-absent session is a no-op.
    pub async fn logout(&self, session_id: &SessionId) {
        let Some(session) = self.sessions.remove(session_id).await else {
            return;
        };
        if let Some(sso_id) = &session.sso_id {
            self.sso
                .detach(sso_id, &session.app_id, session_id)
                .await;
        }
        tracing::info!(session_id = %session_id, app_id = %session.app_id, "Logged out");
    }

    /// Create a session and bind it to `sso_id` on both sides, rolling
    /// the session back if the SSO bind fails (e.g. the reaper purged
    /// the record between lookup and bind).
    async fn bind_new_session(
        &self,
        sso_id: &SsoId,
        principal: &Principal,
        app_id: &AppId,
        now_ms: u64,
    ) -> AppResult<SessionId> {
        let session_id = self
            .sessions
            .create(
                app_id.clone(),
                self.config.session_idle_timeout,
                Some(principal.clone()),
                now_ms,
            )
            .await;

        if let Err(e) = self.sessions.bind_sso(&session_id, sso_id.clone()).await {
            self.sessions.remove(&session_id).await;
            return Err(e);
        }

        if let Err(e) = self
            .sso
            .bind(sso_id, app_id.clone(), session_id.clone(), now_ms)
            .await
        {
            // No orphaned sessions: undo the creation before reporting.
            self.sessions.remove(&session_id).await;
            tracing::debug!(
                sso_id = %sso_id,
                session_id = %session_id,
                error = %e,
                "SSO bind failed; rolled back session creation"
            );
            return Err(AppError::SsoInvalid(format!(
                "SSO record {sso_id} is unknown or already reclaimed"
            )));
        }

        Ok(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    struct AllowAll;

    #[async_trait]
    impl CredentialVerifier for AllowAll {
        async fn verify(&self, _principal: &Principal, _proof: &str) -> bool {
            true
        }
    }

    struct DenyAll;

    #[async_trait]
    impl CredentialVerifier for DenyAll {
        async fn verify(&self, _principal: &Principal, _proof: &str) -> bool {
            false
        }
    }

    fn test_config() -> Config {
        Config {
            sso_enabled: true,
            session_idle_timeout: Duration::from_secs(20),
            session_reap_interval: Duration::from_secs(2),
            sso_max_inactive: Duration::from_secs(10),
            sso_reap_interval: Duration::from_secs(2),
        }
    }

    fn coordinator(
        verifier: Arc<dyn CredentialVerifier>,
        clock: Arc<ManualClock>,
        config: Config,
    ) -> (
        AuthenticationCoordinator,
        Arc<SessionStore>,
        Arc<SsoRegistry>,
    ) {
        let sessions = Arc::new(SessionStore::new());
        let sso = Arc::new(SsoRegistry::new(config.sso_max_inactive));
        let coordinator = AuthenticationCoordinator::new(
            sessions.clone(),
            sso.clone(),
            verifier,
            clock,
            config,
        );
        (coordinator, sessions, sso)
    }

    #[tokio::test]
    async fn failed_login_creates_no_state() {
        let clock = ManualClock::new(0);
        let (coordinator, sessions, sso) =
            coordinator(Arc::new(DenyAll), clock, test_config());

        let err = coordinator
            .login(&Principal::new("user"), "wrong", &AppId::new("app1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthenticationFailed));
        assert_eq!(sessions.count().await, 0);
        assert_eq!(sso.count().await, 0);
    }

    #[tokio::test]
    async fn login_binds_session_and_record_on_both_sides() {
        let clock = ManualClock::new(0);
        let (coordinator, sessions, sso) =
            coordinator(Arc::new(AllowAll), clock, test_config());
        let user = Principal::new("user");
        let app = AppId::new("app1");

        let sid = coordinator.login(&user, "changeit", &app).await.unwrap();

        let session = sessions.get(&sid).await.unwrap();
        let sso_id = session.sso_id.clone().expect("session references its record");
        let record = sso.get(&sso_id).await.unwrap();
        assert!(record.bindings.contains(&(app, sid)));
        assert_eq!(record.principal, user);
        assert_eq!(session.principal, Some(user));
    }

    #[tokio::test]
    async fn second_login_reuses_the_live_sso_record() {
        let clock = ManualClock::new(0);
        let (coordinator, sessions, sso) =
            coordinator(Arc::new(AllowAll), clock, test_config());
        let user = Principal::new("user");

        let sid1 = coordinator
            .login(&user, "changeit", &AppId::new("app1"))
            .await
            .unwrap();
        let sid2 = coordinator
            .login(&user, "changeit", &AppId::new("app2"))
            .await
            .unwrap();

        let sso1 = sessions.get(&sid1).await.unwrap().sso_id.unwrap();
        let sso2 = sessions.get(&sid2).await.unwrap().sso_id.unwrap();
        assert_eq!(sso1, sso2, "one record shared across applications");
        assert_eq!(sso.get(&sso1).await.unwrap().bindings.len(), 2);
    }

    #[tokio::test]
    async fn reauthentication_against_a_purged_record_fails_and_leaves_nothing() {
        let clock = ManualClock::new(0);
        let (coordinator, sessions, sso) =
            coordinator(Arc::new(AllowAll), clock.clone(), test_config());
        let user = Principal::new("user");

        let sid = coordinator
            .login(&user, "changeit", &AppId::new("app1"))
            .await
            .unwrap();
        let sso_id = sessions.get(&sid).await.unwrap().sso_id.unwrap();

        clock.advance_ms(10_001);
        sso.sweep_expired(clock.now_ms()).await;

        let before = sessions.count().await;
        let err = coordinator
            .reauthenticate_via_sso(&sso_id, &AppId::new("app2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SsoInvalid(_)));
        assert_eq!(sessions.count().await, before, "no orphaned session");
    }

    #[tokio::test]
    async fn logout_detaches_but_keeps_the_record() {
        let clock = ManualClock::new(0);
        let (coordinator, sessions, sso) =
            coordinator(Arc::new(AllowAll), clock, test_config());
        let user = Principal::new("user");
        let app = AppId::new("app1");

        let sid = coordinator.login(&user, "changeit", &app).await.unwrap();
        let sso_id = sessions.get(&sid).await.unwrap().sso_id.unwrap();

        coordinator.logout(&sid).await;
        coordinator.logout(&sid).await; // idempotent

        assert!(sessions.get(&sid).await.is_none());
        let record = sso.get(&sso_id).await.expect("record survives logout");
        assert!(record.bindings.is_empty());
    }

    #[tokio::test]
    async fn login_with_sso_disabled_creates_no_record() {
        let clock = ManualClock::new(0);
        let mut config = test_config();
        config.sso_enabled = false;
        let (coordinator, sessions, sso) = coordinator(Arc::new(AllowAll), clock, config);

        let sid = coordinator
            .login(&Principal::new("user"), "changeit", &AppId::new("app1"))
            .await
            .unwrap();

        let session = sessions.get(&sid).await.unwrap();
        assert!(session.sso_id.is_none());
        assert_eq!(session.principal, Some(Principal::new("user")));
        assert_eq!(sso.count().await, 0);
    }
}

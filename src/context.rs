use std::sync::Arc;

use vestibule_config::Config;
use vestibule_error::{AppError, AppResult};

use crate::clock::{Clock, SystemClock};
use crate::coordinator::{AuthenticationCoordinator, CredentialVerifier};
use crate::gate::RequestGate;
use crate::reaper::ReaperScheduler;
use crate::session_store::SessionStore;
use crate::sso_registry::SsoRegistry;

/// Application context wiring the coordinator together.
///
/// Explicitly constructed and explicitly torn down — there is no
/// process-wide singleton. The reaper tasks only run between
/// `start_reapers` and `shutdown`; a clean shutdown lets in-flight
/// sweeps finish before the tasks exit.
pub struct AppContext {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub sessions: Arc<SessionStore>,
    pub sso: Arc<SsoRegistry>,
    pub coordinator: Arc<AuthenticationCoordinator>,
    pub gate: RequestGate,
    reaper: ReaperScheduler,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Build a coordinator on the real wall clock.
    pub fn new(config: Config, verifier: Arc<dyn CredentialVerifier>) -> AppResult<Self> {
        Self::with_clock(config, verifier, Arc::new(SystemClock))
    }

    /// Build a coordinator on an injected clock (virtual time in tests).
    pub fn with_clock(
        config: Config,
        verifier: Arc<dyn CredentialVerifier>,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        config
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let sessions = Arc::new(SessionStore::new());
        let sso = Arc::new(SsoRegistry::new(config.sso_max_inactive));
        let coordinator = Arc::new(AuthenticationCoordinator::new(
            sessions.clone(),
            sso.clone(),
            verifier,
            clock.clone(),
            config.clone(),
        ));
        let gate = RequestGate::new(
            sessions.clone(),
            sso.clone(),
            coordinator.clone(),
            clock.clone(),
            config.sso_enabled,
        );
        let reaper =
            ReaperScheduler::new(sessions.clone(), sso.clone(), clock.clone(), config.clone());

        Ok(Self {
            config,
            clock,
            sessions,
            sso,
            coordinator,
            gate,
            reaper,
        })
    }

    pub fn start_reapers(&mut self) {
        self.reaper.start();
    }

    /// Stop the background sweeps and wait for them to finish.
    pub async fn shutdown(&mut self) {
        self.reaper.stop().await;
    }

    pub fn reapers_running(&self) -> bool {
        self.reaper.is_running()
    }
}

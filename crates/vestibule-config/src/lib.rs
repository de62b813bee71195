// ============================================================================
// Vestibule Config - Centralized configuration management
// ============================================================================
//
// Loads the coordinator's timing policy from environment variables with
// sensible defaults. Configuration is read once at coordinator
// construction; the core does not react to live reconfiguration.
//
// ============================================================================

mod constants;

pub use constants::{
    DEFAULT_SESSION_IDLE_TIMEOUT_SECS, DEFAULT_SESSION_REAP_INTERVAL_SECS,
    DEFAULT_SSO_MAX_INACTIVE_SECS, DEFAULT_SSO_REAP_INTERVAL_SECS,
};

use std::time::Duration;

use anyhow::{Result, bail};

/// Timing and feature policy for the SSO coordinator.
///
/// The defaults mirror the upstream server defaults: a 30 minute
/// session idle timeout, a 5 minute single sign-on inactivity window,
/// and one minute reap intervals for both sweeps.
#[derive(Clone, Debug)]
pub struct Config {
    /// Whether cross-application single sign-on is active. When false,
    /// logins still create per-application sessions but no shared SSO
    /// record, and no transparent reauthentication happens.
    pub sso_enabled: bool,

    /// Inactivity window after which an application session becomes
    /// eligible for reclamation.
    pub session_idle_timeout: Duration,

    /// Interval between application-session reaper sweeps.
    pub session_reap_interval: Duration,

    /// Inactivity window after which an SSO record becomes eligible for
    /// purging. Access to *any* bound application keeps the record
    /// active, so this is usually much shorter than the session idle
    /// timeout multiplied by the number of applications.
    pub sso_max_inactive: Duration,

    /// Interval between purges of expired SSO records.
    pub sso_reap_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            sso_enabled: std::env::var("VESTIBULE_SSO_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),

            session_idle_timeout: Duration::from_secs(
                std::env::var("VESTIBULE_SESSION_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SESSION_IDLE_TIMEOUT_SECS),
            ),

            session_reap_interval: Duration::from_secs(
                std::env::var("VESTIBULE_SESSION_REAP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SESSION_REAP_INTERVAL_SECS),
            ),

            sso_max_inactive: Duration::from_secs(
                std::env::var("VESTIBULE_SSO_MAX_INACTIVE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SSO_MAX_INACTIVE_SECS),
            ),

            sso_reap_interval: Duration::from_secs(
                std::env::var("VESTIBULE_SSO_REAP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SSO_REAP_INTERVAL_SECS),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the reaper cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.session_idle_timeout.is_zero() {
            bail!("session_idle_timeout must be greater than zero");
        }
        if self.session_reap_interval.is_zero() {
            bail!("session_reap_interval must be greater than zero");
        }
        if self.sso_max_inactive.is_zero() {
            bail!("sso_max_inactive must be greater than zero");
        }
        if self.sso_reap_interval.is_zero() {
            bail!("sso_reap_interval must be greater than zero");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sso_enabled: true,
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_TIMEOUT_SECS),
            session_reap_interval: Duration::from_secs(DEFAULT_SESSION_REAP_INTERVAL_SECS),
            sso_max_inactive: Duration::from_secs(DEFAULT_SSO_MAX_INACTIVE_SECS),
            sso_reap_interval: Duration::from_secs(DEFAULT_SSO_REAP_INTERVAL_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_upstream_server_defaults() {
        let config = Config::default();
        assert!(config.sso_enabled);
        assert_eq!(config.session_idle_timeout, Duration::from_secs(1800));
        assert_eq!(config.session_reap_interval, Duration::from_secs(60));
        assert_eq!(config.sso_max_inactive, Duration::from_secs(300));
        assert_eq!(config.sso_reap_interval, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut config = Config::default();
        config.session_reap_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sso_max_inactive = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}

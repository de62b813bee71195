// ============================================================================
// Configuration Constants
// ============================================================================

// Default session timing (in seconds). These track the upstream web
// container defaults: 30 minute session timeout, one minute reap cycle.
pub const DEFAULT_SESSION_IDLE_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_SESSION_REAP_INTERVAL_SECS: u64 = 60;

// Default single sign-on timing (in seconds). The SSO record only needs
// five minutes of inactivity tolerance because activity on any bound
// application refreshes it.
pub const DEFAULT_SSO_MAX_INACTIVE_SECS: u64 = 300;
pub const DEFAULT_SSO_REAP_INTERVAL_SECS: u64 = 60;

//! Prometheus metrics for the SSO coordinator.
//!
//! Provides centralized metrics collection for monitoring:
//! - Session and SSO record lifecycle (created / reaped)
//! - Transparent reauthentication through shared SSO records
//! - Failed logins
//! - Defensive cleanup performed by the reaper
//!
//! Reclamation anomalies must be observable but never fatal, so the
//! reaper counts them here and keeps running.

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, TextEncoder, opts, register_int_counter};

// ============================================================================
// Session Metrics
// ============================================================================

/// Total number of application sessions created
pub static SESSIONS_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "vestibule_sessions_created_total",
        "Total number of application sessions created"
    ))
    .expect("Failed to register SESSIONS_CREATED_TOTAL metric")
});

/// Total number of application sessions removed by the reaper
pub static SESSIONS_REAPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "vestibule_sessions_reaped_total",
        "Total number of application sessions removed by the session reaper"
    ))
    .expect("Failed to register SESSIONS_REAPED_TOTAL metric")
});

// ============================================================================
// SSO Record Metrics
// ============================================================================

/// Total number of SSO records created
pub static SSO_RECORDS_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "vestibule_sso_records_created_total",
        "Total number of single sign-on records created"
    ))
    .expect("Failed to register SSO_RECORDS_CREATED_TOTAL metric")
});

/// Total number of SSO records purged by the reaper
pub static SSO_RECORDS_REAPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "vestibule_sso_records_reaped_total",
        "Total number of single sign-on records purged by the SSO reaper"
    ))
    .expect("Failed to register SSO_RECORDS_REAPED_TOTAL metric")
});

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Sessions minted transparently from a live SSO record, without re-login
pub static SSO_REAUTH_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "vestibule_sso_reauth_total",
        "Application sessions minted transparently from a live SSO record"
    ))
    .expect("Failed to register SSO_REAUTH_TOTAL metric")
});

/// Logins rejected by credential verification
pub static LOGIN_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "vestibule_login_failures_total",
        "Logins rejected by credential verification"
    ))
    .expect("Failed to register LOGIN_FAILURES_TOTAL metric")
});

// ============================================================================
// Reaper Metrics
// ============================================================================

/// Sessions force-removed because their SSO record was purged.
///
/// Normally the session reaper detaches sessions before the SSO reaper
/// gets to their record, so sustained growth here means the two sweep
/// intervals are badly tuned relative to the timeouts.
pub static ORPHAN_SESSIONS_REMOVED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "vestibule_orphan_sessions_removed_total",
        "Sessions force-removed because their SSO record was purged"
    ))
    .expect("Failed to register ORPHAN_SESSIONS_REMOVED_TOTAL metric")
});

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
